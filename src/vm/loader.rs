//! Module loading
//!
//! A module image is a 60-byte little-endian header followed by sections the
//! header locates by byte offset and element count: statements, global defs,
//! field defs, functions, the string table and the initial globals. Loading
//! decodes every record into host order once, checks that each section lies
//! inside the input and computes the memory layout the module will run in.
//! Nothing of a failed load is kept.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::vm::errors::LoadError;
use crate::vm::memory::MemoryLayout;
use crate::vm::types::{
    Def, EType, FieldOffset, FunctionDef, FunctionId, GlobalIndex, Statement, StringIndex,
    DEF_SIZE, FUNCTION_SIZE, HEADER_SIZE, MAX_PARMS, PROG_ID_VERSION, PROG_VERSION,
    STATEMENT_SIZE,
};

/// CRC-16/CCITT with initial value `0xffff`, as used for module checksums.
pub fn crc16(bytes: &[u8]) -> u16 {
    let mut crc: u16 = 0xffff;
    for &byte in bytes {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Little-endian cursor over a byte slice.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.take())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }
}

/// The fixed module header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct Header {
    pub version: u32,
    pub crc: u32,
    pub ofs_statements: u32,
    pub num_statements: u32,
    pub ofs_globaldefs: u32,
    pub num_globaldefs: u32,
    pub ofs_fielddefs: u32,
    pub num_fielddefs: u32,
    pub ofs_functions: u32,
    pub num_functions: u32,
    pub ofs_strings: u32,
    pub num_strings: u32,
    pub ofs_globals: u32,
    pub num_globals: u32,
    pub entity_fields: u32,
}

impl Header {
    /// Decode the header; fails when `bytes` is shorter than a header.
    pub fn parse(bytes: &[u8]) -> Result<Self, LoadError> {
        if bytes.len() < HEADER_SIZE {
            return Err(LoadError::Format(format!(
                "error reading header: {} bytes, need {}",
                bytes.len(),
                HEADER_SIZE
            )));
        }
        let mut r = Reader::new(bytes);
        Ok(Self {
            version: r.u32(),
            crc: r.u32(),
            ofs_statements: r.u32(),
            num_statements: r.u32(),
            ofs_globaldefs: r.u32(),
            num_globaldefs: r.u32(),
            ofs_fielddefs: r.u32(),
            num_fielddefs: r.u32(),
            ofs_functions: r.u32(),
            num_functions: r.u32(),
            ofs_strings: r.u32(),
            num_strings: r.u32(),
            ofs_globals: r.u32(),
            num_globals: r.u32(),
            entity_fields: r.u32(),
        })
    }

    /// Encode the header in file byte order.
    pub fn to_bytes(&self) -> Vec<u8> {
        [
            self.version,
            self.crc,
            self.ofs_statements,
            self.num_statements,
            self.ofs_globaldefs,
            self.num_globaldefs,
            self.ofs_fielddefs,
            self.num_fielddefs,
            self.ofs_functions,
            self.num_functions,
            self.ofs_strings,
            self.num_strings,
            self.ofs_globals,
            self.num_globals,
            self.entity_fields,
        ]
        .iter()
        .flat_map(|field| field.to_le_bytes())
        .collect()
    }
}

/// Return the bytes of one section after checking it lies inside the input.
fn section<'a>(
    bytes: &'a [u8],
    name: &'static str,
    offset: u32,
    count: u32,
    record_size: usize,
) -> Result<&'a [u8], LoadError> {
    let offset = offset as usize;
    let needed = (count as usize)
        .checked_mul(record_size)
        .ok_or_else(|| LoadError::Format(format!("{} count {} overflows", name, count)))?;
    match offset.checked_add(needed) {
        Some(end) if end <= bytes.len() => Ok(&bytes[offset..end]),
        _ => Err(LoadError::Truncated {
            section: name,
            offset,
            needed,
            available: bytes.len(),
        }),
    }
}

/// Globals and fields the interpreter refers to by name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bindings {
    pub self_entity: Option<GlobalIndex>,
    pub time: Option<GlobalIndex>,
    pub nextthink: Option<FieldOffset>,
    pub frame: Option<FieldOffset>,
    pub think: Option<FieldOffset>,
}

/// A loaded, immutable program image.
#[derive(Debug, Clone)]
pub struct Module {
    pub header: Header,
    /// Checksum of the whole input.
    pub crc: u16,
    /// Size of the input in bytes.
    pub size: usize,
    pub statements: Vec<Statement>,
    pub functions: Vec<FunctionDef>,
    pub global_defs: Vec<Def>,
    pub field_defs: Vec<Def>,
    pub strings: Arc<[u8]>,
    /// Initial contents of the globals.
    pub globals: Vec<u32>,
    pub layout: MemoryLayout,
    pub bindings: Bindings,
    function_names: HashMap<String, FunctionId>,
    global_names: HashMap<String, usize>,
    field_names: HashMap<String, usize>,
    globals_by_offset: HashMap<u16, usize>,
}

/// Load a module image.
///
/// `entity_capacity` is the number of entity records to reserve and
/// `heap_size` the auxiliary heap in bytes.
pub fn load(bytes: &[u8], entity_capacity: usize, heap_size: usize) -> Result<Module, LoadError> {
    let header = Header::parse(bytes)?;
    debug!("Programs occupy {}K.", bytes.len() / 1024);

    if header.version != PROG_VERSION && header.version != PROG_ID_VERSION {
        return Err(LoadError::Version {
            found: header.version,
            expected: PROG_VERSION,
            alternate: PROG_ID_VERSION,
        });
    }

    let crc = crc16(bytes);

    let statements = section(
        bytes,
        "statements",
        header.ofs_statements,
        header.num_statements,
        STATEMENT_SIZE,
    )?
    .chunks_exact(STATEMENT_SIZE)
    .map(|chunk| {
        let mut r = Reader::new(chunk);
        Statement::new(r.u16(), r.u16(), r.u16(), r.u16())
    })
    .collect::<Vec<_>>();

    let functions = section(
        bytes,
        "functions",
        header.ofs_functions,
        header.num_functions,
        FUNCTION_SIZE,
    )?
    .chunks_exact(FUNCTION_SIZE)
    .map(|chunk| {
        let mut r = Reader::new(chunk);
        FunctionDef {
            first_statement: r.i32(),
            parm_start: r.u32(),
            locals: r.u32(),
            profile: r.u32(),
            s_name: r.i32(),
            s_file: r.i32(),
            numparms: r.i32(),
            parm_size: r.take::<MAX_PARMS>(),
        }
    })
    .collect::<Vec<_>>();

    let read_defs = |name: &'static str, offset: u32, count: u32| -> Result<Vec<Def>, LoadError> {
        Ok(section(bytes, name, offset, count, DEF_SIZE)?
            .chunks_exact(DEF_SIZE)
            .map(|chunk| {
                let mut r = Reader::new(chunk);
                Def {
                    type_tag: r.u16(),
                    ofs: r.u16(),
                    s_name: r.i32(),
                }
            })
            .collect())
    };
    let global_defs = read_defs("globaldefs", header.ofs_globaldefs, header.num_globaldefs)?;
    let field_defs = read_defs("fielddefs", header.ofs_fielddefs, header.num_fielddefs)?;
    if let Some(index) = field_defs.iter().position(Def::is_save_global) {
        return Err(LoadError::InvalidFieldDef { index });
    }

    let strings: Arc<[u8]> = Arc::from(section(
        bytes,
        "strings",
        header.ofs_strings,
        header.num_strings,
        1,
    )?);

    let globals = section(bytes, "globals", header.ofs_globals, header.num_globals, 4)?
        .chunks_exact(4)
        .map(|chunk| Reader::new(chunk).u32())
        .collect::<Vec<_>>();

    let layout = MemoryLayout::new(
        header.num_globals as usize,
        header.entity_fields as usize,
        entity_capacity,
        heap_size,
    )?;

    let mut module = Module {
        header,
        crc,
        size: bytes.len(),
        statements,
        functions,
        global_defs,
        field_defs,
        strings,
        globals,
        layout,
        bindings: Bindings::default(),
        function_names: HashMap::new(),
        global_names: HashMap::new(),
        field_names: HashMap::new(),
        globals_by_offset: HashMap::new(),
    };
    module.build_lookup_tables();
    module.bindings = module.resolve_bindings();

    debug!(
        "loaded module: {} statements, {} functions, {} globals, {} fields, crc {:04x}",
        module.statements.len(),
        module.functions.len(),
        module.globals.len(),
        module.header.entity_fields,
        module.crc
    );
    debug!("memory layout: {}", module.layout);
    Ok(module)
}

impl Module {
    fn build_lookup_tables(&mut self) {
        let mut function_names = HashMap::new();
        for (index, function) in self.functions.iter().enumerate() {
            let name = self.string_lossy(StringIndex(function.s_name));
            if !name.is_empty() {
                function_names.entry(name).or_insert(FunctionId(index as u32));
            }
        }

        let mut global_names = HashMap::new();
        let mut globals_by_offset = HashMap::new();
        for (index, def) in self.global_defs.iter().enumerate() {
            let name = self.string_lossy(StringIndex(def.s_name));
            if !name.is_empty() {
                global_names.entry(name).or_insert(index);
            }
            globals_by_offset.entry(def.ofs).or_insert(index);
        }

        let mut field_names = HashMap::new();
        for (index, def) in self.field_defs.iter().enumerate() {
            let name = self.string_lossy(StringIndex(def.s_name));
            if !name.is_empty() {
                field_names.entry(name).or_insert(index);
            }
        }

        self.function_names = function_names;
        self.global_names = global_names;
        self.field_names = field_names;
        self.globals_by_offset = globals_by_offset;
    }

    fn resolve_bindings(&self) -> Bindings {
        let global = |name: &str| self.find_global(name).map(|def| GlobalIndex(def.ofs as u32));
        let field = |name: &str| self.find_field(name).map(|def| FieldOffset(def.ofs as u32));
        Bindings {
            self_entity: global("self"),
            time: global("time"),
            nextthink: field("nextthink"),
            frame: field("frame"),
            think: field("think"),
        }
    }

    pub fn version(&self) -> u32 {
        self.header.version
    }

    /// Bytes of a string from the module's string table.
    pub fn string(&self, index: StringIndex) -> Option<&[u8]> {
        if index.is_temp() {
            return None;
        }
        let tail = self.strings.get(index.0 as usize..)?;
        let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
        Some(&tail[..end])
    }

    /// A module string as text; empty when the reference is invalid.
    pub fn string_lossy(&self, index: StringIndex) -> String {
        self.string(index)
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .unwrap_or_default()
    }

    pub fn function(&self, id: FunctionId) -> Option<&FunctionDef> {
        self.functions.get(id.index())
    }

    pub fn function_name(&self, id: FunctionId) -> String {
        self.function(id)
            .map(|f| self.string_lossy(StringIndex(f.s_name)))
            .unwrap_or_default()
    }

    pub fn function_file(&self, id: FunctionId) -> String {
        self.function(id)
            .map(|f| self.string_lossy(StringIndex(f.s_file)))
            .unwrap_or_default()
    }

    pub fn find_function(&self, name: &str) -> Option<FunctionId> {
        self.function_names.get(name).copied()
    }

    pub fn find_global(&self, name: &str) -> Option<&Def> {
        self.global_names.get(name).map(|&i| &self.global_defs[i])
    }

    pub fn find_field(&self, name: &str) -> Option<&Def> {
        self.field_names.get(name).map(|&i| &self.field_defs[i])
    }

    /// The global def placed at `ofs`, if any.
    pub fn global_def_at(&self, ofs: u16) -> Option<&Def> {
        self.globals_by_offset.get(&ofs).map(|&i| &self.global_defs[i])
    }

    pub fn def_name(&self, def: &Def) -> String {
        self.string_lossy(StringIndex(def.s_name))
    }

    /// The function whose body contains `statement`.
    pub fn function_at_statement(&self, statement: usize) -> Option<FunctionId> {
        self.functions
            .iter()
            .enumerate()
            .filter(|(_, f)| f.first_statement > 0 && f.first_statement as usize <= statement)
            .max_by_key(|(_, f)| f.first_statement)
            .map(|(index, _)| FunctionId(index as u32))
    }

    /// Type of the global at `ofs` as declared by its def.
    pub fn global_type(&self, ofs: u16) -> Option<EType> {
        self.global_def_at(ofs).and_then(Def::etype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_check_value() {
        assert_eq!(crc16(b"123456789"), 0x29b1);
        assert_eq!(crc16(b""), 0xffff);
    }

    #[test]
    fn test_short_header_is_format_error() {
        let err = load(&[0u8; 59], 1, 0).unwrap_err();
        assert!(matches!(err, LoadError::Format(_)));
    }

    #[test]
    fn test_bad_version() {
        let header = Header {
            version: 7,
            ..Default::default()
        };
        let err = load(&header.to_bytes(), 1, 0).unwrap_err();
        assert_eq!(
            err,
            LoadError::Version {
                found: 7,
                expected: PROG_VERSION,
                alternate: PROG_ID_VERSION
            }
        );
    }

    #[test]
    fn test_truncated_section() {
        let header = Header {
            version: PROG_VERSION,
            ofs_statements: HEADER_SIZE as u32,
            num_statements: 4,
            ..Default::default()
        };
        let err = load(&header.to_bytes(), 1, 0).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Truncated {
                section: "statements",
                ..
            }
        ));
    }

    #[test]
    fn test_header_round_trip() {
        let header = Header {
            version: PROG_ID_VERSION,
            num_globals: 28,
            entity_fields: 3,
            ..Default::default()
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(Header::parse(&bytes).unwrap(), header);
    }
}
