//! Module writer and JSON assembly for progs modules
//!
//! This module produces module images in the on-disk format the loader reads.
//! It includes:
//!
//! - `ModuleBuilder`: accumulates strings, globals, defs, functions and
//!   statements and serialises them with `to_bytes`
//! - `AssemblySource`: a JSON description of a module whose statements are
//!   written as `["add.f", "x", "y", "z"]` and resolved by name
//! - `dump_module`: a textual listing of a loaded module for debugging

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::vm::loader::{crc16, Header, Module};
use crate::vm::memory::GlobalMemory;
use crate::vm::opcodes::Opcode;
use crate::vm::trace::disassemble_module;
use crate::vm::types::{
    format_version, parm_offset, Def, EType, FieldOffset, FunctionDef, FunctionId, Statement,
    StringIndex, Value, DEF_SIZE, FUNCTION_SIZE, HEADER_SIZE, MAX_PARMS, OFS_RETURN, PARM_SIZE,
    PROG_VERSION, RESERVED_OFS, STATEMENT_SIZE,
};

/// Incrementally built module image.
///
/// A new builder already holds what every module starts with: the empty
/// string, the null statement, the null function, the null defs and the
/// reserved return/parameter globals.
#[derive(Debug, Clone)]
pub struct ModuleBuilder {
    version: u32,
    strings: Vec<u8>,
    interned: HashMap<String, i32>,
    statements: Vec<Statement>,
    functions: Vec<FunctionDef>,
    global_defs: Vec<Def>,
    field_defs: Vec<Def>,
    globals: Vec<u32>,
    global_names: HashMap<String, u16>,
    entity_fields: u32,
}

impl Default for ModuleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleBuilder {
    pub fn new() -> Self {
        let mut interned = HashMap::new();
        interned.insert(String::new(), 0);
        Self {
            version: PROG_VERSION,
            strings: vec![0],
            interned,
            statements: vec![Statement::default()],
            functions: vec![FunctionDef::default()],
            global_defs: vec![Def::default()],
            field_defs: vec![Def::default()],
            globals: vec![0; RESERVED_OFS as usize],
            global_names: HashMap::new(),
            entity_fields: 0,
        }
    }

    pub fn set_version(&mut self, version: u32) {
        self.version = version;
    }

    /// Intern a string and return its offset in the string table.
    pub fn add_string(&mut self, text: &str) -> i32 {
        if let Some(&offset) = self.interned.get(text) {
            return offset;
        }
        let offset = self.strings.len() as i32;
        self.strings.extend_from_slice(text.as_bytes());
        self.strings.push(0);
        self.interned.insert(text.to_string(), offset);
        offset
    }

    /// Grow the global area to at least `count` words.
    pub fn reserve_globals(&mut self, count: usize) {
        if self.globals.len() < count {
            self.globals.resize(count, 0);
        }
    }

    /// Append `count` zeroed words and return the offset of the first.
    pub fn reserve_words(&mut self, count: u32) -> u16 {
        let ofs = self.globals.len() as u16;
        self.globals.resize(self.globals.len() + count as usize, 0);
        ofs
    }

    /// Add a def naming the global at `ofs`.
    pub fn add_def(&mut self, name: &str, etype: EType, ofs: u16) {
        let s_name = self.add_string(name);
        self.global_defs.push(Def {
            type_tag: etype as u16,
            ofs,
            s_name,
        });
        self.global_names.entry(name.to_string()).or_insert(ofs);
    }

    /// Append a named, initialised global and return its offset.
    pub fn add_global(&mut self, name: &str, value: Value) -> u16 {
        let words = value.to_words();
        let ofs = self.reserve_words(words.len().max(1) as u32);
        self.globals[ofs as usize..ofs as usize + words.len()].copy_from_slice(&words);
        self.add_def(name, value.etype(), ofs);
        ofs
    }

    /// Offset of a global added by name.
    pub fn global_offset(&self, name: &str) -> Option<u16> {
        self.global_names.get(name).copied()
    }

    pub fn global_count(&self) -> usize {
        self.globals.len()
    }

    /// Append statements and return the index of the first.
    pub fn push_statements(&mut self, statements: &[Statement]) -> i32 {
        let first = self.statements.len() as i32;
        self.statements.extend_from_slice(statements);
        first
    }

    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }

    fn push_function(&mut self, name: &str, file: &str, mut def: FunctionDef) -> FunctionId {
        def.s_name = self.add_string(name);
        def.s_file = self.add_string(file);
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(def);
        id
    }

    fn parm_sizes(sizes: &[u8]) -> [u8; MAX_PARMS] {
        let mut parm_size = [0u8; MAX_PARMS];
        for (slot, &size) in parm_size.iter_mut().zip(sizes) {
            *slot = size;
        }
        parm_size
    }

    /// Add a bytecode function with a fixed parameter list.
    pub fn add_function(
        &mut self,
        name: &str,
        file: &str,
        first_statement: i32,
        parm_start: u32,
        parm_sizes: &[u8],
        locals: u32,
    ) -> FunctionId {
        let numparms = parm_sizes.len().min(MAX_PARMS) as i32;
        self.push_function(
            name,
            file,
            FunctionDef {
                first_statement,
                parm_start,
                locals,
                numparms,
                parm_size: Self::parm_sizes(parm_sizes),
                ..FunctionDef::default()
            },
        )
    }

    /// Add a function taking `fixed_sizes` positional parameters and any
    /// number of further arguments.
    pub fn add_variadic_function(
        &mut self,
        name: &str,
        file: &str,
        first_statement: i32,
        parm_start: u32,
        fixed_sizes: &[u8],
        locals: u32,
    ) -> FunctionId {
        let fixed = fixed_sizes.len().min(MAX_PARMS - 1) as i32;
        self.push_function(
            name,
            file,
            FunctionDef {
                first_statement,
                parm_start,
                locals,
                numparms: -(fixed + 1),
                parm_size: Self::parm_sizes(&fixed_sizes[..fixed as usize]),
                ..FunctionDef::default()
            },
        )
    }

    /// Add a function implemented by host builtin number `index`.
    pub fn add_builtin(&mut self, name: &str, index: u32) -> FunctionId {
        self.push_function(
            name,
            "",
            FunctionDef {
                first_statement: -(index as i32),
                ..FunctionDef::default()
            },
        )
    }

    /// Point a function at its first statement once its body is known.
    pub fn set_function_entry(&mut self, id: FunctionId, first_statement: i32) {
        if let Some(def) = self.functions.get_mut(id.index()) {
            def.first_statement = first_statement;
        }
    }

    /// Declare an entity field and return its offset within each entity.
    pub fn add_field(&mut self, name: &str, etype: EType) -> u16 {
        let ofs = self.entity_fields as u16;
        let s_name = self.add_string(name);
        self.field_defs.push(Def {
            type_tag: etype as u16,
            ofs,
            s_name,
        });
        self.entity_fields += etype.word_count();
        ofs
    }

    /// Serialise the module in file byte order.
    pub fn to_bytes(&self) -> Vec<u8> {
        let ofs_statements = HEADER_SIZE;
        let ofs_globaldefs = ofs_statements + self.statements.len() * STATEMENT_SIZE;
        let ofs_fielddefs = ofs_globaldefs + self.global_defs.len() * DEF_SIZE;
        let ofs_functions = ofs_fielddefs + self.field_defs.len() * DEF_SIZE;
        let ofs_strings = ofs_functions + self.functions.len() * FUNCTION_SIZE;
        let ofs_globals = ofs_strings + self.strings.len();

        let mut body = Vec::with_capacity(ofs_globals + self.globals.len() * 4 - HEADER_SIZE);

        for st in &self.statements {
            for half in [st.op, st.a, st.b, st.c] {
                body.extend_from_slice(&half.to_le_bytes());
            }
        }
        for def in self.global_defs.iter().chain(&self.field_defs) {
            body.extend_from_slice(&def.type_tag.to_le_bytes());
            body.extend_from_slice(&def.ofs.to_le_bytes());
            body.extend_from_slice(&def.s_name.to_le_bytes());
        }
        for f in &self.functions {
            body.extend_from_slice(&f.first_statement.to_le_bytes());
            body.extend_from_slice(&f.parm_start.to_le_bytes());
            body.extend_from_slice(&f.locals.to_le_bytes());
            body.extend_from_slice(&f.profile.to_le_bytes());
            body.extend_from_slice(&f.s_name.to_le_bytes());
            body.extend_from_slice(&f.s_file.to_le_bytes());
            body.extend_from_slice(&f.numparms.to_le_bytes());
            body.extend_from_slice(&f.parm_size);
        }
        body.extend_from_slice(&self.strings);
        for word in &self.globals {
            body.extend_from_slice(&word.to_le_bytes());
        }

        let header = Header {
            version: self.version,
            crc: crc16(&body) as u32,
            ofs_statements: ofs_statements as u32,
            num_statements: self.statements.len() as u32,
            ofs_globaldefs: ofs_globaldefs as u32,
            num_globaldefs: self.global_defs.len() as u32,
            ofs_fielddefs: ofs_fielddefs as u32,
            num_fielddefs: self.field_defs.len() as u32,
            ofs_functions: ofs_functions as u32,
            num_functions: self.functions.len() as u32,
            ofs_strings: ofs_strings as u32,
            num_strings: self.strings.len() as u32,
            ofs_globals: ofs_globals as u32,
            num_globals: self.globals.len() as u32,
            entity_fields: self.entity_fields,
        };

        let mut bytes = header.to_bytes();
        bytes.extend_from_slice(&body);
        bytes
    }
}

/// Errors raised while assembling a JSON module description
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("Invalid assembly source: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown opcode '{opname}' in function {function}")]
    UnknownOpcode { function: String, opname: String },

    #[error("Unknown name '{name}' in function {function}")]
    UnknownName { function: String, name: String },

    #[error("Operand {value} out of range in function {function}")]
    OperandRange { function: String, value: i64 },

    #[error("Malformed statement {index} in function {function}: {reason}")]
    MalformedStatement {
        function: String,
        index: usize,
        reason: &'static str,
    },

    #[error("Function {function} has {count} parameters, at most {max} are allowed")]
    TooManyParams {
        function: String,
        count: usize,
        max: usize,
    },

    #[error("Global {name} needs either a value or a string")]
    MissingValue { name: String },
}

/// A named slot with a declared type: a field, parameter or local.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolSource {
    pub name: String,
    #[serde(rename = "type")]
    pub etype: EType,
}

/// A global with its initial value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalSource {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Initial text of a string global.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string: Option<String>,
}

/// A statement operand: a global name or a raw number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Number(i64),
    Name(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionSource {
    pub name: String,
    pub file: String,
    /// Builtin number for functions implemented by the host.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub builtin: Option<u32>,
    pub params: Vec<SymbolSource>,
    pub locals: Vec<SymbolSource>,
    pub variadic: bool,
    /// Statements as `[opname, a, b, c]`; missing operands are zero.
    pub statements: Vec<Vec<Operand>>,
}

/// A whole module described in JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblySource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    pub fields: Vec<SymbolSource>,
    pub globals: Vec<GlobalSource>,
    pub functions: Vec<FunctionSource>,
}

/// Names every function can use for the return slot and the parameters.
fn reserved_names() -> HashMap<String, u16> {
    let mut names = HashMap::new();
    names.insert("return".to_string(), OFS_RETURN as u16);
    for n in 0..MAX_PARMS {
        names.insert(format!("parm{}", n), parm_offset(n) as u16);
    }
    names
}

struct FunctionLayout {
    id: FunctionId,
    scope: HashMap<String, u16>,
}

impl AssemblySource {
    pub fn from_json(text: &str) -> Result<Self, AssemblyError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AssemblyError> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Resolve names and opcodes and build the module.
    ///
    /// Every field and every function also gets a global of the same name
    /// holding its offset or function number. A body that does not end in
    /// `return` or `done` gets a `done` appended.
    pub fn assemble(&self) -> Result<ModuleBuilder, AssemblyError> {
        let mut builder = ModuleBuilder::new();
        if let Some(version) = self.version {
            builder.set_version(version);
        }

        builder.add_def("return", EType::Vector, OFS_RETURN as u16);
        for n in 0..MAX_PARMS {
            builder.add_def(&format!("parm{}", n), EType::Vector, parm_offset(n) as u16);
        }

        for field in &self.fields {
            let ofs = builder.add_field(&field.name, field.etype);
            builder.add_global(&field.name, Value::Field(FieldOffset(ofs as u32)));
        }

        for global in &self.globals {
            let value = match (&global.value, &global.string) {
                (_, Some(text)) => Value::String(StringIndex(builder.add_string(text))),
                (Some(value), None) => *value,
                (None, None) => {
                    return Err(AssemblyError::MissingValue {
                        name: global.name.clone(),
                    })
                }
            };
            builder.add_global(&global.name, value);
        }

        let layouts = self
            .functions
            .iter()
            .map(|function| declare_function(&mut builder, function))
            .collect::<Result<Vec<_>, _>>()?;
        // `return` copies three words from its operand, whatever its type
        builder.reserve_words(PARM_SIZE - 1);

        let reserved = reserved_names();
        for (function, layout) in self.functions.iter().zip(&layouts) {
            if function.builtin.is_some() {
                continue;
            }
            let mut body = function
                .statements
                .iter()
                .enumerate()
                .map(|(index, operands)| {
                    assemble_statement(&builder, &reserved, function, &layout.scope, index, operands)
                })
                .collect::<Result<Vec<_>, _>>()?;
            let terminated = body
                .last()
                .is_some_and(|st| st.op == Opcode::Return as u16 || st.op == Opcode::Done as u16);
            if !terminated {
                body.push(Statement::new(Opcode::Done as u16, 0, 0, 0));
            }
            let first = builder.push_statements(&body);
            builder.set_function_entry(layout.id, first);
        }

        Ok(builder)
    }
}

/// Add the function record, its parameter/local globals and its name global.
fn declare_function(builder: &mut ModuleBuilder, function: &FunctionSource) -> Result<FunctionLayout, AssemblyError> {
    if let Some(index) = function.builtin {
        let id = builder.add_builtin(&function.name, index);
        builder.add_global(&function.name, Value::Function(id));
        return Ok(FunctionLayout {
            id,
            scope: HashMap::new(),
        });
    }

    let max = if function.variadic { MAX_PARMS - 1 } else { MAX_PARMS };
    if function.params.len() > max {
        return Err(AssemblyError::TooManyParams {
            function: function.name.clone(),
            count: function.params.len(),
            max,
        });
    }

    let parm_start = builder.global_count() as u32;
    let mut scope = HashMap::new();
    let mut declare = |builder: &mut ModuleBuilder, symbol: &SymbolSource| {
        let ofs = builder.reserve_words(symbol.etype.word_count());
        builder.add_def(&symbol.name, symbol.etype, ofs);
        scope.insert(symbol.name.clone(), ofs);
    };

    for param in &function.params {
        declare(builder, param);
    }
    if function.variadic {
        for (name, etype) in [("argc", EType::Integer), ("argv", EType::Pointer)] {
            declare(
                builder,
                &SymbolSource {
                    name: name.to_string(),
                    etype,
                },
            );
        }
        builder.reserve_words((MAX_PARMS - function.params.len()) as u32 * PARM_SIZE);
    }
    for local in &function.locals {
        declare(builder, local);
    }
    let locals = builder.global_count() as u32 - parm_start;

    let sizes: Vec<u8> = function
        .params
        .iter()
        .map(|p| p.etype.word_count() as u8)
        .collect();
    let id = if function.variadic {
        builder.add_variadic_function(&function.name, &function.file, 0, parm_start, &sizes, locals)
    } else {
        builder.add_function(&function.name, &function.file, 0, parm_start, &sizes, locals)
    };
    builder.add_global(&function.name, Value::Function(id));
    Ok(FunctionLayout { id, scope })
}

fn assemble_statement(
    builder: &ModuleBuilder,
    reserved: &HashMap<String, u16>,
    function: &FunctionSource,
    scope: &HashMap<String, u16>,
    index: usize,
    operands: &[Operand],
) -> Result<Statement, AssemblyError> {
    let malformed = |reason| AssemblyError::MalformedStatement {
        function: function.name.clone(),
        index,
        reason,
    };
    let (opname, rest) = match operands.split_first() {
        Some((Operand::Name(opname), rest)) => (opname, rest),
        Some(_) => return Err(malformed("opcode must be a name")),
        None => return Err(malformed("empty statement")),
    };
    if rest.len() > 3 {
        return Err(malformed("more than three operands"));
    }
    let op = Opcode::by_name(opname).ok_or_else(|| AssemblyError::UnknownOpcode {
        function: function.name.clone(),
        opname: opname.clone(),
    })?;

    let mut slots = [0u16; 3];
    for (slot, operand) in slots.iter_mut().zip(rest) {
        *slot = match operand {
            Operand::Number(value) => match *value {
                v @ -0x8000..=-1 => v as i16 as u16,
                v @ 0..=0xffff => v as u16,
                value => {
                    return Err(AssemblyError::OperandRange {
                        function: function.name.clone(),
                        value,
                    })
                }
            },
            Operand::Name(name) => scope
                .get(name)
                .or_else(|| reserved.get(name))
                .copied()
                .or_else(|| builder.global_offset(name))
                .ok_or_else(|| AssemblyError::UnknownName {
                    function: function.name.clone(),
                    name: name.clone(),
                })?,
        };
    }
    Ok(Statement::new(op as u16, slots[0], slots[1], slots[2]))
}

/// Dump a loaded module with its function table and statements for debugging.
pub fn dump_module(module: &Module) -> Result<String, crate::vm::errors::LoadError> {
    let memory = GlobalMemory::with_image(&module.layout, &module.globals)?;
    let mut result = String::new();
    result.push_str(&format!(
        "Module: version {}, crc {:04x}, {} bytes\n",
        format_version(module.version()),
        module.crc,
        module.size
    ));

    result.push_str("Function Table:\n");
    for (index, function) in module.functions.iter().enumerate().skip(1) {
        let id = FunctionId(index as u32);
        let entry = match function.builtin_index() {
            Some(builtin) => format!("builtin #{}", builtin),
            None => format!("{:05}", function.first_statement),
        };
        result.push_str(&format!("  {} -> {}\n", module.function_name(id), entry));
    }

    result.push_str("\nStatements:\n");
    for line in disassemble_module(module, &memory, None) {
        result.push_str(&line);
        result.push('\n');
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::loader::load;
    use crate::vm::types::PROG_ID_VERSION;

    #[test]
    fn test_new_builder_loads() {
        let module = load(&ModuleBuilder::new().to_bytes(), 1, 0).unwrap();
        assert_eq!(module.statements.len(), 1);
        assert_eq!(module.functions.len(), 1);
        assert_eq!(module.globals.len(), RESERVED_OFS as usize);
        assert_eq!(module.version(), PROG_VERSION);
    }

    #[test]
    fn test_builder_contents_survive_loading() {
        let mut builder = ModuleBuilder::new();
        builder.set_version(PROG_ID_VERSION);
        let origin = builder.add_field("origin", EType::Vector);
        let health = builder.add_field("health", EType::Float);
        let speed = builder.add_global("speed", Value::Float(320.0));
        let body = builder.push_statements(&[Statement::new(Opcode::Done as u16, 0, 0, 0)]);
        let think = builder.add_function("think", "ai.qc", body, 40, &[1, 3], 4);
        let bytes = builder.to_bytes();

        let module = load(&bytes, 2, 0).unwrap();
        assert_eq!(module.version(), PROG_ID_VERSION);
        assert_eq!(module.header.entity_fields, 4);
        assert_eq!((origin, health), (0, 3));
        assert_eq!(module.find_global("speed").map(|d| d.ofs), Some(speed));
        assert_eq!(module.globals[speed as usize], 320.0f32.to_bits());
        assert_eq!(module.find_function("think"), Some(think));
        let def = module.function(think).unwrap();
        assert_eq!(def.numparms, 2);
        assert_eq!(&def.parm_size[..3], &[1, 3, 0]);
        assert_eq!(module.function_file(think), "ai.qc");
        assert_eq!(module.header.crc, crc16(&bytes[HEADER_SIZE..]) as u32);
    }

    #[test]
    fn test_strings_are_interned() {
        let mut builder = ModuleBuilder::new();
        let a = builder.add_string("hello");
        let b = builder.add_string("hello");
        assert_eq!(a, b);
        assert_eq!(builder.add_string(""), 0);
    }

    #[test]
    fn test_assemble_resolves_names() {
        let source = AssemblySource::from_json(
            r#"{
                "globals": [
                    {"name": "x", "value": {"type": "float", "value": 2}},
                    {"name": "greeting", "string": "hi"}
                ],
                "functions": [
                    {"name": "print", "builtin": 1},
                    {
                        "name": "double",
                        "file": "math.qc",
                        "params": [{"name": "v", "type": "float"}],
                        "statements": [["add.f", "v", "v", "return"], ["return", "return"]]
                    },
                    {
                        "name": "main",
                        "statements": [["store.f", "x", "parm0"], ["call1", "double"]]
                    }
                ]
            }"#,
        )
        .unwrap();
        let module = load(&source.assemble().unwrap().to_bytes(), 1, 0).unwrap();

        let double = module.find_function("double").unwrap();
        let def = module.function(double).unwrap();
        let first = def.first_statement as usize;
        let add = module.statements[first];
        assert_eq!(add.op, Opcode::AddF as u16);
        assert_eq!(add.a as u32, def.parm_start);
        assert_eq!(add.c as u32, OFS_RETURN);

        let main = module.find_function("main").unwrap();
        let body = module.function(main).unwrap().first_statement as usize;
        assert_eq!(module.statements[body + 2].op, Opcode::Done as u16);
        assert!(module.function(module.find_function("print").unwrap()).unwrap().is_builtin());
        assert_eq!(
            module.string_lossy(StringIndex(
                module.globals[module.find_global("greeting").unwrap().ofs as usize] as i32
            )),
            "hi"
        );
    }

    #[test]
    fn test_assemble_reports_unknown_names() {
        let source = AssemblySource::from_json(
            r#"{"functions": [{"name": "main", "statements": [["add.f", "nope", 0, 0]]}]}"#,
        )
        .unwrap();
        assert!(matches!(
            source.assemble(),
            Err(AssemblyError::UnknownName { ref name, .. }) if name == "nope"
        ));

        let source = AssemblySource::from_json(
            r#"{"functions": [{"name": "main", "statements": [["frobnicate"]]}]}"#,
        )
        .unwrap();
        assert!(matches!(source.assemble(), Err(AssemblyError::UnknownOpcode { .. })));
    }

    #[test]
    fn test_returning_last_local_validates() {
        let source = AssemblySource::from_json(
            r#"{"functions": [{
                "name": "last",
                "locals": [{"name": "t", "type": "float"}],
                "statements": [["return", "t"]]
            }]}"#,
        )
        .unwrap();
        let module = load(&source.assemble().unwrap().to_bytes(), 1, 0).unwrap();
        let last = module.function(module.find_function("last").unwrap()).unwrap();
        let ret = module.statements[last.first_statement as usize];
        assert!(ret.a as u32 + 3 <= module.header.num_globals);
        assert_eq!(crate::vm::validate::validate(&module), Ok(()));
    }

    #[test]
    fn test_negative_operands_are_shorts() {
        let source = AssemblySource::from_json(
            r#"{"functions": [{"name": "spin", "statements": [["goto", -1]]}]}"#,
        )
        .unwrap();
        let module = load(&source.assemble().unwrap().to_bytes(), 1, 0).unwrap();
        let spin = module.function(module.find_function("spin").unwrap()).unwrap();
        assert_eq!(module.statements[spin.first_statement as usize].a_short(), -1);
    }

    #[test]
    fn test_dump_lists_functions_and_statements() {
        let mut builder = ModuleBuilder::new();
        let body = builder.push_statements(&[Statement::new(Opcode::Done as u16, 0, 0, 0)]);
        builder.add_function("main", "main.qc", body, 0, &[], 0);
        builder.add_builtin("print", 1);
        let module = load(&builder.to_bytes(), 1, 0).unwrap();
        let dump = dump_module(&module).unwrap();
        assert!(dump.contains("main -> 00001"));
        assert!(dump.contains("print -> builtin #1"));
        assert!(dump.contains("main (main.qc):"));
    }
}
