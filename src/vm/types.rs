//! Type definitions for the virtual machine
//!
//! This module contains the core data types shared by the loader, the
//! validator and the interpreter:
//!
//! - Format constants of the on-disk module (versions, record sizes, the
//!   reserved global offsets used for parameters and the return value)
//! - The typed handles used to address the flat global array
//! - `EType`, the type tag carried by defs and by the opcode table
//! - `Value`, the tagged view of one or more global words used at the
//!   host-visible boundary
//! - The decoded on-disk records: `Statement`, `FunctionDef` and `Def`

use serde::{Deserialize, Serialize};
use std::fmt;

/// Version number of modules produced by the id compiler.
pub const PROG_ID_VERSION: u32 = 6;

/// Version number of the extended module format.
pub const PROG_VERSION: u32 = 0x00ff_f005;

/// Maximum number of formal parameters a function can declare.
pub const MAX_PARMS: usize = 8;

/// Words reserved for each parameter slot (wide enough for a vector).
pub const PARM_SIZE: u32 = 3;

/// Global offset that always reads as zero.
pub const OFS_NULL: u32 = 0;

/// Global offset of the return slot.
pub const OFS_RETURN: u32 = 1;

/// Global offset of the first parameter slot.
pub const OFS_PARM0: u32 = 4;

/// First global offset available to compiled code.
pub const RESERVED_OFS: u32 = 28;

/// Flag bit in a def's type tag marking a global that belongs in save games.
pub const DEF_SAVEGLOBAL: u16 = 1 << 15;

/// Size in bytes of the module header.
pub const HEADER_SIZE: usize = 60;

/// Size in bytes of one statement record.
pub const STATEMENT_SIZE: usize = 8;

/// Size in bytes of one function record.
pub const FUNCTION_SIZE: usize = 28 + MAX_PARMS;

/// Size in bytes of one global or field def record.
pub const DEF_SIZE: usize = 8;

/// Global offset of parameter slot `n`.
pub fn parm_offset(n: usize) -> u32 {
    OFS_PARM0 + n as u32 * PARM_SIZE
}

/// Render a version number the way the error messages show it.
///
/// Extended versions are shown as a `MM.mmm.ppp` triplet, id versions as a
/// plain number.
pub fn format_version(version: u32) -> String {
    if version < 0x00ff_f000 {
        version.to_string()
    } else {
        format!(
            "{:02x}.{:03x}.{:03x}",
            version >> 24,
            (version >> 12) & 0xfff,
            version & 0xfff
        )
    }
}

/// Index of one word in the flat global array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GlobalIndex(pub u32);

/// Entity number inside the entity area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u32);

/// Word offset of a field inside every entity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldOffset(pub u32);

/// Index into the module's function table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionId(pub u32);

/// Reference to a string.
///
/// Non-negative values are byte offsets into the module's string table,
/// negative values name transient strings created at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StringIndex(pub i32);

macro_rules! handle_index {
    ($($handle:ident),*) => {
        $(
            impl $handle {
                /// The handle as a container index.
                pub fn index(self) -> usize {
                    self.0 as usize
                }
            }

            impl fmt::Display for $handle {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        )*
    };
}

handle_index!(GlobalIndex, EntityId, FieldOffset, FunctionId);

impl StringIndex {
    /// The empty string every module starts its string table with.
    pub const EMPTY: StringIndex = StringIndex(0);

    pub fn is_temp(self) -> bool {
        self.0 < 0
    }
}

/// Type tags used by defs and by the opcode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u16)]
pub enum EType {
    Void = 0,
    String = 1,
    Float = 2,
    Vector = 3,
    Entity = 4,
    Field = 5,
    Function = 6,
    Pointer = 7,
    Quaternion = 8,
    Integer = 9,
    UInteger = 10,
    /// The operand is an immediate embedded in the statement.
    Short = 11,
    Struct = 12,
}

impl EType {
    /// Decode a def type tag, ignoring the save-global flag.
    pub fn from_tag(tag: u16) -> Option<EType> {
        let etype = match tag & !DEF_SAVEGLOBAL {
            0 => EType::Void,
            1 => EType::String,
            2 => EType::Float,
            3 => EType::Vector,
            4 => EType::Entity,
            5 => EType::Field,
            6 => EType::Function,
            7 => EType::Pointer,
            8 => EType::Quaternion,
            9 => EType::Integer,
            10 => EType::UInteger,
            11 => EType::Short,
            12 => EType::Struct,
            _ => return None,
        };
        Some(etype)
    }

    /// Number of global words a value of this type occupies.
    pub fn word_count(self) -> u32 {
        match self {
            EType::Vector => 3,
            EType::Quaternion => 4,
            _ => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EType::Void => "void",
            EType::String => "string",
            EType::Float => "float",
            EType::Vector => "vector",
            EType::Entity => "entity",
            EType::Field => "field",
            EType::Function => "function",
            EType::Pointer => "pointer",
            EType::Quaternion => "quaternion",
            EType::Integer => "integer",
            EType::UInteger => "uinteger",
            EType::Short => "short",
            EType::Struct => "struct",
        }
    }
}

impl fmt::Display for EType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed view of one or more global words.
///
/// The interpreter works on raw words; `Value` is what the host sees when it
/// reads or writes globals and entity fields through the public API.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Void,
    String(StringIndex),
    Float(f32),
    Vector([f32; 3]),
    Entity(EntityId),
    Field(FieldOffset),
    Function(FunctionId),
    Pointer(GlobalIndex),
    Quaternion([f32; 4]),
    Integer(i32),
    UInteger(u32),
}

impl Value {
    /// Decode `words` according to `etype`.
    ///
    /// Returns `None` when fewer words are supplied than the type needs.
    pub fn from_words(etype: EType, words: &[u32]) -> Option<Value> {
        if words.len() < etype.word_count() as usize {
            return None;
        }
        let value = match etype {
            EType::Void | EType::Short | EType::Struct => Value::Void,
            EType::String => Value::String(StringIndex(words[0] as i32)),
            EType::Float => Value::Float(f32::from_bits(words[0])),
            EType::Vector => Value::Vector([
                f32::from_bits(words[0]),
                f32::from_bits(words[1]),
                f32::from_bits(words[2]),
            ]),
            EType::Entity => Value::Entity(EntityId(words[0])),
            EType::Field => Value::Field(FieldOffset(words[0])),
            EType::Function => Value::Function(FunctionId(words[0])),
            EType::Pointer => Value::Pointer(GlobalIndex(words[0])),
            EType::Quaternion => Value::Quaternion([
                f32::from_bits(words[0]),
                f32::from_bits(words[1]),
                f32::from_bits(words[2]),
                f32::from_bits(words[3]),
            ]),
            EType::Integer => Value::Integer(words[0] as i32),
            EType::UInteger => Value::UInteger(words[0]),
        };
        Some(value)
    }

    /// Encode the value as the words it occupies in the global array.
    pub fn to_words(&self) -> Vec<u32> {
        match *self {
            Value::Void => Vec::new(),
            Value::String(s) => vec![s.0 as u32],
            Value::Float(f) => vec![f.to_bits()],
            Value::Vector(v) => v.iter().map(|f| f.to_bits()).collect(),
            Value::Entity(e) => vec![e.0],
            Value::Field(f) => vec![f.0],
            Value::Function(f) => vec![f.0],
            Value::Pointer(p) => vec![p.0],
            Value::Quaternion(q) => q.iter().map(|f| f.to_bits()).collect(),
            Value::Integer(i) => vec![i as u32],
            Value::UInteger(u) => vec![u],
        }
    }

    pub fn etype(&self) -> EType {
        match self {
            Value::Void => EType::Void,
            Value::String(_) => EType::String,
            Value::Float(_) => EType::Float,
            Value::Vector(_) => EType::Vector,
            Value::Entity(_) => EType::Entity,
            Value::Field(_) => EType::Field,
            Value::Function(_) => EType::Function,
            Value::Pointer(_) => EType::Pointer,
            Value::Quaternion(_) => EType::Quaternion,
            Value::Integer(_) => EType::Integer,
            Value::UInteger(_) => EType::UInteger,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "void"),
            Value::String(s) => write!(f, "string {}", s.0),
            Value::Float(v) => write!(f, "{}", v),
            Value::Vector(v) => write!(f, "'{} {} {}'", v[0], v[1], v[2]),
            Value::Entity(e) => write!(f, "entity {}", e),
            Value::Field(o) => write!(f, ".{}", o),
            Value::Function(n) => write!(f, "function {}", n),
            Value::Pointer(p) => write!(f, "&{}", p),
            Value::Quaternion(q) => write!(f, "'{} {} {} {}'", q[0], q[1], q[2], q[3]),
            Value::Integer(i) => write!(f, "{}", i),
            Value::UInteger(u) => write!(f, "{}", u),
        }
    }
}

/// One bytecode instruction: an opcode and three operand slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub op: u16,
    pub a: u16,
    pub b: u16,
    pub c: u16,
}

impl Statement {
    pub fn new(op: u16, a: u16, b: u16, c: u16) -> Self {
        Self { op, a, b, c }
    }

    /// Operand `a` read as a signed immediate.
    pub fn a_short(&self) -> i16 {
        self.a as i16
    }

    /// Operand `b` read as a signed immediate.
    pub fn b_short(&self) -> i16 {
        self.b as i16
    }

    /// Operand `c` read as a signed immediate.
    pub fn c_short(&self) -> i16 {
        self.c as i16
    }
}

/// A function descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDef {
    /// Entry statement; negative values name a builtin.
    pub first_statement: i32,
    /// Global offset of the parameter/local region.
    pub parm_start: u32,
    /// Words of parameters plus locals saved across re-entrant calls.
    pub locals: u32,
    /// Profile counter as stored on disk; the live counter is in the context.
    pub profile: u32,
    pub s_name: i32,
    pub s_file: i32,
    /// Formal parameter count; negative marks a variadic function.
    pub numparms: i32,
    pub parm_size: [u8; MAX_PARMS],
}

impl FunctionDef {
    pub fn is_builtin(&self) -> bool {
        self.first_statement < 0
    }

    /// The builtin number for a function without bytecode.
    pub fn builtin_index(&self) -> Option<u32> {
        if self.first_statement < 0 {
            Some(self.first_statement.unsigned_abs())
        } else {
            None
        }
    }

    pub fn is_variadic(&self) -> bool {
        self.numparms < 0
    }

    /// Number of parameters copied positionally on entry.
    pub fn fixed_params(&self) -> usize {
        let fixed = if self.numparms < 0 {
            -(self.numparms + 1)
        } else {
            self.numparms
        };
        (fixed.max(0) as usize).min(MAX_PARMS)
    }

    /// Words taken by the positional parameters.
    pub fn fixed_param_words(&self) -> u32 {
        self.parm_size[..self.fixed_params()]
            .iter()
            .map(|&size| size as u32)
            .sum()
    }
}

/// A global or field def: type tag, offset and name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Def {
    pub type_tag: u16,
    pub ofs: u16,
    pub s_name: i32,
}

impl Def {
    pub fn etype(&self) -> Option<EType> {
        EType::from_tag(self.type_tag)
    }

    pub fn is_save_global(&self) -> bool {
        self.type_tag & DEF_SAVEGLOBAL != 0
    }
}
