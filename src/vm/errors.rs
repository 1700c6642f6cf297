//! Error types for VM operations
//!
//! Errors come in three layers matching the life of a module:
//! [`LoadError`] while reading the binary image, [`ValidationError`] from the
//! static opcode/operand pass, and [`VMError`] while interpreting. Every
//! `VMError` raised by the interpreter loop is reported as a
//! [`RuntimeError`], which carries the location and call stack at the fault.

use super::types::format_version;
use thiserror::Error;

/// Errors raised while reading a module image
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LoadError {
    /// The header is incomplete or describes an impossible layout
    #[error("Format error: {0}")]
    Format(String),

    /// A section runs past the end of the input
    #[error("Truncated module: {section} needs {needed} bytes at offset {offset}, file has {available}")]
    Truncated {
        section: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// The version field is not one of the accepted formats
    #[error(
        "Version error: module is version {}, expected {} or {}",
        format_version(*found),
        format_version(*expected),
        format_version(*alternate)
    )]
    Version {
        found: u32,
        expected: u32,
        alternate: u32,
    },

    /// The memory region for the module could not be reserved
    #[error("Allocation error: cannot reserve {words} words")]
    Allocation { words: usize },

    /// A field def carries the save-global flag
    #[error("Invalid field def {index}: fields cannot be saved globals")]
    InvalidFieldDef { index: usize },

    /// The static validator rejected the module
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
}

/// Errors raised by the static opcode/operand validator
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The opcode is not in the opcode table
    #[error("unknown opcode {opcode} at statement {statement}")]
    UnknownOpcode { statement: usize, opcode: u16 },

    /// A branch lands outside the statement table
    #[error("invalid branch to {target} (statement {statement}: {opname})")]
    InvalidBranch {
        statement: usize,
        opname: &'static str,
        target: i64,
    },

    /// An operand does not fit the type the opcode declares for its slot
    #[error("{reason} in operand {slot} = {value} (statement {statement}: {opname})")]
    InvalidOperand {
        statement: usize,
        opname: &'static str,
        slot: char,
        value: u16,
        reason: &'static str,
    },

    /// The opcode was introduced after the module's format version
    #[error("opcode not available in this module version (statement {statement}: {opname})")]
    OpcodeVersion {
        statement: usize,
        opname: &'static str,
    },
}

/// Error variants that can occur during VM execution
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VMError {
    /// The call stack would exceed its configured depth
    #[error("Stack overflow: call depth limit of {limit} reached")]
    StackOverflow { limit: usize },

    /// A return was executed with no frame to return to
    #[error("Stack underflow")]
    StackUnderflow,

    /// The saved-locals stack would exceed its configured size
    #[error("Locals stack overflow: {needed} words needed, {available} available")]
    LocalsOverflow { needed: usize, available: usize },

    /// More locals were restored than were saved
    #[error("Locals stack underflow")]
    LocalsUnderflow,

    /// A call through function reference zero
    #[error("NULL function")]
    NullFunction,

    /// A call through a function reference outside the function table
    #[error("Bad function number {0}")]
    BadFunction(u32),

    /// A builtin number with no registered native function
    #[error("Bad builtin call number {0}")]
    BadBuiltin(u32),

    /// An opcode reached the interpreter that it does not know
    #[error("Bad opcode {0}")]
    UnknownOpcode(u16),

    /// An entity number outside the entity area
    #[error("Progs attempted to access an out of bounds entity {entity}")]
    InvalidEntityAccess { entity: i64 },

    /// A field offset outside the entity record
    #[error("Progs attempted to access an invalid field {field} in an entity")]
    InvalidFieldAccess { field: i64 },

    /// Taking the address of a field of the world entity
    #[error("Assignment to world entity")]
    WorldAssignment,

    /// A jump target outside the statement table
    #[error("Invalid jump destination {0}")]
    InvalidJump(i64),

    /// The statement cursor left the statement table
    #[error("Statement index {0} out of range")]
    InvalidStatement(i64),

    /// A global or pointer access outside the memory region
    #[error("Invalid global access at {0}")]
    InvalidGlobal(i64),

    /// A string reference that does not name a string
    #[error("Invalid string reference {0}")]
    InvalidString(i32),

    /// The statement budget of a single execute call ran out
    #[error("Runaway loop error: {0} statements executed")]
    RunawayLoop(u64),

    /// Division or modulo by zero without fault substitution
    #[error("Division by zero in {0}")]
    DivisionByZero(&'static str),

    /// A global or field the interpreter depends on is not defined
    #[error("Missing binding for {0}")]
    MissingBinding(&'static str),

    /// A function name the host asked for is not defined
    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    #[error("Global not found: {0}")]
    GlobalNotFound(String),

    #[error("Field not found: {0}")]
    FieldNotFound(String),

    /// A host-supplied value does not match the declared type
    #[error("Type mismatch for {name}: declared {declared}, got {actual}")]
    TypeMismatch {
        name: String,
        declared: &'static str,
        actual: &'static str,
    },

    /// Error reported by a native builtin
    #[error("Builtin error: {0}")]
    Builtin(String),
}

/// A fatal interpreter error together with the state at the fault.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{kind} in {function} ({file}) at statement {statement}")]
pub struct RuntimeError {
    pub kind: VMError,
    pub function: String,
    pub file: String,
    pub statement: usize,
    /// Disassembly of the statement being executed, when there was one.
    pub disassembly: Option<String>,
    /// Call stack from innermost to outermost frame.
    pub backtrace: Vec<String>,
}

impl RuntimeError {
    /// A runtime error raised outside any function, e.g. by a host lookup.
    pub fn detached(kind: VMError) -> Self {
        Self {
            kind,
            function: String::from("<none>"),
            file: String::from("<none>"),
            statement: 0,
            disassembly: None,
            backtrace: Vec::new(),
        }
    }

    /// Multi-line dump of the VM state at the fault.
    pub fn dump(&self) -> String {
        let mut out = format!("{}\n", self);
        if let Some(line) = &self.disassembly {
            out.push_str(&format!("    {}\n", line));
        }
        for frame in &self.backtrace {
            out.push_str(&format!("  {}\n", frame));
        }
        out
    }
}

impl From<VMError> for RuntimeError {
    fn from(kind: VMError) -> Self {
        RuntimeError::detached(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::types::{PROG_ID_VERSION, PROG_VERSION};

    #[test]
    fn test_version_message_reports_both_versions() {
        let err = LoadError::Version {
            found: 0x0100_2003,
            expected: PROG_VERSION,
            alternate: PROG_ID_VERSION,
        };
        let msg = err.to_string();
        assert!(msg.contains("01.002.003"));
        assert!(msg.contains("00.fff.005"));
        assert!(msg.contains(" 6"));
    }

    #[test]
    fn test_runtime_error_dump() {
        let err = RuntimeError {
            kind: VMError::NullFunction,
            function: "think".into(),
            file: "monsters.qc".into(),
            statement: 12,
            disassembly: Some("00012 call0 [40](0)".into()),
            backtrace: vec!["think (monsters.qc) at 12".into(), "main (main.qc) at 3".into()],
        };
        let dump = err.dump();
        assert!(dump.starts_with("NULL function in think (monsters.qc) at statement 12"));
        assert!(dump.contains("call0"));
        assert!(dump.contains("main (main.qc) at 3"));
    }
}
