//! Virtual machine for progs bytecode modules
//!
//! This module contains the loader, the static validator and the
//! interpreter for compiled game-logic modules.

pub mod builtins;
pub mod errors;
pub mod execution;
pub mod loader;
pub mod memory;
pub mod opcodes;
pub mod ops;
pub mod stack;
pub mod strings;
pub mod trace;
pub mod types;
pub mod validate;

// Main VM struct that coordinates components
pub mod vm;

pub use builtins::{Builtin, BuiltinFn, BuiltinRegistry};
pub use errors::{LoadError, RuntimeError, VMError, ValidationError};
pub use loader::{load, Module};
pub use opcodes::{Opcode, OpcodeDef};
pub use types::{EType, EntityId, FieldOffset, FunctionId, GlobalIndex, Statement, StringIndex, Value};
pub use validate::validate;
pub use vm::VM;
