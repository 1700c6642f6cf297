pub mod bytecode;
pub mod config;
pub mod events;
pub mod vm;

// Types most hosts need
pub use crate::bytecode::{AssemblySource, ModuleBuilder};
pub use crate::config::VmConfig;
pub use crate::events::Event;
pub use crate::vm::{LoadError, Module, RuntimeError, VMError, ValidationError, Value, VM};
