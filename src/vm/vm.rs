//! Main Virtual Machine implementation
//!
//! The VM struct is the coordinator the host talks to. It owns the loaded
//! module, the execution context built for it, the builtin registry and the
//! configuration, and it exposes the operations a host or a builtin needs:
//! running functions, reading parameters, writing results and looking
//! things up by name.

use std::sync::Arc;

use log::debug;

use crate::config::VmConfig;
use crate::vm::builtins::BuiltinRegistry;
use crate::vm::errors::{LoadError, RuntimeError, VMError};
use crate::vm::execution::Context;
use crate::vm::loader::{self, Module};
use crate::vm::memory::GlobalMemory;
use crate::vm::ops::ArithmeticOpImpl;
use crate::vm::trace::{disassemble_module, profile_report, ProfileEntry};
use crate::vm::types::{
    parm_offset, Def, EntityId, FieldOffset, FunctionId, GlobalIndex, StringIndex, Value,
    OFS_RETURN,
};
use crate::vm::validate::validate;

/// A loaded module ready to run.
#[derive(Debug, Clone)]
pub struct VM {
    pub(crate) module: Arc<Module>,
    pub(crate) context: Context,
    pub(crate) builtins: BuiltinRegistry,
    pub(crate) config: VmConfig,
    pub(crate) arith: ArithmeticOpImpl,
    entity_capacity: usize,
    heap_size: usize,
}

fn build(
    bytes: &[u8],
    entity_capacity: usize,
    heap_size: usize,
    config: &VmConfig,
) -> Result<(Arc<Module>, Context), LoadError> {
    let module = loader::load(bytes, entity_capacity, heap_size)?;
    if config.bounds_check {
        validate(&module)?;
        debug!("validated {} statements", module.statements.len());
    }
    let context = Context::new(&module, config)?;
    Ok((Arc::new(module), context))
}

impl VM {
    /// Load a module image and build a fresh execution context for it.
    ///
    /// The static validator runs when `config.bounds_check` is set; a module
    /// that fails it is never returned.
    pub fn load(
        bytes: &[u8],
        entity_capacity: usize,
        heap_size: usize,
        config: VmConfig,
    ) -> Result<Self, LoadError> {
        let (module, context) = build(bytes, entity_capacity, heap_size, &config)?;
        Ok(Self {
            module,
            context,
            builtins: BuiltinRegistry::new(),
            arith: ArithmeticOpImpl::new(config.fault_checks),
            config,
            entity_capacity,
            heap_size,
        })
    }

    /// Replace the module and context wholesale, keeping builtins and config.
    ///
    /// On failure the current module stays loaded.
    pub fn reload(&mut self, bytes: &[u8]) -> Result<(), LoadError> {
        let (module, context) = build(bytes, self.entity_capacity, self.heap_size, &self.config)?;
        self.module = module;
        self.context = context;
        Ok(())
    }

    /// Run a function until it returns.
    pub fn execute(&mut self, function: FunctionId) -> Result<(), RuntimeError> {
        self.run(function)
    }

    pub fn execute_by_name(&mut self, name: &str) -> Result<(), RuntimeError> {
        let function = self
            .module
            .find_function(name)
            .ok_or_else(|| VMError::FunctionNotFound(name.to_string()))?;
        self.run(function)
    }

    /// Register a native function under builtin number `index`.
    pub fn register_builtin<F>(&mut self, index: u32, name: &str, func: F)
    where
        F: Fn(&mut VM) -> Result<(), VMError> + Send + Sync + 'static,
    {
        if self.builtins.register(index, name, func).is_some() {
            debug!("builtin #{} replaced by {}", index, name);
        }
    }

    pub fn builtins(&self) -> &BuiltinRegistry {
        &self.builtins
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn memory(&self) -> &GlobalMemory {
        &self.context.memory
    }

    pub fn memory_mut(&mut self) -> &mut GlobalMemory {
        &mut self.context.memory
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Function currently executing, zero at the top level.
    pub fn current_function(&self) -> FunctionId {
        self.context.function
    }

    pub fn call_depth(&self) -> usize {
        self.context.calls.depth()
    }

    fn parm(n: usize) -> i64 {
        parm_offset(n) as i64
    }

    pub fn param_float(&self, n: usize) -> Result<f32, VMError> {
        self.context.memory.float(Self::parm(n))
    }

    pub fn param_int(&self, n: usize) -> Result<i32, VMError> {
        self.context.memory.int(Self::parm(n))
    }

    pub fn param_vector(&self, n: usize) -> Result<[f32; 3], VMError> {
        self.context.memory.vector(Self::parm(n))
    }

    /// Text of a string parameter, lossily decoded.
    pub fn param_string(&self, n: usize) -> Result<String, VMError> {
        let index = StringIndex(self.param_int(n)?);
        Ok(self.context.strings.get_str(index)?.into_owned())
    }

    pub fn param_entity(&self, n: usize) -> Result<EntityId, VMError> {
        self.context.memory.read(Self::parm(n)).map(EntityId)
    }

    pub fn param_function(&self, n: usize) -> Result<FunctionId, VMError> {
        self.context.memory.read(Self::parm(n)).map(FunctionId)
    }

    pub fn return_float(&mut self, value: f32) -> Result<(), VMError> {
        self.context.memory.set_float(OFS_RETURN as i64, value)
    }

    pub fn return_int(&mut self, value: i32) -> Result<(), VMError> {
        self.context.memory.set_int(OFS_RETURN as i64, value)
    }

    pub fn return_vector(&mut self, value: [f32; 3]) -> Result<(), VMError> {
        self.context.memory.set_vector(OFS_RETURN as i64, value)
    }

    /// Return a new transient string.
    pub fn return_string(&mut self, text: impl Into<Vec<u8>>) -> Result<StringIndex, VMError> {
        let index = self.set_temp_string(text);
        self.return_int(index.0)?;
        Ok(index)
    }

    pub fn result_float(&self) -> Result<f32, VMError> {
        self.context.memory.float(OFS_RETURN as i64)
    }

    pub fn result_int(&self) -> Result<i32, VMError> {
        self.context.memory.int(OFS_RETURN as i64)
    }

    pub fn result_vector(&self) -> Result<[f32; 3], VMError> {
        self.context.memory.vector(OFS_RETURN as i64)
    }

    /// Number of arguments passed by the most recent call.
    pub fn argc(&self) -> usize {
        self.context.argc
    }

    /// Argument count seen by a variadic function entered from the host.
    pub fn set_argc(&mut self, argc: usize) {
        self.context.argc = argc;
    }

    pub fn find_function(&self, name: &str) -> Option<FunctionId> {
        self.module.find_function(name)
    }

    pub fn find_global(&self, name: &str) -> Option<&Def> {
        self.module.find_global(name)
    }

    pub fn find_field(&self, name: &str) -> Option<&Def> {
        self.module.find_field(name)
    }

    fn global_def(&self, name: &str) -> Result<Def, VMError> {
        self.module
            .find_global(name)
            .copied()
            .ok_or_else(|| VMError::GlobalNotFound(name.to_string()))
    }

    fn field_def(&self, name: &str) -> Result<Def, VMError> {
        self.module
            .find_field(name)
            .copied()
            .ok_or_else(|| VMError::FieldNotFound(name.to_string()))
    }

    fn read_typed(&self, name: &str, def: &Def, address: i64) -> Result<Value, VMError> {
        let etype = def.etype().ok_or_else(|| VMError::TypeMismatch {
            name: name.to_string(),
            declared: "unknown",
            actual: "value",
        })?;
        let words = self.context.memory.slice(address, etype.word_count())?;
        Value::from_words(etype, words).ok_or(VMError::InvalidGlobal(address))
    }

    fn write_typed(&mut self, name: &str, def: &Def, address: i64, value: Value) -> Result<(), VMError> {
        let declared = def.etype();
        if declared != Some(value.etype()) {
            return Err(VMError::TypeMismatch {
                name: name.to_string(),
                declared: declared.map(|t| t.name()).unwrap_or("unknown"),
                actual: value.etype().name(),
            });
        }
        self.context.memory.write_slice(address, &value.to_words())
    }

    /// Value of a named global, decoded by its declared type.
    pub fn global_value(&self, name: &str) -> Result<Value, VMError> {
        let def = self.global_def(name)?;
        self.read_typed(name, &def, def.ofs as i64)
    }

    /// Overwrite a named global; the value must match its declared type.
    pub fn set_global(&mut self, name: &str, value: Value) -> Result<(), VMError> {
        let def = self.global_def(name)?;
        self.write_typed(name, &def, def.ofs as i64, value)
    }

    /// Global index of `field` in `entity`, always range checked.
    pub fn entity_field_index(&self, entity: EntityId, field: FieldOffset) -> Result<GlobalIndex, VMError> {
        let layout = &self.module.layout;
        if !layout.entity_in_range(entity.0 as i64) {
            return Err(VMError::InvalidEntityAccess {
                entity: entity.0 as i64,
            });
        }
        if !layout.field_in_range(field.0 as i64, 1) {
            return Err(VMError::InvalidFieldAccess {
                field: field.0 as i64,
            });
        }
        let address = layout.entity_field_address(entity.0 as i64, field.0 as i64);
        Ok(GlobalIndex(address as u32))
    }

    fn entity_field_address(&self, entity: EntityId, name: &str) -> Result<(Def, i64), VMError> {
        let def = self.field_def(name)?;
        let width = def.etype().map(|t| t.word_count()).unwrap_or(1);
        let index = self.entity_field_index(entity, FieldOffset(def.ofs as u32))?;
        if !self.module.layout.field_in_range(def.ofs as i64, width) {
            return Err(VMError::InvalidFieldAccess {
                field: def.ofs as i64,
            });
        }
        Ok((def, index.0 as i64))
    }

    pub fn read_entity_field(&self, entity: EntityId, name: &str) -> Result<Value, VMError> {
        let (def, address) = self.entity_field_address(entity, name)?;
        self.read_typed(name, &def, address)
    }

    pub fn write_entity_field(&mut self, entity: EntityId, name: &str, value: Value) -> Result<(), VMError> {
        let (def, address) = self.entity_field_address(entity, name)?;
        self.write_typed(name, &def, address, value)
    }

    /// Text of any string reference, module or transient.
    pub fn string(&self, index: StringIndex) -> Result<String, VMError> {
        Ok(self.context.strings.get_str(index)?.into_owned())
    }

    /// Register a transient string for the next run.
    ///
    /// It stays valid through the next `execute` and is released when the
    /// run after that begins, or by `clear_temp_strings`.
    pub fn set_temp_string(&mut self, text: impl Into<Vec<u8>>) -> StringIndex {
        self.context.strings.push_temp(text.into())
    }

    pub fn clear_temp_strings(&mut self) {
        self.context.strings.clear_temps();
    }

    /// Number of live transient strings.
    pub fn temp_string_count(&self) -> usize {
        self.context.strings.temp_count()
    }

    /// Turn statement tracing on or off.
    pub fn set_trace(&mut self, enabled: bool) {
        self.context.tracing = enabled;
    }

    /// Most recently traced statements, oldest first.
    pub fn trace_lines(&self) -> Vec<String> {
        self.context.trace.lines().map(str::to_string).collect()
    }

    pub fn profile_report(&self, top: usize) -> Vec<ProfileEntry> {
        profile_report(&self.module, &self.context.profile, top)
    }

    /// Disassembly of the module, or of one function, against live memory.
    pub fn disassemble(&self, only: Option<FunctionId>) -> Vec<String> {
        disassemble_module(&self.module, &self.context.memory, only)
    }
}
