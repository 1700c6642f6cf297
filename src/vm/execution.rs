//! Execution context and the interpreter loop
//!
//! The `Context` is the mutable half of a running VM: the flat memory, the
//! transient strings, both bounded stacks, the statement cursor and the
//! profiling counters. The loop in this module fetches one statement at a
//! time, dispatches on its opcode and owns function entry and exit.
//!
//! Function exit is tied to an `ExitGuard`. Whatever way a top-level
//! `execute` ends, dropping the guard unwinds every frame it pushed and
//! restores the saved locals of each, so a fault never leaves a half-entered
//! call behind.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use log::{error, trace, warn};

use crate::config::VmConfig;
use crate::vm::errors::{LoadError, RuntimeError, VMError};
use crate::vm::loader::Module;
use crate::vm::memory::{GlobalMemory, MemoryLayout};
use crate::vm::opcodes::Opcode;
use crate::vm::ops::{truthy, ArithmeticOpHandler, ComparisonOpHandler};
use crate::vm::stack::{CallStack, Frame, LocalsStack};
use crate::vm::strings::StringTable;
use crate::vm::trace::{backtrace, disassemble_statement, TraceBuffer};
use crate::vm::types::{
    parm_offset, FunctionDef, FunctionId, Statement, StringIndex, MAX_PARMS, OFS_RETURN, PARM_SIZE,
};
use crate::vm::vm::VM;

/// Value written over a callee's locals when poisoning is enabled.
pub const DEADBEEF: u32 = 0xdead_beef;

/// The live state of one VM instance.
#[derive(Debug, Clone)]
pub struct Context {
    pub memory: GlobalMemory,
    pub strings: StringTable,
    pub calls: CallStack,
    pub locals: LocalsStack,
    /// Statement being executed; while a builtin runs, its call statement.
    pub statement: usize,
    /// Function being executed; zero outside any function.
    pub function: FunctionId,
    /// Argument count of the most recent call.
    pub argc: usize,
    /// Statements executed per function.
    pub profile: Vec<u64>,
    pub trace: TraceBuffer,
    pub tracing: bool,
}

impl Context {
    pub fn new(module: &Module, config: &VmConfig) -> Result<Self, LoadError> {
        Ok(Self {
            memory: GlobalMemory::with_image(&module.layout, &module.globals)?,
            strings: StringTable::new(Arc::clone(&module.strings)),
            calls: CallStack::new(config.max_stack_depth),
            locals: LocalsStack::new(config.locals_stack_size),
            statement: 0,
            function: FunctionId(0),
            argc: 0,
            profile: vec![0; module.functions.len()],
            trace: TraceBuffer::default(),
            tracing: false,
        })
    }
}

/// What the loop does after a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Next,
    Jump(i64),
    Call { function: u32, argc: usize },
    Return { value: u16 },
}

/// Address of `width` words of `field` in `entity`, checked when `bounds` is on.
fn entity_address(
    layout: &MemoryLayout,
    bounds: bool,
    entity: i32,
    field: i32,
    width: u32,
) -> Result<i64, VMError> {
    if bounds {
        if !layout.entity_in_range(entity as i64) {
            return Err(VMError::InvalidEntityAccess {
                entity: entity as i64,
            });
        }
        if !layout.field_in_range(field as i64, width) {
            return Err(VMError::InvalidFieldAccess {
                field: field as i64,
            });
        }
    }
    Ok(layout.entity_field_address(entity as i64, field as i64))
}

fn flag(value: bool) -> i32 {
    value as i32
}

fn float_flag(value: bool) -> f32 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Width in words of the value a load/store opcode moves.
fn value_width(op: Opcode) -> u32 {
    match op {
        Opcode::LoadV
        | Opcode::StoreV
        | Opcode::StorePV
        | Opcode::LoadBV
        | Opcode::LoadBIV
        | Opcode::StoreBV
        | Opcode::StoreBIV => 3,
        _ => 1,
    }
}

/// Unwinds the frames pushed during one top-level execution.
struct ExitGuard<'a> {
    vm: &'a mut VM,
    module: Arc<Module>,
    exit_depth: usize,
}

impl<'a> ExitGuard<'a> {
    fn new(vm: &'a mut VM, module: Arc<Module>) -> Self {
        let exit_depth = vm.context.calls.depth();
        Self {
            vm,
            module,
            exit_depth,
        }
    }
}

impl Deref for ExitGuard<'_> {
    type Target = VM;

    fn deref(&self) -> &VM {
        self.vm
    }
}

impl DerefMut for ExitGuard<'_> {
    fn deref_mut(&mut self) -> &mut VM {
        self.vm
    }
}

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        while self.vm.context.calls.depth() > self.exit_depth {
            if let Err(err) = self.vm.leave_function(&self.module) {
                warn!("unwinding frame after fault: {}", err);
            }
        }
    }
}

impl VM {
    /// Run `function` until it returns to the caller of this method.
    pub(crate) fn run(&mut self, function: FunctionId) -> Result<(), RuntimeError> {
        self.context.strings.begin_run();
        let result = self.run_function(function);
        self.context.strings.end_run();
        result
    }

    fn run_function(&mut self, function: FunctionId) -> Result<(), RuntimeError> {
        let module = Arc::clone(&self.module);
        let def = self
            .resolve_function(&module, function.0)
            .map_err(|kind| self.fault(&module, kind))?;

        if let Some(index) = def.builtin_index() {
            return self
                .call_builtin(index)
                .map_err(|kind| self.fault(&module, kind));
        }

        let mut guard = ExitGuard::new(self, Arc::clone(&module));
        let first = guard
            .enter_function(&module, function)
            .map_err(|kind| guard.fault(&module, kind))?;
        let exit_depth = guard.exit_depth;
        guard.interpret(&module, first, exit_depth)
    }

    fn resolve_function(&self, module: &Module, function: u32) -> Result<FunctionDef, VMError> {
        if function == 0 {
            return Err(VMError::NullFunction);
        }
        module
            .function(FunctionId(function))
            .copied()
            .ok_or(VMError::BadFunction(function))
    }

    fn call_builtin(&mut self, index: u32) -> Result<(), VMError> {
        let func = self
            .builtins
            .get(index)
            .map(|builtin| Arc::clone(&builtin.func))
            .ok_or(VMError::BadBuiltin(index))?;
        func(self)
    }

    /// Call through a function reference found in a call statement.
    ///
    /// Returns the callee's first statement, or `None` when a builtin ran.
    fn call_function(&mut self, module: &Module, function: u32) -> Result<Option<usize>, VMError> {
        let def = self.resolve_function(module, function)?;
        if let Some(index) = def.builtin_index() {
            self.call_builtin(index)?;
            return Ok(None);
        }
        if def.first_statement == 0 {
            return Err(VMError::BadBuiltin(0));
        }
        self.enter_function(module, FunctionId(function)).map(Some)
    }

    /// Push a frame, save the callee's locals and copy its parameters in.
    ///
    /// All limits are checked before anything is modified.
    pub(crate) fn enter_function(&mut self, module: &Module, function: FunctionId) -> Result<usize, VMError> {
        let def = *module
            .function(function)
            .ok_or(VMError::BadFunction(function.0))?;
        let first = def.first_statement;
        if first <= 0 || first as usize >= module.statements.len() {
            return Err(VMError::InvalidStatement(first as i64));
        }

        let ctx = &mut self.context;
        if !ctx.calls.has_room() {
            return Err(VMError::StackOverflow {
                limit: ctx.calls.max_depth(),
            });
        }
        if !ctx.locals.has_room(def.locals as usize) {
            return Err(VMError::LocalsOverflow {
                needed: def.locals as usize,
                available: ctx.locals.capacity() - ctx.locals.used(),
            });
        }
        let start = def.parm_start as i64;
        ctx.memory.resolve(start, def.locals)?;

        ctx.calls.push(Frame {
            statement: ctx.statement,
            function: ctx.function,
        })?;
        ctx.locals.save(&ctx.memory, start, def.locals)?;
        ctx.function = function;

        if self.config.deadbeef_locals {
            ctx.memory.fill(start, def.locals, DEADBEEF)?;
        }

        let fixed = def.fixed_params();
        let mut dst = start;
        for (i, &size) in def.parm_size[..fixed].iter().enumerate() {
            ctx.memory.copy_within(parm_offset(i) as i64, dst, size as u32)?;
            dst += size as i64;
        }
        if def.is_variadic() {
            let extra = ctx.argc.saturating_sub(fixed);
            let argv = dst + 2;
            ctx.memory.set_int(dst, extra as i32)?;
            ctx.memory.set_int(dst + 1, argv as i32)?;
            let tail = (MAX_PARMS - fixed) as u32 * PARM_SIZE;
            ctx.memory.copy_within(parm_offset(fixed) as i64, argv, tail)?;
        }

        Ok(first as usize)
    }

    /// Restore the current function's locals and pop its frame.
    pub(crate) fn leave_function(&mut self, module: &Module) -> Result<(), VMError> {
        let ctx = &mut self.context;
        let frame = ctx.calls.pop()?;
        let restored = match module.function(ctx.function) {
            Some(def) if ctx.function.0 != 0 => {
                ctx.locals
                    .restore(&mut ctx.memory, def.parm_start as i64, def.locals)
            }
            _ => Ok(()),
        };
        ctx.statement = frame.statement;
        ctx.function = frame.function;
        restored
    }

    /// Wrap an error with the location and call stack at the fault.
    pub(crate) fn fault(&self, module: &Module, kind: VMError) -> RuntimeError {
        let ctx = &self.context;
        let function = ctx.function;
        let err = RuntimeError {
            kind,
            function: if function.0 == 0 {
                String::from("<none>")
            } else {
                module.function_name(function)
            },
            file: if function.0 == 0 {
                String::from("<none>")
            } else {
                module.function_file(function)
            },
            statement: ctx.statement,
            disassembly: (function.0 != 0)
                .then(|| disassemble_statement(module, &ctx.memory, ctx.statement)),
            backtrace: backtrace(module, &ctx.calls, function, ctx.statement),
        };
        error!("{}", err);
        err
    }
}

impl ExitGuard<'_> {
    fn interpret(&mut self, module: &Module, first: usize, exit_depth: usize) -> Result<(), RuntimeError> {
        let budget = (!self.config.no_exec_limit).then_some(self.config.runaway_budget);
        let mut executed: u64 = 0;
        let mut next = first as i64;

        loop {
            executed += 1;
            if let Some(limit) = budget {
                if executed > limit {
                    return Err(self.fault(module, VMError::RunawayLoop(limit)));
                }
            }

            let index = match usize::try_from(next) {
                Ok(index) if index < module.statements.len() => index,
                _ => return Err(self.fault(module, VMError::InvalidStatement(next))),
            };
            let st = module.statements[index];

            let ctx = &mut self.vm.context;
            ctx.statement = index;
            if let Some(count) = ctx.profile.get_mut(ctx.function.index()) {
                *count += 1;
            }
            if ctx.tracing {
                let line = disassemble_statement(module, &ctx.memory, index);
                trace!("{}", line);
                ctx.trace.push(line);
            }

            let control = match self.vm.step(module, index, st) {
                Ok(control) => control,
                Err(kind) => return Err(self.fault(module, kind)),
            };

            next = match control {
                Control::Next => index as i64 + 1,
                Control::Jump(target) => target,
                Control::Call { function, argc } => {
                    self.vm.context.argc = argc;
                    match self.vm.call_function(module, function) {
                        Ok(Some(entry)) => entry as i64,
                        Ok(None) => index as i64 + 1,
                        Err(kind) => return Err(self.fault(module, kind)),
                    }
                }
                Control::Return { value } => {
                    let result = self
                        .vm
                        .context
                        .memory
                        .copy_within(value as i64, OFS_RETURN as i64, 3)
                        .and_then(|_| self.vm.leave_function(module));
                    if let Err(kind) = result {
                        return Err(self.fault(module, kind));
                    }
                    if self.vm.context.calls.depth() == exit_depth {
                        return Ok(());
                    }
                    self.vm.context.statement as i64 + 1
                }
            };
        }
    }
}

impl VM {
    /// Check a jump target when bounds checking is on.
    fn jump(&self, module: &Module, target: i64) -> Result<Control, VMError> {
        if self.config.bounds_check && (target < 0 || target >= module.statements.len() as i64) {
            return Err(VMError::InvalidJump(target));
        }
        Ok(Control::Jump(target))
    }

    /// Execute one statement.
    fn step(&mut self, module: &Module, index: usize, st: Statement) -> Result<Control, VMError> {
        let op = Opcode::from_u16(st.op).ok_or(VMError::UnknownOpcode(st.op))?;
        let ops = self.arith;
        let bounds = self.config.bounds_check;
        let null_bad = self.config.null_bad;
        let layout = &module.layout;
        let (a, b, c) = (st.a as i64, st.b as i64, st.c as i64);
        let here = index as i64;

        let ctx = &mut self.context;
        let mem = &mut ctx.memory;

        match op {
            Opcode::Done | Opcode::Return => return Ok(Control::Return { value: st.a }),

            Opcode::AddF
            | Opcode::SubF
            | Opcode::MulF
            | Opcode::DivF
            | Opcode::ModF
            | Opcode::BitAnd
            | Opcode::BitOr
            | Opcode::BitXorF
            | Opcode::ShlF
            | Opcode::ShrF => {
                let value = ops.float_binary(op, mem.float(a)?, mem.float(b)?)?;
                mem.set_float(c, value)?;
            }
            Opcode::BitNotF => {
                let value = !(mem.float(a)? as i32);
                mem.set_float(c, value as f32)?;
            }

            Opcode::MulV => {
                let (x, y) = (mem.vector(a)?, mem.vector(b)?);
                mem.set_float(c, x[0] * y[0] + x[1] * y[1] + x[2] * y[2])?;
            }
            Opcode::MulFV => {
                let (f, v) = (mem.float(a)?, mem.vector(b)?);
                mem.set_vector(c, v.map(|x| x * f))?;
            }
            Opcode::MulVF => {
                let (v, f) = (mem.vector(a)?, mem.float(b)?);
                mem.set_vector(c, v.map(|x| x * f))?;
            }
            Opcode::AddV | Opcode::SubV => {
                let (x, y) = (mem.vector(a)?, mem.vector(b)?);
                let v = if op == Opcode::AddV {
                    [x[0] + y[0], x[1] + y[1], x[2] + y[2]]
                } else {
                    [x[0] - y[0], x[1] - y[1], x[2] - y[2]]
                };
                mem.set_vector(c, v)?;
            }

            Opcode::EqF | Opcode::NeF | Opcode::And | Opcode::Or => {
                let result = ops.float_compare(op, mem.float(a)?, mem.float(b)?)?;
                mem.set_int(c, flag(result))?;
            }
            Opcode::LeF | Opcode::GeF | Opcode::LtF | Opcode::GtF => {
                let result = ops.float_compare(op, mem.float(a)?, mem.float(b)?)?;
                mem.set_float(c, float_flag(result))?;
            }
            Opcode::EqV | Opcode::NeV => {
                let equal = mem.vector(a)? == mem.vector(b)?;
                mem.set_int(c, flag(equal == (op == Opcode::EqV)))?;
            }
            Opcode::EqE | Opcode::EqFnc | Opcode::NeE | Opcode::NeFnc => {
                let equal = mem.read(a)? == mem.read(b)?;
                let want = matches!(op, Opcode::EqE | Opcode::EqFnc);
                mem.set_int(c, flag(equal == want))?;
            }
            Opcode::EqS | Opcode::NeS | Opcode::LeS | Opcode::GeS | Opcode::LtS | Opcode::GtS => {
                let ordering = ctx.strings.compare(
                    StringIndex(mem.int(a)?),
                    StringIndex(mem.int(b)?),
                )?;
                let result = match op {
                    Opcode::EqS => ordering.is_eq(),
                    Opcode::NeS => ordering.is_ne(),
                    Opcode::LeS => ordering.is_le(),
                    Opcode::GeS => ordering.is_ge(),
                    Opcode::LtS => ordering.is_lt(),
                    _ => ordering.is_gt(),
                };
                mem.set_int(c, flag(result))?;
            }
            Opcode::AddS => {
                let joined = ctx
                    .strings
                    .concat(StringIndex(mem.int(a)?), StringIndex(mem.int(b)?))?;
                mem.set_int(c, joined.0)?;
            }

            Opcode::NotF => {
                let value = !truthy(mem.read(a)?);
                mem.set_int(c, flag(value))?;
            }
            Opcode::NotV => {
                let zero = mem.vector(a)?.iter().all(|&x| x == 0.0);
                mem.set_int(c, flag(zero))?;
            }
            Opcode::NotS => {
                let empty = ctx.strings.is_empty_string(StringIndex(mem.int(a)?))?;
                mem.set_int(c, flag(empty))?;
            }
            Opcode::NotEnt | Opcode::NotFnc | Opcode::NotI | Opcode::NotU | Opcode::NotP => {
                let zero = mem.read(a)? == 0;
                mem.set_int(c, flag(zero))?;
            }

            Opcode::LoadF
            | Opcode::LoadV
            | Opcode::LoadS
            | Opcode::LoadEnt
            | Opcode::LoadFld
            | Opcode::LoadFnc
            | Opcode::LoadI
            | Opcode::LoadU
            | Opcode::LoadP => {
                let width = value_width(op);
                let address = entity_address(layout, bounds, mem.int(a)?, mem.int(b)?, width)?;
                mem.copy_within(address, c, width)?;
            }
            Opcode::Address => {
                let entity = mem.int(a)?;
                let field = mem.int(b)?;
                if bounds && null_bad && entity == 0 {
                    return Err(VMError::WorldAssignment);
                }
                let address = entity_address(layout, bounds, entity, field, 1)?;
                let address = i32::try_from(address).map_err(|_| VMError::InvalidGlobal(address))?;
                mem.set_int(c, address)?;
            }

            Opcode::StoreF
            | Opcode::StoreV
            | Opcode::StoreS
            | Opcode::StoreEnt
            | Opcode::StoreFld
            | Opcode::StoreFnc
            | Opcode::StoreI
            | Opcode::StoreU
            | Opcode::StoreP => {
                mem.copy_within(a, b, value_width(op))?;
            }
            Opcode::StorePF
            | Opcode::StorePV
            | Opcode::StorePS
            | Opcode::StorePEnt
            | Opcode::StorePFld
            | Opcode::StorePFnc
            | Opcode::StorePI
            | Opcode::StorePU
            | Opcode::StorePP => {
                let pointer = mem.int(b)? as i64;
                mem.copy_within(a, pointer, value_width(op))?;
            }

            Opcode::LoadBF
            | Opcode::LoadBV
            | Opcode::LoadBS
            | Opcode::LoadBEnt
            | Opcode::LoadBFld
            | Opcode::LoadBFnc
            | Opcode::LoadBI
            | Opcode::LoadBU
            | Opcode::LoadBP => {
                let pointer = mem.int(a)? as i64 + mem.int(b)? as i64;
                mem.copy_within(pointer, c, value_width(op))?;
            }
            Opcode::LoadBIF
            | Opcode::LoadBIV
            | Opcode::LoadBIS
            | Opcode::LoadBIEnt
            | Opcode::LoadBIFld
            | Opcode::LoadBIFnc
            | Opcode::LoadBII
            | Opcode::LoadBIU
            | Opcode::LoadBIP => {
                let pointer = mem.int(a)? as i64 + st.b_short() as i64;
                mem.copy_within(pointer, c, value_width(op))?;
            }
            Opcode::StoreBF
            | Opcode::StoreBV
            | Opcode::StoreBS
            | Opcode::StoreBEnt
            | Opcode::StoreBFld
            | Opcode::StoreBFnc
            | Opcode::StoreBI
            | Opcode::StoreBU
            | Opcode::StoreBP => {
                let pointer = mem.int(b)? as i64 + mem.int(c)? as i64;
                mem.copy_within(a, pointer, value_width(op))?;
            }
            Opcode::StoreBIF
            | Opcode::StoreBIV
            | Opcode::StoreBIS
            | Opcode::StoreBIEnt
            | Opcode::StoreBIFld
            | Opcode::StoreBIFnc
            | Opcode::StoreBII
            | Opcode::StoreBIU
            | Opcode::StoreBIP => {
                let pointer = mem.int(b)? as i64 + st.c_short() as i64;
                mem.copy_within(a, pointer, value_width(op))?;
            }

            Opcode::AddressF
            | Opcode::AddressV
            | Opcode::AddressS
            | Opcode::AddressEnt
            | Opcode::AddressFld
            | Opcode::AddressFnc
            | Opcode::AddressI
            | Opcode::AddressU
            | Opcode::AddressP => {
                mem.set_int(c, st.a as i32)?;
            }
            Opcode::Lea => {
                let pointer = mem.int(a)?.wrapping_add(mem.int(b)?);
                mem.set_int(c, pointer)?;
            }
            Opcode::Leai => {
                let pointer = mem.int(a)?.wrapping_add(st.b_short() as i32);
                mem.set_int(c, pointer)?;
            }

            Opcode::If | Opcode::IfNot => {
                let value = truthy(mem.read(a)?);
                if value == (op == Opcode::If) {
                    return self.jump(module, here + st.b_short() as i64);
                }
            }
            Opcode::IfBe | Opcode::IfB | Opcode::IfAe | Opcode::IfA => {
                let value = mem.int(a)?;
                let taken = match op {
                    Opcode::IfBe => value <= 0,
                    Opcode::IfB => value < 0,
                    Opcode::IfAe => value >= 0,
                    _ => value > 0,
                };
                if taken {
                    return self.jump(module, here + st.b_short() as i64);
                }
            }
            Opcode::Goto => return self.jump(module, here + st.a_short() as i64),
            Opcode::Jump => {
                let target = mem.read(a)? as i64;
                return self.jump(module, target);
            }
            Opcode::JumpB => {
                let pointer = mem.int(a)? as i64 + mem.int(b)? as i64;
                let target = mem.read(pointer)? as i64;
                return self.jump(module, target);
            }

            Opcode::Call0
            | Opcode::Call1
            | Opcode::Call2
            | Opcode::Call3
            | Opcode::Call4
            | Opcode::Call5
            | Opcode::Call6
            | Opcode::Call7
            | Opcode::Call8 => {
                return Ok(Control::Call {
                    function: mem.read(a)?,
                    argc: op.call_argc().unwrap_or(0),
                });
            }

            Opcode::State => {
                let bindings = &module.bindings;
                let self_global = bindings.self_entity.ok_or(VMError::MissingBinding("self"))?;
                let time = bindings.time.ok_or(VMError::MissingBinding("time"))?;
                let nextthink = bindings.nextthink.ok_or(VMError::MissingBinding("nextthink"))?;
                let frame = bindings.frame.ok_or(VMError::MissingBinding("frame"))?;
                let think = bindings.think.ok_or(VMError::MissingBinding("think"))?;

                let entity = mem.int(self_global.0 as i64)?;
                let field = |f: u32| entity_address(layout, bounds, entity, f as i32, 1);
                let now = mem.float(time.0 as i64)?;
                let (frame_number, thinker) = (mem.float(a)?, mem.read(b)?);
                mem.set_float(field(nextthink.0)?, now + 0.1)?;
                mem.set_float(field(frame.0)?, frame_number)?;
                mem.write(field(think.0)?, thinker)?;
            }

            Opcode::AddI
            | Opcode::SubI
            | Opcode::MulI
            | Opcode::DivI
            | Opcode::ModI
            | Opcode::BitAndI
            | Opcode::BitOrI
            | Opcode::BitXorI
            | Opcode::ShlI
            | Opcode::ShrI => {
                let value = ops.int_binary(op, mem.int(a)?, mem.int(b)?)?;
                mem.set_int(c, value)?;
            }
            Opcode::BitNotI => {
                let value = !mem.int(a)?;
                mem.set_int(c, value)?;
            }
            Opcode::GeI
            | Opcode::LeI
            | Opcode::GtI
            | Opcode::LtI
            | Opcode::EqI
            | Opcode::NeI
            | Opcode::AndI
            | Opcode::OrI
            | Opcode::GeP
            | Opcode::LeP
            | Opcode::GtP
            | Opcode::LtP
            | Opcode::EqP
            | Opcode::NeP => {
                let result = ops.int_compare(op, mem.int(a)?, mem.int(b)?)?;
                mem.set_int(c, flag(result))?;
            }

            Opcode::AddU
            | Opcode::SubU
            | Opcode::MulU
            | Opcode::DivU
            | Opcode::ModU
            | Opcode::BitAndU
            | Opcode::BitOrU
            | Opcode::BitXorU
            | Opcode::ShlU
            | Opcode::ShrU => {
                let value = ops.uint_binary(op, mem.read(a)?, mem.read(b)?)?;
                mem.write(c, value)?;
            }
            Opcode::BitNotU => {
                let value = !mem.read(a)?;
                mem.write(c, value)?;
            }
            Opcode::LtU
            | Opcode::GtU
            | Opcode::LeU
            | Opcode::GeU
            | Opcode::EqU
            | Opcode::NeU
            | Opcode::AndU
            | Opcode::OrU => {
                let result = ops.uint_compare(op, mem.read(a)?, mem.read(b)?)?;
                mem.set_int(c, flag(result))?;
            }

            Opcode::ConvIF => {
                let value = mem.int(a)? as f32;
                mem.set_float(c, value)?;
            }
            Opcode::ConvFI => {
                let value = mem.float(a)? as i32;
                mem.set_int(c, value)?;
            }
            Opcode::ConvIU | Opcode::ConvUI => {
                let value = mem.read(a)?;
                mem.write(c, value)?;
            }

            Opcode::Move => mem.copy_within(a, c, st.b as u32)?,
            Opcode::MoveP => {
                let count = mem.read(b)?;
                let (from, to) = (mem.int(a)? as i64, mem.int(c)? as i64);
                mem.copy_within(from, to, count)?;
            }
        }

        Ok(Control::Next)
    }
}
