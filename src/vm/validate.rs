//! Static opcode and operand validation.
//!
//! Walks every statement once before the module runs. After a successful
//! pass every opcode is known and allowed for the module's version, every
//! relative branch lands inside the statement table, and every word an
//! operand addresses lies inside the globals. Vector operands span three
//! words, and so does the value slot of `return` and `done`.

use crate::vm::errors::ValidationError;
use crate::vm::loader::Module;
use crate::vm::opcodes::{lookup, Opcode, OpcodeDef};
use crate::vm::types::{EType, Statement};

fn check_branch(
    module: &Module,
    index: usize,
    def: &OpcodeDef,
    offset: i16,
) -> Result<(), ValidationError> {
    let target = index as i64 + offset as i64;
    if target < 0 || target >= module.statements.len() as i64 {
        return Err(ValidationError::InvalidBranch {
            statement: index,
            opname: def.opname,
            target,
        });
    }
    Ok(())
}

fn check_operand(
    module: &Module,
    index: usize,
    def: &OpcodeDef,
    slot: char,
    etype: EType,
    operand: u16,
) -> Result<(), ValidationError> {
    let reason = match etype {
        EType::Short => return Ok(()),
        EType::Void if operand != 0 => "non-zero global index in void operand",
        EType::Void => return Ok(()),
        _ if operand as u32 >= module.header.num_globals => "out of bounds global index",
        _ if operand as u32 + etype.word_count() > module.header.num_globals => {
            "operand runs past the end of the globals"
        }
        _ => return Ok(()),
    };
    Err(ValidationError::InvalidOperand {
        statement: index,
        opname: def.opname,
        slot,
        value: operand,
        reason,
    })
}

fn check_statement(module: &Module, index: usize, st: &Statement) -> Result<(), ValidationError> {
    let def = lookup(st.op).ok_or(ValidationError::UnknownOpcode {
        statement: index,
        opcode: st.op,
    })?;
    if !def.allowed_in(module.version()) {
        return Err(ValidationError::OpcodeVersion {
            statement: index,
            opname: def.opname,
        });
    }

    match def.opcode {
        op if op.is_conditional_branch() => {
            check_operand(module, index, def, 'a', def.type_a, st.a)?;
            check_branch(module, index, def, st.b_short())
        }
        Opcode::Goto => check_branch(module, index, def, st.a_short()),
        Opcode::Done | Opcode::Return => {
            check_operand(module, index, def, 'a', EType::Vector, st.a)?;
            check_operand(module, index, def, 'b', EType::Void, st.b)?;
            check_operand(module, index, def, 'c', EType::Void, st.c)
        }
        _ => {
            check_operand(module, index, def, 'a', def.type_a, st.a)?;
            check_operand(module, index, def, 'b', def.type_b, st.b)?;
            check_operand(module, index, def, 'c', def.type_c, st.c)
        }
    }
}

/// Check every statement of `module`, stopping at the first problem.
pub fn validate(module: &Module) -> Result<(), ValidationError> {
    for (index, st) in module.statements.iter().enumerate() {
        check_statement(module, index, st)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::ModuleBuilder;
    use crate::vm::loader::load;
    use crate::vm::types::PROG_ID_VERSION;

    fn module_with(statements: &[Statement]) -> Module {
        let mut builder = ModuleBuilder::new();
        builder.reserve_globals(40);
        let body = builder.push_statements(statements);
        builder.add_function("main", "test.qc", body, 0, &[], 0);
        load(&builder.to_bytes(), 1, 0).unwrap()
    }

    fn st(op: Opcode, a: u16, b: u16, c: u16) -> Statement {
        Statement::new(op as u16, a, b, c)
    }

    #[test]
    fn test_accepts_well_formed_code() {
        let module = module_with(&[
            st(Opcode::AddF, 30, 31, 32),
            st(Opcode::IfNot, 32, 2, 0),
            st(Opcode::Goto, (-1i16) as u16, 0, 0),
            st(Opcode::Return, 32, 0, 0),
        ]);
        assert_eq!(validate(&module), Ok(()));
    }

    #[test]
    fn test_unknown_opcode_names_statement() {
        let module = module_with(&[st(Opcode::AddF, 30, 31, 32), Statement::new(0xffff, 0, 0, 0)]);
        // statement 0 is the builder's null statement
        assert_eq!(
            validate(&module),
            Err(ValidationError::UnknownOpcode {
                statement: 2,
                opcode: 0xffff
            })
        );
    }

    #[test]
    fn test_branch_out_of_range() {
        let module = module_with(&[st(Opcode::Goto, 50, 0, 0)]);
        assert!(matches!(
            validate(&module),
            Err(ValidationError::InvalidBranch { statement: 1, target: 51, .. })
        ));
    }

    #[test]
    fn test_operand_checks() {
        let module = module_with(&[st(Opcode::AddF, 30, 31, 40)]);
        assert!(matches!(
            validate(&module),
            Err(ValidationError::InvalidOperand { slot: 'c', value: 40, .. })
        ));

        let module = module_with(&[st(Opcode::NotF, 30, 1, 31)]);
        assert!(matches!(
            validate(&module),
            Err(ValidationError::InvalidOperand { slot: 'b', value: 1, .. })
        ));

        // short immediates are not global indices
        let module = module_with(&[st(Opcode::Leai, 30, 5000, 31)]);
        assert_eq!(validate(&module), Ok(()));
    }

    #[test]
    fn test_vector_operands_fit_inside_globals() {
        let module = module_with(&[st(Opcode::AddV, 39, 39, 30)]);
        assert!(matches!(
            validate(&module),
            Err(ValidationError::InvalidOperand { slot: 'a', value: 39, .. })
        ));

        let module = module_with(&[st(Opcode::AddV, 30, 33, 37)]);
        assert_eq!(validate(&module), Ok(()));

        let module = module_with(&[st(Opcode::Return, 38, 0, 0)]);
        assert!(matches!(
            validate(&module),
            Err(ValidationError::InvalidOperand { slot: 'a', value: 38, .. })
        ));

        let module = module_with(&[st(Opcode::Return, 37, 0, 0)]);
        assert_eq!(validate(&module), Ok(()));
    }

    #[test]
    fn test_version_gating() {
        let mut builder = ModuleBuilder::new();
        builder.set_version(PROG_ID_VERSION);
        builder.reserve_globals(40);
        let body = builder.push_statements(&[st(Opcode::AddI, 30, 31, 32)]);
        builder.add_function("main", "test.qc", body, 0, &[], 0);
        let module = load(&builder.to_bytes(), 1, 0).unwrap();
        assert!(matches!(
            validate(&module),
            Err(ValidationError::OpcodeVersion { statement: 1, opname: "add.i" })
        ));
    }
}
