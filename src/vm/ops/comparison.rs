//! Comparison and logical operations implementation

use crate::vm::errors::VMError;
use crate::vm::opcodes::Opcode;
use crate::vm::ops::{ArithmeticOpImpl, ComparisonOpHandler};

/// Truthiness of a float word: any bit set other than the sign of zero.
pub fn truthy(bits: u32) -> bool {
    bits & 0x7fff_ffff != 0
}

impl ComparisonOpHandler for ArithmeticOpImpl {
    fn float_compare(&self, op: Opcode, a: f32, b: f32) -> Result<bool, VMError> {
        let result = match op {
            Opcode::EqF => a == b,
            Opcode::NeF => a != b,
            Opcode::LeF => a <= b,
            Opcode::GeF => a >= b,
            Opcode::LtF => a < b,
            Opcode::GtF => a > b,
            Opcode::And => truthy(a.to_bits()) && truthy(b.to_bits()),
            Opcode::Or => truthy(a.to_bits()) || truthy(b.to_bits()),
            _ => return Err(VMError::UnknownOpcode(op as u16)),
        };
        Ok(result)
    }

    fn int_compare(&self, op: Opcode, a: i32, b: i32) -> Result<bool, VMError> {
        let result = match op {
            Opcode::EqI | Opcode::EqP => a == b,
            Opcode::NeI | Opcode::NeP => a != b,
            Opcode::LeI | Opcode::LeP => a <= b,
            Opcode::GeI | Opcode::GeP => a >= b,
            Opcode::LtI | Opcode::LtP => a < b,
            Opcode::GtI | Opcode::GtP => a > b,
            Opcode::AndI => a != 0 && b != 0,
            Opcode::OrI => a != 0 || b != 0,
            _ => return Err(VMError::UnknownOpcode(op as u16)),
        };
        Ok(result)
    }

    fn uint_compare(&self, op: Opcode, a: u32, b: u32) -> Result<bool, VMError> {
        let result = match op {
            Opcode::EqU => a == b,
            Opcode::NeU => a != b,
            Opcode::LeU => a <= b,
            Opcode::GeU => a >= b,
            Opcode::LtU => a < b,
            Opcode::GtU => a > b,
            Opcode::AndU => a != 0 && b != 0,
            Opcode::OrU => a != 0 || b != 0,
            _ => return Err(VMError::UnknownOpcode(op as u16)),
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!truthy(0));
        assert!(!truthy((-0.0f32).to_bits()));
        assert!(truthy(1.0f32.to_bits()));
        assert!(truthy(1));
    }

    #[test]
    fn test_logical_float_ops_ignore_negative_zero() {
        let ops = ArithmeticOpImpl::default();
        assert_eq!(ops.float_compare(Opcode::And, 1.0, -0.0), Ok(false));
        assert_eq!(ops.float_compare(Opcode::Or, -0.0, 2.0), Ok(true));
    }

    #[test]
    fn test_signed_and_unsigned_orderings_differ() {
        let ops = ArithmeticOpImpl::default();
        assert_eq!(ops.int_compare(Opcode::LtI, -1, 1), Ok(true));
        assert_eq!(ops.uint_compare(Opcode::LtU, u32::MAX, 1), Ok(false));
        assert_eq!(ops.uint_compare(Opcode::GeU, u32::MAX, 1), Ok(true));
    }

    #[test]
    fn test_float_orderings() {
        let ops = ArithmeticOpImpl::default();
        assert_eq!(ops.float_compare(Opcode::LeF, 2.0, 2.0), Ok(true));
        assert_eq!(ops.float_compare(Opcode::GtF, 2.0, 3.0), Ok(false));
        assert_eq!(ops.float_compare(Opcode::NeF, f32::NAN, f32::NAN), Ok(true));
    }
}
