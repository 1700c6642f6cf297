//! Arithmetic operations implementation
//!
//! Division by zero is decided before dividing. With fault substitution on,
//! float division yields an infinity signed like the quotient would be and
//! integer division saturates toward the dividend's sign; otherwise it is a
//! fatal `DivisionByZero`. Modulo by zero is always fatal.

use crate::vm::errors::VMError;
use crate::vm::opcodes::Opcode;
use crate::vm::ops::ArithmeticOpHandler;

const SIGN_BIT: u32 = 0x8000_0000;

/// Arithmetic handler carrying the divide-by-zero policy of one context
#[derive(Debug, Clone, Copy, Default)]
pub struct ArithmeticOpImpl {
    fault_checks: bool,
}

impl ArithmeticOpImpl {
    pub fn new(fault_checks: bool) -> Self {
        Self { fault_checks }
    }

    pub fn fault_checks(&self) -> bool {
        self.fault_checks
    }

    fn divide_float(&self, a: f32, b: f32) -> Result<f32, VMError> {
        if b != 0.0 {
            return Ok(a / b);
        }
        if !self.fault_checks {
            return Err(VMError::DivisionByZero(Opcode::DivF.name()));
        }
        let sign = (a.to_bits() ^ b.to_bits()) & SIGN_BIT;
        Ok(f32::from_bits(sign | f32::INFINITY.to_bits()))
    }

    fn divide_int(&self, a: i32, b: i32) -> Result<i32, VMError> {
        if b != 0 {
            return Ok(a.wrapping_div(b));
        }
        if !self.fault_checks {
            return Err(VMError::DivisionByZero(Opcode::DivI.name()));
        }
        Ok(if a < 0 { i32::MIN } else { i32::MAX })
    }

    fn divide_uint(&self, a: u32, b: u32) -> Result<u32, VMError> {
        match a.checked_div(b) {
            Some(q) => Ok(q),
            None if self.fault_checks => Ok(u32::MAX),
            None => Err(VMError::DivisionByZero(Opcode::DivU.name())),
        }
    }
}

/// Float operands of the bit operations are truncated to integers first.
fn as_int(f: f32) -> i32 {
    f as i32
}

impl ArithmeticOpHandler for ArithmeticOpImpl {
    fn float_binary(&self, op: Opcode, a: f32, b: f32) -> Result<f32, VMError> {
        let result = match op {
            Opcode::AddF => a + b,
            Opcode::SubF => a - b,
            Opcode::MulF => a * b,
            Opcode::DivF => self.divide_float(a, b)?,
            Opcode::ModF => {
                let divisor = as_int(b);
                if divisor == 0 {
                    return Err(VMError::DivisionByZero(op.name()));
                }
                as_int(a).wrapping_rem(divisor) as f32
            }
            Opcode::BitAnd => (as_int(a) & as_int(b)) as f32,
            Opcode::BitOr => (as_int(a) | as_int(b)) as f32,
            Opcode::BitXorF => (as_int(a) ^ as_int(b)) as f32,
            Opcode::ShlF => as_int(a).wrapping_shl(as_int(b) as u32) as f32,
            Opcode::ShrF => as_int(a).wrapping_shr(as_int(b) as u32) as f32,
            _ => return Err(VMError::UnknownOpcode(op as u16)),
        };
        Ok(result)
    }

    fn int_binary(&self, op: Opcode, a: i32, b: i32) -> Result<i32, VMError> {
        let result = match op {
            Opcode::AddI => a.wrapping_add(b),
            Opcode::SubI => a.wrapping_sub(b),
            Opcode::MulI => a.wrapping_mul(b),
            Opcode::DivI => self.divide_int(a, b)?,
            Opcode::ModI => {
                if b == 0 {
                    return Err(VMError::DivisionByZero(op.name()));
                }
                a.wrapping_rem(b)
            }
            Opcode::BitAndI => a & b,
            Opcode::BitOrI => a | b,
            Opcode::BitXorI => a ^ b,
            Opcode::ShlI => a.wrapping_shl(b as u32),
            Opcode::ShrI => a.wrapping_shr(b as u32),
            _ => return Err(VMError::UnknownOpcode(op as u16)),
        };
        Ok(result)
    }

    fn uint_binary(&self, op: Opcode, a: u32, b: u32) -> Result<u32, VMError> {
        let result = match op {
            Opcode::AddU => a.wrapping_add(b),
            Opcode::SubU => a.wrapping_sub(b),
            Opcode::MulU => a.wrapping_mul(b),
            Opcode::DivU => self.divide_uint(a, b)?,
            Opcode::ModU => a
                .checked_rem(b)
                .ok_or(VMError::DivisionByZero(op.name()))?,
            Opcode::BitAndU => a & b,
            Opcode::BitOrU => a | b,
            Opcode::BitXorU => a ^ b,
            Opcode::ShlU => a.wrapping_shl(b),
            Opcode::ShrU => a.wrapping_shr(b),
            _ => return Err(VMError::UnknownOpcode(op as u16)),
        };
        Ok(result)
    }
}
