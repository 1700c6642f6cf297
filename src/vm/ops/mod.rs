//! Operation handlers for VM operations
//!
//! The interpreter loop decodes operands and stores results; the value
//! computations themselves live here, grouped by domain:
//! - ArithmeticOpHandler: float, integer and unsigned arithmetic, including
//!   the divide-by-zero policy
//! - ComparisonOpHandler: orderings, equality and logical connectives

pub mod arithmetic;
pub mod comparison;

pub use arithmetic::ArithmeticOpImpl;
pub use comparison::truthy;

use crate::vm::errors::VMError;
use crate::vm::opcodes::Opcode;

/// Binary arithmetic on the scalar value kinds
pub trait ArithmeticOpHandler {
    /// Float arithmetic and the float-encoded bit operations
    fn float_binary(&self, op: Opcode, a: f32, b: f32) -> Result<f32, VMError>;

    /// Signed integer arithmetic, wrapping on overflow
    fn int_binary(&self, op: Opcode, a: i32, b: i32) -> Result<i32, VMError>;

    /// Unsigned integer arithmetic, wrapping on overflow
    fn uint_binary(&self, op: Opcode, a: u32, b: u32) -> Result<u32, VMError>;
}

/// Comparisons and logical connectives
pub trait ComparisonOpHandler {
    fn float_compare(&self, op: Opcode, a: f32, b: f32) -> Result<bool, VMError>;

    fn int_compare(&self, op: Opcode, a: i32, b: i32) -> Result<bool, VMError>;

    fn uint_compare(&self, op: Opcode, a: u32, b: u32) -> Result<bool, VMError>;
}
