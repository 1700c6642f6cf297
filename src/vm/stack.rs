//! VM stacks
//!
//! The interpreter keeps two bounded stacks: the call stack of return
//! addresses and the saved-locals stack that rescues a function's
//! parameter/local region while the function is re-entered.

use crate::vm::errors::VMError;
use crate::vm::memory::GlobalMemory;
use crate::vm::types::FunctionId;

/// Where to resume after a call returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// The calling statement.
    pub statement: usize,
    /// The calling function.
    pub function: FunctionId,
}

/// Bounded stack of return frames
#[derive(Debug, Clone)]
pub struct CallStack {
    frames: Vec<Frame>,
    max_depth: usize,
}

impl CallStack {
    pub fn new(max_depth: usize) -> Self {
        Self {
            frames: Vec::with_capacity(max_depth.min(256)),
            max_depth,
        }
    }

    /// Fails without pushing when the stack is full.
    pub fn push(&mut self, frame: Frame) -> Result<(), VMError> {
        if self.frames.len() >= self.max_depth {
            return Err(VMError::StackOverflow {
                limit: self.max_depth,
            });
        }
        self.frames.push(frame);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Frame, VMError> {
        self.frames.pop().ok_or(VMError::StackUnderflow)
    }

    /// Whether another frame fits.
    pub fn has_room(&self) -> bool {
        self.frames.len() < self.max_depth
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Frames from innermost to outermost.
    pub fn iter_innermost(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter().rev()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

/// Bounded stack of saved local words
#[derive(Debug, Clone)]
pub struct LocalsStack {
    words: Vec<u32>,
    capacity: usize,
}

impl LocalsStack {
    pub fn new(capacity: usize) -> Self {
        Self {
            words: Vec::with_capacity(capacity.min(65536)),
            capacity,
        }
    }

    /// Whether `count` more words fit.
    pub fn has_room(&self, count: usize) -> bool {
        self.words.len() + count <= self.capacity
    }

    /// Save `count` words of `memory` starting at `start`.
    pub fn save(&mut self, memory: &GlobalMemory, start: i64, count: u32) -> Result<(), VMError> {
        if !self.has_room(count as usize) {
            return Err(VMError::LocalsOverflow {
                needed: count as usize,
                available: self.capacity - self.words.len(),
            });
        }
        self.words.extend_from_slice(memory.slice(start, count)?);
        Ok(())
    }

    /// Pop the last `count` saved words back into `memory` at `start`.
    pub fn restore(&mut self, memory: &mut GlobalMemory, start: i64, count: u32) -> Result<(), VMError> {
        let count = count as usize;
        if count > self.words.len() {
            return Err(VMError::LocalsUnderflow);
        }
        let from = self.words.len() - count;
        memory.write_slice(start, &self.words[from..])?;
        self.words.truncate(from);
        Ok(())
    }

    pub fn used(&self) -> usize {
        self.words.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.words.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_stack_bound() {
        let mut stack = CallStack::new(2);
        let frame = Frame {
            statement: 3,
            function: FunctionId(1),
        };
        assert!(stack.push(frame).is_ok());
        assert!(stack.push(frame).is_ok());
        assert!(!stack.has_room());
        assert_eq!(stack.push(frame), Err(VMError::StackOverflow { limit: 2 }));
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.pop().unwrap(), frame);
    }

    #[test]
    fn test_call_stack_underflow() {
        let mut stack = CallStack::new(4);
        assert_eq!(stack.pop(), Err(VMError::StackUnderflow));
    }

    #[test]
    fn test_locals_save_restore() {
        let mut memory = GlobalMemory::allocate(8).unwrap();
        memory.write_slice(2, &[10, 11, 12]).unwrap();

        let mut locals = LocalsStack::new(4);
        locals.save(&memory, 2, 3).unwrap();
        memory.fill(2, 3, 0xdead_beef).unwrap();
        assert_eq!(locals.used(), 3);

        locals.restore(&mut memory, 2, 3).unwrap();
        assert_eq!(&memory.words()[2..5], &[10, 11, 12]);
        assert_eq!(locals.used(), 0);
    }

    #[test]
    fn test_locals_bounds() {
        let memory = GlobalMemory::allocate(8).unwrap();
        let mut locals = LocalsStack::new(4);
        locals.save(&memory, 0, 3).unwrap();
        assert_eq!(
            locals.save(&memory, 0, 2),
            Err(VMError::LocalsOverflow {
                needed: 2,
                available: 1
            })
        );
        let mut memory = memory;
        assert_eq!(locals.restore(&mut memory, 0, 4), Err(VMError::LocalsUnderflow));
    }
}
