//! Host builtin registry
//!
//! A function whose entry statement is negative has no bytecode; calling it
//! invokes the native function registered under the negated entry value.
//! Builtins receive the whole VM, so they can read their parameters from the
//! parameter slots, write the return slot and re-enter the interpreter.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::vm::errors::VMError;
use crate::vm::vm::VM;

/// Signature of a native builtin.
pub type BuiltinFn = Arc<dyn Fn(&mut VM) -> Result<(), VMError> + Send + Sync>;

/// A registered builtin and the name it was registered under.
#[derive(Clone)]
pub struct Builtin {
    pub name: String,
    pub func: BuiltinFn,
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builtin").field("name", &self.name).finish()
    }
}

/// Builtins keyed by their positive index.
#[derive(Debug, Clone, Default)]
pub struct BuiltinRegistry {
    builtins: HashMap<u32, Builtin>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `func` as builtin number `index`, replacing any earlier one.
    pub fn register<F>(&mut self, index: u32, name: &str, func: F) -> Option<Builtin>
    where
        F: Fn(&mut VM) -> Result<(), VMError> + Send + Sync + 'static,
    {
        self.builtins.insert(
            index,
            Builtin {
                name: name.to_string(),
                func: Arc::new(func),
            },
        )
    }

    pub fn get(&self, index: u32) -> Option<&Builtin> {
        self.builtins.get(&index)
    }

    pub fn contains(&self, index: u32) -> bool {
        self.builtins.contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.builtins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builtins.is_empty()
    }

    /// Registered indices in ascending order.
    pub fn indices(&self) -> Vec<u32> {
        let mut indices: Vec<u32> = self.builtins.keys().copied().collect();
        indices.sort_unstable();
        indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_replace() {
        let mut registry = BuiltinRegistry::new();
        assert!(registry.register(3, "vtos", |_| Ok(())).is_none());
        assert!(registry.register(1, "print", |_| Ok(())).is_none());
        let previous = registry.register(1, "dprint", |_| Ok(()));
        assert_eq!(previous.map(|b| b.name), Some("print".to_string()));

        assert_eq!(registry.indices(), vec![1, 3]);
        assert_eq!(registry.get(1).map(|b| b.name.as_str()), Some("dprint"));
        assert!(!registry.contains(2));
        assert_eq!(registry.len(), 2);
    }
}
