//! String storage
//!
//! Strings referenced by the bytecode are either byte offsets into the
//! module's NUL-delimited string table or, when negative, transient strings
//! created while running (concatenation results and host-supplied text).
//!
//! Transient strings are released when a top-level run begins. Strings the
//! host registered after the previous run finished survive that release, so
//! they can be passed in as arguments; they go at the start of the run after.
//! Released slots are reused.

use std::borrow::Cow;
use std::sync::Arc;

use crate::vm::errors::VMError;
use crate::vm::types::StringIndex;

#[derive(Debug, Clone)]
struct TempString {
    bytes: Vec<u8>,
    epoch: u64,
}

/// Module strings plus the transient arena.
#[derive(Debug, Clone)]
pub struct StringTable {
    blob: Arc<[u8]>,
    temps: Vec<Option<TempString>>,
    free: Vec<usize>,
    /// Odd while a run is active, even between runs.
    epoch: u64,
    active_runs: usize,
}

impl StringTable {
    pub fn new(blob: Arc<[u8]>) -> Self {
        Self {
            blob,
            temps: Vec::new(),
            free: Vec::new(),
            epoch: 0,
            active_runs: 0,
        }
    }

    /// Mark the start of a run, releasing transient strings from earlier runs.
    pub fn begin_run(&mut self) {
        self.active_runs += 1;
        if self.active_runs > 1 {
            return;
        }
        self.epoch += 1;
        let keep_from = self.epoch - 1;
        for (slot, temp) in self.temps.iter_mut().enumerate() {
            if temp.as_ref().is_some_and(|t| t.epoch < keep_from) {
                *temp = None;
                self.free.push(slot);
            }
        }
    }

    pub fn end_run(&mut self) {
        self.active_runs = self.active_runs.saturating_sub(1);
        if self.active_runs == 0 {
            self.epoch += 1;
        }
    }

    /// Bytes of the string named by `index`, without the terminator.
    pub fn get(&self, index: StringIndex) -> Result<&[u8], VMError> {
        if index.is_temp() {
            let slot = (-(index.0 as i64) - 1) as usize;
            return self
                .temps
                .get(slot)
                .and_then(Option::as_ref)
                .map(|temp| temp.bytes.as_slice())
                .ok_or(VMError::InvalidString(index.0));
        }
        let start = index.0 as usize;
        let tail = self.blob.get(start..).ok_or(VMError::InvalidString(index.0))?;
        let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
        Ok(&tail[..end])
    }

    /// Lossy UTF-8 view, for builtins and diagnostics.
    pub fn get_str(&self, index: StringIndex) -> Result<Cow<'_, str>, VMError> {
        self.get(index).map(String::from_utf8_lossy)
    }

    /// Register a transient string and return its reference.
    pub fn push_temp(&mut self, bytes: Vec<u8>) -> StringIndex {
        let temp = Some(TempString {
            bytes,
            epoch: self.epoch,
        });
        let slot = match self.free.pop() {
            Some(slot) => {
                self.temps[slot] = temp;
                slot
            }
            None => {
                self.temps.push(temp);
                self.temps.len() - 1
            }
        };
        StringIndex(-(slot as i32) - 1)
    }

    /// Concatenate two strings into a new transient string.
    pub fn concat(&mut self, a: StringIndex, b: StringIndex) -> Result<StringIndex, VMError> {
        let mut joined = self.get(a)?.to_vec();
        joined.extend_from_slice(self.get(b)?);
        Ok(self.push_temp(joined))
    }

    /// Byte-wise comparison of two strings.
    pub fn compare(&self, a: StringIndex, b: StringIndex) -> Result<std::cmp::Ordering, VMError> {
        Ok(self.get(a)?.cmp(self.get(b)?))
    }

    /// Whether the string is empty; reference zero is always empty.
    pub fn is_empty_string(&self, index: StringIndex) -> Result<bool, VMError> {
        if index == StringIndex::EMPTY {
            return Ok(true);
        }
        self.get(index).map(|s| s.is_empty())
    }

    pub fn clear_temps(&mut self) {
        self.temps.clear();
        self.free.clear();
    }

    /// Number of live transient strings.
    pub fn temp_count(&self) -> usize {
        self.temps.len() - self.free.len()
    }

    pub fn blob_len(&self) -> usize {
        self.blob.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    fn table() -> StringTable {
        StringTable::new(Arc::from(&b"\0alpha\0beta\0"[..]))
    }

    #[test]
    fn test_module_strings() {
        let strings = table();
        assert_eq!(strings.get(StringIndex(0)).unwrap(), b"");
        assert_eq!(strings.get(StringIndex(1)).unwrap(), b"alpha");
        assert_eq!(strings.get(StringIndex(3)).unwrap(), b"pha");
        assert_eq!(strings.get(StringIndex(7)).unwrap(), b"beta");
        assert!(strings.get(StringIndex(100)).is_err());
    }

    #[test]
    fn test_concat_creates_temp() {
        let mut strings = table();
        let joined = strings.concat(StringIndex(1), StringIndex(7)).unwrap();
        assert!(joined.is_temp());
        assert_eq!(strings.get_str(joined).unwrap(), "alphabeta");
        strings.clear_temps();
        assert_eq!(strings.get(joined), Err(VMError::InvalidString(joined.0)));
    }

    #[test]
    fn test_compare_is_bytewise() {
        let mut strings = table();
        let upper = strings.push_temp(b"Alpha".to_vec());
        assert_eq!(strings.compare(StringIndex(1), StringIndex(7)).unwrap(), Ordering::Less);
        assert_eq!(strings.compare(upper, StringIndex(1)).unwrap(), Ordering::Less);
        assert!(strings.is_empty_string(StringIndex::EMPTY).unwrap());
    }

    #[test]
    fn test_runs_release_earlier_temps() {
        let mut strings = table();

        strings.begin_run();
        let first = strings.push_temp(b"first".to_vec());
        strings.end_run();
        let arg = strings.push_temp(b"argument".to_vec());

        strings.begin_run();
        assert!(strings.get(first).is_err());
        assert_eq!(strings.get(arg).unwrap(), b"argument");
        // nested runs share the outer run's lifetime
        strings.begin_run();
        let inner = strings.push_temp(b"inner".to_vec());
        strings.end_run();
        assert_eq!(strings.get(arg).unwrap(), b"argument");
        assert_eq!(strings.get(inner).unwrap(), b"inner");
        strings.end_run();

        strings.begin_run();
        assert_eq!(strings.temp_count(), 0);
        strings.end_run();
    }

    #[test]
    fn test_released_slots_are_reused() {
        let mut strings = table();
        for _ in 0..100 {
            strings.begin_run();
            strings.push_temp(b"a".to_vec());
            strings.push_temp(b"b".to_vec());
            strings.end_run();
        }
        assert_eq!(strings.temp_count(), 2);
    }
}
