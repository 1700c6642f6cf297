//! VM memory
//!
//! All program data lives in one flat array of 32-bit words. The array is
//! split into three regions: the module's globals, the entity area and an
//! auxiliary heap. Pointers used by the bytecode are word indices into this
//! array, so every access goes through a range check here instead of raw
//! host addressing.

use std::fmt;

use crate::vm::errors::{LoadError, VMError};
use crate::vm::types::{EntityId, GlobalIndex};

/// Words per alignment unit (eight bytes).
const ALIGN_WORDS: usize = 2;

fn align_up(words: usize) -> usize {
    (words + ALIGN_WORDS - 1) / ALIGN_WORDS * ALIGN_WORDS
}

/// Placement of the three regions inside the flat array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLayout {
    /// Globals declared by the module.
    pub global_count: usize,
    /// First word of the entity area.
    pub entity_base: usize,
    /// Words between consecutive entity records.
    pub entity_stride: usize,
    /// Number of entity records.
    pub entity_capacity: usize,
    /// Fields declared per entity.
    pub entity_fields: usize,
    /// First word of the auxiliary heap.
    pub heap_base: usize,
    pub heap_words: usize,
    /// Total words in the array.
    pub total_words: usize,
}

impl MemoryLayout {
    /// Compute the layout for a module.
    ///
    /// `heap_bytes` is rounded up to whole, aligned words.
    pub fn new(
        global_count: usize,
        entity_fields: usize,
        entity_capacity: usize,
        heap_bytes: usize,
    ) -> Result<Self, LoadError> {
        let overflow = || LoadError::Format(String::from("memory layout overflows the address space"));

        let globals = align_up(global_count);
        let entity_stride = align_up(entity_fields);
        let entity_words = entity_stride
            .checked_mul(entity_capacity)
            .ok_or_else(overflow)?;
        let heap_words = align_up(heap_bytes.div_ceil(4));

        let entity_base = globals;
        let heap_base = entity_base.checked_add(entity_words).ok_or_else(overflow)?;
        let total_words = heap_base.checked_add(heap_words).ok_or_else(overflow)?;
        if total_words > i32::MAX as usize {
            return Err(overflow());
        }

        Ok(Self {
            global_count,
            entity_base,
            entity_stride,
            entity_capacity,
            entity_fields,
            heap_base,
            heap_words,
            total_words,
        })
    }

    /// Word index of `field` in entity `entity`.
    ///
    /// Does not check the entity or field against their limits; the caller
    /// decides which checks apply.
    pub fn entity_field_address(&self, entity: i64, field: i64) -> i64 {
        self.entity_base as i64 + entity * self.entity_stride as i64 + field
    }

    /// First word of an entity record.
    pub fn entity_address(&self, entity: EntityId) -> GlobalIndex {
        GlobalIndex(self.entity_field_address(entity.0 as i64, 0) as u32)
    }

    pub fn entity_in_range(&self, entity: i64) -> bool {
        entity >= 0 && (entity as usize) < self.entity_capacity
    }

    /// Whether `width` words starting at `field` fit inside an entity record.
    pub fn field_in_range(&self, field: i64, width: u32) -> bool {
        field >= 0 && (field as usize) + (width as usize) <= self.entity_fields
    }
}

impl fmt::Display for MemoryLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "globals 0..{} | entities {}..{} ({} x {} words) | heap {}..{}",
            self.global_count,
            self.entity_base,
            self.heap_base,
            self.entity_capacity,
            self.entity_stride,
            self.heap_base,
            self.total_words
        )
    }
}

/// The flat word array the interpreter operates on.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalMemory {
    words: Vec<u32>,
}

impl GlobalMemory {
    /// Reserve a zeroed array of `total_words` words.
    pub fn allocate(total_words: usize) -> Result<Self, LoadError> {
        let mut words = Vec::new();
        words
            .try_reserve_exact(total_words)
            .map_err(|_| LoadError::Allocation { words: total_words })?;
        words.resize(total_words, 0);
        Ok(Self { words })
    }

    /// Build the array for `layout` and copy the initial global image in.
    pub fn with_image(layout: &MemoryLayout, image: &[u32]) -> Result<Self, LoadError> {
        let mut memory = Self::allocate(layout.total_words)?;
        let count = image.len().min(layout.global_count);
        memory.words[..count].copy_from_slice(&image[..count]);
        Ok(memory)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Check that `count` words starting at `address` are inside the array.
    pub fn resolve(&self, address: i64, count: u32) -> Result<usize, VMError> {
        if address < 0 || address as u64 + count as u64 > self.words.len() as u64 {
            return Err(VMError::InvalidGlobal(address));
        }
        Ok(address as usize)
    }

    pub fn read(&self, address: i64) -> Result<u32, VMError> {
        let index = self.resolve(address, 1)?;
        Ok(self.words[index])
    }

    pub fn write(&mut self, address: i64, value: u32) -> Result<(), VMError> {
        let index = self.resolve(address, 1)?;
        self.words[index] = value;
        Ok(())
    }

    /// Read `N` consecutive words.
    pub fn read_n<const N: usize>(&self, address: i64) -> Result<[u32; N], VMError> {
        let index = self.resolve(address, N as u32)?;
        let mut out = [0u32; N];
        out.copy_from_slice(&self.words[index..index + N]);
        Ok(out)
    }

    pub fn write_slice(&mut self, address: i64, values: &[u32]) -> Result<(), VMError> {
        let index = self.resolve(address, values.len() as u32)?;
        self.words[index..index + values.len()].copy_from_slice(values);
        Ok(())
    }

    pub fn slice(&self, address: i64, count: u32) -> Result<&[u32], VMError> {
        let index = self.resolve(address, count)?;
        Ok(&self.words[index..index + count as usize])
    }

    /// Copy `count` words from `src` to `dst`; the ranges may overlap.
    pub fn copy_within(&mut self, src: i64, dst: i64, count: u32) -> Result<(), VMError> {
        let from = self.resolve(src, count)?;
        let to = self.resolve(dst, count)?;
        self.words.copy_within(from..from + count as usize, to);
        Ok(())
    }

    pub fn fill(&mut self, address: i64, count: u32, value: u32) -> Result<(), VMError> {
        let index = self.resolve(address, count)?;
        self.words[index..index + count as usize].fill(value);
        Ok(())
    }

    pub fn float(&self, address: i64) -> Result<f32, VMError> {
        self.read(address).map(f32::from_bits)
    }

    pub fn set_float(&mut self, address: i64, value: f32) -> Result<(), VMError> {
        self.write(address, value.to_bits())
    }

    pub fn int(&self, address: i64) -> Result<i32, VMError> {
        self.read(address).map(|w| w as i32)
    }

    pub fn set_int(&mut self, address: i64, value: i32) -> Result<(), VMError> {
        self.write(address, value as u32)
    }

    pub fn vector(&self, address: i64) -> Result<[f32; 3], VMError> {
        let [x, y, z] = self.read_n::<3>(address)?;
        Ok([f32::from_bits(x), f32::from_bits(y), f32::from_bits(z)])
    }

    pub fn set_vector(&mut self, address: i64, value: [f32; 3]) -> Result<(), VMError> {
        self.write_slice(address, &value.map(f32::to_bits))
    }
}

/// Format a raw word for dumps and disassembly.
pub fn format_word(word: u32) -> String {
    let float = f32::from_bits(word);
    if word == 0 {
        String::from("0")
    } else if float.is_finite() && float.abs() >= 1.0e-6 && float.abs() < 1.0e9 {
        format!("{}", float)
    } else {
        format!("{:#010x}", word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_regions() {
        let layout = MemoryLayout::new(31, 5, 4, 10).unwrap();
        assert_eq!(layout.entity_base, 32);
        assert_eq!(layout.entity_stride, 6);
        assert_eq!(layout.heap_base, 32 + 24);
        assert_eq!(layout.heap_words, 4);
        assert_eq!(layout.total_words, 32 + 24 + 4);
        assert_eq!(layout.entity_field_address(2, 3), 32 + 12 + 3);
        assert!(layout.entity_in_range(3));
        assert!(!layout.entity_in_range(4));
        assert!(layout.field_in_range(2, 3));
        assert!(!layout.field_in_range(3, 3));
    }

    #[test]
    fn test_access_is_range_checked() {
        let mut memory = GlobalMemory::allocate(8).unwrap();
        memory.set_float(2, 1.5).unwrap();
        assert_eq!(memory.float(2).unwrap(), 1.5);
        assert_eq!(memory.read(8), Err(VMError::InvalidGlobal(8)));
        assert_eq!(memory.read(-1), Err(VMError::InvalidGlobal(-1)));
        assert!(memory.vector(6).is_err());
        assert!(memory.set_vector(5, [1.0, 2.0, 3.0]).is_ok());
    }

    #[test]
    fn test_overlapping_copy() {
        let mut memory = GlobalMemory::allocate(6).unwrap();
        memory.write_slice(0, &[1, 2, 3, 4]).unwrap();
        memory.copy_within(0, 1, 4).unwrap();
        assert_eq!(memory.words(), &[1, 1, 2, 3, 4, 0]);
    }

    #[test]
    fn test_image_copy() {
        let layout = MemoryLayout::new(4, 2, 1, 0).unwrap();
        let memory = GlobalMemory::with_image(&layout, &[7, 8, 9, 10]).unwrap();
        assert_eq!(&memory.words()[..4], &[7, 8, 9, 10]);
        assert_eq!(memory.len(), layout.total_words);
    }

    #[test]
    fn test_format_word() {
        assert_eq!(format_word(0), "0");
        assert_eq!(format_word(2.5f32.to_bits()), "2.5");
        assert_eq!(format_word(5), "0x00000005");
    }
}
