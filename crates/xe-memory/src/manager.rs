//! Physical memory manager

use std::sync::Arc;

use bytemuck::Pod;
use parking_lot::RwLock;
use xe_core::error::MemoryError;
use xe_core::mem_trace;

use crate::constants::{MIN_PHYSICAL_SIZE, PHYSICAL_ADDRESS_MASK, PHYSICAL_MEM_SIZE};

/// Mapping between guest address spaces
///
/// The CPU sees physical memory through several mirrored windows, the GPU
/// addresses it directly.
pub trait AddressTranslator {
    /// Offset into backing storage for a guest physical address
    fn translate_physical(&self, address: u32) -> u32;

    /// CPU view of a GPU address
    fn cpu_address_of(&self, gpu_address: u32) -> u32 {
        gpu_address
    }

    /// GPU view of a CPU address
    fn gpu_address_of(&self, cpu_address: u32) -> u32 {
        cpu_address & PHYSICAL_ADDRESS_MASK
    }
}

/// Backing store for guest physical memory
///
/// Shared between the producer writing command buffers and the GPU worker
/// consuming them. Word accessors align the address down and wrap inside the
/// backed size, so they cannot fail; ranged accessors report accesses that
/// run off the end.
pub struct MemoryManager {
    physical: RwLock<Box<[u8]>>,
    /// Backed size minus one
    wrap_mask: u32,
}

impl MemoryManager {
    /// Create a memory manager backing `size` bytes of physical memory
    pub fn new(size: u32) -> Result<Arc<Self>, MemoryError> {
        if !size.is_power_of_two() || !(MIN_PHYSICAL_SIZE..=PHYSICAL_MEM_SIZE).contains(&size) {
            return Err(MemoryError::InvalidSize(size as u64));
        }

        mem_trace!("Allocating 0x{:X} bytes of physical memory", size);

        Ok(Arc::new(Self {
            physical: RwLock::new(vec![0u8; size as usize].into_boxed_slice()),
            wrap_mask: size - 1,
        }))
    }

    /// Backed physical memory size in bytes
    pub fn size(&self) -> u32 {
        self.wrap_mask + 1
    }

    /// Check that `len` bytes starting at `address` are backed
    pub fn check_range(&self, address: u32, len: usize) -> Result<usize, MemoryError> {
        let offset = self.translate_physical(address) as usize;
        if offset + len > self.size() as usize {
            return Err(MemoryError::OutOfRange { address, size: len });
        }
        Ok(offset)
    }

    #[inline]
    fn word_offset(&self, address: u32) -> usize {
        (self.translate_physical(address) & !3) as usize
    }

    /// Load a word in host (little-endian) order
    #[inline]
    pub fn load_u32(&self, address: u32) -> u32 {
        let offset = self.word_offset(address);
        let mem = self.physical.read();
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&mem[offset..offset + 4]);
        u32::from_le_bytes(bytes)
    }

    /// Store a word in host (little-endian) order
    #[inline]
    pub fn store_u32(&self, address: u32, value: u32) {
        let offset = self.word_offset(address);
        self.physical.write()[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Read a big-endian word
    #[inline]
    pub fn read_be32(&self, address: u32) -> u32 {
        self.load_u32(address).swap_bytes()
    }

    /// Write a big-endian word
    #[inline]
    pub fn write_be32(&self, address: u32, value: u32) {
        self.store_u32(address, value.swap_bytes());
    }

    /// Read a big-endian halfword
    pub fn read_be16(&self, address: u32) -> u16 {
        let offset = (self.translate_physical(address) & !1) as usize;
        let mem = self.physical.read();
        u16::from_be_bytes([mem[offset], mem[offset + 1]])
    }

    /// Write a big-endian halfword
    pub fn write_be16(&self, address: u32, value: u16) {
        let offset = (self.translate_physical(address) & !1) as usize;
        self.physical.write()[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
    }

    /// Copy `data` into guest memory
    pub fn write_bytes(&self, address: u32, data: &[u8]) -> Result<(), MemoryError> {
        let offset = self.check_range(address, data.len())?;
        self.physical.write()[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Read a plain-old-data value in host byte order
    pub fn read<T: Pod>(&self, address: u32) -> Result<T, MemoryError> {
        let size = std::mem::size_of::<T>();
        let offset = self.check_range(address, size)?;
        let mem = self.physical.read();
        Ok(bytemuck::pod_read_unaligned(&mem[offset..offset + size]))
    }

    /// Write a plain-old-data value in host byte order
    pub fn write<T: Pod>(&self, address: u32, value: T) -> Result<(), MemoryError> {
        self.write_bytes(address, bytemuck::bytes_of(&value))
    }

    /// Read `count` consecutive big-endian words
    pub fn read_be32_slice(&self, address: u32, count: usize) -> Result<Vec<u32>, MemoryError> {
        let offset = self.check_range(address & !3, count * 4)?;
        let mem = self.physical.read();
        Ok(mem[offset..offset + count * 4]
            .chunks_exact(4)
            .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }

    /// Write consecutive big-endian words
    pub fn write_be32_slice(&self, address: u32, words: &[u32]) -> Result<(), MemoryError> {
        let offset = self.check_range(address & !3, words.len() * 4)?;
        let mut mem = self.physical.write();
        for (chunk, word) in mem[offset..offset + words.len() * 4]
            .chunks_exact_mut(4)
            .zip(words)
        {
            chunk.copy_from_slice(&word.to_be_bytes());
        }
        Ok(())
    }
}

impl AddressTranslator for MemoryManager {
    #[inline]
    fn translate_physical(&self, address: u32) -> u32 {
        address & PHYSICAL_ADDRESS_MASK & self.wrap_mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_sizes() {
        assert!(matches!(MemoryManager::new(0x1001), Err(MemoryError::InvalidSize(0x1001))));
        assert!(MemoryManager::new(0x800).is_err());
        assert!(MemoryManager::new(0x4000_0000).is_err());
        assert!(MemoryManager::new(0x1000).is_ok());
    }

    #[test]
    fn test_word_byte_order() {
        let mem = MemoryManager::new(0x1000).unwrap();

        mem.write_be32(0x10, 0x1122_3344);
        assert_eq!(mem.read::<[u8; 4]>(0x10).unwrap(), [0x11, 0x22, 0x33, 0x44]);
        assert_eq!(mem.load_u32(0x10), 0x4433_2211);

        // Word accessors align down
        assert_eq!(mem.read_be32(0x13), 0x1122_3344);
    }

    #[test]
    fn test_ranged_access_past_end() {
        let mem = MemoryManager::new(0x1000).unwrap();

        let err = mem.write_bytes(0xFFE, &[1, 2, 3, 4]).unwrap_err();
        assert_eq!(err, MemoryError::OutOfRange { address: 0xFFE, size: 4 });
        assert!(mem.read_be32_slice(0xFF0, 8).is_err());
        assert!(mem.read_be32_slice(0xFF0, 4).is_ok());
    }

    #[test]
    fn test_gpu_cpu_views() {
        let mem = MemoryManager::new(0x1000).unwrap();
        assert_eq!(mem.gpu_address_of(0xA000_0100), 0x0000_0100);
        assert_eq!(mem.cpu_address_of(0x0000_0100), 0x0000_0100);
    }
}
