//! Xenon memory map constants

/// Largest physical memory size (512 MB)
pub const PHYSICAL_MEM_SIZE: u32 = 0x2000_0000;
/// Mask applied to every physical address
pub const PHYSICAL_ADDRESS_MASK: u32 = PHYSICAL_MEM_SIZE - 1;

/// Smallest physical memory size accepted (4 KB, one page)
pub const MIN_PHYSICAL_SIZE: u32 = PAGE_SIZE;

/// CPU view of physical memory with 64 KB pages
pub const PHYSICAL_64K_BASE: u32 = 0xA000_0000;
/// CPU view of physical memory with 16 MB pages
pub const PHYSICAL_16M_BASE: u32 = 0xC000_0000;
/// CPU view of physical memory with 4 KB pages
pub const PHYSICAL_4K_BASE: u32 = 0xE000_0000;

/// Standard page size (4 KB)
pub const PAGE_SIZE: u32 = 0x1000;
