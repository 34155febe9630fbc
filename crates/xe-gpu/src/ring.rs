//! Ring buffer cursor over guest memory

use std::sync::Arc;

use xe_core::error::MemoryError;
use xe_memory::MemoryManager;

/// Read cursor over a circular region of big-endian command words
///
/// The readable extent is fixed when the cursor is created; a new cursor is
/// built for every region entered (primary ring drain or indirect buffer).
/// Cloning yields an independent snapshot, which is how nested execution
/// saves and restores the outer position.
#[derive(Clone)]
pub struct RingCursor {
    memory: Arc<MemoryManager>,
    /// Guest physical address of the region
    base: u32,
    /// Region size in bytes
    capacity: u32,
    /// Byte offset of the next word
    read_offset: u32,
    /// Bytes left before the write offset
    available: u32,
}

impl RingCursor {
    /// Cursor over a whole linear region, starting at its first word
    pub fn new(memory: Arc<MemoryManager>, base: u32, capacity: u32) -> Result<Self, MemoryError> {
        Self::with_offsets(memory, base, capacity, 0, capacity)
    }

    /// Cursor over a ring from `read_offset` up to `write_offset`
    ///
    /// A write offset equal to the read offset means the ring is empty; a
    /// write offset equal to the capacity means the whole region is pending.
    pub fn with_offsets(
        memory: Arc<MemoryManager>,
        base: u32,
        capacity: u32,
        read_offset: u32,
        write_offset: u32,
    ) -> Result<Self, MemoryError> {
        if capacity == 0 || capacity % 4 != 0 || base % 4 != 0 {
            return Err(MemoryError::InvalidRing { base, capacity });
        }
        memory.check_range(base, capacity as usize)?;

        let read_offset = read_offset % capacity;
        let available = if write_offset == capacity && read_offset == 0 {
            capacity
        } else {
            let write_offset = write_offset % capacity;
            if write_offset >= read_offset {
                write_offset - read_offset
            } else {
                capacity - read_offset + write_offset
            }
        };

        Ok(Self {
            memory,
            base,
            capacity,
            read_offset,
            available,
        })
    }

    /// Read the next word, byte order normalized
    #[inline]
    pub fn read_u32(&mut self) -> u32 {
        let value = self.memory.read_be32(self.base + self.read_offset);
        self.advance(4);
        value
    }

    /// Skip `n_bytes`, wrapping at the end of the region
    #[inline]
    pub fn advance(&mut self, n_bytes: u32) {
        self.read_offset =
            ((self.read_offset as u64 + n_bytes as u64) % self.capacity as u64) as u32;
        self.available = self.available.saturating_sub(n_bytes);
    }

    /// Step back `n_bytes`, returning them to the extent
    #[inline]
    pub fn rewind(&mut self, n_bytes: u32) {
        let back = n_bytes % self.capacity;
        self.read_offset = (self.read_offset + self.capacity - back) % self.capacity;
        self.available = (self.available + n_bytes).min(self.capacity);
    }

    /// Bytes left in the extent
    #[inline]
    pub fn read_count(&self) -> u32 {
        self.available
    }

    /// Current byte offset inside the region
    #[inline]
    pub fn read_offset(&self) -> u32 {
        self.read_offset
    }

    /// Move the read position, keeping the write offset where it was
    pub fn set_read_offset(&mut self, offset: u32) {
        let offset = offset % self.capacity;
        if offset == self.read_offset {
            return;
        }
        let write_offset = (self.read_offset + self.available) % self.capacity;
        self.available = if write_offset >= offset {
            write_offset - offset
        } else {
            self.capacity - offset + write_offset
        };
        self.read_offset = offset;
    }

    /// Region size in bytes
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Guest address of the region
    #[inline]
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Guest address of the next word
    #[inline]
    pub fn read_address(&self) -> u32 {
        self.base + self.read_offset
    }

    /// Guest address `back` bytes before the next word, wrapping
    #[inline]
    pub fn address_behind(&self, back: u32) -> u32 {
        let back = back % self.capacity;
        self.base + (self.read_offset + self.capacity - back) % self.capacity
    }

    /// Memory the cursor reads from
    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }
}

impl std::fmt::Debug for RingCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingCursor")
            .field("base", &format_args!("0x{:08X}", self.base))
            .field("capacity", &self.capacity)
            .field("read_offset", &self.read_offset)
            .field("available", &self.available)
            .finish()
    }
}
