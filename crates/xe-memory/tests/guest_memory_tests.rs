//! Tests for guest physical memory and address views

use std::sync::Arc;
use std::thread;

use xe_memory::{constants::*, AddressTranslator, MemoryManager};

#[test]
fn test_cpu_windows_alias_physical_memory() {
    let mem = MemoryManager::new(0x10_0000).unwrap();

    mem.write_be32(0x1000, 0xDEADBEEF);

    // Every CPU window maps onto the same physical page
    assert_eq!(mem.read_be32(PHYSICAL_64K_BASE + 0x1000), 0xDEADBEEF);
    assert_eq!(mem.read_be32(PHYSICAL_16M_BASE + 0x1000), 0xDEADBEEF);
    assert_eq!(mem.read_be32(PHYSICAL_4K_BASE + 0x1000), 0xDEADBEEF);
    assert_eq!(mem.translate_physical(PHYSICAL_4K_BASE + 0x1000), 0x1000);
}

#[test]
fn test_small_backing_wraps() {
    let mem = MemoryManager::new(0x1_0000).unwrap();

    mem.write_be32(0x0000_0040, 0xCAFEBABE);
    assert_eq!(mem.read_be32(0x0001_0040), 0xCAFEBABE);
    assert_eq!(mem.size(), 0x1_0000);
}

#[test]
fn test_big_endian_operations() {
    let mem = MemoryManager::new(0x1000).unwrap();

    mem.write_be16(0x100, 0x1234);
    assert_eq!(mem.read_be16(0x100), 0x1234);

    mem.write_be32(0x104, 0x12345678);
    assert_eq!(mem.read_be32(0x104), 0x12345678);

    mem.write_be32_slice(0x200, &[1, 2, 3]).unwrap();
    assert_eq!(mem.read_be32_slice(0x200, 3).unwrap(), vec![1, 2, 3]);
}

#[test]
fn test_pod_access() {
    let mem = MemoryManager::new(0x1000).unwrap();

    mem.write::<[u32; 2]>(0x300, [0x0102_0304, 0x0506_0708]).unwrap();
    assert_eq!(mem.read::<[u32; 2]>(0x300).unwrap(), [0x0102_0304, 0x0506_0708]);
    assert_eq!(mem.load_u32(0x304), 0x0506_0708);

    mem.write::<u64>(0x300, 0).unwrap();
    assert_eq!(mem.read::<[u32; 2]>(0x300).unwrap(), [0, 0]);
}

#[test]
fn test_concurrent_writer_and_reader() {
    let mem = MemoryManager::new(0x1000).unwrap();
    let writer_mem = Arc::clone(&mem);

    let writer = thread::spawn(move || {
        for i in 0..256u32 {
            writer_mem.write_be32(i * 4, i);
        }
    });
    writer.join().unwrap();

    for i in 0..256u32 {
        assert_eq!(mem.read_be32(i * 4), i);
    }
}
