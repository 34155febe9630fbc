//! WAIT_REG_MEM and COND_WRITE

use std::thread;
use std::time::Duration;

use xe_core::error::GpuError;
use xe_core::gpu_trace;

use super::type3::require;
use super::{CommandProcessor, Step};
use crate::packet::WaitInfo;
use crate::ring::RingCursor;

/// Wait values at or above this sleep instead of yielding
const WAIT_SLEEP_THRESHOLD: u32 = 0x100;

impl CommandProcessor {
    /// Fetch the operand a wait or conditional write compares
    fn poll_value(&mut self, info: WaitInfo, poll_addr: u32) -> Result<u32, GpuError> {
        if info.contains(WaitInfo::POLL_MEMORY) {
            Ok(self.read_memory_word(poll_addr))
        } else {
            self.read_register(poll_addr)
        }
    }

    pub(super) fn execute_wait_reg_mem(
        &mut self,
        cursor: &mut RingCursor,
        count: u32,
    ) -> Result<Step, GpuError> {
        require(count, 5, "PM4_WAIT_REG_MEM")?;

        let info = WaitInfo::from_bits_retain(cursor.read_u32());
        let poll_addr = cursor.read_u32();
        let reference = cursor.read_u32();
        let mask = cursor.read_u32();
        let wait = cursor.read_u32();
        let function = info.function();

        loop {
            let value = self.poll_value(info, poll_addr)?;
            if function.matches(value & mask, reference) {
                return Ok(Step::Continue);
            }

            if self.shutdown.is_requested() {
                gpu_trace!("WAIT_REG_MEM on 0x{:08X} cancelled", poll_addr);
                return Ok(Step::Cancelled);
            }

            if wait >= WAIT_SLEEP_THRESHOLD {
                self.hooks.prepare_for_wait();
                if self.config.vsync {
                    // Guest-chosen duration; shutdown cuts it short
                    let millis = (wait / WAIT_SLEEP_THRESHOLD) as u64;
                    self.shutdown.sleep(Duration::from_millis(millis));
                } else {
                    thread::yield_now();
                }
                self.hooks.return_from_wait();
            } else {
                thread::yield_now();
            }
        }
    }

    pub(super) fn execute_cond_write(
        &mut self,
        cursor: &mut RingCursor,
        count: u32,
    ) -> Result<Step, GpuError> {
        require(count, 6, "PM4_COND_WRITE")?;

        let info = WaitInfo::from_bits_retain(cursor.read_u32());
        let poll_addr = cursor.read_u32();
        let reference = cursor.read_u32();
        let mask = cursor.read_u32();
        let write_addr = cursor.read_u32();
        let write_data = cursor.read_u32();

        let value = self.poll_value(info, poll_addr)?;
        if !info.function().matches(value & mask, reference) {
            return Ok(Step::Continue);
        }

        if info.contains(WaitInfo::WRITE_MEMORY) {
            self.write_memory_word(write_addr, write_data);
        } else {
            self.write_register(write_addr, write_data);
        }
        Ok(Step::Continue)
    }
}
