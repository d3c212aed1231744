//! Frame pacing across the in-flight frame slots.

use std::sync::Arc;

use loom_rhi::RhiResult;
use loom_rhi::command::CommandPool;
use loom_rhi::device::Device;
use loom_rhi::sync::FrameSync;
use loom_rhi::vk;

use crate::FRAMES_IN_FLIGHT;

/// Command buffer and synchronization objects for one in-flight frame.
pub struct FrameSlot {
    pub command_buffer: vk::CommandBuffer,
    pub sync: FrameSync,
}

/// Owns the frame slots and the cursor that cycles through them.
///
/// The cursor advances only after a successful submit, so a frame that
/// bails out early (out-of-date swapchain, zero-sized window) reuses the
/// same slot on the next attempt.
pub struct FrameExecutor {
    /// Owns the slots' command buffers; frees them when the executor drops
    _command_pool: CommandPool,
    slots: Vec<FrameSlot>,
    cursor: usize,
}

impl FrameExecutor {
    /// Creates [`FRAMES_IN_FLIGHT`] frame slots with their command buffers
    /// and sync objects.
    ///
    /// # Errors
    ///
    /// Returns an error if command pool creation, buffer allocation, or
    /// sync object creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let command_pool = CommandPool::new(device.clone())?;
        let command_buffers = command_pool.allocate_command_buffers(FRAMES_IN_FLIGHT as u32)?;

        let mut slots = Vec::with_capacity(FRAMES_IN_FLIGHT);
        for command_buffer in command_buffers {
            slots.push(FrameSlot {
                command_buffer,
                sync: FrameSync::new(device.clone())?,
            });
        }

        Ok(Self {
            _command_pool: command_pool,
            slots,
            cursor: 0,
        })
    }

    /// Returns the slot the cursor currently points at.
    #[inline]
    pub fn current(&self) -> &FrameSlot {
        &self.slots[self.cursor]
    }

    /// Moves the cursor to the next slot.
    #[inline]
    pub fn advance(&mut self) {
        self.cursor = advance_cursor(self.cursor, FRAMES_IN_FLIGHT);
    }
}

/// Advances a frame cursor modulo the slot count.
#[inline]
fn advance_cursor(cursor: usize, frames: usize) -> usize {
    (cursor + 1) % frames
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_wraps_around() {
        assert_eq!(advance_cursor(0, 2), 1);
        assert_eq!(advance_cursor(1, 2), 0);
    }

    #[test]
    fn test_cursor_cycles_over_many_frames() {
        let mut cursor = 0;
        for tick in 1..=100 {
            cursor = advance_cursor(cursor, FRAMES_IN_FLIGHT);
            assert_eq!(cursor, tick % FRAMES_IN_FLIGHT);
        }
    }
}
