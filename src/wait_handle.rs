use ash::vk::Fence;

use crate::command_buffer::CommandBuffer;

/// Fence-backed completion handle for a submitted recording. Dropping it
/// blocks until the device is done, then releases the command buffer and
/// the fence.
pub struct WaitHandle {
    command_buffer: CommandBuffer,
    fence: Fence,
}

impl WaitHandle {
    pub(crate) fn new(command_buffer: CommandBuffer, fence: Fence) -> Self {
        Self {
            command_buffer,
            fence,
        }
    }

    pub fn has_completed(&self) -> bool {
        unsafe {
            self.command_buffer
                .device()
                .handle()
                .wait_for_fences(&[self.fence], true, 0)
                .is_ok()
        }
    }

    pub fn wait(&self) {
        unsafe {
            self.command_buffer
                .device()
                .handle()
                .wait_for_fences(&[self.fence], true, u64::MAX)
                .expect("Wait failed");
        }
    }
}

impl Drop for WaitHandle {
    fn drop(&mut self) {
        self.wait();
        unsafe {
            let device = self.command_buffer.device();
            device.handle().destroy_fence(self.fence, None);
            device.handle().free_command_buffers(
                self.command_buffer.queue().pool(),
                &[self.command_buffer.handle()],
            );
        }
    }
}
