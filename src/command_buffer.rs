use std::rc::Rc;

use ash::vk::{
    Buffer, BufferImageCopy, CommandBufferAllocateInfo, CommandBufferBeginInfo,
    CommandBufferUsageFlags, DependencyFlags, FenceCreateInfo, Image, ImageLayout,
    ImageMemoryBarrier, PipelineStageFlags, SubmitInfo,
};

use crate::device_context::DeviceContext;
use crate::error::Result;
use crate::queue::CommandQueue;
use crate::wait_handle::WaitHandle;

/// A one-time-submit command recording. Allocated from the queue's transient
/// pool; freed by the `WaitHandle` returned from `submit`.
pub struct CommandBuffer {
    device: Rc<DeviceContext>,
    queue: Rc<CommandQueue>,
    handle: ash::vk::CommandBuffer,
}

impl CommandBuffer {
    pub fn new(device: Rc<DeviceContext>, queue: Rc<CommandQueue>) -> Result<Self> {
        let info = CommandBufferAllocateInfo::default()
            .command_buffer_count(1)
            .command_pool(queue.pool());
        let buffers = unsafe { device.handle().allocate_command_buffers(&info)? };

        Ok(Self {
            device,
            queue,
            handle: buffers[0],
        })
    }

    pub fn begin(&mut self) -> Result<()> {
        let begin_info =
            CommandBufferBeginInfo::default().flags(CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .handle()
                .begin_command_buffer(self.handle, &begin_info)?;
        }
        Ok(())
    }

    pub fn pipeline_barrier(
        &mut self,
        execute_stage: PipelineStageFlags,
        wait_stage: PipelineStageFlags,
        barrier: &ImageMemoryBarrier,
    ) {
        unsafe {
            self.device.handle().cmd_pipeline_barrier(
                self.handle,
                execute_stage,
                wait_stage,
                DependencyFlags::empty(),
                &[],
                &[],
                std::slice::from_ref(barrier),
            );
        }
    }

    pub fn copy_buffer_to_image(
        &mut self,
        buffer: Buffer,
        image: Image,
        layout: ImageLayout,
        regions: &[BufferImageCopy],
    ) {
        unsafe {
            self.device
                .handle()
                .cmd_copy_buffer_to_image(self.handle, buffer, image, layout, regions);
        }
    }

    pub fn submit(self) -> Result<WaitHandle> {
        unsafe {
            self.device.handle().end_command_buffer(self.handle)?;

            let fence = self
                .device
                .handle()
                .create_fence(&FenceCreateInfo::default(), None)?;

            let handles = [self.handle];
            let submits = [SubmitInfo::default().command_buffers(&handles)];
            if let Err(error) =
                self.device
                    .handle()
                    .queue_submit(self.queue.handle(), &submits, fence)
            {
                self.device.handle().destroy_fence(fence, None);
                return Err(error.into());
            }

            Ok(WaitHandle::new(self, fence))
        }
    }

    pub(crate) fn handle(&self) -> ash::vk::CommandBuffer {
        self.handle
    }

    pub(crate) fn device(&self) -> Rc<DeviceContext> {
        self.device.clone()
    }

    pub(crate) fn queue(&self) -> Rc<CommandQueue> {
        self.queue.clone()
    }
}

/// Acquire a recording that is guaranteed to be submitted and waited on by
/// the matching `end_single_time_commands` call.
pub fn begin_single_time_commands(queue: Rc<CommandQueue>) -> Result<CommandBuffer> {
    let mut command_buffer = CommandBuffer::new(queue.device(), queue)?;
    command_buffer.begin()?;
    Ok(command_buffer)
}

/// Submit the recording and block until the device has finished executing it.
pub fn end_single_time_commands(command_buffer: CommandBuffer) -> Result<()> {
    command_buffer.submit()?.wait();
    Ok(())
}
