use std::rc::Rc;

use ash::vk::{
    Buffer, BufferCreateInfo, BufferUsageFlags, DeviceMemory, MappedMemoryRange,
    MemoryAllocateInfo, MemoryMapFlags, MemoryPropertyFlags, SharingMode, WHOLE_SIZE,
};

use crate::device_context::DeviceContext;
use crate::error::Result;
use crate::memory::memory_type_index;

/// Linear device buffer, primarily the host-visible staging source for image
/// uploads.
pub struct BufferResource {
    device: Rc<DeviceContext>,
    pub buffer: Buffer,
    memory: DeviceMemory,
    size: u64,
    content_size: u64,
}

impl BufferResource {
    pub fn new(
        device: Rc<DeviceContext>,
        size: u64,
        property_flags: MemoryPropertyFlags,
        usage: BufferUsageFlags,
    ) -> Result<Self> {
        unsafe {
            let buffer_info = BufferCreateInfo::default()
                .size(size)
                .sharing_mode(SharingMode::EXCLUSIVE)
                .usage(usage);

            let buffer = device.handle().create_buffer(&buffer_info, None)?;
            let memory_requirements = device.handle().get_buffer_memory_requirements(buffer);
            let type_index = memory_type_index(
                memory_requirements.memory_type_bits,
                device.gpu().memory_properties(),
                property_flags,
            )
            .expect("no compatible memory type for buffer allocation");

            let allocation_info = MemoryAllocateInfo::default()
                .memory_type_index(type_index)
                .allocation_size(memory_requirements.size);
            let memory = device.handle().allocate_memory(&allocation_info, None)?;
            device.handle().bind_buffer_memory(buffer, memory, 0)?;

            Ok(Self {
                device,
                buffer,
                memory,
                size: memory_requirements.size,
                content_size: size,
            })
        }
    }

    pub fn new_staging(device: Rc<DeviceContext>, size: u64) -> Result<Self> {
        Self::new(
            device,
            size,
            MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT,
            BufferUsageFlags::TRANSFER_SRC,
        )
    }

    pub fn upload<T>(&mut self, data: &[T]) -> Result<()> {
        unsafe {
            let ptr = self.device.handle().map_memory(
                self.memory,
                0,
                self.size,
                MemoryMapFlags::default(),
            )?;

            let count = self.content_size as usize / std::mem::size_of::<T>();
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr as _, count);

            let ranges = [MappedMemoryRange::default()
                .memory(self.memory)
                .size(WHOLE_SIZE)];
            self.device.handle().flush_mapped_memory_ranges(&ranges)?;
            self.device.handle().unmap_memory(self.memory);
        }

        Ok(())
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn content_size(&self) -> u64 {
        self.content_size
    }
}

impl Drop for BufferResource {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().free_memory(self.memory, None);
            self.device.handle().destroy_buffer(self.buffer, None);
        }
    }
}
