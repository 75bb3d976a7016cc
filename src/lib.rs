pub mod buffer_resource;
pub mod command_buffer;
pub mod device_context;
pub mod device_image;
pub mod error;
pub mod format;
pub mod gpu;
pub mod memory;
pub mod queue;
pub mod vulkan;
pub mod wait_handle;

pub use ash::vk::{
    BufferUsageFlags, Extent3D, Format, FormatFeatureFlags, ImageAspectFlags, ImageLayout,
    ImageTiling, ImageUsageFlags, MemoryPropertyFlags, QueueFlags, SampleCountFlags, SharingMode,
};
