use std::ffi::CStr;

use ash::vk::{
    Format, FormatProperties, PhysicalDevice, PhysicalDeviceMemoryProperties,
    PhysicalDeviceProperties, QueueFamilyProperties, QueueFlags,
};

use crate::device_context::DeviceContext;
use crate::error::Result;
use crate::vulkan::Vulkan;

#[derive(Clone)]
pub struct Gpu {
    vulkan: Vulkan,
    physical_device: PhysicalDevice,
    properties: PhysicalDeviceProperties,
    memory_properties: PhysicalDeviceMemoryProperties,
    queue_family_properties: Vec<QueueFamilyProperties>,
}

impl Gpu {
    pub(crate) fn new(vulkan: &Vulkan, physical_device: &PhysicalDevice) -> Self {
        unsafe {
            let properties = vulkan
                .vk_instance()
                .get_physical_device_properties(*physical_device);

            let memory_properties = vulkan
                .vk_instance()
                .get_physical_device_memory_properties(*physical_device);

            Self {
                vulkan: vulkan.clone(),
                properties,
                memory_properties,
                physical_device: *physical_device,
                queue_family_properties: vulkan
                    .vk_instance()
                    .get_physical_device_queue_family_properties(*physical_device),
            }
        }
    }

    pub fn device_context(&self, extensions: &[&'static CStr]) -> Result<DeviceContext> {
        DeviceContext::new(self, extensions)
    }

    pub(crate) fn family_type_index(&self, flags: QueueFlags) -> Option<u32> {
        for (index, queue_info) in self.queue_family_properties.iter().enumerate() {
            if queue_info.queue_flags.contains(flags) {
                return Some(index as u32);
            }
        }

        None
    }

    pub fn vk_physical_device(&self) -> &PhysicalDevice {
        &self.physical_device
    }

    pub fn name(&self) -> String {
        let c_str = unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) };
        String::from(c_str.to_str().expect("String conversion failed"))
    }

    pub fn supports_graphics(&self) -> bool {
        self.queue_family_properties
            .iter()
            .any(|queue_info| queue_info.queue_flags.contains(QueueFlags::GRAPHICS))
    }

    pub fn supports_transfer(&self) -> bool {
        self.queue_family_properties
            .iter()
            .any(|queue_info| queue_info.queue_flags.contains(QueueFlags::TRANSFER))
    }

    pub fn vulkan(&self) -> &Vulkan {
        &self.vulkan
    }

    pub fn memory_properties(&self) -> &PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    pub fn format_properties(&self, format: Format) -> FormatProperties {
        unsafe {
            self.vulkan
                .vk_instance()
                .get_physical_device_format_properties(self.physical_device, format)
        }
    }
}
