use std::ffi::CStr;

use ash::vk::{DeviceCreateInfo, DeviceQueueCreateInfo, Queue, QueueFlags};
use ash::Device;

use crate::error::{Error, Result};
use crate::gpu::Gpu;

pub struct DeviceContext {
    gpu: Gpu,
    handle: Device,
}

unsafe impl Send for DeviceContext {}

impl DeviceContext {
    pub(crate) fn new(gpu: &Gpu, extensions: &[&'static CStr]) -> Result<Self> {
        let index = gpu
            .family_type_index(QueueFlags::GRAPHICS)
            .ok_or(Error::NoSuitableQueueFamily)?;

        let priorities: [f32; 1] = [1.];
        let queue_info = [DeviceQueueCreateInfo::default()
            .queue_priorities(&priorities)
            .queue_family_index(index)];

        #[allow(unused_mut)]
        let mut extension_names_raw: Vec<*const std::ffi::c_char> =
            extensions.iter().map(|name| name.as_ptr()).collect();

        #[cfg(any(target_os = "macos", target_os = "ios"))]
        {
            extension_names_raw.push(ash::khr::portability_subset::NAME.as_ptr());
        }

        let create_info = DeviceCreateInfo::default()
            .enabled_extension_names(&extension_names_raw)
            .queue_create_infos(&queue_info);

        unsafe {
            let handle = gpu.vulkan().vk_instance().create_device(
                *gpu.vk_physical_device(),
                &create_info,
                None,
            )?;
            log::debug!("created logical device on {}", gpu.name());

            Ok(Self {
                gpu: gpu.clone(),
                handle,
            })
        }
    }

    pub fn queue_family_index(&self, flags: QueueFlags) -> Option<u32> {
        self.gpu.family_type_index(flags)
    }

    pub fn queue(&self, queue_family_index: u32) -> Queue {
        unsafe { self.handle.get_device_queue(queue_family_index, 0) }
    }

    pub fn wait(&self) {
        unsafe {
            self.handle.device_wait_idle().expect("Wait failed");
        }
    }

    pub fn handle(&self) -> &Device {
        &self.handle
    }

    pub fn gpu(&self) -> &Gpu {
        &self.gpu
    }
}
