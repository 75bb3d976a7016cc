use std::borrow::Cow;
use std::ffi::{CStr, CString};

use ash::ext::debug_utils;
use ash::vk::{
    make_api_version, ApplicationInfo, Bool32, DebugUtilsMessageSeverityFlagsEXT,
    DebugUtilsMessageTypeFlagsEXT, DebugUtilsMessengerCallbackDataEXT,
    DebugUtilsMessengerCreateInfoEXT, DebugUtilsMessengerEXT, InstanceCreateInfo, FALSE,
};
pub use ash::{Entry, Instance};

use crate::error::Result;
use crate::gpu::Gpu;

unsafe extern "system" fn vulkan_debug_callback(
    message_severity: DebugUtilsMessageSeverityFlagsEXT,
    message_type: DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> Bool32 {
    let callback_data = *p_callback_data;

    let message = if callback_data.p_message.is_null() {
        Cow::from("")
    } else {
        CStr::from_ptr(callback_data.p_message).to_string_lossy()
    };

    if message_severity.contains(DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::error!("{:?}: {}", message_type, message);
    } else if message_severity.contains(DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::warn!("{:?}: {}", message_type, message);
    } else {
        log::debug!("{:?}: {}", message_type, message);
    }

    FALSE
}

#[derive(Clone)]
pub struct Vulkan {
    _debug_callback: Option<DebugUtilsMessengerEXT>,
    library: Entry,
    instance: Instance,
}

impl Vulkan {
    pub fn new(name: &str, layers: &[CString], extensions: &[&'static CStr]) -> Result<Self> {
        let c_name = CString::new(name).expect("application name contains a nul byte");
        let appinfo = ApplicationInfo::default()
            .application_name(&c_name)
            .application_version(0)
            .engine_name(&c_name)
            .engine_version(0)
            .api_version(make_api_version(0, 1, 2, 0));

        let layer_names_raw: Vec<*const std::ffi::c_char> =
            layers.iter().map(|layer_name| layer_name.as_ptr()).collect();

        let extension_names_raw: Vec<*const std::ffi::c_char> =
            extensions.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = InstanceCreateInfo::default()
            .application_info(&appinfo)
            .enabled_layer_names(&layer_names_raw)
            .enabled_extension_names(&extension_names_raw);

        unsafe {
            let library = Entry::load()?;
            let instance: Instance = library.create_instance(&create_info, None)?;
            log::debug!("created vulkan instance for {}", name);

            // The messenger only loads when the caller actually enabled the
            // debug-utils extension.
            let debug_callback = if extensions.iter().any(|ext| *ext == debug_utils::NAME) {
                let debug_info = DebugUtilsMessengerCreateInfoEXT::default()
                    .message_severity(
                        DebugUtilsMessageSeverityFlagsEXT::ERROR
                            | DebugUtilsMessageSeverityFlagsEXT::WARNING
                            | DebugUtilsMessageSeverityFlagsEXT::INFO,
                    )
                    .message_type(DebugUtilsMessageTypeFlagsEXT::VALIDATION)
                    .pfn_user_callback(Some(vulkan_debug_callback));

                let debug_utils_loader = debug_utils::Instance::new(&library, &instance);
                match debug_utils_loader.create_debug_utils_messenger(&debug_info, None) {
                    Ok(messenger) => Some(messenger),
                    Err(error) => {
                        log::warn!("debug messenger creation failed: {}", error);
                        None
                    }
                }
            } else {
                None
            };

            Ok(Self {
                _debug_callback: debug_callback,
                library,
                instance,
            })
        }
    }

    pub fn library(&self) -> &Entry {
        &self.library
    }

    pub fn vk_instance(&self) -> &Instance {
        &self.instance
    }

    pub fn physical_devices(&self) -> Vec<Gpu> {
        unsafe {
            self.instance
                .enumerate_physical_devices()
                .expect("Physical device enumeration failed")
                .iter()
                .map(|physical_device| Gpu::new(self, physical_device))
                .collect()
        }
    }
}
