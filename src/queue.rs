use std::rc::Rc;

use ash::vk::{CommandPool, CommandPoolCreateFlags, CommandPoolCreateInfo, Queue, QueueFlags};

use crate::device_context::DeviceContext;
use crate::error::{Error, Result};

/// A device queue paired with a transient command pool, feeding the
/// single-time-commands path.
#[derive(Clone)]
pub struct CommandQueue {
    device: Rc<DeviceContext>,
    handle: Queue,
    queue_family_index: u32,
    command_pool: CommandPool,
}

impl CommandQueue {
    pub fn new(device: Rc<DeviceContext>, flags: QueueFlags) -> Result<Self> {
        let queue_family_index = device
            .queue_family_index(flags)
            .ok_or(Error::NoSuitableQueueFamily)?;

        let pool_info = CommandPoolCreateInfo::default()
            .flags(CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(queue_family_index);
        let command_pool = unsafe { device.handle().create_command_pool(&pool_info, None)? };

        Ok(Self {
            handle: device.queue(queue_family_index),
            device,
            queue_family_index,
            command_pool,
        })
    }

    pub fn family_type_index(&self) -> u32 {
        self.queue_family_index
    }

    pub fn handle(&self) -> Queue {
        self.handle
    }

    pub(crate) fn pool(&self) -> CommandPool {
        self.command_pool
    }

    pub(crate) fn device(&self) -> Rc<DeviceContext> {
        self.device.clone()
    }
}
