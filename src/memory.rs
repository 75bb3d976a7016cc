use ash::vk::{MemoryPropertyFlags, PhysicalDeviceMemoryProperties};

/// Index of the first device memory type whose bit is set in `type_bits` and
/// whose property flags cover `required`. `None` means the caller's memory
/// requirements cannot be satisfied on this device.
pub fn memory_type_index(
    type_bits: u32,
    properties: &PhysicalDeviceMemoryProperties,
    required: MemoryPropertyFlags,
) -> Option<u32> {
    for i in 0..properties.memory_type_count {
        if (type_bits & (1 << i)) != 0
            && (properties.memory_types[i as usize].property_flags & required) == required
        {
            return Some(i);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::MemoryType;

    fn properties(type_flags: &[MemoryPropertyFlags]) -> PhysicalDeviceMemoryProperties {
        let mut properties = PhysicalDeviceMemoryProperties {
            memory_type_count: type_flags.len() as u32,
            ..Default::default()
        };
        for (i, &property_flags) in type_flags.iter().enumerate() {
            properties.memory_types[i] = MemoryType {
                property_flags,
                heap_index: 0,
            };
        }
        properties
    }

    #[test]
    fn first_matching_type_wins() {
        let properties = properties(&[
            MemoryPropertyFlags::DEVICE_LOCAL,
            MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT,
            MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT,
        ]);

        assert_eq!(
            memory_type_index(0b111, &properties, MemoryPropertyFlags::HOST_VISIBLE),
            Some(1)
        );
    }

    #[test]
    fn type_zero_is_a_candidate() {
        let properties = properties(&[MemoryPropertyFlags::DEVICE_LOCAL]);

        assert_eq!(
            memory_type_index(0b1, &properties, MemoryPropertyFlags::DEVICE_LOCAL),
            Some(0)
        );
    }

    #[test]
    fn type_bits_exclude_types() {
        let properties = properties(&[
            MemoryPropertyFlags::DEVICE_LOCAL,
            MemoryPropertyFlags::DEVICE_LOCAL,
        ]);

        assert_eq!(
            memory_type_index(0b10, &properties, MemoryPropertyFlags::DEVICE_LOCAL),
            Some(1)
        );
    }

    #[test]
    fn required_flags_must_all_be_present() {
        let properties = properties(&[
            MemoryPropertyFlags::HOST_VISIBLE,
            MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT,
        ]);

        assert_eq!(
            memory_type_index(
                0b11,
                &properties,
                MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT
            ),
            Some(1)
        );
    }

    #[test]
    fn no_match_yields_none() {
        let properties = properties(&[MemoryPropertyFlags::DEVICE_LOCAL]);

        assert_eq!(
            memory_type_index(0b1, &properties, MemoryPropertyFlags::HOST_VISIBLE),
            None
        );
    }
}
