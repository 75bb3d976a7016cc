use std::rc::Rc;

use ash::vk::{
    AccessFlags, BufferImageCopy, DeviceMemory, Extent3D, Format, Image, ImageAspectFlags,
    ImageCreateInfo, ImageLayout, ImageMemoryBarrier, ImageSubresourceLayers,
    ImageSubresourceRange, ImageTiling, ImageType, ImageUsageFlags, ImageView,
    ImageViewCreateInfo, ImageViewType, MemoryAllocateInfo, MemoryPropertyFlags, Offset3D,
    PipelineStageFlags, SampleCountFlags, SharingMode, QUEUE_FAMILY_IGNORED,
};
use ash::Device;

use crate::buffer_resource::BufferResource;
use crate::command_buffer::{begin_single_time_commands, end_single_time_commands};
use crate::device_context::DeviceContext;
use crate::error::{Error, Result};
use crate::memory::memory_type_index;
use crate::queue::CommandQueue;

// Byte stride per texel assumed by copy_all_from_buffer: layers in the
// staging buffer must be tightly packed at width * height * 4 bytes each.
const PACKED_TEXEL_SIZE: u64 = 4;

#[derive(Clone, Copy, Debug)]
pub struct DeviceImageDescriptor {
    pub extent: Extent3D,
    pub layer_count: u32,
    pub aspect_mask: ImageAspectFlags,
    pub format: Format,
    /// Recorded for the caller's benefit but not honored yet: images are
    /// always created with optimal tiling.
    pub tiling: ImageTiling,
    pub usage: ImageUsageFlags,
    pub sharing_mode: SharingMode,
    pub sample_count: SampleCountFlags,
    pub memory_properties: MemoryPropertyFlags,
}

impl DeviceImageDescriptor {
    /// Defaults for a sampled color texture that is filled by staged uploads.
    pub fn new(extent: Extent3D, format: Format) -> Self {
        Self {
            extent,
            layer_count: 1,
            aspect_mask: ImageAspectFlags::COLOR,
            format,
            tiling: ImageTiling::OPTIMAL,
            usage: ImageUsageFlags::TRANSFER_DST | ImageUsageFlags::SAMPLED,
            sharing_mode: SharingMode::EXCLUSIVE,
            sample_count: SampleCountFlags::TYPE_1,
            memory_properties: MemoryPropertyFlags::DEVICE_LOCAL,
        }
    }
}

/// An image plus the device memory backing it, with exactly one mip level.
///
/// The resource does not track its current layout; callers supply both ends
/// of every transition. Every GPU-side operation submits a single-use
/// recording and blocks until the device has finished it, so consecutive
/// operations never overlap. Move-only; dropping the final owner releases
/// the image and its memory together.
pub struct DeviceImage {
    device: Rc<DeviceContext>,
    image: Image,
    memory: DeviceMemory,
    extent: Extent3D,
    format: Format,
    subresource_range: ImageSubresourceRange,
}

impl DeviceImage {
    pub fn new(device: Rc<DeviceContext>, descriptor: &DeviceImageDescriptor) -> Result<Self> {
        assert!(
            descriptor.layer_count > 0,
            "DeviceImage requires at least one array layer"
        );

        let image_type = image_type_for_extent(&descriptor.extent)?;

        // Tiling is forced to optimal regardless of the descriptor.
        let create_info = ImageCreateInfo::default()
            .image_type(image_type)
            .extent(descriptor.extent)
            .mip_levels(1)
            .array_layers(descriptor.layer_count)
            .format(descriptor.format)
            .tiling(ImageTiling::OPTIMAL)
            .initial_layout(ImageLayout::UNDEFINED)
            .usage(descriptor.usage)
            .sharing_mode(descriptor.sharing_mode)
            .samples(descriptor.sample_count);

        unsafe {
            let image = device.handle().create_image(&create_info, None)?;
            let memory_requirements = device.handle().get_image_memory_requirements(image);
            let type_index = memory_type_index(
                memory_requirements.memory_type_bits,
                device.gpu().memory_properties(),
                descriptor.memory_properties,
            )
            .expect("no compatible memory type for image allocation");

            let allocation_info = MemoryAllocateInfo::default()
                .allocation_size(memory_requirements.size)
                .memory_type_index(type_index);
            let memory = device.handle().allocate_memory(&allocation_info, None)?;
            device.handle().bind_image_memory(image, memory, 0)?;

            log::debug!(
                "created {}x{}x{} image, {:?}, {} layer(s)",
                descriptor.extent.width,
                descriptor.extent.height,
                descriptor.extent.depth,
                descriptor.format,
                descriptor.layer_count
            );

            Ok(Self {
                device,
                image,
                memory,
                extent: descriptor.extent,
                format: descriptor.format,
                subresource_range: ImageSubresourceRange::default()
                    .aspect_mask(descriptor.aspect_mask)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(descriptor.layer_count),
            })
        }
    }

    /// Release the image and its memory. Idempotent; `Drop` calls this, so
    /// explicit use is only needed for deterministic early teardown.
    pub fn destroy(&mut self) {
        unsafe {
            if self.image != Image::null() {
                self.device.handle().destroy_image(self.image, None);
                self.image = Image::null();
                log::trace!("destroyed image");
            }
            if self.memory != DeviceMemory::null() {
                self.device.handle().free_memory(self.memory, None);
                self.memory = DeviceMemory::null();
            }
        }
    }

    /// Record and synchronously execute the barrier for one of the supported
    /// layout transitions, covering the image's full subresource range.
    pub fn transition_layout(
        &self,
        queue: Rc<CommandQueue>,
        old_layout: ImageLayout,
        new_layout: ImageLayout,
    ) -> Result<()> {
        let policy =
            transition_policy(old_layout, new_layout).ok_or(Error::UnsupportedTransition {
                old: old_layout,
                new: new_layout,
            })?;

        let barrier = ImageMemoryBarrier::default()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(self.subresource_range)
            .src_access_mask(policy.src_access)
            .dst_access_mask(policy.dst_access);

        let mut command_buffer = begin_single_time_commands(queue)?;
        command_buffer.pipeline_barrier(policy.execute_stage, policy.wait_stage, &barrier);
        end_single_time_commands(command_buffer)
    }

    /// Copy a contiguous run of `layer_count` layers starting at
    /// `starting_layer` out of one tightly packed buffer. The image must
    /// already be in TRANSFER_DST_OPTIMAL layout.
    pub fn copy_from_buffer(
        &self,
        queue: Rc<CommandQueue>,
        buffer: &BufferResource,
        starting_layer: u32,
        layer_count: u32,
    ) -> Result<()> {
        let region = layer_run_region(self.extent, self.aspect_mask(), starting_layer, layer_count);

        let mut command_buffer = begin_single_time_commands(queue)?;
        command_buffer.copy_buffer_to_image(
            buffer.buffer,
            self.image,
            ImageLayout::TRANSFER_DST_OPTIMAL,
            std::slice::from_ref(&region),
        );
        end_single_time_commands(command_buffer)
    }

    /// Copy every layer from `starting_layer` up out of one buffer holding
    /// the layers back to back, each width * height * 4 bytes. Batched into
    /// a single copy command with one region per layer.
    pub fn copy_all_from_buffer(
        &self,
        queue: Rc<CommandQueue>,
        buffer: &BufferResource,
        starting_layer: u32,
    ) -> Result<()> {
        assert!(
            starting_layer < self.layer_count(),
            "starting layer {} out of range for {} layer(s)",
            starting_layer,
            self.layer_count()
        );

        let regions = packed_layer_regions(
            self.extent.width,
            self.extent.height,
            self.layer_count(),
            starting_layer,
        );
        log::debug!("uploading {} layer(s) from staging buffer", regions.len());

        let mut command_buffer = begin_single_time_commands(queue)?;
        command_buffer.copy_buffer_to_image(
            buffer.buffer,
            self.image,
            ImageLayout::TRANSFER_DST_OPTIMAL,
            &regions,
        );
        end_single_time_commands(command_buffer)
    }

    /// One buffer per layer: buffer `j` fills layer `starting_layer + j`,
    /// each as its own copy command inside one recording.
    pub fn copy_from_buffers(
        &self,
        queue: Rc<CommandQueue>,
        buffers: &[BufferResource],
        starting_layer: u32,
    ) -> Result<()> {
        let mut command_buffer = begin_single_time_commands(queue)?;
        for (i, buffer) in buffers.iter().enumerate() {
            let region = layer_run_region(
                self.extent,
                self.aspect_mask(),
                starting_layer + i as u32,
                1,
            );
            command_buffer.copy_buffer_to_image(
                buffer.buffer,
                self.image,
                ImageLayout::TRANSFER_DST_OPTIMAL,
                std::slice::from_ref(&region),
            );
        }
        end_single_time_commands(command_buffer)
    }

    /// A view over the whole image; the caller owns the returned handle.
    pub fn create_img_view(&self) -> Result<ImageView> {
        create_image_view(
            self.device.handle(),
            self.image,
            self.subresource_range.aspect_mask,
            self.format,
            self.layer_count(),
        )
    }

    pub fn handle(&self) -> Image {
        self.image
    }

    pub fn extent(&self) -> Extent3D {
        self.extent
    }

    pub fn width(&self) -> u32 {
        self.extent.width
    }

    pub fn height(&self) -> u32 {
        self.extent.height
    }

    pub fn depth(&self) -> u32 {
        self.extent.depth
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn layer_count(&self) -> u32 {
        self.subresource_range.layer_count
    }

    pub fn aspect_mask(&self) -> ImageAspectFlags {
        self.subresource_range.aspect_mask
    }

    pub fn subresource_range(&self) -> ImageSubresourceRange {
        self.subresource_range
    }
}

impl Drop for DeviceImage {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// A 2-D view for single-layer images, a 2-D-array view otherwise. Base mip
/// 0, one mip level, all layers.
pub fn create_image_view(
    device: &Device,
    image: Image,
    aspect_mask: ImageAspectFlags,
    format: Format,
    layer_count: u32,
) -> Result<ImageView> {
    let view_type = view_type_for_layer_count(layer_count)?;

    let create_info = ImageViewCreateInfo::default()
        .image(image)
        .view_type(view_type)
        .format(format)
        .subresource_range(
            ImageSubresourceRange::default()
                .aspect_mask(aspect_mask)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(layer_count),
        );

    unsafe { Ok(device.create_image_view(&create_info, None)?) }
}

#[derive(Clone, Copy)]
struct TransitionPolicy {
    src_access: AccessFlags,
    dst_access: AccessFlags,
    execute_stage: PipelineStageFlags,
    wait_stage: PipelineStageFlags,
}

// The only transitions this resource knows how to synchronize; anything else
// is an error, not a derived mapping.
const SUPPORTED_TRANSITIONS: [((ImageLayout, ImageLayout), TransitionPolicy); 2] = [
    (
        (ImageLayout::UNDEFINED, ImageLayout::TRANSFER_DST_OPTIMAL),
        TransitionPolicy {
            src_access: AccessFlags::empty(),
            dst_access: AccessFlags::TRANSFER_WRITE,
            execute_stage: PipelineStageFlags::TOP_OF_PIPE,
            wait_stage: PipelineStageFlags::TRANSFER,
        },
    ),
    (
        (
            ImageLayout::TRANSFER_DST_OPTIMAL,
            ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ),
        TransitionPolicy {
            src_access: AccessFlags::TRANSFER_WRITE,
            dst_access: AccessFlags::SHADER_READ,
            execute_stage: PipelineStageFlags::TRANSFER,
            wait_stage: PipelineStageFlags::FRAGMENT_SHADER,
        },
    ),
];

fn transition_policy(old: ImageLayout, new: ImageLayout) -> Option<TransitionPolicy> {
    SUPPORTED_TRANSITIONS
        .iter()
        .find(|(pair, _)| *pair == (old, new))
        .map(|(_, policy)| *policy)
}

fn image_type_for_extent(extent: &Extent3D) -> Result<ImageType> {
    if extent.depth == 1 {
        Ok(ImageType::TYPE_2D)
    } else if extent.depth > 1 {
        Ok(ImageType::TYPE_3D)
    } else {
        Err(Error::InvalidImageDepth)
    }
}

fn view_type_for_layer_count(layer_count: u32) -> Result<ImageViewType> {
    if layer_count == 1 {
        Ok(ImageViewType::TYPE_2D)
    } else if layer_count > 1 {
        Ok(ImageViewType::TYPE_2D_ARRAY)
    } else {
        Err(Error::InvalidViewLayerCount)
    }
}

/// One region covering the layer run, tightly packed from offset 0, with the
/// image's full extent.
fn layer_run_region(
    extent: Extent3D,
    aspect_mask: ImageAspectFlags,
    starting_layer: u32,
    layer_count: u32,
) -> BufferImageCopy {
    BufferImageCopy::default()
        .buffer_offset(0)
        .buffer_row_length(0)
        .buffer_image_height(0)
        .image_subresource(
            ImageSubresourceLayers::default()
                .aspect_mask(aspect_mask)
                .mip_level(0)
                .base_array_layer(starting_layer)
                .layer_count(layer_count),
        )
        .image_offset(Offset3D::default())
        .image_extent(extent)
}

/// One region per remaining layer. Regions address the color aspect and a
/// depth-1 extent, with layer `starting_layer + i` sourced at byte offset
/// `i * width * height * 4`.
fn packed_layer_regions(
    width: u32,
    height: u32,
    total_layers: u32,
    starting_layer: u32,
) -> Vec<BufferImageCopy> {
    (0..total_layers - starting_layer)
        .map(|i| {
            BufferImageCopy::default()
                .buffer_offset(u64::from(i) * u64::from(width) * u64::from(height) * PACKED_TEXEL_SIZE)
                .image_subresource(
                    ImageSubresourceLayers::default()
                        .aspect_mask(ImageAspectFlags::COLOR)
                        .mip_level(0)
                        .base_array_layer(starting_layer + i)
                        .layer_count(1),
                )
                .image_extent(Extent3D {
                    width,
                    height,
                    depth: 1,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::Gpu;
    use crate::vulkan::Vulkan;
    use ash::vk::QueueFlags;

    #[test]
    fn transition_table_covers_the_upload_path() {
        let to_transfer =
            transition_policy(ImageLayout::UNDEFINED, ImageLayout::TRANSFER_DST_OPTIMAL)
                .expect("upload transition missing");
        assert_eq!(to_transfer.src_access, AccessFlags::empty());
        assert_eq!(to_transfer.dst_access, AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_transfer.execute_stage, PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(to_transfer.wait_stage, PipelineStageFlags::TRANSFER);

        let to_sampled = transition_policy(
            ImageLayout::TRANSFER_DST_OPTIMAL,
            ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .expect("sampling transition missing");
        assert_eq!(to_sampled.src_access, AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_sampled.dst_access, AccessFlags::SHADER_READ);
        assert_eq!(to_sampled.execute_stage, PipelineStageFlags::TRANSFER);
        assert_eq!(to_sampled.wait_stage, PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn unknown_transitions_have_no_policy() {
        assert!(transition_policy(
            ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ImageLayout::TRANSFER_DST_OPTIMAL
        )
        .is_none());
        assert!(transition_policy(
            ImageLayout::UNDEFINED,
            ImageLayout::SHADER_READ_ONLY_OPTIMAL
        )
        .is_none());
        assert!(
            transition_policy(ImageLayout::UNDEFINED, ImageLayout::UNDEFINED).is_none()
        );
    }

    #[test]
    fn image_type_follows_depth() {
        let flat = Extent3D {
            width: 8,
            height: 8,
            depth: 1,
        };
        assert_eq!(image_type_for_extent(&flat).unwrap(), ImageType::TYPE_2D);

        let volume = Extent3D {
            width: 8,
            height: 8,
            depth: 4,
        };
        assert_eq!(image_type_for_extent(&volume).unwrap(), ImageType::TYPE_3D);

        let empty = Extent3D {
            width: 8,
            height: 8,
            depth: 0,
        };
        assert!(matches!(
            image_type_for_extent(&empty),
            Err(Error::InvalidImageDepth)
        ));
    }

    #[test]
    fn view_type_follows_layer_count() {
        assert_eq!(view_type_for_layer_count(1).unwrap(), ImageViewType::TYPE_2D);
        assert_eq!(
            view_type_for_layer_count(6).unwrap(),
            ImageViewType::TYPE_2D_ARRAY
        );
        assert!(matches!(
            view_type_for_layer_count(0),
            Err(Error::InvalidViewLayerCount)
        ));
    }

    #[test]
    fn layer_run_region_covers_the_run() {
        let extent = Extent3D {
            width: 32,
            height: 16,
            depth: 1,
        };
        let region = layer_run_region(extent, ImageAspectFlags::DEPTH, 2, 3);

        assert_eq!(region.buffer_offset, 0);
        assert_eq!(region.buffer_row_length, 0);
        assert_eq!(region.buffer_image_height, 0);
        assert_eq!(region.image_subresource.aspect_mask, ImageAspectFlags::DEPTH);
        assert_eq!(region.image_subresource.mip_level, 0);
        assert_eq!(region.image_subresource.base_array_layer, 2);
        assert_eq!(region.image_subresource.layer_count, 3);
        assert_eq!(region.image_extent.width, 32);
        assert_eq!(region.image_extent.height, 16);
        assert_eq!(region.image_extent.depth, 1);
    }

    #[test]
    fn packed_regions_cover_every_layer_from_zero() {
        let regions = packed_layer_regions(64, 32, 4, 0);

        assert_eq!(regions.len(), 4);
        for (i, region) in regions.iter().enumerate() {
            assert_eq!(region.buffer_offset, i as u64 * 64 * 32 * 4);
            assert_eq!(region.image_subresource.aspect_mask, ImageAspectFlags::COLOR);
            assert_eq!(region.image_subresource.base_array_layer, i as u32);
            assert_eq!(region.image_subresource.layer_count, 1);
            assert_eq!(region.image_extent.depth, 1);
        }
    }

    #[test]
    fn packed_regions_start_mid_image() {
        let regions = packed_layer_regions(16, 16, 5, 2);

        assert_eq!(regions.len(), 3);
        for (i, region) in regions.iter().enumerate() {
            assert_eq!(region.buffer_offset, i as u64 * 16 * 16 * 4);
            assert_eq!(region.image_subresource.base_array_layer, 2 + i as u32);
        }
    }

    // The tests below need a live device; they skip when the machine has no
    // vulkan implementation.
    fn test_context() -> Option<(Rc<DeviceContext>, Rc<CommandQueue>)> {
        let vulkan = Vulkan::new("vk_image tests", &[], &[]).ok()?;
        let gpu: Gpu = vulkan
            .physical_devices()
            .into_iter()
            .find(|gpu| gpu.supports_graphics())?;
        let device = Rc::new(gpu.device_context(&[]).ok()?);
        let queue = Rc::new(CommandQueue::new(device.clone(), QueueFlags::GRAPHICS).ok()?);
        Some((device, queue))
    }

    fn color_target(layer_count: u32) -> DeviceImageDescriptor {
        let mut descriptor = DeviceImageDescriptor::new(
            Extent3D {
                width: 4,
                height: 4,
                depth: 1,
            },
            Format::R8G8B8A8_UNORM,
        );
        descriptor.layer_count = layer_count;
        descriptor
    }

    #[test]
    fn construct_and_destroy_is_idempotent() {
        let Some((device, _queue)) = test_context() else {
            println!("skipping: no vulkan device available");
            return;
        };

        let mut image = DeviceImage::new(device, &color_target(3)).unwrap();
        assert_ne!(image.handle(), Image::null());
        assert_eq!(image.layer_count(), 3);

        image.destroy();
        assert_eq!(image.handle(), Image::null());
        image.destroy();
        assert_eq!(image.handle(), Image::null());
    }

    #[test]
    fn zero_depth_is_rejected() {
        let Some((device, _queue)) = test_context() else {
            println!("skipping: no vulkan device available");
            return;
        };

        let mut descriptor = color_target(1);
        descriptor.extent.depth = 0;

        assert!(matches!(
            DeviceImage::new(device, &descriptor),
            Err(Error::InvalidImageDepth)
        ));
    }

    #[test]
    fn zero_layer_count_is_fatal() {
        let Some((device, _queue)) = test_context() else {
            println!("skipping: no vulkan device available");
            return;
        };

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = DeviceImage::new(device.clone(), &color_target(0));
        }));
        assert!(result.is_err());
    }

    #[test]
    fn move_transfers_ownership() {
        let Some((device, _queue)) = test_context() else {
            println!("skipping: no vulkan device available");
            return;
        };

        let image = DeviceImage::new(device, &color_target(1)).unwrap();
        let handle = image.handle();

        let moved = image;
        assert_eq!(moved.handle(), handle);
    }

    #[test]
    fn upload_round_trip() {
        let Some((device, queue)) = test_context() else {
            println!("skipping: no vulkan device available");
            return;
        };

        let image = DeviceImage::new(device.clone(), &color_target(2)).unwrap();
        image
            .transition_layout(
                queue.clone(),
                ImageLayout::UNDEFINED,
                ImageLayout::TRANSFER_DST_OPTIMAL,
            )
            .unwrap();

        let mut staging = BufferResource::new_staging(device.clone(), 4 * 4 * 4 * 2).unwrap();
        staging.upload(&[0xffu8; 4 * 4 * 4 * 2]).unwrap();
        image.copy_all_from_buffer(queue.clone(), &staging, 0).unwrap();

        image
            .transition_layout(
                queue.clone(),
                ImageLayout::TRANSFER_DST_OPTIMAL,
                ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )
            .unwrap();

        let view = image.create_img_view().unwrap();
        unsafe { device.handle().destroy_image_view(view, None) };
        device.wait();
    }

    #[test]
    fn per_layer_buffers_upload() {
        let Some((device, queue)) = test_context() else {
            println!("skipping: no vulkan device available");
            return;
        };

        let image = DeviceImage::new(device.clone(), &color_target(2)).unwrap();
        image
            .transition_layout(
                queue.clone(),
                ImageLayout::UNDEFINED,
                ImageLayout::TRANSFER_DST_OPTIMAL,
            )
            .unwrap();

        let mut buffers = Vec::new();
        for _ in 0..2 {
            let mut staging = BufferResource::new_staging(device.clone(), 4 * 4 * 4).unwrap();
            staging.upload(&[0x7fu8; 4 * 4 * 4]).unwrap();
            buffers.push(staging);
        }
        image.copy_from_buffers(queue.clone(), &buffers, 0).unwrap();
        image
            .copy_from_buffer(queue.clone(), &buffers[0], 1, 1)
            .unwrap();
    }

    #[test]
    fn unsupported_transition_is_rejected() {
        let Some((device, queue)) = test_context() else {
            println!("skipping: no vulkan device available");
            return;
        };

        let image = DeviceImage::new(device, &color_target(1)).unwrap();
        let result = image.transition_layout(
            queue,
            ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        assert!(matches!(
            result,
            Err(Error::UnsupportedTransition { .. })
        ));
    }

    #[test]
    fn single_time_commands_submit_and_wait() {
        let Some((_device, queue)) = test_context() else {
            println!("skipping: no vulkan device available");
            return;
        };

        let command_buffer = begin_single_time_commands(queue).unwrap();
        let wait_handle = command_buffer.submit().unwrap();
        wait_handle.wait();
        assert!(wait_handle.has_completed());
    }
}
