use ash::vk::{ImageLayout, Result as VkResult};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Recoverable failures surfaced to the caller. Precondition violations
/// (zero layer count at construction, copy ranges past the last layer, no
/// compatible memory type) are caller bugs and panic instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load the vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("no queue family supports the requested capabilities")]
    NoSuitableQueueFamily,

    #[error("image extent depth must be at least 1")]
    InvalidImageDepth,

    #[error("unsupported image layout transition: {old:?} -> {new:?}")]
    UnsupportedTransition { old: ImageLayout, new: ImageLayout },

    #[error("image view requires at least one array layer")]
    InvalidViewLayerCount,

    #[error("vulkan call failed: {0}")]
    Vk(#[from] VkResult),
}
