use ash::vk::{Format, FormatFeatureFlags, FormatProperties, ImageTiling};

use crate::gpu::Gpu;

/// First candidate format the device supports with `required_features` under
/// the requested tiling, in candidate order. `None` when no candidate
/// qualifies.
pub fn find_supported_format(
    gpu: &Gpu,
    candidates: &[Format],
    tiling: ImageTiling,
    required_features: FormatFeatureFlags,
) -> Option<Format> {
    first_supported(candidates, tiling, required_features, |format| {
        gpu.format_properties(format)
    })
}

fn first_supported<F>(
    candidates: &[Format],
    tiling: ImageTiling,
    required_features: FormatFeatureFlags,
    mut query: F,
) -> Option<Format>
where
    F: FnMut(Format) -> FormatProperties,
{
    candidates.iter().copied().find(|&format| {
        let properties = query(format);
        let supported = if tiling == ImageTiling::LINEAR {
            properties.linear_tiling_features
        } else if tiling == ImageTiling::OPTIMAL {
            properties.optimal_tiling_features
        } else {
            FormatFeatureFlags::empty()
        };

        (supported & required_features) == required_features
    })
}
