//! Pure arithmetic for the capability negotiator: extent clamping, image-count selection,
//! scaling-mode priority, and the wait-chunking rule used by the acquire protocol. Kept free of
//! any `ash` device call so the selection logic is testable on its own.

use ash::vk;

pub(crate) fn clamp_extent(desired: vk::Extent2D, min: vk::Extent2D, max: vk::Extent2D) -> vk::Extent2D {
    vk::Extent2D {
        width: desired.width.clamp(min.width, max.width),
        height: desired.height.clamp(min.height, max.height),
    }
}

fn extent_within(extent: vk::Extent2D, min: vk::Extent2D, max: vk::Extent2D) -> bool {
    extent.width >= min.width
        && extent.width <= max.width
        && extent.height >= min.height
        && extent.height <= max.height
}

/// `caps.maxImageCount == 0` means "no upper bound" per the Vulkan spec.
pub(crate) fn choose_image_count(desired_min: u32, caps_min: u32, caps_max: u32) -> u32 {
    let lower = desired_min.max(caps_min);
    if caps_max == 0 {
        lower
    } else {
        lower.min(caps_max)
    }
}

/// Priority order: `ONE_TO_ONE`, `ASPECT_RATIO_STRETCH`, `STRETCH`, else the lowest-numbered
/// bit still set. Returns `None` when scaling is unsupported or the desired extent falls
/// outside the scaled-extent range the surface advertises.
pub(crate) fn choose_scaling_mode(
    supported: vk::PresentScalingFlagsEXT,
    desired_extent: vk::Extent2D,
    min_scaled_extent: vk::Extent2D,
    max_scaled_extent: vk::Extent2D,
) -> Option<vk::PresentScalingFlagsEXT> {
    if supported.is_empty() {
        return None;
    }
    if !extent_within(desired_extent, min_scaled_extent, max_scaled_extent) {
        return None;
    }

    const PRIORITY: [vk::PresentScalingFlagsEXT; 3] = [
        vk::PresentScalingFlagsEXT::ONE_TO_ONE,
        vk::PresentScalingFlagsEXT::ASPECT_RATIO_STRETCH,
        vk::PresentScalingFlagsEXT::STRETCH,
    ];

    for mode in PRIORITY {
        if supported.contains(mode) {
            return Some(mode);
        }
    }

    let bits = supported.as_raw();
    let lowest_bit = bits & bits.wrapping_neg();
    Some(vk::PresentScalingFlagsEXT::from_raw(lowest_bit))
}

/// Groups of at most 2 waits per submission, or 1 when more than 3 swapchains are in the
/// batch — too many binary waits in one submission has been observed to deadlock on some
/// drivers. Returns the chunk sizes, summing to `wait_count`.
pub(crate) fn chunk_wait_groups(wait_count: usize) -> Vec<usize> {
    if wait_count == 0 {
        return Vec::new();
    }
    let max_per_chunk = if wait_count > 3 { 1 } else { 2 };
    let mut chunks = Vec::with_capacity(wait_count.div_ceil(max_per_chunk));
    let mut remaining = wait_count;
    while remaining > 0 {
        let n = remaining.min(max_per_chunk);
        chunks.push(n);
        remaining -= n;
    }
    chunks
}
