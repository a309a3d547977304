//! The swapchain wrapper and its capability negotiator: native handle, per-image resources,
//! `Drop` leak logging, and the `recreate` step that clamps the requested extent and image
//! count against what the surface actually supports and optionally opts into presentation
//! scaling via `caps::choose_scaling_mode`.
//!
//! `Swapchain` never stores a back-reference to `Context` — every method that needs pool or
//! device access takes `&Context`/`&mut Context` explicitly.

use ash::vk;
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::caps;
use crate::context::Context;

/// Swapchain configuration requested by the caller; negotiated down to what the surface
/// actually supports by `Swapchain::recreate`.
#[derive(Debug, Clone)]
pub struct SwapchainInfo {
    pub min_image_count: u32,
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub image_array_layers: u32,
    pub image_usage: vk::ImageUsageFlags,
    pub image_sharing_mode: vk::SharingMode,
    pub queue_family_indices: SmallVec<[u32; 4]>,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
    pub present_mode: vk::PresentModeKHR,
}

impl Default for SwapchainInfo {
    fn default() -> Self {
        Self {
            min_image_count: 2,
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: vk::SharingMode::EXCLUSIVE,
            queue_family_indices: SmallVec::new(),
            pre_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode: vk::PresentModeKHR::FIFO,
        }
    }
}

pub(crate) struct ImageResources {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub present_signal_fence: Option<vk::Fence>,
    pub last_present_wait_semaphore: Option<vk::Semaphore>,
}

/// A single image retrieved via [`Swapchain::get_current`].
#[derive(Debug, Clone, Copy)]
pub struct SwapchainImage {
    pub index: u32,
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub extent: vk::Extent2D,
    pub version: u64,
}

pub struct Swapchain {
    surface: vk::SurfaceKHR,
    handle: vk::SwapchainKHR,
    info: SwapchainInfo,
    pending_info: SwapchainInfo,
    last_extent: vk::Extent2D,
    pending_extent: vk::Extent2D,
    out_of_date: bool,
    version: u64,
    resources: Vec<ImageResources>,
    image_index: Option<u32>,
}

impl Swapchain {
    /// No native swapchain is created yet; the first `acquire` triggers `recreate` because
    /// `out_of_date` starts `true`.
    pub fn new(surface: vk::SurfaceKHR, extent: vk::Extent2D) -> Self {
        Self {
            surface,
            handle: vk::SwapchainKHR::null(),
            info: SwapchainInfo::default(),
            pending_info: SwapchainInfo::default(),
            last_extent: vk::Extent2D { width: 0, height: 0 },
            pending_extent: extent,
            out_of_date: true,
            version: 0,
            resources: Vec::new(),
            image_index: None,
        }
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn out_of_date(&self) -> bool {
        self.out_of_date
    }

    pub(crate) fn mark_out_of_date(&mut self) {
        self.out_of_date = true;
    }

    pub(crate) fn pending_extent(&self) -> vk::Extent2D {
        self.pending_extent
    }

    pub(crate) fn last_extent(&self) -> vk::Extent2D {
        self.last_extent
    }

    pub(crate) fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    pub(crate) fn image_index(&self) -> Option<u32> {
        self.image_index
    }

    pub(crate) fn set_image_index(&mut self, index: u32) {
        self.image_index = Some(index);
    }

    /// Marks the swapchain stale; applied by the next `recreate`.
    pub fn set_info(&mut self, info: SwapchainInfo) {
        self.pending_info = info;
        self.out_of_date = true;
    }

    /// Only ever touches `pending_extent`; does not itself mark the swapchain stale — `acquire`
    /// detects the `pending_extent != last_extent` mismatch and re-negotiates capabilities.
    pub fn resize(&mut self, extent: vk::Extent2D) {
        self.pending_extent = extent;
    }

    /// Returns the currently acquired image. Panics if no image has been acquired yet — this is
    /// only ever meant to be called after a successful acquire.
    pub fn get_current(&self) -> SwapchainImage {
        let index = self
            .image_index
            .expect("get_current called before any successful acquire");
        let resources = &self.resources[index as usize];
        SwapchainImage {
            index,
            image: resources.image,
            view: resources.view,
            extent: self.last_extent,
            version: self.version,
        }
    }

    /// The capability negotiator. Queries surface capabilities v2, clamps the
    /// desired extent, optionally selects a scaling mode, computes image count, and — unless
    /// nothing actually changed — creates a new native swapchain chained off the old one.
    pub(crate) fn recreate(&mut self, ctx: &mut Context) -> ash::prelude::VkResult<()> {
        self.wait_all_present_complete(ctx)?;

        let mut scaling_caps = vk::SurfacePresentScalingCapabilitiesEXT::default();
        let mut present_mode_info =
            vk::SurfacePresentModeEXT::default().present_mode(self.pending_info.present_mode);
        let mut caps2 = vk::SurfaceCapabilities2KHR::default().push_next(&mut scaling_caps);
        let surface_info = vk::PhysicalDeviceSurfaceInfo2KHR::default()
            .surface(self.surface)
            .push_next(&mut present_mode_info);
        unsafe {
            ctx.functions()
                .surface_capabilities2
                .get_physical_device_surface_capabilities2(
                    ctx.physical_device(),
                    &surface_info,
                    &mut caps2,
                )?;
        }
        let surface_caps = caps2.surface_capabilities;

        let clamped_extent = caps::clamp_extent(
            self.pending_extent,
            surface_caps.min_image_extent,
            surface_caps.max_image_extent,
        );

        let (final_extent, scaling_mode) = match caps::choose_scaling_mode(
            scaling_caps.supported_present_scaling,
            self.pending_extent,
            scaling_caps.min_scaled_image_extent,
            scaling_caps.max_scaled_image_extent,
        ) {
            Some(mode) => (self.pending_extent, Some(mode)),
            None => (clamped_extent, None),
        };

        let image_count = caps::choose_image_count(
            self.pending_info.min_image_count,
            surface_caps.min_image_count,
            surface_caps.max_image_count,
        );

        if !self.out_of_date && final_extent == self.last_extent && self.handle != vk::SwapchainKHR::null() {
            return Ok(());
        }

        let info = self.pending_info.clone();
        let old_handle = self.handle;

        let mut scaling_create_info = vk::SwapchainPresentScalingCreateInfoEXT::default();
        if let Some(mode) = scaling_mode {
            scaling_create_info = scaling_create_info.scaling_behavior(mode);
        }

        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(info.format)
            .image_color_space(info.color_space)
            .image_extent(final_extent)
            .image_array_layers(info.image_array_layers)
            .image_usage(info.image_usage)
            .image_sharing_mode(info.image_sharing_mode)
            .queue_family_indices(&info.queue_family_indices)
            .pre_transform(info.pre_transform)
            .composite_alpha(info.composite_alpha)
            .present_mode(info.present_mode)
            .clipped(true)
            .old_swapchain(old_handle)
            .flags(vk::SwapchainCreateFlagsKHR::DEFERRED_MEMORY_ALLOCATION_EXT);
        if scaling_mode.is_some() {
            create_info = create_info.push_next(&mut scaling_create_info);
        }

        let new_handle = match unsafe { ctx.functions().swapchain.create_swapchain(&create_info, None) } {
            Ok(handle) => handle,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                warn!("swapchain creation reported out-of-date against old_swapchain; will retry");
                self.out_of_date = true;
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        debug!(?new_handle, ?old_handle, extent = ?final_extent, "recreating swapchain");

        if old_handle != vk::SwapchainKHR::null() {
            for resource in &self.resources {
                if resource.view != vk::ImageView::null() {
                    unsafe { ctx.device().destroy_image_view(resource.view, None) };
                }
            }
            unsafe { ctx.functions().swapchain.destroy_swapchain(old_handle, None) };
        }

        let images = unsafe { ctx.functions().swapchain.get_swapchain_images(new_handle)? };
        self.resources = images
            .into_iter()
            .map(|image| ImageResources {
                image,
                view: vk::ImageView::null(),
                present_signal_fence: None,
                last_present_wait_semaphore: None,
            })
            .collect();

        self.handle = new_handle;
        self.last_extent = final_extent;
        self.out_of_date = false;
        self.info = info;
        self.version += 1;

        Ok(())
    }

    /// Lazily creates the image view for `index` if it doesn't exist yet.
    pub(crate) fn ensure_image_view(&mut self, ctx: &Context, index: u32) -> ash::prelude::VkResult<()> {
        let format = self.info.format;
        let resource = &mut self.resources[index as usize];
        if resource.view != vk::ImageView::null() {
            return Ok(());
        }
        let create_info = vk::ImageViewCreateInfo::default()
            .image(resource.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        resource.view = unsafe { ctx.device().create_image_view(&create_info, None)? };
        Ok(())
    }

    /// Present-completion reconciliation, invoked opportunistically from `acquire` and
    /// explicitly via `wait_for_present_complete`.
    pub(crate) fn on_present_complete(&mut self, ctx: &mut Context, index: u32) -> ash::prelude::VkResult<()> {
        let resource = &mut self.resources[index as usize];
        if let Some(fence) = resource.present_signal_fence.take() {
            ctx.return_fence(fence)?;
        }
        if let Some(semaphore) = resource.last_present_wait_semaphore.take() {
            ctx.release_present_wait(semaphore);
        }
        Ok(())
    }

    /// Host-waits on the per-image present fence (if any) before reconciling it.
    pub fn wait_for_present_complete(&mut self, ctx: &mut Context, index: u32) -> ash::prelude::VkResult<()> {
        let Some(fence) = self.resources[index as usize].present_signal_fence else {
            return Ok(());
        };
        unsafe { ctx.device().wait_for_fences(&[fence], true, u64::MAX)? };
        self.on_present_complete(ctx, index)
    }

    /// Installs a fresh present fence on `index`'s slot, returning it so the caller can
    /// aggregate it into the present-fence-info extension struct.
    pub(crate) fn install_present_fence(&mut self, ctx: &mut Context, index: u32) -> ash::prelude::VkResult<vk::Fence> {
        let resource = &mut self.resources[index as usize];
        if let Some(stale) = resource.present_signal_fence {
            warn!(?stale, index, "unexpected unreturned fence at present-installation time");
        }
        let fence = ctx.get_fence()?;
        resource.present_signal_fence = Some(fence);
        Ok(fence)
    }

    pub(crate) fn set_last_present_wait_semaphore(&mut self, index: u32, semaphore: vk::Semaphore) {
        self.resources[index as usize].last_present_wait_semaphore = Some(semaphore);
    }

    fn wait_all_present_complete(&mut self, ctx: &mut Context) -> ash::prelude::VkResult<()> {
        for index in 0..self.resources.len() as u32 {
            self.wait_for_present_complete(ctx, index)?;
        }
        Ok(())
    }

    /// Drains every pending present, then tears down the native handle and its image views.
    /// Explicit rather than `Drop`-driven since destruction needs `&mut Context`.
    pub fn destroy(mut self, ctx: &mut Context) -> ash::prelude::VkResult<()> {
        self.wait_all_present_complete(ctx)?;
        for resource in &self.resources {
            if resource.view != vk::ImageView::null() {
                unsafe { ctx.device().destroy_image_view(resource.view, None) };
            }
        }
        if self.handle != vk::SwapchainKHR::null() {
            unsafe { ctx.functions().swapchain.destroy_swapchain(self.handle, None) };
            self.handle = vk::SwapchainKHR::null();
        }
        Ok(())
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        if self.handle != vk::SwapchainKHR::null() {
            warn!("Swapchain dropped without calling destroy(); native handle leaked");
        }
    }
}
