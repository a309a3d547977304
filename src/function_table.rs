//! Resolves the fixed set of instance/device entry points this crate depends on, once, at
//! [`crate::Context`] construction. A plain record of loaded function tables, not a dynamic
//! dispatch hierarchy.
//!
//! Limited to the surface/swapchain/sync subset — command recording and pipeline functions
//! belong to the caller's own render graph and are out of scope here. `ash::Instance`/
//! `ash::Device` already resolve their own core v1.0-1.3 tables via
//! `vkGetInstanceProcAddr`/`vkGetDeviceProcAddr`; this struct only wraps the extension loaders
//! that sit outside the core tables.

use ash::{ext, khr};

use crate::error::InitError;

pub struct FunctionTable {
    /// `VK_KHR_surface`: format/present-mode enumeration, queue-family support queries.
    pub surface: khr::surface::Instance,
    /// `VK_KHR_get_surface_capabilities2`: capability queries chained with present-mode and
    /// scaling-capability input/output structs.
    pub surface_capabilities2: khr::get_surface_capabilities2::Instance,
    /// `VK_KHR_swapchain`: create/destroy/get-images/acquire/present.
    pub swapchain: khr::swapchain::Device,
    /// `VK_EXT_debug_utils`: object naming. Optional — absent when the instance wasn't built
    /// with the extension enabled.
    pub debug_utils: Option<ext::debug_utils::Device>,
}

impl FunctionTable {
    pub fn load(
        entry: &ash::Entry,
        instance: &ash::Instance,
        device: &ash::Device,
        enable_debug_utils: bool,
    ) -> Result<Self, InitError> {
        let surface = khr::surface::Instance::new(entry, instance);
        let surface_capabilities2 = khr::get_surface_capabilities2::Instance::new(entry, instance);
        let swapchain = khr::swapchain::Device::new(instance, device);
        let debug_utils = enable_debug_utils.then(|| ext::debug_utils::Device::new(instance, device));

        Ok(Self {
            surface,
            surface_capabilities2,
            swapchain,
            debug_utils,
        })
    }
}
