//! The context: owns the function table, the pool manager, the timeline semaphore + counter,
//! and the optional log sink. Exposes an explicit `destroy` rather than relying on `Drop` for
//! teardown, since the context never owns the device it calls through — it borrows the device
//! the caller constructed and hands it back untouched (no destroying borrowed external
//! handles).

use ash::prelude::VkResult;
use ash::vk;

use crate::error::InitError;
use crate::function_table::FunctionTable;
use crate::log::{ctx_log, LogLevel, LogSink};
use crate::pool::PoolManager;

/// Handles the client hands in at construction. None of these are owned by the resulting
/// [`Context`] — destroying them remains the caller's responsibility, strictly after
/// `Context::destroy` (and after every swapchain built against this context is destroyed).
pub struct ContextInfo<'a> {
    pub instance: &'a ash::Instance,
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub entry: &'a ash::Entry,
    pub log_sink: Option<LogSink>,
    /// When set, every queue submission also signals a dedicated fence that is waited on and
    /// reset before the call returns, serializing all GPU work for deterministic single-stepping.
    pub debug_linearize: bool,
    pub enable_debug_utils: bool,
}

pub struct Context {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    functions: FunctionTable,
    timeline: vk::Semaphore,
    timeline_value: u64,
    pool: PoolManager,
    log_sink: Option<LogSink>,
    debug_fence: Option<vk::Fence>,
}

impl Context {
    pub fn new(info: ContextInfo) -> Result<Self, InitError> {
        if info.device.handle() == vk::Device::null() {
            return Err(InitError::InvalidHandle("device"));
        }
        if info.physical_device == vk::PhysicalDevice::null() {
            return Err(InitError::InvalidHandle("physical_device"));
        }

        let functions = FunctionTable::load(
            info.entry,
            info.instance,
            &info.device,
            info.enable_debug_utils,
        )?;

        let mut type_create_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(0);
        let create_info = vk::SemaphoreCreateInfo::default().push_next(&mut type_create_info);
        // Safety: no host synchronization requirement on vkCreateSemaphore.
        let timeline = unsafe { info.device.create_semaphore(&create_info, None)? };

        let debug_fence = if info.debug_linearize {
            let fence_info = vk::FenceCreateInfo::default();
            Some(unsafe { info.device.create_fence(&fence_info, None)? })
        } else {
            None
        };

        Ok(Self {
            device: info.device,
            physical_device: info.physical_device,
            functions,
            timeline,
            timeline_value: 0,
            pool: PoolManager::new(),
            log_sink: info.log_sink,
            debug_fence,
        })
    }

    /// Precondition: every swapchain created against this context has already been destroyed.
    pub fn destroy(mut self) -> VkResult<()> {
        let (fences, semaphores) = self.pool.drain_all();
        unsafe {
            for fence in fences {
                self.device.destroy_fence(fence, None);
            }
            for semaphore in semaphores {
                self.device.destroy_semaphore(semaphore, None);
            }
            if let Some(fence) = self.debug_fence.take() {
                self.device.destroy_fence(fence, None);
            }
            self.device.destroy_semaphore(self.timeline, None);
        }
        ctx_log!(self, LogLevel::Info, "context destroyed");
        Ok(())
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub(crate) fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    pub(crate) fn log_sink(&self) -> Option<&LogSink> {
        self.log_sink.as_ref()
    }

    pub(crate) fn timeline_semaphore(&self) -> vk::Semaphore {
        self.timeline
    }

    pub(crate) fn timeline_value(&self) -> u64 {
        self.timeline_value
    }

    pub(crate) fn debug_fence(&self) -> Option<vk::Fence> {
        self.debug_fence
    }

    /// Reads the timeline's current value off the GPU and recovers every acquire-release
    /// record whose value is now at or behind it. Safe to call at any time.
    pub(crate) fn recover_binary_semaphores(&mut self) -> VkResult<usize> {
        let observed = unsafe { self.device.get_semaphore_counter_value(self.timeline)? };
        Ok(self.pool.recover_binary_semaphores(observed))
    }

    pub(crate) fn next_timeline_value(&mut self) -> u64 {
        self.timeline_value += 1;
        self.timeline_value
    }

    pub(crate) fn get_fence(&mut self) -> VkResult<vk::Fence> {
        if let Some(fence) = self.pool.take_fence() {
            return Ok(fence);
        }
        ctx_log!(self, LogLevel::Warn, "fence pool exhausted, allocating a fresh one");
        let create_info = vk::FenceCreateInfo::default();
        unsafe { self.device.create_fence(&create_info, None) }
    }

    /// Resets the fence before returning it to the pool; a failed reset is surfaced to the
    /// caller, and the fence does not re-enter the free list in that case.
    pub(crate) fn return_fence(&mut self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.reset_fences(&[fence])? };
        self.pool.return_fence(fence);
        Ok(())
    }

    pub(crate) fn get_binary_semaphore(&mut self) -> VkResult<vk::Semaphore> {
        if let Some(semaphore) = self.pool.take_semaphore() {
            return Ok(semaphore);
        }
        ctx_log!(self, LogLevel::Warn, "binary semaphore pool exhausted, allocating a fresh one");
        let create_info = vk::SemaphoreCreateInfo::default();
        unsafe { self.device.create_semaphore(&create_info, None) }
    }

    pub(crate) fn return_binary_semaphore(&mut self, semaphore: vk::Semaphore) {
        self.pool.return_semaphore(semaphore);
    }

    pub(crate) fn push_acquire_release_record(
        &mut self,
        timeline_value: u64,
        semaphores: smallvec::SmallVec<[vk::Semaphore; 4]>,
    ) {
        self.pool.push_acquire_release_record(timeline_value, semaphores);
    }

    pub(crate) fn install_present_wait(&mut self, semaphore: vk::Semaphore, refcount: u32) {
        self.pool.install_present_wait(semaphore, refcount);
    }

    pub(crate) fn release_present_wait(&mut self, semaphore: vk::Semaphore) -> bool {
        self.pool.release_present_wait(semaphore)
    }

    /// Returns the first mode in `preferred` that the surface actually supports, falling back
    /// to FIFO (guaranteed present by the Vulkan spec).
    pub fn pick_present_mode(
        &self,
        surface: vk::SurfaceKHR,
        preferred: &[vk::PresentModeKHR],
    ) -> VkResult<vk::PresentModeKHR> {
        let supported = unsafe {
            self.functions
                .surface
                .get_physical_device_surface_present_modes(self.physical_device, surface)?
        };
        for &mode in preferred {
            if supported.contains(&mode) {
                return Ok(mode);
            }
        }
        Ok(vk::PresentModeKHR::FIFO)
    }

    /// Labels a Vulkan object for RenderDoc/validation-layer output. Wired in but never
    /// called internally — a pure opt-in capability for the client.
    pub fn set_object_name<H: vk::Handle>(&self, handle: H, name: &str) -> VkResult<()> {
        let Some(debug_utils) = self.functions.debug_utils.as_ref() else {
            return Ok(());
        };
        let c_name = std::ffi::CString::new(name).map_err(|_| vk::Result::ERROR_UNKNOWN)?;
        let name_info = vk::DebugUtilsObjectNameInfoEXT::default()
            .object_handle(handle)
            .object_name(&c_name);
        unsafe { debug_utils.set_debug_utils_object_name(&name_info) }
    }
}
