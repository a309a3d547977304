//! The present protocol, and the present-completion reconciliation it sets up (executed by
//! [`crate::swapchain::Swapchain::on_present_complete`]).
//!
//! An optional wait-conversion submission (host wait or a shared binary semaphore) precedes a
//! batched present with per-swapchain fences installed via the present-fence-info extension,
//! refcounting the shared semaphore across however many swapchains consumed it.

use ash::prelude::VkResult;
use ash::vk;
use smallvec::SmallVec;
use tracing::info_span;

use crate::context::Context;
use crate::swapchain::Swapchain;

/// Presents the currently-acquired image of every swapchain in `swapchains`.
///
/// If `host_wait` is `true`, `client_waits` must be timeline waits and the host blocks on them
/// directly. Otherwise, if `client_waits` is non-empty, a fresh shared binary semaphore is
/// allocated and a zero-command submission converts the timeline waits into a single binary
/// signal (the GPU API's present only accepts binary waits).
pub fn present(
    ctx: &mut Context,
    swapchains: &mut [&mut Swapchain],
    queue: vk::Queue,
    client_waits: &[vk::SemaphoreSubmitInfo],
    host_wait: bool,
) -> VkResult<()> {
    if swapchains.is_empty() {
        return Ok(());
    }

    let span = info_span!("present", swapchain_count = swapchains.len());
    let _enter = span.enter();

    let mut shared_wait_semaphore: Option<vk::Semaphore> = None;

    if !client_waits.is_empty() {
        if host_wait {
            let semaphores: SmallVec<[vk::Semaphore; 4]> =
                client_waits.iter().map(|w| w.semaphore).collect();
            let values: SmallVec<[u64; 4]> = client_waits.iter().map(|w| w.value).collect();
            let wait_info = vk::SemaphoreWaitInfo::default()
                .semaphores(&semaphores)
                .values(&values);
            unsafe { ctx.device().wait_semaphores(&wait_info, u64::MAX)? };
        } else {
            let semaphore = ctx.get_binary_semaphore()?;
            let signal_info = [vk::SemaphoreSubmitInfo::default().semaphore(semaphore)];
            let submit_info = vk::SubmitInfo2::default()
                .wait_semaphore_infos(client_waits)
                .signal_semaphore_infos(&signal_info);
            let debug_fence = ctx.debug_fence().unwrap_or(vk::Fence::null());
            unsafe {
                ctx.device()
                    .queue_submit2(queue, std::slice::from_ref(&submit_info), debug_fence)?;
            }
            if let Some(fence) = ctx.debug_fence() {
                unsafe {
                    ctx.device().wait_for_fences(&[fence], true, u64::MAX)?;
                    ctx.device().reset_fences(&[fence])?;
                }
            }
            shared_wait_semaphore = Some(semaphore);
        }
    }

    let mut handles: SmallVec<[vk::SwapchainKHR; 4]> = SmallVec::with_capacity(swapchains.len());
    let mut indices: SmallVec<[u32; 4]> = SmallVec::with_capacity(swapchains.len());
    let mut fences: SmallVec<[vk::Fence; 4]> = SmallVec::with_capacity(swapchains.len());

    for swapchain in swapchains.iter_mut() {
        let index = swapchain
            .image_index()
            .expect("present called on a swapchain with no acquired image");
        let fence = match swapchain.install_present_fence(ctx, index) {
            Ok(fence) => fence,
            Err(err) => {
                if let Some(semaphore) = shared_wait_semaphore {
                    ctx.return_binary_semaphore(semaphore);
                }
                return Err(err);
            }
        };
        handles.push(swapchain.handle());
        indices.push(index);
        fences.push(fence);
    }

    let wait_semaphore_slice = shared_wait_semaphore
        .as_ref()
        .map(std::slice::from_ref)
        .unwrap_or(&[]);

    let mut results: SmallVec<[vk::Result; 4]> = smallvec::smallvec![vk::Result::SUCCESS; swapchains.len()];
    let mut present_fence_info = vk::SwapchainPresentFenceInfoEXT::default().fences(&fences);
    let present_info = vk::PresentInfoKHR::default()
        .wait_semaphores(wait_semaphore_slice)
        .swapchains(&handles)
        .image_indices(&indices)
        .results(&mut results)
        .push_next(&mut present_fence_info);

    // The driver writes `results` in place before returning, regardless of the call's own
    // top-level result code (which can itself be OUT_OF_DATE/SUBOPTIMAL when any swapchain in
    // the batch hit that case) — so the per-swapchain array below is authoritative and the
    // top-level code is intentionally not separately inspected.
    let _ = unsafe { ctx.functions().swapchain.queue_present(queue, &present_info) };

    // The shared semaphore was consumed by the GPU present regardless of per-swapchain
    // result codes, so it's always refcounted.
    if let Some(semaphore) = shared_wait_semaphore {
        ctx.install_present_wait(semaphore, swapchains.len() as u32);
        for swapchain in swapchains.iter_mut() {
            let index = swapchain.image_index().unwrap();
            swapchain.set_last_present_wait_semaphore(index, semaphore);
        }
    }

    // Scan every swapchain's result before returning: a hard error on one swapchain must not
    // cause a later swapchain's own OUT_OF_DATE to be silently dropped.
    let mut hard_error = None;
    for (swapchain, &result) in swapchains.iter_mut().zip(results.iter()) {
        match result {
            vk::Result::ERROR_OUT_OF_DATE_KHR => {
                swapchain.mark_out_of_date();
            }
            vk::Result::SUCCESS | vk::Result::SUBOPTIMAL_KHR => {}
            other => hard_error = Some(other),
        }
    }

    if let Some(err) = hard_error {
        return Err(err);
    }

    Ok(())
}
