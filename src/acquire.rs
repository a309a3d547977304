//! The acquire protocol: recover the binary-semaphore pool, then per swapchain recreate-if-needed,
//! acquire, drain any outstanding present on the slot, and lazily create the image view, before
//! batching everything into one or more `vkQueueSubmit2` calls that inject a timeline signal
//! proving the acquire waits have been consumed.
//!
//! Submissions are chunked into small wait groups (`caps::chunk_wait_groups`) rather than one
//! big submission, since very large binary-wait counts in a single `vkQueueSubmit2` call have
//! been observed to deadlock on some drivers.

use ash::prelude::VkResult;
use ash::vk;
use smallvec::SmallVec;
use tracing::{error, info_span};

use crate::caps::chunk_wait_groups;
use crate::context::Context;
use crate::swapchain::Swapchain;

/// Bounds the OUT_OF_DATE retry loop per swapchain per call, so a surface stuck reporting
/// OUT_OF_DATE during a long resize can't busy-loop the caller forever.
const MAX_RECREATE_RETRIES: u32 = 8;

/// Acquires the next image on every swapchain in `swapchains`, in order, then submits one or
/// more chunked batches on `queue` carrying `client_signals` (plus an injected timeline
/// signal) so the acquired binary semaphores become reusable once observed.
///
/// Precondition: `queue` is the same queue across an entire run of acquire calls — the
/// injected timeline proxy only bounds earlier waits because of FIFO ordering on one queue.
pub fn acquire(
    ctx: &mut Context,
    swapchains: &mut [&mut Swapchain],
    queue: vk::Queue,
    client_signals: &[vk::SemaphoreSubmitInfo],
) -> VkResult<()> {
    if swapchains.is_empty() {
        return Ok(());
    }

    let span = info_span!("acquire", swapchain_count = swapchains.len());
    let _enter = span.enter();

    ctx.recover_binary_semaphores()?;

    let mut wait_semaphores: SmallVec<[vk::Semaphore; 4]> = SmallVec::with_capacity(swapchains.len());

    for swapchain in swapchains.iter_mut() {
        let wait_semaphore = match ctx.get_binary_semaphore() {
            Ok(semaphore) => semaphore,
            Err(err) => {
                return_all(ctx, &mut wait_semaphores);
                return Err(err);
            }
        };

        let debug_fence = ctx.debug_fence().unwrap_or(vk::Fence::null());
        let mut retries = 0u32;
        let image_index = loop {
            if swapchain.out_of_date() || swapchain.pending_extent() != swapchain.last_extent() {
                if let Err(err) = swapchain.recreate(ctx) {
                    ctx.return_binary_semaphore(wait_semaphore);
                    return_all(ctx, &mut wait_semaphores);
                    return Err(err);
                }
            }

            let acquire_result = unsafe {
                ctx.functions().swapchain.acquire_next_image(
                    swapchain.handle(),
                    u64::MAX,
                    wait_semaphore,
                    debug_fence,
                )
            };

            match acquire_result {
                Ok((index, _suboptimal)) => break index,
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                    swapchain.mark_out_of_date();
                    retries += 1;
                    if retries > MAX_RECREATE_RETRIES {
                        error!("acquire: exceeded retry budget waiting for a valid swapchain");
                        ctx.return_binary_semaphore(wait_semaphore);
                        return_all(ctx, &mut wait_semaphores);
                        return Err(vk::Result::ERROR_OUT_OF_DATE_KHR);
                    }
                    continue;
                }
                Err(err) => {
                    ctx.return_binary_semaphore(wait_semaphore);
                    return_all(ctx, &mut wait_semaphores);
                    return Err(err);
                }
            }
        };

        if let Some(fence) = ctx.debug_fence() {
            unsafe {
                ctx.device().wait_for_fences(&[fence], true, u64::MAX)?;
                ctx.device().reset_fences(&[fence])?;
            }
        }

        swapchain.set_image_index(image_index);

        if let Err(err) = swapchain.wait_for_present_complete(ctx, image_index) {
            ctx.return_binary_semaphore(wait_semaphore);
            return_all(ctx, &mut wait_semaphores);
            return Err(err);
        }
        if let Err(err) = swapchain.ensure_image_view(ctx, image_index) {
            ctx.return_binary_semaphore(wait_semaphore);
            return_all(ctx, &mut wait_semaphores);
            return Err(err);
        }

        wait_semaphores.push(wait_semaphore);
    }

    let chunk_sizes = chunk_wait_groups(wait_semaphores.len());
    let mut offset = 0usize;
    let mut last_timeline_value = 0u64;

    for (chunk_index, &size) in chunk_sizes.iter().enumerate() {
        let is_last_chunk = chunk_index + 1 == chunk_sizes.len();
        let timeline_value = ctx.next_timeline_value();
        last_timeline_value = timeline_value;

        let wait_infos: SmallVec<[vk::SemaphoreSubmitInfo; 4]> = wait_semaphores[offset..offset + size]
            .iter()
            .map(|&semaphore| vk::SemaphoreSubmitInfo::default().semaphore(semaphore))
            .collect();

        let mut signal_infos: SmallVec<[vk::SemaphoreSubmitInfo; 5]> = SmallVec::new();
        if is_last_chunk {
            signal_infos.extend_from_slice(client_signals);
        }
        signal_infos.push(
            vk::SemaphoreSubmitInfo::default()
                .semaphore(ctx.timeline_semaphore())
                .value(timeline_value),
        );

        let submit_info = vk::SubmitInfo2::default()
            .wait_semaphore_infos(&wait_infos)
            .signal_semaphore_infos(&signal_infos);

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

        offset += size;
    }

    ctx.push_acquire_release_record(last_timeline_value, wait_semaphores);

    Ok(())
}

fn return_all(ctx: &mut Context, semaphores: &mut SmallVec<[vk::Semaphore; 4]>) {
    for semaphore in semaphores.drain(..) {
        ctx.return_binary_semaphore(semaphore);
    }
}
