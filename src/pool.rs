//! Pure bookkeeping for fence/binary-semaphore recycling keyed off the context's monotonic
//! timeline. No `ash` calls happen here — every method operates only on handle values and
//! plain collections, which keeps the acquire/present pool invariants checkable without a real
//! device (fabricated `vk::Fence::from_raw(n)` handles).

use std::collections::{HashMap, VecDeque};

use ash::vk;
use smallvec::SmallVec;

pub(crate) struct AcquireReleaseRecord {
    pub timeline_value: u64,
    pub semaphores: SmallVec<[vk::Semaphore; 4]>,
}

#[derive(Default)]
pub(crate) struct PoolManager {
    free_fences: Vec<vk::Fence>,
    free_semaphores: Vec<vk::Semaphore>,
    acquire_release_queue: VecDeque<AcquireReleaseRecord>,
    present_wait_refcounts: HashMap<vk::Semaphore, u32>,
}

impl PoolManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_fence(&mut self) -> Option<vk::Fence> {
        self.free_fences.pop()
    }

    /// Caller has already reset the fence — a fence only re-enters the free list after a
    /// successful reset, never before.
    pub fn return_fence(&mut self, fence: vk::Fence) {
        self.free_fences.push(fence);
    }

    pub fn take_semaphore(&mut self) -> Option<vk::Semaphore> {
        self.free_semaphores.pop()
    }

    pub fn return_semaphore(&mut self, semaphore: vk::Semaphore) {
        self.free_semaphores.push(semaphore);
    }

    pub fn push_acquire_release_record(
        &mut self,
        timeline_value: u64,
        semaphores: SmallVec<[vk::Semaphore; 4]>,
    ) {
        if semaphores.is_empty() {
            return;
        }
        self.acquire_release_queue.push_back(AcquireReleaseRecord {
            timeline_value,
            semaphores,
        });
    }

    /// Moves every record whose `timeline_value` is at or behind `observed_timeline_value`
    /// into the free list. Returns the number of semaphores recovered. Idempotent, safe to
    /// call at any time — a no-op if nothing is eligible yet.
    pub fn recover_binary_semaphores(&mut self, observed_timeline_value: u64) -> usize {
        let mut recovered = 0;
        while let Some(front) = self.acquire_release_queue.front() {
            if front.timeline_value > observed_timeline_value {
                break;
            }
            let record = self.acquire_release_queue.pop_front().unwrap();
            recovered += record.semaphores.len();
            self.free_semaphores.extend(record.semaphores);
        }
        recovered
    }

    /// Installs a shared present-wait semaphore with an outstanding-reference count of
    /// `refcount` (one per swapchain whose present consumed it).
    pub fn install_present_wait(&mut self, semaphore: vk::Semaphore, refcount: u32) {
        self.present_wait_refcounts.insert(semaphore, refcount);
    }

    /// Decrements the refcount for `semaphore`. Returns `true` if this decrement brought it to
    /// zero, in which case the semaphore has already been moved back into the free list and
    /// the map entry erased.
    pub fn release_present_wait(&mut self, semaphore: vk::Semaphore) -> bool {
        let Some(count) = self.present_wait_refcounts.get_mut(&semaphore) else {
            return false;
        };
        *count -= 1;
        if *count == 0 {
            self.present_wait_refcounts.remove(&semaphore);
            self.free_semaphores.push(semaphore);
            return true;
        }
        false
    }

    /// Drains every handle this pool still owns, regardless of free/outstanding state — used
    /// only by `Context::destroy` once every swapchain has already been torn down.
    pub fn drain_all(&mut self) -> (Vec<vk::Fence>, Vec<vk::Semaphore>) {
        let fences = std::mem::take(&mut self.free_fences);
        let mut semaphores = std::mem::take(&mut self.free_semaphores);
        for record in self.acquire_release_queue.drain(..) {
            semaphores.extend(record.semaphores);
        }
        semaphores.extend(self.present_wait_refcounts.drain().map(|(s, _)| s));
        (fences, semaphores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fence(raw: u64) -> vk::Fence {
        vk::Fence::from_raw(raw)
    }

    fn semaphore(raw: u64) -> vk::Semaphore {
        vk::Semaphore::from_raw(raw)
    }

    #[test]
    fn fence_round_trip_through_free_list() {
        let mut pool = PoolManager::new();
        assert_eq!(pool.take_fence(), None);
        pool.return_fence(fence(1));
        pool.return_fence(fence(2));
        // Fence single-ownership: each fence comes back out exactly once.
        let mut seen = vec![pool.take_fence().unwrap(), pool.take_fence().unwrap()];
        seen.sort_by_key(|f| f.as_raw());
        assert_eq!(seen, vec![fence(1), fence(2)]);
        assert_eq!(pool.take_fence(), None);
    }

    #[test]
    fn recovery_releases_only_records_at_or_behind_observed_timeline() {
        let mut pool = PoolManager::new();
        pool.push_acquire_release_record(10, SmallVec::from_vec(vec![semaphore(1)]));
        pool.push_acquire_release_record(20, SmallVec::from_vec(vec![semaphore(2)]));

        assert_eq!(pool.recover_binary_semaphores(15), 1);
        assert_eq!(pool.take_semaphore(), Some(semaphore(1)));
        assert_eq!(pool.take_semaphore(), None);

        assert_eq!(pool.recover_binary_semaphores(20), 1);
        assert_eq!(pool.take_semaphore(), Some(semaphore(2)));
    }

    #[test]
    fn recovery_is_idempotent() {
        let mut pool = PoolManager::new();
        pool.push_acquire_release_record(5, SmallVec::from_vec(vec![semaphore(1)]));
        assert_eq!(pool.recover_binary_semaphores(100), 1);
        assert_eq!(pool.recover_binary_semaphores(100), 0);
        assert_eq!(pool.recover_binary_semaphores(200), 0);
    }

    #[test]
    fn present_refcount_returns_semaphore_only_on_final_release() {
        let mut pool = PoolManager::new();
        let shared = semaphore(42);
        pool.install_present_wait(shared, 3);

        assert!(!pool.release_present_wait(shared));
        assert!(!pool.release_present_wait(shared));
        assert_eq!(pool.take_semaphore(), None);
        assert!(pool.release_present_wait(shared));
        assert_eq!(pool.take_semaphore(), Some(shared));
    }

    #[test]
    fn releasing_unknown_semaphore_is_a_no_op() {
        let mut pool = PoolManager::new();
        assert!(!pool.release_present_wait(semaphore(7)));
    }
}
