//! Epoch-based reclamation for nodes retired out of the lock-free containers.
//!
//! A [Collector] tracks a global epoch counter plus one slot per registered
//! thread. While a thread holds a [Guard], the epoch it observed at pin time
//! is published in its slot, and the global epoch can only advance while
//! every pinned thread has observed the current value. Memory retired at
//! epoch `e` is therefore only reclaimed once the global epoch reaches
//! `e + 2`: one epoch for threads which read the pointer just before a
//! pending advance, and one more for the advance itself.
//!
//! Reclamation is opportunistic. There is no background thread; every
//! [GC_INTERVAL] retirements the retiring thread attempts to advance the
//! global epoch and then frees whatever its own bucket allows. A thread
//! which enters a guard and never leaves it blocks the epoch and causes
//! garbage to accumulate without bound, but that is a caller bug, not a
//! failure mode of the collector.

use crate::err::{NoThreadSlotAvailableError, RegisterError};
use crate::sync::{Arc, AtomicBool, AtomicUsize, Ordering};
use crate::types::ThreadIndex;
use core::cell::{Cell, UnsafeCell};
use core::fmt::{Debug, Formatter};
use parking_lot::Mutex;
use tracing::trace;

/// The number of retirements between opportunistic epoch-advance attempts.
pub const GC_INTERVAL: usize = 1000;

/// Garbage retired at epoch `e` is reclaimable once the global epoch reaches
/// `e + EPOCH_QUIESCENCE_GAP`.
const EPOCH_QUIESCENCE_GAP: usize = 2;

/// A deferred destructor for one retired allocation.
pub(crate) struct Deferred {
    func: Box<dyn FnOnce() + Send>,
}

impl Deferred {
    pub(crate) fn new(func: impl FnOnce() + Send + 'static) -> Self {
        Self {
            func: Box::new(func),
        }
    }

    fn call(self) {
        (self.func)();
    }
}

impl Debug for Deferred {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_str("Deferred")
    }
}

struct Slot {
    /// Indicates whether this slot is currently assigned to a [LocalHandle].
    claimed: AtomicBool,

    /// 0 while the owning thread is not inside a guard; otherwise the epoch
    /// the thread observed at pin time, plus one.
    local_epoch: AtomicUsize,

    /// Destructors retired by the owning thread, keyed by the global epoch at
    /// retire time. Only the owning thread touches this bucket; on handle
    /// drop it is moved into the collector's orphan list.
    garbage: UnsafeCell<Vec<(usize, Deferred)>>,
}

impl Debug for Slot {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Slot")
            .field("claimed", &self.claimed)
            .field("local_epoch", &self.local_epoch)
            .finish_non_exhaustive()
    }
}

/// Shared epoch-reclamation state for up to `POOL_SIZE` concurrent threads.
#[derive(Debug)]
pub struct Collector<const POOL_SIZE: usize> {
    global_epoch: AtomicUsize,
    slots: [Slot; POOL_SIZE],

    /// Garbage inherited from dropped handles, reclaimed during later
    /// advances by whichever thread performs them.
    orphans: Mutex<Vec<(usize, Deferred)>>,
}

// The garbage buckets are only accessed by the slot's owning thread while the
// slot is claimed, and through the orphan mutex after the owning handle is
// dropped.
unsafe impl<const POOL_SIZE: usize> Sync for Collector<POOL_SIZE> {}

impl<const POOL_SIZE: usize> Collector<POOL_SIZE> {
    pub fn new() -> Self {
        Self {
            global_epoch: AtomicUsize::new(0),
            slots: core::array::from_fn(|_| Slot {
                claimed: AtomicBool::new(false),
                local_epoch: AtomicUsize::new(0),
                garbage: UnsafeCell::new(Vec::new()),
            }),
            orphans: Mutex::new(Vec::new()),
        }
    }

    /// Attempt to advance the global epoch, returning the epoch in effect
    /// afterwards. The advance is abandoned if any pinned thread has not yet
    /// observed the current epoch.
    fn try_advance(&self) -> usize {
        let global_epoch: usize = self.global_epoch.load(Ordering::SeqCst);
        for slot in &self.slots {
            if !slot.claimed.load(Ordering::Acquire) {
                continue;
            }
            let local_epoch: usize = slot.local_epoch.load(Ordering::SeqCst);
            if local_epoch != 0 && local_epoch - 1 != global_epoch {
                // a pinned thread still observes an older epoch
                return global_epoch;
            }
        }

        match self.global_epoch.compare_exchange(
            global_epoch,
            global_epoch + 1,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => {
                let new_epoch: usize = global_epoch + 1;
                trace!("advanced global epoch to {new_epoch}");
                self.collect_orphans(new_epoch);
                new_epoch
            }
            Err(actual_epoch) => actual_epoch,
        }
    }

    fn collect_orphans(&self, global_epoch: usize) {
        let mut orphans = self.orphans.lock();
        let mut index: usize = 0;
        while index < orphans.len() {
            if orphans[index].0 + EPOCH_QUIESCENCE_GAP <= global_epoch {
                let (_, deferred) = orphans.swap_remove(index);
                deferred.call();
            } else {
                index += 1;
            }
        }
    }
}

impl<const POOL_SIZE: usize> Default for Collector<POOL_SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const POOL_SIZE: usize> Drop for Collector<POOL_SIZE> {
    fn drop(&mut self) {
        // no handle can outlive the collector, so everything left is safe
        for slot in &self.slots {
            let bucket: &mut Vec<(usize, Deferred)> = unsafe { &mut *slot.garbage.get() };
            for (_, deferred) in bucket.drain(..) {
                deferred.call();
            }
        }
        for (_, deferred) in self.orphans.get_mut().drain(..) {
            deferred.call();
        }
    }
}

/// A per-thread registration with a [Collector].
///
/// Dropping the handle returns its thread slot to the pool and hands any
/// not-yet-reclaimable garbage over to the collector.
#[derive(Debug)]
pub struct LocalHandle<const POOL_SIZE: usize> {
    collector: Arc<Collector<POOL_SIZE>>,
    thread_index: ThreadIndex,
    guard_depth: Cell<usize>,
    retired_since_advance: Cell<usize>,
}

impl<const POOL_SIZE: usize> LocalHandle<POOL_SIZE> {
    /// Claim a thread slot of `collector` and return a handle through which
    /// the calling thread can pin itself and retire garbage.
    pub fn register(collector: Arc<Collector<POOL_SIZE>>) -> Result<Self, RegisterError> {
        for thread_index in 0..POOL_SIZE {
            let cas_result: Result<bool, bool> = collector.slots[thread_index]
                .claimed
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire);
            if cas_result.is_ok() {
                return Ok(Self {
                    collector,
                    thread_index,
                    guard_depth: Cell::new(0),
                    retired_since_advance: Cell::new(0),
                });
            }
        }
        Err(RegisterError::from(NoThreadSlotAvailableError))
    }

    /// Pin the calling thread, publishing the epoch it observes.
    ///
    /// Nested pins are idempotent: only the outermost [Guard] publishes and
    /// withdraws the thread's epoch.
    pub fn pin(&self) -> Guard<'_, POOL_SIZE> {
        let depth: usize = self.guard_depth.get();
        if depth == 0 {
            let slot: &Slot = &self.collector.slots[self.thread_index];
            loop {
                let epoch: usize = self.collector.global_epoch.load(Ordering::SeqCst);
                slot.local_epoch.store(epoch + 1, Ordering::SeqCst);
                // the epoch may have advanced between the load and the
                // publication; republish until the two agree
                if self.collector.global_epoch.load(Ordering::SeqCst) == epoch {
                    break;
                }
            }
        }
        self.guard_depth.set(depth + 1);
        Guard { handle: self }
    }

    fn defer(&self, deferred: Deferred) {
        let epoch: usize = self.collector.global_epoch.load(Ordering::SeqCst);
        let bucket: &mut Vec<(usize, Deferred)> =
            unsafe { &mut *self.collector.slots[self.thread_index].garbage.get() };
        bucket.push((epoch, deferred));

        let retired: usize = self.retired_since_advance.get() + 1;
        if retired >= GC_INTERVAL {
            self.retired_since_advance.set(0);
            self.collect();
        } else {
            self.retired_since_advance.set(retired);
        }
    }

    fn collect(&self) {
        let global_epoch: usize = self.collector.try_advance();
        let bucket: &mut Vec<(usize, Deferred)> =
            unsafe { &mut *self.collector.slots[self.thread_index].garbage.get() };
        let mut index: usize = 0;
        while index < bucket.len() {
            if bucket[index].0 + EPOCH_QUIESCENCE_GAP <= global_epoch {
                let (_, deferred) = bucket.swap_remove(index);
                deferred.call();
            } else {
                index += 1;
            }
        }
    }
}

impl<const POOL_SIZE: usize> Drop for LocalHandle<POOL_SIZE> {
    fn drop(&mut self) {
        let slot: &Slot = &self.collector.slots[self.thread_index];

        let bucket: &mut Vec<(usize, Deferred)> = unsafe { &mut *slot.garbage.get() };
        if !bucket.is_empty() {
            self.collector.orphans.lock().append(bucket);
        }

        slot.claimed.store(false, Ordering::Release);
    }
}

/// A scoped marker that the calling thread is inside an epoch-protected
/// critical section.
///
/// While a guard is live, memory retired through any thread's [Guard::defer]
/// after this thread pinned itself will not be reclaimed.
#[derive(Debug)]
pub struct Guard<'handle, const POOL_SIZE: usize> {
    handle: &'handle LocalHandle<POOL_SIZE>,
}

impl<'handle, const POOL_SIZE: usize> Guard<'handle, POOL_SIZE> {
    /// Schedule `func` to run once no thread can still observe the memory it
    /// frees.
    pub fn defer(&self, func: impl FnOnce() + Send + 'static) {
        self.handle.defer(Deferred::new(func));
    }
}

impl<'handle, const POOL_SIZE: usize> Drop for Guard<'handle, POOL_SIZE> {
    fn drop(&mut self) {
        let depth: usize = self.handle.guard_depth.get() - 1;
        self.handle.guard_depth.set(depth);
        if depth == 0 {
            let slot: &Slot = &self.handle.collector.slots[self.handle.thread_index];
            slot.local_epoch.store(0, Ordering::Release);
        }
    }
}
