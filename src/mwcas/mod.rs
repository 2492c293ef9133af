//! The multi-word CAS descriptor pool and engine.
//!
//! A [DescriptorPool] reserves one descriptor slot per registered thread.
//! Each operation publishes its `(address, expected, desired)` entries into
//! the owning thread's slot, stamps the slot `Undecided` under a fresh
//! sequence number, and then drives the three-phase protocol:
//!
//! 1. **Install**: claim each target word in address order by CASing the
//!    expected value to a [DescriptorMarker]. A thread which encounters
//!    another operation's marker helps that operation to completion before
//!    retrying, so in-flight descriptors never block anyone.
//! 2. **Decide**: CAS the slot's status from `Undecided` to `Succeeded` (all
//!    entries installed) or `Failed` (some word held an unexpected value).
//!    Exactly one thread wins this CAS; it is the linearization point.
//! 3. **Finalize**: replace every installed marker with the desired value on
//!    success, or restore the expected value on failure. Finalization is
//!    idempotent and may be performed by any number of helpers.
//!
//! Descriptor slots are reused rather than freed; the sequence number embedded
//! in every marker lets helpers detect that a slot has moved on to a newer
//! operation, which defeats the ABA problem on reuse.

use crate::err::{NoThreadSlotAvailableError, RegisterError};
use crate::status::Status;
use crate::sync::{Arc, AtomicBool, AtomicUsize, Ordering};
use crate::types::{
    construct_descriptor_marker, construct_status_and_sequence, convert_thread_id_to_thread_index,
    convert_thread_index_to_thread_id, extract_sequence_from_marker,
    extract_sequence_from_status_and_sequence, extract_status_from_status_and_sequence,
    extract_thread_index_from_marker, is_descriptor_marker, is_plain_value, next_sequence,
    SequenceNum, StatusAndSequence, ThreadId, ThreadIndex, MAX_TARGET_NUM,
};
use self::install::{install, InstallError};

mod finalize;
mod install;

/// A structure containing all the information needed to perform a single CAS
/// within a multi-word operation.
///
/// `target` is the word whose value should be CASed. Values `expected` and
/// `desired` can be any usize, including a thin pointer, as long as the most
/// significant bit is 0; that bit is reserved for [DescriptorMarker]s. See
/// [is_plain_value].
///
/// [DescriptorMarker]: crate::types::DescriptorMarker
#[derive(Clone, Copy, Debug)]
pub struct MwCasTarget<'a> {
    target: &'a AtomicUsize,
    expected: usize,
    desired: usize,
}

impl<'a> MwCasTarget<'a> {
    pub fn new(target: &'a AtomicUsize, expected: usize, desired: usize) -> Self {
        Self {
            target,
            expected,
            desired,
        }
    }

    pub(crate) fn address(&self) -> usize {
        self.target as *const AtomicUsize as usize
    }
}

/// Holds descriptor state shared between all threads so that threads can help
/// each other's operations.
///
/// `POOL_SIZE` is the maximum number of threads allowed to perform MwCAS
/// operations at any given point in time. Memory allocation at initialization
/// grows linearly with `POOL_SIZE`; besides wasted memory, it is okay to
/// underutilize the slots.
///
/// Every operation may target up to [MAX_TARGET_NUM] words.
#[derive(Debug)]
pub struct DescriptorPool<const POOL_SIZE: usize> {
    /// Indicates whether a particular slot is currently assigned to a
    /// [MwCasHandle].
    pub(crate) thread_index_slots: [AtomicBool; POOL_SIZE],

    /// The target address of each entry of the current operation for each
    /// thread, stored as a usize.
    pub(crate) target_addresses: [[AtomicUsize; MAX_TARGET_NUM]; POOL_SIZE],

    /// The expected value of each entry of the current operation for each
    /// thread.
    pub(crate) expected_values: [[AtomicUsize; MAX_TARGET_NUM]; POOL_SIZE],

    /// The desired value of each entry of the current operation for each
    /// thread.
    pub(crate) desired_values: [[AtomicUsize; MAX_TARGET_NUM]; POOL_SIZE],

    /// The number of entries of the current operation for each thread.
    pub(crate) entry_counts: [AtomicUsize; POOL_SIZE],

    /// The packed [StatusAndSequence] of the current operation for each
    /// thread.
    pub(crate) status_and_sequences: [AtomicUsize; POOL_SIZE],
}

impl<const POOL_SIZE: usize> DescriptorPool<POOL_SIZE> {
    pub fn new() -> Self {
        Self {
            thread_index_slots: core::array::from_fn(|_| AtomicBool::new(false)),
            target_addresses: core::array::from_fn(|_| {
                core::array::from_fn(|_| AtomicUsize::new(0))
            }),
            expected_values: core::array::from_fn(|_| {
                core::array::from_fn(|_| AtomicUsize::new(0))
            }),
            desired_values: core::array::from_fn(|_| {
                core::array::from_fn(|_| AtomicUsize::new(0))
            }),
            entry_counts: core::array::from_fn(|_| AtomicUsize::new(0)),
            // slots start out at a terminal status with nothing installed
            status_and_sequences: core::array::from_fn(|_| {
                AtomicUsize::new(construct_status_and_sequence(Status::Failed, 0))
            }),
        }
    }

    /// Read the logical value of `target`, never returning an encoded
    /// descriptor reference.
    ///
    /// If the word currently holds a marker for an in-flight operation, that
    /// operation is helped to completion and the word is read again, so the
    /// returned value is always the plain value the winning operation left
    /// behind. Callers traversing pointer-linked structures must hold an
    /// epoch guard so the word itself cannot be freed mid-read.
    pub fn read(&self, target: &AtomicUsize) -> usize {
        loop {
            let value: usize = target.load(Ordering::SeqCst);
            if !is_descriptor_marker(value) {
                return value;
            }
            help_descriptor(self, value);
        }
    }
}

impl<const POOL_SIZE: usize> Default for DescriptorPool<POOL_SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

/// Help the operation behind `marker`, driving it to a terminal status.
///
/// Returns without effect when the marker's slot has already moved on to a
/// different sequence number, which means the marked operation finished.
pub(crate) fn help_descriptor<const POOL_SIZE: usize>(
    pool: &DescriptorPool<POOL_SIZE>,
    marker: usize,
) {
    let thread_index: ThreadIndex = extract_thread_index_from_marker::<POOL_SIZE>(marker);
    if thread_index >= POOL_SIZE {
        return;
    }
    let sequence: SequenceNum = extract_sequence_from_marker::<POOL_SIZE>(marker);
    let _ = drive(pool, thread_index, sequence);
}

/// Run the install/decide/finalize phases for the operation `sequence` owned
/// by `thread_index` until it reaches a terminal status.
///
/// Returns `None` if the slot's sequence number no longer matches, i.e. the
/// operation already finished and the slot was reused. Only helpers can
/// observe that; the owning thread is the only writer of its sequence.
pub(crate) fn drive<const POOL_SIZE: usize>(
    pool: &DescriptorPool<POOL_SIZE>,
    thread_index: ThreadIndex,
    sequence: SequenceNum,
) -> Option<Status> {
    loop {
        let status_and_sequence: StatusAndSequence =
            pool.status_and_sequences[thread_index].load(Ordering::SeqCst);
        if extract_sequence_from_status_and_sequence(status_and_sequence) != sequence {
            return None;
        }
        let status: Status = match extract_status_from_status_and_sequence(status_and_sequence) {
            Ok(status) => status,
            // the status field is only ever written through
            // construct_status_and_sequence
            Err(error) => unreachable!("corrupt descriptor status: {error}"),
        };

        match status {
            Status::Undecided => {
                let proposed: Status = match install(pool, thread_index, sequence) {
                    Ok(()) => Status::Succeeded,
                    Err(InstallError::ValueWasNotExpectedValue { .. }) => Status::Failed,
                    // another thread decided or the slot moved on; re-read
                    Err(InstallError::ConcurrentChange) => continue,
                };
                let current: StatusAndSequence =
                    construct_status_and_sequence(Status::Undecided, sequence);
                let desired: StatusAndSequence = construct_status_and_sequence(proposed, sequence);
                // the decision CAS is the linearization point; losing it just
                // means another helper decided first
                let _ = pool.status_and_sequences[thread_index].compare_exchange(
                    current,
                    desired,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
            }
            Status::Succeeded | Status::Failed => {
                finalize::finalize(pool, thread_index, sequence, status);
                return Some(status);
            }
        }
    }
}

/// A per-thread registration with a [DescriptorPool].
///
/// Each handle owns one descriptor slot and is designed to execute MwCAS
/// operations for exactly one thread at a time. Dropping the handle returns
/// the slot to the pool.
#[derive(Debug)]
pub struct MwCasHandle<const POOL_SIZE: usize> {
    pool: Arc<DescriptorPool<POOL_SIZE>>,
    thread_id: ThreadId,
}

impl<const POOL_SIZE: usize> MwCasHandle<POOL_SIZE> {
    /// Claim a descriptor slot of `pool`.
    pub fn register(pool: Arc<DescriptorPool<POOL_SIZE>>) -> Result<Self, RegisterError> {
        for thread_index in 0..POOL_SIZE {
            let cas_result: Result<bool, bool> = pool.thread_index_slots[thread_index]
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire);
            if cas_result.is_ok() {
                return Ok(Self {
                    pool,
                    thread_id: convert_thread_index_to_thread_id(thread_index),
                });
            }
        }
        Err(RegisterError::from(NoThreadSlotAvailableError))
    }

    /// Atomically compare-and-swap every word in `targets`.
    ///
    /// Returns `true` if every target word held its expected value and now
    /// holds its desired value, `false` if at least one word held something
    /// else, in which case no word was changed.
    ///
    /// # Panics
    ///
    /// Targets must be sorted by address, pairwise distinct, between 1 and
    /// [MAX_TARGET_NUM] in number, and carry plain values only. Violations
    /// are caller bugs and panic.
    pub fn mwcas(&mut self, targets: &[MwCasTarget<'_>]) -> bool {
        assert!(
            (1..=MAX_TARGET_NUM).contains(&targets.len()),
            "an MwCAS operation must have between 1 and {MAX_TARGET_NUM} targets"
        );
        let mut previous_address: Option<usize> = None;
        for target in targets {
            assert!(
                is_plain_value(target.expected) && is_plain_value(target.desired),
                "MwCAS values must leave the descriptor tag bit clear"
            );
            let address: usize = target.address();
            if let Some(previous) = previous_address {
                assert!(
                    address > previous,
                    "MwCAS targets must be sorted by address and pairwise distinct"
                );
            }
            previous_address = Some(address);
        }

        let thread_index: ThreadIndex = convert_thread_id_to_thread_index(self.thread_id);
        let pool: &DescriptorPool<POOL_SIZE> = self.pool.as_ref();
        let sequence: SequenceNum = initialize_operation(pool, thread_index, targets);

        match drive(pool, thread_index, sequence) {
            Some(status) => status == Status::Succeeded,
            // the owning thread is the only writer of its sequence number
            None => unreachable!("sequence advanced during an operation owned by this thread"),
        }
    }

    /// Read the logical value of `target` through the pool's protected-read
    /// path. See [DescriptorPool::read].
    pub fn read(&self, target: &AtomicUsize) -> usize {
        self.pool.read(target)
    }
}

impl<const POOL_SIZE: usize> Drop for MwCasHandle<POOL_SIZE> {
    fn drop(&mut self) {
        let thread_index: ThreadIndex = convert_thread_id_to_thread_index(self.thread_id);
        self.pool.thread_index_slots[thread_index].store(false, Ordering::Release);
    }
}

/// Publish information about this operation which may be needed by helping
/// threads into the shared pool, and stamp the slot `Undecided` under a fresh
/// sequence number.
///
/// Only the originating thread may perform this.
fn initialize_operation<const POOL_SIZE: usize>(
    pool: &DescriptorPool<POOL_SIZE>,
    thread_index: ThreadIndex,
    targets: &[MwCasTarget<'_>],
) -> SequenceNum {
    for (word_num, target) in targets.iter().enumerate() {
        pool.target_addresses[thread_index][word_num].store(target.address(), Ordering::Release);
        pool.expected_values[thread_index][word_num].store(target.expected, Ordering::Release);
        pool.desired_values[thread_index][word_num].store(target.desired, Ordering::Release);
    }
    pool.entry_counts[thread_index].store(targets.len(), Ordering::Release);

    let original: StatusAndSequence =
        pool.status_and_sequences[thread_index].load(Ordering::Acquire);
    let sequence: SequenceNum =
        next_sequence::<POOL_SIZE>(extract_sequence_from_status_and_sequence(original));

    // the SeqCst store publishes the entries above to any helper which
    // observes the new sequence
    pool.status_and_sequences[thread_index].store(
        construct_status_and_sequence(Status::Undecided, sequence),
        Ordering::SeqCst,
    );
    sequence
}

/// The marker this operation installs into its target words.
pub(crate) fn marker_for<const POOL_SIZE: usize>(
    thread_index: ThreadIndex,
    sequence: SequenceNum,
) -> usize {
    construct_descriptor_marker::<POOL_SIZE>(thread_index, sequence)
}
