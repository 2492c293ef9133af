use crate::mwcas::{marker_for, DescriptorPool};
use crate::status::Status;
use crate::sync::{AtomicUsize, Ordering};
use crate::types::{SequenceNum, ThreadIndex, WordNum, MAX_TARGET_NUM};

/// Replace every installed marker of the decided operation `sequence` with
/// its terminal value: the desired value after `Succeeded`, the original
/// expected value after `Failed`.
///
/// This phase is idempotent and may run concurrently in any number of
/// helpers; a word whose marker was already replaced simply fails its CAS.
pub(super) fn finalize<const POOL_SIZE: usize>(
    pool: &DescriptorPool<POOL_SIZE>,
    thread_index: ThreadIndex,
    sequence: SequenceNum,
    status: Status,
) {
    let marker: usize = marker_for::<POOL_SIZE>(thread_index, sequence);
    let entry_count: usize = pool.entry_counts[thread_index].load(Ordering::Acquire);

    match status {
        Status::Succeeded => {
            for word_num in 0..entry_count {
                replace_marker(pool, thread_index, word_num, marker, &pool.desired_values);
            }
        }
        Status::Failed => {
            // walk backwards so a failed install is unwound in the reverse of
            // the order it claimed words
            for word_num in (0..entry_count).rev() {
                replace_marker(pool, thread_index, word_num, marker, &pool.expected_values);
            }
        }
        Status::Undecided => unreachable!("finalize called before a decision was made"),
    }
}

fn replace_marker<const POOL_SIZE: usize>(
    pool: &DescriptorPool<POOL_SIZE>,
    thread_index: ThreadIndex,
    word_num: WordNum,
    marker: usize,
    values: &[[AtomicUsize; MAX_TARGET_NUM]; POOL_SIZE],
) {
    let target_address: usize =
        pool.target_addresses[thread_index][word_num].load(Ordering::Acquire);
    let Some(target) = (unsafe { (target_address as *const AtomicUsize).as_ref() }) else {
        return;
    };
    let value: usize = values[thread_index][word_num].load(Ordering::Acquire);

    // even if this word does not contain the marker, keep going with the rest
    let _ = target.compare_exchange(marker, value, Ordering::AcqRel, Ordering::Acquire);
}
