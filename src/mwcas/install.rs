use crate::mwcas::{help_descriptor, marker_for, DescriptorPool};
use crate::status::Status;
use crate::sync::{AtomicUsize, Ordering};
use crate::types::{
    extract_sequence_from_status_and_sequence, extract_status_from_status_and_sequence,
    is_descriptor_marker, SequenceNum, StatusAndSequence, ThreadIndex, WordNum,
};
use displaydoc::Display;

#[derive(Debug, Display)]
pub(super) enum InstallError {
    /// Word {word_num} held {actual_value} instead of its expected value.
    ValueWasNotExpectedValue {
        word_num: WordNum,
        actual_value: usize,
    },
    /** The operation's status or sequence was changed by another thread while
       installing.
    */
    ConcurrentChange,
}

/// Claim every target word of the operation `sequence` owned by
/// `thread_index` by installing its [DescriptorMarker] in address order.
///
/// Entries must be pre-sorted by address; that total order guarantees that
/// two operations helping each other can never deadlock through cyclic
/// helping.
///
/// [DescriptorMarker]: crate::types::DescriptorMarker
pub(super) fn install<const POOL_SIZE: usize>(
    pool: &DescriptorPool<POOL_SIZE>,
    thread_index: ThreadIndex,
    sequence: SequenceNum,
) -> Result<(), InstallError> {
    let marker: usize = marker_for::<POOL_SIZE>(thread_index, sequence);
    let entry_count: usize = pool.entry_counts[thread_index].load(Ordering::Acquire);

    let mut word_num: WordNum = 0;
    while word_num < entry_count {
        let target_address: usize =
            pool.target_addresses[thread_index][word_num].load(Ordering::Acquire);
        let Some(target) = (unsafe { (target_address as *const AtomicUsize).as_ref() }) else {
            // the entries were already overwritten by a newer operation
            return Err(InstallError::ConcurrentChange);
        };
        let expected: usize = pool.expected_values[thread_index][word_num].load(Ordering::Acquire);

        match target.compare_exchange(expected, marker, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => {
                word_num += 1;
            }
            Err(actual_value) => {
                if actual_value == marker {
                    // another helper installed this word already
                    word_num += 1;
                    continue;
                }

                verify_status_and_sequence(pool, thread_index, sequence)?;

                if is_descriptor_marker(actual_value) {
                    // help the other operation finish, then retry this word
                    help_descriptor(pool, actual_value);
                    continue;
                }

                return Err(InstallError::ValueWasNotExpectedValue {
                    word_num,
                    actual_value,
                });
            }
        }
    }
    Ok(())
}

/// Confirm the operation is still `Undecided` under the sequence number the
/// caller is working on. Installing on behalf of a decided or finished
/// operation would clobber unrelated values.
fn verify_status_and_sequence<const POOL_SIZE: usize>(
    pool: &DescriptorPool<POOL_SIZE>,
    thread_index: ThreadIndex,
    sequence: SequenceNum,
) -> Result<(), InstallError> {
    let status_and_sequence: StatusAndSequence =
        pool.status_and_sequences[thread_index].load(Ordering::SeqCst);
    if extract_sequence_from_status_and_sequence(status_and_sequence) != sequence {
        return Err(InstallError::ConcurrentChange);
    }
    match extract_status_from_status_and_sequence(status_and_sequence) {
        Ok(Status::Undecided) => Ok(()),
        Ok(_) => Err(InstallError::ConcurrentChange),
        Err(error) => unreachable!("corrupt descriptor status: {error}"),
    }
}
