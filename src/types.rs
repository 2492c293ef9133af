use crate::err::StatusOutOfBoundsError;
use crate::status::{Status, STATUS_BIT_LENGTH};

/// A monotonically increasing counter identifying a single MwCAS operation
/// owned by a descriptor slot.
///
/// Only equality matters for sequence numbers, so as long as care is taken to
/// wrap the counter around, the number of bits allocated to it does not bound
/// the number of possible operations.
pub(crate) type SequenceNum = usize;

/// An identifier for a thread which performs MwCAS operations.
///
/// ThreadIds are assigned incrementally starting from 1.
pub(crate) type ThreadId = usize;

/// A zero-based index into the descriptor pool's per-thread slots.
pub(crate) type ThreadIndex = usize;

/// A zero-based index of one entry within a descriptor.
pub(crate) type WordNum = usize;

/// A usize which combines a [Status] in the [STATUS_BIT_LENGTH] most
/// significant bits and a [SequenceNum] in the remaining bits. This allows us
/// to CAS both pieces of information in one operation.
pub(crate) type StatusAndSequence = usize;

/// A usize stored in a target word while an MwCAS operation is claiming it.
///
/// The most significant bit is the descriptor tag. The next bits hold the
/// descriptor's pool index and the remaining bits hold the operation's
/// sequence number, which differentiates an in-flight operation from an
/// earlier, finished operation that used the same pool slot.
pub(crate) type DescriptorMarker = usize;

/// The maximum number of target words a single MwCAS operation may contain.
pub const MAX_TARGET_NUM: usize = 8;

/// The number of descriptor slots the benchmark driver reserves; also the
/// upper bound on `num_thread`.
pub const MAX_THREAD_NUM: usize = 64;

/// The most significant bit of a word distinguishes descriptor markers from
/// plain values.
pub(crate) const DESCRIPTOR_TAG: usize = 1 << (usize::BITS - 1);

pub(crate) fn convert_thread_id_to_thread_index(thread_id: ThreadId) -> ThreadIndex {
    thread_id - 1
}

pub(crate) fn convert_thread_index_to_thread_id(thread_index: ThreadIndex) -> ThreadId {
    thread_index + 1
}

/// The number of bits needed to represent `number`. For example, 64 can be
/// represented in binary as 1000000, which is 7 bits long.
pub(crate) const fn get_bit_length(number: usize) -> usize {
    (usize::BITS - number.leading_zeros()) as usize
}

/// The number of value bits reserved by this library for descriptor markers.
///
/// Plain values stored in MwCAS target words must fit in the remaining bits;
/// see [is_plain_value].
pub const fn get_bit_length_of_pool_size<const POOL_SIZE: usize>() -> usize {
    // one tag bit plus the pool index
    1 + get_bit_length(POOL_SIZE)
}

const fn get_sequence_bit_length<const POOL_SIZE: usize>() -> usize {
    usize::BITS as usize - get_bit_length_of_pool_size::<POOL_SIZE>()
}

pub(crate) const fn get_sequence_mask_for_marker<const POOL_SIZE: usize>() -> usize {
    (1 << get_sequence_bit_length::<POOL_SIZE>()) - 1
}

/// Advance a sequence number, wrapping within the bits available to a
/// [DescriptorMarker].
pub(crate) const fn next_sequence<const POOL_SIZE: usize>(sequence: SequenceNum) -> SequenceNum {
    (sequence + 1) & get_sequence_mask_for_marker::<POOL_SIZE>()
}

/// Whether `value` is an encoded descriptor reference rather than a plain
/// value.
pub fn is_descriptor_marker(value: usize) -> bool {
    value & DESCRIPTOR_TAG != 0
}

/// Whether `value` may be stored in an MwCAS target word.
///
/// Values with the most significant bit set are reserved for descriptor
/// markers. This makes the library unsuitable for values which must take up
/// all bits of a usize, but leaves the full canonical pointer range and any
/// 63-bit counter usable.
pub fn is_plain_value(value: usize) -> bool {
    !is_descriptor_marker(value)
}

pub(crate) fn construct_descriptor_marker<const POOL_SIZE: usize>(
    thread_index: ThreadIndex,
    sequence: SequenceNum,
) -> DescriptorMarker {
    let sequence_bit_length: usize = get_sequence_bit_length::<POOL_SIZE>();
    DESCRIPTOR_TAG
        | (thread_index << sequence_bit_length)
        | (sequence & get_sequence_mask_for_marker::<POOL_SIZE>())
}

pub(crate) fn extract_thread_index_from_marker<const POOL_SIZE: usize>(
    marker: DescriptorMarker,
) -> ThreadIndex {
    (marker & !DESCRIPTOR_TAG) >> get_sequence_bit_length::<POOL_SIZE>()
}

pub(crate) fn extract_sequence_from_marker<const POOL_SIZE: usize>(
    marker: DescriptorMarker,
) -> SequenceNum {
    marker & get_sequence_mask_for_marker::<POOL_SIZE>()
}

const STATUS_SHIFT: usize = usize::BITS as usize - STATUS_BIT_LENGTH;
const STATUS_SEQUENCE_MASK: usize = (1 << STATUS_SHIFT) - 1;

pub(crate) fn construct_status_and_sequence(
    status: Status,
    sequence: SequenceNum,
) -> StatusAndSequence {
    ((status as usize) << STATUS_SHIFT) | (sequence & STATUS_SEQUENCE_MASK)
}

pub(crate) fn extract_status_from_status_and_sequence(
    status_and_sequence: StatusAndSequence,
) -> Result<Status, StatusOutOfBoundsError> {
    Status::try_from(status_and_sequence >> STATUS_SHIFT)
}

pub(crate) fn extract_sequence_from_status_and_sequence(
    status_and_sequence: StatusAndSequence,
) -> SequenceNum {
    status_and_sequence & STATUS_SEQUENCE_MASK
}
