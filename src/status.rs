use crate::err::StatusOutOfBoundsError;
use core::fmt::{Display, Formatter};

/// The status of an in-flight or finished MwCAS descriptor.
///
/// A descriptor starts out `Undecided`. Exactly one thread - the originating
/// thread or a helper - wins the CAS which moves it to `Succeeded` or
/// `Failed`. Both of those states are terminal: once decided, the decision
/// never changes for that operation, and the slot is only reused after the
/// owning thread advances its sequence number.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Status {
    /// The operation is still installing its entries; the outcome is open.
    Undecided = 0,
    /// Every entry was installed; finalization writes the desired values.
    Succeeded = 1,
    /// An entry held an unexpected value; finalization restores the expected
    /// values of any entries which were already installed.
    Failed = 2,
}

/// The total number of bits a [Status] takes up. Status has 3 possible
/// values, which fit in 2 bits.
pub(crate) const STATUS_BIT_LENGTH: usize = 2;

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl TryFrom<usize> for Status {
    type Error = StatusOutOfBoundsError;

    fn try_from(status: usize) -> Result<Self, StatusOutOfBoundsError> {
        match status {
            i if i == Status::Undecided as usize => Ok(Status::Undecided),
            i if i == Status::Succeeded as usize => Ok(Status::Succeeded),
            i if i == Status::Failed as usize => Ok(Status::Failed),
            i => Err(StatusOutOfBoundsError(i)),
        }
    }
}
