use displaydoc::Display;

/// All thread slots of the shared state are already claimed.
#[derive(Debug, Display, Eq, PartialEq)]
pub struct NoThreadSlotAvailableError;

/// Errors which can occur while registering a per-thread handle.
#[derive(Debug, Display, Eq, PartialEq)]
pub enum RegisterError {
    /** Could not register a handle because all thread slots of the shared
       state are already claimed.
    */
    NoThreadSlotAvailable(NoThreadSlotAvailableError),
}

impl From<NoThreadSlotAvailableError> for RegisterError {
    fn from(error: NoThreadSlotAvailableError) -> Self {
        Self::NoThreadSlotAvailable(error)
    }
}

/// Tried to parse {0} as a status, but it does not correlate to a valid status.
#[derive(Debug, Display, Eq, PartialEq)]
pub(crate) struct StatusOutOfBoundsError(pub(crate) usize);
