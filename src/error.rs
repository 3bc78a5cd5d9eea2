use std::error::Error;
use std::fmt;
use std::fmt::Display;

use crate::SlotIndex;

/// This enum contains all error messages this library can return. Most API functions will generally return a [`Result<(), GarrisonError>`].
///
/// [`Result<(), GarrisonError>`]: std::result::Result
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GarrisonError {
    /// You made an invalid request, usually by using wrong parameters for function calls.
    InvalidRequest {
        /// Further specifies why the request was invalid.
        info: String,
    },
    /// An out-of-range slot index was provided. Slot indices must be below the
    /// total number of seats in the session.
    InvalidSlot {
        /// The slot index that was invalid.
        slot: SlotIndex,
        /// The number of seats in the session (game seats + spectator seats).
        num_slots: usize,
    },
    /// A host-only operation was attempted by a client session.
    NotHost {
        /// The operation that was attempted.
        operation: String,
    },
    /// Serialization or deserialization of a wire payload failed.
    SerializationError {
        /// A description of what failed to serialize/deserialize.
        context: String,
    },
    /// The host was asked for a file it previously advertised but can no longer
    /// open. The session cannot continue: every joiner depends on that data.
    /// A host-dropped notice has already been broadcast when this is returned.
    HostedFileUnavailable {
        /// The advertised file name.
        name: String,
    },
    /// An internal error occurred that should not happen under normal operation.
    /// If you encounter this error, please report it as a bug.
    InternalError {
        /// A description of the internal error.
        context: String,
    },
}

impl GarrisonError {
    /// Returns `true` if this error is fatal to the session.
    ///
    /// Only [`GarrisonError::HostedFileUnavailable`] is fatal; every other
    /// error leaves the session in a usable state.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, GarrisonError::HostedFileUnavailable { .. })
    }
}

impl Display for GarrisonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GarrisonError::InvalidRequest { info } => {
                write!(f, "Invalid Request: {}", info)
            }
            GarrisonError::InvalidSlot { slot, num_slots } => {
                write!(
                    f,
                    "Invalid slot index {}: must be less than {}",
                    slot, num_slots
                )
            }
            GarrisonError::NotHost { operation } => {
                write!(
                    f,
                    "Host-only operation '{}' attempted by a non-host session",
                    operation
                )
            }
            GarrisonError::SerializationError { context } => {
                write!(f, "Serialization error: {}", context)
            }
            GarrisonError::HostedFileUnavailable { name } => {
                write!(
                    f,
                    "Hosted file '{}' could not be opened for sending; the session cannot continue",
                    name
                )
            }
            GarrisonError::InternalError { context } => {
                write!(f, "Internal error (please report as bug): {}", context)
            }
        }
    }
}

impl Error for GarrisonError {}

/// Convenience alias for results returned by this library.
pub type GarrisonResult<T> = Result<T, GarrisonError>;

impl From<crate::network::codec::CodecError> for GarrisonError {
    fn from(err: crate::network::codec::CodecError) -> Self {
        GarrisonError::SerializationError {
            context: err.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn display_contains_context() {
        let err = GarrisonError::InvalidSlot {
            slot: SlotIndex::new(9),
            num_slots: 4,
        };
        let text = err.to_string();
        assert!(text.contains('9'));
        assert!(text.contains('4'));

        let err = GarrisonError::NotHost {
            operation: "kick".to_owned(),
        };
        assert!(err.to_string().contains("kick"));
    }

    #[test]
    fn only_hosted_file_failure_is_fatal() {
        assert!(GarrisonError::HostedFileUnavailable {
            name: "canyon.map".to_owned()
        }
        .is_fatal());
        assert!(!GarrisonError::InvalidRequest {
            info: "x".to_owned()
        }
        .is_fatal());
        assert!(!GarrisonError::NotHost {
            operation: "kick".to_owned()
        }
        .is_fatal());
    }

    #[test]
    fn error_is_std_error() {
        fn takes_error(_: &dyn Error) {}
        let err = GarrisonError::InternalError {
            context: "test".to_owned(),
        };
        takes_error(&err);
    }
}
