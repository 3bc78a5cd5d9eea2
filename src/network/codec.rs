//! Binary codec for wire payloads.
//!
//! Every payload struct in [`messages`](crate::network::messages) is encoded
//! and decoded through this module so the bincode configuration is defined
//! exactly once. The configuration uses fixed-size integer encoding: payload
//! layouts stay byte-stable across releases, which the frozen kind bytes
//! promise and which replay files depend on.
//!
//! # Examples
//!
//! ```
//! use garrison_lockstep::network::codec::{decode_value, encode};
//! use garrison_lockstep::network::messages::PingPayload;
//!
//! let probe = PingPayload { echo: false };
//! let bytes = encode(&probe).expect("encoding should succeed");
//! let decoded: PingPayload = decode_value(&bytes).expect("decoding should succeed");
//! assert_eq!(probe, decoded);
//! ```

use serde::{de::DeserializeOwned, Serialize};
use std::fmt;

// Fixed-size integers keep encoded sizes independent of the values inside,
// so a payload's wire layout never shifts between peers or versions.
fn config() -> impl bincode::config::Config {
    bincode::config::standard().with_fixed_int_encoding()
}

/// Errors that can occur during encoding or decoding.
///
/// The underlying bincode errors are opaque and only expose human-readable
/// messages, so the message is carried as a `String`. Codec failures are
/// exceptional (a malformed or truncated payload from a peer), never a hot
/// path, so the allocation does not matter.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CodecError {
    /// The encoding operation failed.
    EncodeError {
        /// The underlying bincode error message.
        message: String,
    },
    /// The decoding operation failed.
    DecodeError {
        /// The underlying bincode error message.
        message: String,
    },
}

impl CodecError {
    /// Creates a new encode error with the given message.
    pub fn encode(message: impl Into<String>) -> Self {
        Self::EncodeError {
            message: message.into(),
        }
    }

    /// Creates a new decode error with the given message.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::DecodeError {
            message: message.into(),
        }
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EncodeError { message } => {
                write!(f, "encoding failed: {message}")
            },
            Self::DecodeError { message } => {
                write!(f, "decoding failed: {message}")
            },
        }
    }
}

impl std::error::Error for CodecError {}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Encodes a value into a new `Vec<u8>`.
///
/// # Examples
///
/// ```
/// use garrison_lockstep::network::codec::encode;
///
/// let data: u32 = 42;
/// let bytes = encode(&data).expect("encoding should succeed");
/// assert!(!bytes.is_empty());
/// ```
pub fn encode<T: Serialize>(value: &T) -> CodecResult<Vec<u8>> {
    bincode::serde::encode_to_vec(value, config()).map_err(|e| CodecError::encode(e.to_string()))
}

/// Decodes a value from a byte slice.
///
/// Returns the decoded value and the number of bytes consumed.
///
/// # Examples
///
/// ```
/// use garrison_lockstep::network::codec::{decode, encode};
///
/// let original: u32 = 42;
/// let bytes = encode(&original).expect("encoding should succeed");
/// let (decoded, bytes_read): (u32, _) = decode(&bytes).expect("decoding should succeed");
/// assert_eq!(original, decoded);
/// assert_eq!(bytes_read, bytes.len());
/// ```
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<(T, usize)> {
    bincode::serde::decode_from_slice(bytes, config()).map_err(|e| CodecError::decode(e.to_string()))
}

/// Decodes a value from a byte slice, ignoring the bytes consumed.
///
/// # Examples
///
/// ```
/// use garrison_lockstep::network::codec::{decode_value, encode};
///
/// let original: u32 = 42;
/// let bytes = encode(&original).expect("encoding should succeed");
/// let decoded: u32 = decode_value(&bytes).expect("decoding should succeed");
/// assert_eq!(original, decoded);
/// ```
pub fn decode_value<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    decode(bytes).map(|(value, _)| value)
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::network::messages::{ChatPayload, KickPayload};
    use crate::LeaveReason;

    #[test]
    fn test_encode_decode_roundtrip_primitive() {
        let original: u32 = 12345;
        let bytes = encode(&original).unwrap();
        let (decoded, len): (u32, _) = decode(&bytes).unwrap();
        assert_eq!(original, decoded);
        assert_eq!(len, bytes.len());
    }

    #[test]
    fn test_encode_decode_roundtrip_payload() {
        let original = KickPayload {
            slot: 3,
            reason: "Unauthorized network command".to_owned(),
            code: LeaveReason::Invalid,
        };
        let bytes = encode(&original).unwrap();
        let (decoded, _): (KickPayload, _) = decode(&bytes).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_decode_value_convenience() {
        let original: u32 = 42;
        let bytes = encode(&original).unwrap();
        let decoded: u32 = decode_value(&bytes).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_decode_invalid_data() {
        // A truncated chat payload: the length prefix promises more bytes
        // than exist.
        let invalid_bytes = [0xFF, 0xFF, 0xFF];
        let result: CodecResult<(ChatPayload, _)> = decode(&invalid_bytes);
        assert!(result.is_err());
    }

    #[test]
    fn test_codec_error_display() {
        let err = CodecError::encode("test error");
        assert!(err.to_string().contains("encoding failed"));
        assert!(err.to_string().contains("test error"));

        let err = CodecError::decode("test error");
        assert!(err.to_string().contains("decoding failed"));
    }

    #[test]
    fn test_codec_error_equality() {
        let err1 = CodecError::encode("test");
        let err2 = CodecError::encode("test");
        let err3 = CodecError::encode("different");
        let err4 = CodecError::decode("test");

        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
        assert_ne!(err1, err4);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let msg = ChatPayload {
            sender: 2,
            team_only: true,
            text: "push north".to_owned(),
        };
        let bytes1 = encode(&msg).unwrap();
        let bytes2 = encode(&msg).unwrap();
        assert_eq!(
            bytes1, bytes2,
            "the same payload must encode identically on every peer"
        );
    }

    #[test]
    fn test_fixed_int_encoding_is_size_stable() {
        // Fixed-int encoding: a u32 is always four bytes no matter its value.
        let small = encode(&1u32).unwrap();
        let large = encode(&u32::MAX).unwrap();
        assert_eq!(small.len(), large.len());
        assert_eq!(small.len(), 4);
    }
}
