//! Error types for snmp-usm.
//!
//! This module provides:
//!
//! - [`Error`] - The main error type (4 variants covering all failure modes)
//! - [`Result`] - Boxed result alias: `Result<T, Box<Error>>`
//!
//! The core performs no internal retries and swallows no errors; every
//! failure is returned to the immediate caller. Decode failures carry
//! minimal public detail; the specifics (offset, expected tag, and so on)
//! go to `tracing::debug!` under the `snmp_usm::*` targets.
//!
//! # Error Handling
//!
//! ```rust
//! use snmp_usm::{Error, Result};
//!
//! fn handle_error(result: Result<()>) {
//!     match result {
//!         Ok(()) => println!("Success"),
//!         Err(e) => match &*e {
//!             Error::Auth => println!("Message rejected: bad authentication code"),
//!             Error::Config(msg) => println!("Bad configuration: {}", msg),
//!             _ => println!("Error: {}", e),
//!         },
//!     }
//! }
//! ```

/// Result type alias using the library's boxed Error type.
pub type Result<T> = std::result::Result<T, Box<Error>>;

/// The main error type for all snmp-usm operations.
///
/// Errors are boxed (via [`Result`]) to keep the size small on the stack.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid security configuration.
    ///
    /// Raised eagerly at [`SecurityContext`](crate::SecurityContext)
    /// construction: unsupported security level, unknown protocol name,
    /// missing or out-of-range password, or an attempt to rebind the
    /// engine ID after localized keys have been derived.
    #[error("configuration error: {0}")]
    Config(Box<str>),

    /// Authentication code mismatch on an inbound message.
    ///
    /// Always fatal to that message; the message must be rejected, never
    /// silently accepted.
    #[error("invalid message authentication salt")]
    Auth,

    /// Malformed BER data, a bad privacy parameter, or a discovery reply
    /// missing required fields.
    ///
    /// Fatal to the current operation; the session layer decides whether
    /// to abort or retry the whole exchange.
    #[error("malformed message")]
    Malformed,

    /// Transport failure, surfaced unchanged from the transport
    /// collaborator during engine discovery.
    #[error("transport error: {source}")]
    Transport {
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Box this error (convenience for constructing boxed errors).
    pub fn boxed(self) -> Box<Self> {
        Box::new(self)
    }

    /// Construct a boxed configuration error.
    pub(crate) fn config(msg: impl Into<Box<str>>) -> Box<Self> {
        Self::Config(msg.into()).boxed()
    }
}

/// Decode failure detail, logged at debug level before the public
/// [`Error::Malformed`] is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DecodeErrorKind {
    TruncatedData,
    InsufficientData { needed: usize, available: usize },
    UnexpectedTag { expected: u8, actual: u8 },
    ZeroLengthInteger,
    IndefiniteLength,
    LengthTooLong { octets: usize },
    InvalidEngineBoots { value: i32 },
    InvalidEngineTime { value: i32 },
    EmptyEngineId,
    UnknownVersion { value: i32 },
    InvalidMsgFlags { value: u8 },
    InvalidSaltLength { expected: usize, actual: usize },
    CiphertextNotBlockAligned { length: usize },
}

impl std::fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TruncatedData => write!(f, "unexpected end of input"),
            Self::InsufficientData { needed, available } => {
                write!(f, "need {needed} bytes, {available} available")
            }
            Self::UnexpectedTag { expected, actual } => {
                write!(f, "expected tag {expected:#04x}, found {actual:#04x}")
            }
            Self::ZeroLengthInteger => write!(f, "zero-length integer"),
            Self::IndefiniteLength => write!(f, "indefinite length not supported"),
            Self::LengthTooLong { octets } => write!(f, "length uses {octets} octets"),
            Self::InvalidEngineBoots { value } => write!(f, "negative engine boots {value}"),
            Self::InvalidEngineTime { value } => write!(f, "negative engine time {value}"),
            Self::EmptyEngineId => write!(f, "empty engine id"),
            Self::UnknownVersion { value } => write!(f, "unknown message version {value}"),
            Self::InvalidMsgFlags { value } => write!(f, "invalid msgFlags {value:#04x}"),
            Self::InvalidSaltLength { expected, actual } => {
                write!(f, "salt must be {expected} bytes, got {actual}")
            }
            Self::CiphertextNotBlockAligned { length } => {
                write!(f, "ciphertext length {length} not a multiple of the block size")
            }
        }
    }
}
