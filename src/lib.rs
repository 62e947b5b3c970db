//! # snmp-usm
//!
//! User-based Security Model (USM) for SNMPv3, as defined in RFC 3414:
//!
//! - Password-to-key derivation (1MB expansion + hash) and key
//!   localization to an authoritative engine
//! - Message authentication (HMAC-MD5-96, HMAC-SHA-96)
//! - Privacy (DES-CBC per RFC 3414, AES-128-CFB per RFC 3826)
//! - Engine discovery (the unauthenticated probe that learns a remote
//!   engine's ID, boot counter, and time)
//!
//! This crate is the security core of an SNMPv3 client: the PDU object
//! model, the transport, and the session lifecycle are collaborators that
//! hand byte streams in and out. A [`SecurityContext`] owns one user's
//! credentials and derived keys for one remote engine and frames every
//! outbound and inbound payload.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use snmp_usm::{AuthProtocol, SecurityContext, SecurityLevel};
//!
//! fn main() -> Result<(), Box<snmp_usm::Error>> {
//!     let engine_id = [0x80, 0x00, 0x00, 0x00, 0x01, 0x02, 0x03, 0x04];
//!
//!     let context = SecurityContext::builder("alice")
//!         .security_level(SecurityLevel::AuthNoPriv)
//!         .auth(AuthProtocol::Md5, "password123")
//!         .engine_id(engine_id.to_vec())
//!         .build()?;
//!
//!     let message = b"serialized message with zeroed auth params";
//!     let code = context.sign(message)?.expect("authenticated context");
//!     context.verify(message, &code)?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Engine Discovery
//!
//! A context at [`SecurityLevel::NoAuthNoPriv`] needs no credentials and
//! exists to run [`discovery::discover`]; the discovered engine ID is then
//! bound into the fully-credentialed context before any authenticated or
//! encrypted traffic:
//!
//! ```rust,no_run
//! use snmp_usm::discovery::{self, Transport};
//! use snmp_usm::{AuthProtocol, PrivProtocol, SecurityContext};
//!
//! fn run(transport: &mut impl Transport) -> Result<(), Box<snmp_usm::Error>> {
//!     let probe_ctx = SecurityContext::builder("alice").build()?;
//!     let engine = discovery::discover(transport, &probe_ctx, 0x1234)?;
//!
//!     let context = SecurityContext::builder("alice")
//!         .auth(AuthProtocol::Md5, "password123")
//!         .privacy(PrivProtocol::Des, "privpass456")
//!         .engine_id(engine.engine_id.clone())
//!         .build()?;
//!
//!     let _ = (context, engine.engine_boots, engine.engine_time);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod ber;
pub mod context;
pub mod discovery;
pub mod error;
pub mod privacy;
pub mod usm;

#[cfg(test)]
pub(crate) mod util;

pub use auth::{LocalizedKey, MasterKey};
pub use context::{SecurityContext, SecurityContextBuilder};
pub use discovery::{DiscoveredEngine, Transport};
pub use error::{Error, Result};
pub use privacy::{PrivKey, SaltCounter};
pub use usm::UsmSecurityParams;

/// SNMPv3 security level.
///
/// The variants are ordered from least secure to most secure, so level
/// requirements can be expressed as comparisons (e.g. `level >= AuthNoPriv`).
/// The wire values are 0, 1, and 3; there is no level 2 (privacy without
/// authentication is not a valid combination).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SecurityLevel {
    /// No authentication, no privacy
    NoAuthNoPriv,
    /// Authentication only
    AuthNoPriv,
    /// Authentication and privacy (encryption)
    AuthPriv,
}

impl SecurityLevel {
    /// Create from the numeric wire value (0, 1, or 3).
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::NoAuthNoPriv),
            1 => Some(Self::AuthNoPriv),
            3 => Some(Self::AuthPriv),
            _ => None,
        }
    }

    /// Get the numeric wire value.
    pub fn as_i32(self) -> i32 {
        match self {
            Self::NoAuthNoPriv => 0,
            Self::AuthNoPriv => 1,
            Self::AuthPriv => 3,
        }
    }

    /// Check if authentication is required.
    pub fn requires_auth(self) -> bool {
        matches!(self, Self::AuthNoPriv | Self::AuthPriv)
    }

    /// Check if privacy (encryption) is required.
    pub fn requires_priv(self) -> bool {
        matches!(self, Self::AuthPriv)
    }
}

impl std::fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAuthNoPriv => write!(f, "noAuthNoPriv"),
            Self::AuthNoPriv => write!(f, "authNoPriv"),
            Self::AuthPriv => write!(f, "authPriv"),
        }
    }
}

/// Error returned when parsing a security level name fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSecurityLevelError {
    input: String,
}

impl std::fmt::Display for ParseSecurityLevelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unknown security level '{}'; expected one of: noAuthNoPriv, authNoPriv, authPriv",
            self.input
        )
    }
}

impl std::error::Error for ParseSecurityLevelError {}

impl std::str::FromStr for SecurityLevel {
    type Err = ParseSecurityLevelError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "noauthnopriv" | "no_auth_no_priv" | "no_auth" | "noauth" => Ok(Self::NoAuthNoPriv),
            "authnopriv" | "auth_no_priv" => Ok(Self::AuthNoPriv),
            "authpriv" | "auth_priv" => Ok(Self::AuthPriv),
            _ => Err(ParseSecurityLevelError {
                input: s.to_string(),
            }),
        }
    }
}

/// Error returned when parsing a protocol name fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseProtocolError {
    input: String,
    kind: ProtocolKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProtocolKind {
    Auth,
    Priv,
}

impl std::fmt::Display for ParseProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ProtocolKind::Auth => write!(
                f,
                "unknown authentication protocol '{}'; expected one of: MD5, SHA",
                self.input
            ),
            ProtocolKind::Priv => write!(
                f,
                "unknown privacy protocol '{}'; expected one of: DES, AES",
                self.input
            ),
        }
    }
}

impl std::error::Error for ParseProtocolError {}

/// Authentication protocol identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthProtocol {
    /// HMAC-MD5-96 (RFC 3414)
    Md5,
    /// HMAC-SHA-96 (RFC 3414)
    Sha1,
}

impl std::fmt::Display for AuthProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Md5 => write!(f, "MD5"),
            Self::Sha1 => write!(f, "SHA"),
        }
    }
}

impl std::str::FromStr for AuthProtocol {
    type Err = ParseProtocolError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MD5" => Ok(Self::Md5),
            "SHA" | "SHA1" | "SHA-1" => Ok(Self::Sha1),
            _ => Err(ParseProtocolError {
                input: s.to_string(),
                kind: ProtocolKind::Auth,
            }),
        }
    }
}

impl AuthProtocol {
    /// Get the digest output length in bytes.
    ///
    /// This is also the length of keys produced by password-to-key
    /// derivation and localization.
    pub fn digest_len(self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
        }
    }

    /// Get the truncated MAC length for authentication parameters.
    ///
    /// Both RFC 3414 protocols emit a 96-bit code regardless of the
    /// underlying digest's native length.
    pub fn mac_len(self) -> usize {
        12
    }
}

/// Privacy protocol identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivProtocol {
    /// DES-CBC (RFC 3414)
    Des,
    /// AES-128-CFB (RFC 3826)
    Aes,
}

impl std::fmt::Display for PrivProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Des => write!(f, "DES"),
            Self::Aes => write!(f, "AES"),
        }
    }
}

impl std::str::FromStr for PrivProtocol {
    type Err = ParseProtocolError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DES" => Ok(Self::Des),
            "AES" | "AES128" | "AES-128" => Ok(Self::Aes),
            _ => Err(ParseProtocolError {
                input: s.to_string(),
                kind: ProtocolKind::Priv,
            }),
        }
    }
}

impl PrivProtocol {
    /// Get the localized key length in bytes.
    pub fn key_len(self) -> usize {
        match self {
            Self::Des => 16, // 8 key + 8 pre-IV
            Self::Aes => 16,
        }
    }

    /// Get the salt (privParameters) length in bytes.
    pub fn salt_len(self) -> usize {
        8
    }
}
