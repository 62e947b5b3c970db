//! Authentication key derivation and HMAC operations (RFC 3414).
//!
//! This module implements:
//! - Password-to-key derivation (1MB expansion + hash)
//! - Key localization (binding a key to an engine ID)
//! - HMAC-96 message authentication

use digest::{Digest, KeyInit, Mac};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::AuthProtocol;

/// Minimum password length (RFC 3414; also enforced by net-snmp).
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum password length accepted by the security context.
pub const MAX_PASSWORD_LENGTH: usize = 32;

/// Authentication code length in bytes (HMAC-96).
pub const MAC_LEN: usize = 12;

const EXPANSION_SIZE: usize = 1_048_576; // 1MB

/// A password-derived master key, not yet bound to any engine.
///
/// Deriving a master key is the expensive step (~1MB hashed per password);
/// it depends only on the password and digest, so it is computed at most
/// once per password and reused across engines via
/// [`localize`](Self::localize).
///
/// # Security
///
/// Key material is zeroed from memory when the key is dropped, using the
/// `zeroize` crate.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: Vec<u8>,
    #[zeroize(skip)]
    protocol: AuthProtocol,
}

impl MasterKey {
    /// Derive a master key from a password (RFC 3414 Section A.2).
    ///
    /// The password is conceptually repeated into a 1MB stream which is
    /// digested in 64-byte windows. The iteration count is fixed by the
    /// protocol and deliberately slow, to raise the cost of offline
    /// password guessing; it must not be shortened.
    pub fn from_password(protocol: AuthProtocol, password: &[u8]) -> Self {
        if password.len() < MIN_PASSWORD_LENGTH {
            tracing::warn!(
                password_len = password.len(),
                min_len = MIN_PASSWORD_LENGTH,
                "password is shorter than the recommended minimum"
            );
        }
        let key = match protocol {
            AuthProtocol::Md5 => password_to_key_impl::<md5::Md5>(password),
            AuthProtocol::Sha1 => password_to_key_impl::<sha1::Sha1>(password),
        };
        Self { key, protocol }
    }

    /// Localize this key to an engine (RFC 3414 Section A.2).
    ///
    /// Computes `H(key || engine_id || key)`, binding the password-derived
    /// key to one specific engine: the same password yields different
    /// localized keys for different engines. Pure; callers cache the
    /// result.
    pub fn localize(&self, engine_id: &[u8]) -> LocalizedKey {
        let key = match self.protocol {
            AuthProtocol::Md5 => localize_key_impl::<md5::Md5>(&self.key, engine_id),
            AuthProtocol::Sha1 => localize_key_impl::<sha1::Sha1>(&self.key, engine_id),
        };
        LocalizedKey {
            key,
            protocol: self.protocol,
        }
    }

    /// Get the protocol this key is for.
    pub fn protocol(&self) -> AuthProtocol {
        self.protocol
    }

    /// Get the raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("protocol", &self.protocol)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// A localized authentication key, bound to a specific engine ID.
///
/// This is the key used to sign and verify messages to/from that engine.
///
/// # Security
///
/// Key material is zeroed from memory when the key is dropped, using the
/// `zeroize` crate.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct LocalizedKey {
    key: Vec<u8>,
    #[zeroize(skip)]
    protocol: AuthProtocol,
}

impl LocalizedKey {
    /// Derive a localized key from a password and engine ID in one step.
    pub fn from_password(protocol: AuthProtocol, password: &[u8], engine_id: &[u8]) -> Self {
        MasterKey::from_password(protocol, password).localize(engine_id)
    }

    /// Create a localized key from raw bytes.
    ///
    /// Use this if you already have a localized key (e.g., from
    /// configuration).
    pub fn from_bytes(protocol: AuthProtocol, key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            protocol,
        }
    }

    /// Get the protocol this key is for.
    pub fn protocol(&self) -> AuthProtocol {
        self.protocol
    }

    /// Get the raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    /// Sign a message, returning the 12-byte authentication code.
    ///
    /// The construction is the HMAC-96 of RFC 3414 Section 6/7: the key is
    /// zero-extended to the digest's 64-byte block, XORed with the 0x36 and
    /// 0x5c pads, the message digested under the inner key, that digest
    /// digested under the outer key, and the result truncated to 12 bytes
    /// regardless of the digest's native output length.
    pub fn sign(&self, message: &[u8]) -> [u8; MAC_LEN] {
        match self.protocol {
            AuthProtocol::Md5 => hmac_96::<hmac::Hmac<md5::Md5>>(&self.key, message),
            AuthProtocol::Sha1 => hmac_96::<hmac::Hmac<sha1::Sha1>>(&self.key, message),
        }
    }

    /// Verify an authentication code.
    ///
    /// Returns `true` only when `presented` equals the recomputed code
    /// byte-for-byte. The comparison is constant-time.
    pub fn verify(&self, message: &[u8], presented: &[u8]) -> bool {
        let computed = self.sign(message);
        if presented.len() != computed.len() {
            return false;
        }
        let mut diff = 0u8;
        for (a, b) in computed.iter().zip(presented.iter()) {
            diff |= a ^ b;
        }
        diff == 0
    }
}

impl std::fmt::Debug for LocalizedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalizedKey")
            .field("protocol", &self.protocol)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

fn password_to_key_impl<D>(password: &[u8]) -> Vec<u8>
where
    D: Digest,
{
    if password.is_empty() {
        // Empty password results in an all-zero key
        return vec![0u8; <D as Digest>::output_size()];
    }

    let mut hasher = D::new();

    // RFC 3414 A.2: repeat the password into a 1MB stream, digested in
    // 64-byte windows
    let mut buf = [0u8; 64];
    let password_len = password.len();
    let mut password_index = 0;
    let mut count = 0;

    while count < EXPANSION_SIZE {
        for byte in &mut buf {
            *byte = password[password_index];
            password_index = (password_index + 1) % password_len;
        }
        hasher.update(buf);
        count += 64;
    }

    hasher.finalize().to_vec()
}

fn localize_key_impl<D>(master_key: &[u8], engine_id: &[u8]) -> Vec<u8>
where
    D: Digest,
{
    let mut hasher = D::new();
    hasher.update(master_key);
    hasher.update(engine_id);
    hasher.update(master_key);
    hasher.finalize().to_vec()
}

fn hmac_96<M>(key: &[u8], data: &[u8]) -> [u8; MAC_LEN]
where
    M: Mac + KeyInit,
{
    let mut mac = <M as KeyInit>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    let out = mac.finalize().into_bytes();
    let mut code = [0u8; MAC_LEN];
    code.copy_from_slice(&out[..MAC_LEN]);
    code
}
