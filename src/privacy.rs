//! Privacy (encryption) protocols for SNMPv3 (RFC 3414, RFC 3826).
//!
//! This module implements:
//! - DES-CBC privacy (RFC 3414 Section 8)
//! - AES-128-CFB privacy (RFC 3826)
//!
//! # Salt/IV Construction
//!
//! ## DES-CBC
//! - Salt (privParameters): engineBoots (4 bytes) || counter (4 bytes) = 8 bytes
//! - IV: pre-IV XOR salt (pre-IV is last 8 bytes of the 16-byte privKey)
//!
//! ## AES-128-CFB
//! - Salt (privParameters): 64-bit counter = 8 bytes
//! - IV: engineBoots (4 bytes) || engineTime (4 bytes) || salt (8 bytes) = 16 bytes
//!   (concatenation, NOT XOR)
//!
//! Every encryption produces a fresh salt from a monotonically increasing
//! counter seeded from OS randomness; the salt travels with the message and
//! is consumed by the peer's decryption.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{DecodeErrorKind, Error, Result};
use crate::{MasterKey, PrivProtocol};

/// Generate a random non-zero u64 for salt initialization.
///
/// Uses the OS cryptographic random source via `getrandom`.
fn random_nonzero_u64() -> u64 {
    let mut buf = [0u8; 8];
    loop {
        getrandom::fill(&mut buf).expect("getrandom failed");
        let val = u64::from_ne_bytes(buf);
        if val != 0 {
            return val;
        }
        // Extremely unlikely (1 in 2^64), but loop if we got zero
    }
}

/// Thread-safe monotonic salt counter.
///
/// Seeded from cryptographic randomness; never yields zero (zero is
/// skipped on wraparound, matching net-snmp).
pub struct SaltCounter(AtomicU64);

impl SaltCounter {
    /// Create a new salt counter initialized from cryptographic randomness.
    pub fn new() -> Self {
        Self(AtomicU64::new(random_nonzero_u64()))
    }

    /// Create a salt counter initialized to a specific value.
    ///
    /// This is primarily for testing purposes.
    pub fn from_value(value: u64) -> Self {
        Self(AtomicU64::new(value))
    }

    /// Get the next salt value and increment the counter.
    pub fn next(&self) -> u64 {
        let val = self.0.fetch_add(1, Ordering::SeqCst);
        // Skip zero on wraparound
        if val == 0 {
            self.0.fetch_add(1, Ordering::SeqCst)
        } else {
            val
        }
    }
}

impl Default for SaltCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Privacy key for encryption/decryption operations.
///
/// Derived with the same password-to-key and localization algorithm as
/// authentication keys (using the *authentication* protocol's digest), then
/// split according to the privacy protocol: for DES the first 8 bytes are
/// the cipher key and the last 8 the pre-IV; for AES the first 16 bytes are
/// the cipher key.
///
/// # Security
///
/// Key material is zeroed from memory when the key is dropped, using the
/// `zeroize` crate.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PrivKey {
    key: Vec<u8>,
    #[zeroize(skip)]
    protocol: PrivProtocol,
    #[zeroize(skip)]
    salt: SaltCounter,
}

impl PrivKey {
    /// Derive a privacy key from a master key and engine ID.
    ///
    /// The master key must have been derived with the context's
    /// authentication protocol; both RFC 3414 digests produce at least the
    /// 16 bytes the DES and AES-128 protocols require.
    pub fn from_master_key(
        master: &MasterKey,
        protocol: PrivProtocol,
        engine_id: &[u8],
    ) -> Self {
        let localized = master.localize(engine_id);
        Self {
            key: localized.as_bytes().to_vec(),
            protocol,
            salt: SaltCounter::new(),
        }
    }

    /// Create a privacy key from raw localized key bytes.
    pub fn from_bytes(protocol: PrivProtocol, key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            protocol,
            salt: SaltCounter::new(),
        }
    }

    /// Get the privacy protocol.
    pub fn protocol(&self) -> PrivProtocol {
        self.protocol
    }

    fn check_key_len(&self) -> Result<()> {
        if self.key.len() < self.protocol.key_len() {
            return Err(Error::config(format!(
                "{} privacy requires a {}-byte localized key, got {}",
                self.protocol,
                self.protocol.key_len(),
                self.key.len()
            )));
        }
        Ok(())
    }

    /// Encrypt data and return (ciphertext, salt).
    ///
    /// # Arguments
    /// * `plaintext` - The data to encrypt (typically a serialized scoped PDU)
    /// * `engine_boots` - The authoritative engine's boot count
    /// * `engine_time` - The authoritative engine's time
    ///
    /// The returned salt is the privParameters value that must accompany
    /// the message; the peer needs it (plus boots/time for AES) to rebuild
    /// the IV.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        engine_boots: u32,
        engine_time: u32,
    ) -> Result<(Bytes, Bytes)> {
        self.check_key_len()?;
        let salt = self.salt.next();

        match self.protocol {
            PrivProtocol::Des => self.encrypt_des(plaintext, engine_boots, salt),
            PrivProtocol::Aes => self.encrypt_aes(plaintext, engine_boots, engine_time, salt),
        }
    }

    /// Decrypt data using the salt (privParameters) from the message.
    ///
    /// Decryption failures (bad salt length, misaligned ciphertext) are
    /// reported as decode errors; they are never treated as plaintext.
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        engine_boots: u32,
        engine_time: u32,
        salt: &[u8],
    ) -> Result<Bytes> {
        self.check_key_len()?;

        if salt.len() != self.protocol.salt_len() {
            tracing::debug!(target: "snmp_usm::privacy", kind = %DecodeErrorKind::InvalidSaltLength { expected: self.protocol.salt_len(), actual: salt.len() }, "decrypt rejected");
            return Err(Error::Malformed.boxed());
        }

        match self.protocol {
            PrivProtocol::Des => self.decrypt_des(ciphertext, salt),
            PrivProtocol::Aes => self.decrypt_aes(ciphertext, engine_boots, engine_time, salt),
        }
    }

    /// DES-CBC encryption (RFC 3414 Section 8.1.1).
    fn encrypt_des(
        &self,
        plaintext: &[u8],
        engine_boots: u32,
        salt_int: u64,
    ) -> Result<(Bytes, Bytes)> {
        use cbc::cipher::{BlockEncryptMut, KeyIvInit, block_padding::NoPadding};
        type DesCbc = cbc::Encryptor<des::Des>;

        // DES key is first 8 bytes, pre-IV the last 8 of the 16-byte privKey
        let key = &self.key[..8];
        let pre_iv = &self.key[8..16];

        // Salt = engineBoots (4 bytes MSB) || counter (4 bytes MSB)
        let mut salt = [0u8; 8];
        salt[..4].copy_from_slice(&engine_boots.to_be_bytes());
        salt[4..].copy_from_slice(&(salt_int as u32).to_be_bytes());

        // IV = pre-IV XOR salt
        let mut iv = [0u8; 8];
        for (i, b) in iv.iter_mut().enumerate() {
            *b = pre_iv[i] ^ salt[i];
        }

        // Zero-pad plaintext to the 8-byte block boundary
        let padded_len = plaintext.len().next_multiple_of(8);
        let mut buffer = vec![0u8; padded_len];
        buffer[..plaintext.len()].copy_from_slice(plaintext);

        let cipher = DesCbc::new_from_slices(key, &iv)
            .map_err(|_| Error::config("invalid DES key length"))?;
        let ciphertext = cipher
            .encrypt_padded_mut::<NoPadding>(&mut buffer, padded_len)
            .map_err(|_| Error::config("DES plaintext not block-aligned"))?;

        Ok((
            Bytes::copy_from_slice(ciphertext),
            Bytes::copy_from_slice(&salt),
        ))
    }

    /// DES-CBC decryption (RFC 3414 Section 8.1.1).
    fn decrypt_des(&self, ciphertext: &[u8], salt: &[u8]) -> Result<Bytes> {
        use cbc::cipher::{BlockDecryptMut, KeyIvInit, block_padding::NoPadding};
        type DesCbc = cbc::Decryptor<des::Des>;

        if !ciphertext.len().is_multiple_of(8) {
            tracing::debug!(target: "snmp_usm::privacy", kind = %DecodeErrorKind::CiphertextNotBlockAligned { length: ciphertext.len() }, "decrypt rejected");
            return Err(Error::Malformed.boxed());
        }

        let key = &self.key[..8];
        let pre_iv = &self.key[8..16];

        // IV = pre-IV XOR salt
        let mut iv = [0u8; 8];
        for (i, b) in iv.iter_mut().enumerate() {
            *b = pre_iv[i] ^ salt[i];
        }

        let cipher = DesCbc::new_from_slices(key, &iv)
            .map_err(|_| Error::config("invalid DES key length"))?;

        let mut buffer = ciphertext.to_vec();
        let plaintext = cipher
            .decrypt_padded_mut::<NoPadding>(&mut buffer)
            .map_err(|_| Error::Malformed.boxed())?;

        Ok(Bytes::copy_from_slice(plaintext))
    }

    /// AES-128-CFB encryption (RFC 3826 Section 3.1).
    fn encrypt_aes(
        &self,
        plaintext: &[u8],
        engine_boots: u32,
        engine_time: u32,
        salt: u64,
    ) -> Result<(Bytes, Bytes)> {
        use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
        type Aes128Cfb = cfb_mode::Encryptor<aes::Aes128>;

        let key = &self.key[..16];
        let salt_bytes = salt.to_be_bytes();

        // IV = engineBoots (4) || engineTime (4) || salt (8) = 16 bytes
        // Concatenation, NOT XOR (unlike DES)
        let mut iv = [0u8; 16];
        iv[..4].copy_from_slice(&engine_boots.to_be_bytes());
        iv[4..8].copy_from_slice(&engine_time.to_be_bytes());
        iv[8..].copy_from_slice(&salt_bytes);

        let mut buffer = plaintext.to_vec();
        let cipher = Aes128Cfb::new_from_slices(key, &iv)
            .map_err(|_| Error::config("invalid AES key length"))?;
        cipher.encrypt(&mut buffer);

        Ok((Bytes::from(buffer), Bytes::copy_from_slice(&salt_bytes)))
    }

    /// AES-128-CFB decryption (RFC 3826 Section 3.1.4).
    fn decrypt_aes(
        &self,
        ciphertext: &[u8],
        engine_boots: u32,
        engine_time: u32,
        salt: &[u8],
    ) -> Result<Bytes> {
        use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
        type Aes128Cfb = cfb_mode::Decryptor<aes::Aes128>;

        let key = &self.key[..16];

        // IV = engineBoots (4) || engineTime (4) || salt (8) = 16 bytes
        let mut iv = [0u8; 16];
        iv[..4].copy_from_slice(&engine_boots.to_be_bytes());
        iv[4..8].copy_from_slice(&engine_time.to_be_bytes());
        iv[8..].copy_from_slice(salt);

        let mut buffer = ciphertext.to_vec();
        let cipher = Aes128Cfb::new_from_slices(key, &iv)
            .map_err(|_| Error::config("invalid AES key length"))?;
        cipher.decrypt(&mut buffer);

        Ok(Bytes::from(buffer))
    }
}

impl std::fmt::Debug for PrivKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivKey")
            .field("protocol", &self.protocol)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AuthProtocol;
    use crate::util::decode_hex;

    #[test]
    fn test_des_encrypt_decrypt_roundtrip() {
        // 16-byte key: 8 for DES, 8 for pre-IV
        let key = vec![
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, // DES key
            0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, // pre-IV
        ];
        let priv_key = PrivKey::from_bytes(PrivProtocol::Des, key);

        let plaintext = b"Hello, SNMPv3 World!";
        let (ciphertext, salt) = priv_key
            .encrypt(plaintext, 100, 12345)
            .expect("encryption failed");

        assert_ne!(ciphertext.as_ref(), plaintext);
        assert_eq!(salt.len(), 8);

        let decrypted = priv_key
            .decrypt(&ciphertext, 100, 12345, &salt)
            .expect("decryption failed");

        // DES pads to the 8-byte boundary, so decrypted may be longer
        assert!(decrypted.len() >= plaintext.len());
        assert_eq!(&decrypted[..plaintext.len()], plaintext);
    }

    #[test]
    fn test_des_salt_embeds_engine_boots() {
        let priv_key = PrivKey::from_bytes(PrivProtocol::Des, vec![0u8; 16]);

        let (_, salt) = priv_key.encrypt(b"data", 0x01020304, 0).unwrap();
        assert_eq!(&salt[..4], &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_aes_encrypt_decrypt_roundtrip() {
        let key = vec![
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
            0x0f, 0x10,
        ];
        let priv_key = PrivKey::from_bytes(PrivProtocol::Aes, key);

        let plaintext = b"Hello, SNMPv3 AES World!";
        let (ciphertext, salt) = priv_key
            .encrypt(plaintext, 200, 54321)
            .expect("encryption failed");

        assert_ne!(ciphertext.as_ref(), plaintext);
        assert_eq!(salt.len(), 8);

        let decrypted = priv_key
            .decrypt(&ciphertext, 200, 54321, &salt)
            .expect("decryption failed");

        // AES-CFB is a stream mode, no padding
        assert_eq!(decrypted.as_ref(), plaintext);
    }

    #[test]
    fn test_des_rejects_misaligned_ciphertext() {
        let priv_key = PrivKey::from_bytes(PrivProtocol::Des, vec![0u8; 16]);

        let result = priv_key.decrypt(&[0u8; 13], 0, 0, &[0u8; 8]);
        assert!(matches!(*result.unwrap_err(), Error::Malformed));
    }

    #[test]
    fn test_rejects_bad_salt_length() {
        let priv_key = PrivKey::from_bytes(PrivProtocol::Aes, vec![0u8; 16]);

        let result = priv_key.decrypt(&[0u8; 16], 0, 0, &[0u8; 4]);
        assert!(matches!(*result.unwrap_err(), Error::Malformed));
    }

    #[test]
    fn test_rejects_short_key() {
        let priv_key = PrivKey::from_bytes(PrivProtocol::Des, vec![0u8; 8]);

        let result = priv_key.encrypt(b"data", 0, 0);
        assert!(matches!(*result.unwrap_err(), Error::Config(_)));
    }

    #[test]
    fn test_salt_counter_increments() {
        let counter = SaltCounter::new();
        let s1 = counter.next();
        let s2 = counter.next();
        let s3 = counter.next();

        assert_eq!(s2, s1.wrapping_add(1));
        assert_eq!(s3, s2.wrapping_add(1));
    }

    #[test]
    fn test_salt_counter_skips_zero() {
        let counter = SaltCounter::from_value(u64::MAX);

        assert_eq!(counter.next(), u64::MAX);
        // Wraparound would yield 0; it is skipped
        assert_eq!(counter.next(), 1);
        assert_eq!(counter.next(), 2);
    }

    #[test]
    fn test_multiple_encryptions_use_different_salts() {
        let priv_key = PrivKey::from_bytes(PrivProtocol::Aes, vec![0u8; 16]);

        let (_, salt1) = priv_key.encrypt(b"test data", 0, 0).unwrap();
        let (_, salt2) = priv_key.encrypt(b"test data", 0, 0).unwrap();

        assert_ne!(salt1, salt2);
    }

    #[test]
    fn test_from_master_key() {
        let engine_id = decode_hex("000000000000000000000002").unwrap();
        let master = MasterKey::from_password(AuthProtocol::Sha1, b"maplesyrup");
        let priv_key = PrivKey::from_master_key(&master, PrivProtocol::Aes, &engine_id);

        let plaintext = b"test message";
        let (ciphertext, salt) = priv_key.encrypt(plaintext, 100, 200).unwrap();
        let decrypted = priv_key.decrypt(&ciphertext, 100, 200, &salt).unwrap();

        assert_eq!(decrypted.as_ref(), plaintext);
    }

    #[test]
    fn test_wrong_key_produces_garbage() {
        // Stream/block ciphers do not detect wrong keys; decryption
        // "succeeds" with garbage. Tampering is caught by the HMAC layer.
        let correct = PrivKey::from_bytes(PrivProtocol::Aes, vec![0x01; 16]);
        let wrong = PrivKey::from_bytes(PrivProtocol::Aes, vec![0xFF; 16]);

        let plaintext = b"Secret SNMPv3 message data!";
        let (ciphertext, salt) = correct.encrypt(plaintext, 200, 54321).unwrap();

        let garbage = wrong.decrypt(&ciphertext, 200, 54321, &salt).unwrap();
        assert_ne!(garbage.as_ref(), plaintext);

        let recovered = correct.decrypt(&ciphertext, 200, 54321, &salt).unwrap();
        assert_eq!(recovered.as_ref(), plaintext);
    }

    #[test]
    fn test_aes_wrong_engine_time_produces_garbage() {
        // The AES IV includes engine boots and time; wrong values yield garbage
        let priv_key = PrivKey::from_bytes(PrivProtocol::Aes, vec![0x42; 16]);

        let plaintext = b"AES test message";
        let (ciphertext, salt) = priv_key.encrypt(plaintext, 200, 54321).unwrap();

        let wrong_time = priv_key.decrypt(&ciphertext, 200, 54322, &salt).unwrap();
        assert_ne!(wrong_time.as_ref(), plaintext);

        let wrong_boots = priv_key.decrypt(&ciphertext, 201, 54321, &salt).unwrap();
        assert_ne!(wrong_boots.as_ref(), plaintext);
    }
}
