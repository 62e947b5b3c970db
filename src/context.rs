//! Security context: one user's credentials and derived keys for one
//! remote engine.
//!
//! A [`SecurityContext`] is validated eagerly at construction and moves
//! through a two-state lifecycle:
//!
//! - **Unbound** — no engine ID yet. Master (password) keys exist, but no
//!   localized keys. This is the state a discovery context lives in.
//! - **Bound** — an engine ID has been installed, exactly once, and the
//!   localized authentication/privacy keys plus the privacy cipher were
//!   derived at that moment.
//!
//! Binding is a one-way transition: rebinding after keys have been derived
//! is rejected rather than silently leaving stale keys in the cache. Keys
//! are derived eagerly at bind time, so a bound context has no interior
//! mutability besides the privacy salt counter (an atomic) and can be
//! shared read-only across threads.

use bytes::Bytes;
use zeroize::Zeroizing;

use crate::auth::{MAC_LEN, MAX_PASSWORD_LENGTH, MIN_PASSWORD_LENGTH, MasterKey};
use crate::ber::{Decoder, EncodeBuf};
use crate::error::{Error, Result};
use crate::privacy::PrivKey;
use crate::{AuthProtocol, LocalizedKey, PrivProtocol, SecurityLevel};

/// Keys localized to a bound engine.
struct EngineKeys {
    engine_id: Bytes,
    auth_key: Option<LocalizedKey>,
    priv_key: Option<PrivKey>,
}

enum Binding {
    Unbound,
    Bound(EngineKeys),
}

/// USM security context.
///
/// Holds the username, security level, protocols, and derived key
/// material, and frames outbound/inbound payloads via
/// [`encode`](Self::encode) / [`decode`](Self::decode) /
/// [`sign`](Self::sign) / [`verify`](Self::verify).
///
/// Constructed through [`SecurityContext::builder`]; configuration errors
/// (unsupported level, missing or out-of-range password) are reported at
/// [`build`](SecurityContextBuilder::build), never deferred to first use.
pub struct SecurityContext {
    username: String,
    security_level: SecurityLevel,
    auth_protocol: Option<AuthProtocol>,
    priv_protocol: Option<PrivProtocol>,
    auth_master: Option<MasterKey>,
    priv_master: Option<MasterKey>,
    binding: Binding,
}

impl SecurityContext {
    /// Start building a security context for the given username.
    pub fn builder(username: impl Into<String>) -> SecurityContextBuilder {
        SecurityContextBuilder::new(username)
    }

    /// Get the username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Get the security level.
    pub fn security_level(&self) -> SecurityLevel {
        self.security_level
    }

    /// Get the authentication protocol, if the level requires one.
    pub fn auth_protocol(&self) -> Option<AuthProtocol> {
        self.auth_protocol
    }

    /// Get the privacy protocol, if the level requires one.
    pub fn priv_protocol(&self) -> Option<PrivProtocol> {
        self.priv_protocol
    }

    /// Get the bound engine ID, or `None` while unbound.
    pub fn engine_id(&self) -> Option<&Bytes> {
        match &self.binding {
            Binding::Unbound => None,
            Binding::Bound(keys) => Some(&keys.engine_id),
        }
    }

    /// Check whether an engine ID has been bound.
    pub fn is_bound(&self) -> bool {
        matches!(self.binding, Binding::Bound(_))
    }

    /// Bind the engine ID and derive all localized keys.
    ///
    /// This is the `Unbound -> Bound` transition. It happens exactly once;
    /// a second call is a configuration error, because localized keys are
    /// derived from the engine ID at this moment and rebinding would leave
    /// them stale.
    pub fn bind_engine(&mut self, engine_id: impl Into<Bytes>) -> Result<()> {
        let engine_id = engine_id.into();
        if engine_id.is_empty() {
            return Err(Error::config("engine id must not be empty"));
        }
        if self.is_bound() {
            return Err(Error::config(
                "engine id is already bound and localized keys are derived; \
                 create a new context to target a different engine",
            ));
        }

        let auth_key = self.auth_master.as_ref().map(|m| m.localize(&engine_id));
        let priv_key = match (&self.priv_master, self.priv_protocol) {
            (Some(master), Some(protocol)) => {
                Some(PrivKey::from_master_key(master, protocol, &engine_id))
            }
            _ => None,
        };

        tracing::debug!(
            target: "snmp_usm::context",
            username = %self.username,
            level = %self.security_level,
            "engine bound, localized keys derived"
        );

        self.binding = Binding::Bound(EngineKeys {
            engine_id,
            auth_key,
            priv_key,
        });
        Ok(())
    }

    /// Get the localized authentication key.
    ///
    /// Fails with a configuration error while unbound or when the security
    /// level carries no authentication material.
    pub fn auth_key(&self) -> Result<&LocalizedKey> {
        match &self.binding {
            Binding::Unbound => Err(Error::config(
                "no engine id bound; authentication keys are not derived",
            )),
            Binding::Bound(keys) => keys.auth_key.as_ref().ok_or_else(|| {
                Error::config("security level carries no authentication material")
            }),
        }
    }

    /// Get the localized privacy key.
    ///
    /// Fails with a configuration error while unbound or when the security
    /// level carries no privacy material.
    pub fn priv_key(&self) -> Result<&PrivKey> {
        match &self.binding {
            Binding::Unbound => Err(Error::config(
                "no engine id bound; privacy keys are not derived",
            )),
            Binding::Bound(keys) => keys
                .priv_key
                .as_ref()
                .ok_or_else(|| Error::config("security level carries no privacy material")),
        }
    }

    /// Sign a message, returning the 12-byte authentication code.
    ///
    /// Returns `Ok(None)` when no authentication protocol is configured
    /// (level [`NoAuthNoPriv`](SecurityLevel::NoAuthNoPriv)) — "no
    /// signature", distinct from an empty or zero code.
    pub fn sign(&self, message: &[u8]) -> Result<Option<[u8; MAC_LEN]>> {
        if self.auth_protocol.is_none() {
            return Ok(None);
        }
        Ok(Some(self.auth_key()?.sign(message)))
    }

    /// Verify the authentication code presented with an inbound message.
    ///
    /// At [`NoAuthNoPriv`](SecurityLevel::NoAuthNoPriv) verification is
    /// trivially satisfied and no comparison occurs, whatever `salt`
    /// contains. At any authenticated level the code is recomputed over
    /// `stream` and compared byte-for-byte; a mismatch is
    /// [`Error::Auth`], fatal to the message.
    pub fn verify(&self, stream: &[u8], salt: &[u8]) -> Result<()> {
        if self.security_level < SecurityLevel::AuthNoPriv {
            return Ok(());
        }
        if self.auth_key()?.verify(stream, salt) {
            Ok(())
        } else {
            Err(Error::Auth.boxed())
        }
    }

    /// Encode an outbound payload.
    ///
    /// `pdu` is the serialized scoped PDU from the PDU collaborator. With
    /// a privacy protocol configured, the PDU is encrypted and wrapped as
    /// a BER OCTET STRING, and the cipher-produced salt replaces
    /// `salt_in`. Without privacy the PDU bytes pass through unchanged
    /// together with `salt_in` (encryption is skipped, not simulated).
    pub fn encode(
        &self,
        pdu: &[u8],
        salt_in: Bytes,
        engine_time: u32,
        engine_boots: u32,
    ) -> Result<(Bytes, Bytes)> {
        if self.priv_protocol.is_none() {
            return Ok((Bytes::copy_from_slice(pdu), salt_in));
        }

        let (ciphertext, salt_out) = self.priv_key()?.encrypt(pdu, engine_boots, engine_time)?;
        let mut buf = EncodeBuf::new();
        buf.push_octet_string(&ciphertext);
        Ok((buf.finish(), salt_out))
    }

    /// Decode an inbound payload.
    ///
    /// The input must parse as a single BER value. With a privacy protocol
    /// configured, that value's content is ciphertext: it is decrypted
    /// with `salt`, `engine_time`, and `engine_boots`, and the recovered
    /// plaintext must itself parse as a BER value, which is returned
    /// (DES block padding is stripped in the process). Without privacy the
    /// parsed value is returned directly. All failures — malformed BER,
    /// bad salt, misaligned ciphertext — are decode errors; ciphertext is
    /// never handed back as plaintext.
    pub fn decode(
        &self,
        stream: impl Into<Bytes>,
        salt: &[u8],
        engine_time: u32,
        engine_boots: u32,
    ) -> Result<Bytes> {
        let mut decoder = Decoder::new(stream.into());

        if self.priv_protocol.is_none() {
            return decoder.read_tlv();
        }

        let ciphertext = decoder.read_octet_string()?;
        let plaintext = self
            .priv_key()?
            .decrypt(&ciphertext, engine_boots, engine_time, salt)?;

        let mut inner = Decoder::new(plaintext);
        inner.read_tlv()
    }
}

impl std::fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityContext")
            .field("username", &self.username)
            .field("security_level", &self.security_level)
            .field("auth_protocol", &self.auth_protocol)
            .field("priv_protocol", &self.priv_protocol)
            .field("engine_id", &self.engine_id())
            .finish_non_exhaustive()
    }
}

/// Builder for [`SecurityContext`].
///
/// Passwords are held in [`Zeroizing`] buffers and wiped as soon as the
/// master keys have been derived in [`build`](Self::build).
pub struct SecurityContextBuilder {
    username: String,
    security_level: Option<SecurityLevel>,
    auth_protocol: Option<AuthProtocol>,
    auth_password: Option<Zeroizing<Vec<u8>>>,
    priv_protocol: Option<PrivProtocol>,
    priv_password: Option<Zeroizing<Vec<u8>>>,
    engine_id: Option<Bytes>,
}

impl SecurityContextBuilder {
    /// Create a new builder with the given username.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            security_level: None,
            auth_protocol: None,
            auth_password: None,
            priv_protocol: None,
            priv_password: None,
            engine_id: None,
        }
    }

    /// Set the security level explicitly.
    ///
    /// Without this, the level is inferred from the configured material:
    /// privacy present → `AuthPriv`, authentication present →
    /// `AuthNoPriv`, otherwise `NoAuthNoPriv`.
    pub fn security_level(mut self, level: SecurityLevel) -> Self {
        self.security_level = Some(level);
        self
    }

    /// Add authentication with an explicit protocol.
    pub fn auth(mut self, protocol: AuthProtocol, password: impl Into<Vec<u8>>) -> Self {
        self.auth_protocol = Some(protocol);
        self.auth_password = Some(Zeroizing::new(password.into()));
        self
    }

    /// Set only the authentication password; the protocol defaults to MD5.
    pub fn auth_password(mut self, password: impl Into<Vec<u8>>) -> Self {
        self.auth_password = Some(Zeroizing::new(password.into()));
        self
    }

    /// Add privacy with an explicit protocol.
    pub fn privacy(mut self, protocol: PrivProtocol, password: impl Into<Vec<u8>>) -> Self {
        self.priv_protocol = Some(protocol);
        self.priv_password = Some(Zeroizing::new(password.into()));
        self
    }

    /// Set only the privacy password; the protocol defaults to DES.
    pub fn priv_password(mut self, password: impl Into<Vec<u8>>) -> Self {
        self.priv_password = Some(Zeroizing::new(password.into()));
        self
    }

    /// Set the engine ID, binding it (and deriving all localized keys)
    /// during [`build`](Self::build).
    ///
    /// Leave unset for a discovery context; bind the discovered engine
    /// with [`SecurityContext::bind_engine`] afterwards.
    pub fn engine_id(mut self, engine_id: impl Into<Bytes>) -> Self {
        self.engine_id = Some(engine_id.into());
        self
    }

    /// Validate the configuration and build the context.
    ///
    /// All configuration errors surface here: a level that requires a
    /// missing password, a password outside 8–32 bytes, or an empty
    /// engine ID.
    pub fn build(self) -> Result<SecurityContext> {
        let security_level = self.security_level.unwrap_or(match (
            &self.auth_password,
            &self.priv_password,
        ) {
            (_, Some(_)) => SecurityLevel::AuthPriv,
            (Some(_), None) => SecurityLevel::AuthNoPriv,
            (None, None) => SecurityLevel::NoAuthNoPriv,
        });

        let mut auth_protocol = None;
        let mut priv_protocol = None;
        let mut auth_master = None;
        let mut priv_master = None;

        if security_level.requires_auth() {
            let protocol = self.auth_protocol.unwrap_or(AuthProtocol::Md5);
            let password = self.auth_password.as_ref().ok_or_else(|| {
                Error::config(format!(
                    "security level {security_level} requires an auth password"
                ))
            })?;
            check_password_length(password, "auth")?;

            auth_protocol = Some(protocol);
            auth_master = Some(MasterKey::from_password(protocol, password));
        }

        if security_level.requires_priv() {
            let protocol = self.priv_protocol.unwrap_or(PrivProtocol::Des);
            let password = self.priv_password.as_ref().ok_or_else(|| {
                Error::config(format!(
                    "security level {security_level} requires a priv password"
                ))
            })?;
            check_password_length(password, "priv")?;

            // The privacy master key uses the auth protocol's digest
            let digest = auth_protocol.expect("authPriv implies an auth protocol");
            priv_protocol = Some(protocol);
            priv_master = Some(MasterKey::from_password(digest, password));
        }

        let mut context = SecurityContext {
            username: self.username,
            security_level,
            auth_protocol,
            priv_protocol,
            auth_master,
            priv_master,
            binding: Binding::Unbound,
        };

        if let Some(engine_id) = self.engine_id {
            context.bind_engine(engine_id)?;
        }

        Ok(context)
    }
}

fn check_password_length(password: &[u8], which: &str) -> Result<()> {
    if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&password.len()) {
        return Err(Error::config(format!(
            "{which} password must have between {MIN_PASSWORD_LENGTH} and \
             {MAX_PASSWORD_LENGTH} characters, got {}",
            password.len()
        )));
    }
    Ok(())
}
