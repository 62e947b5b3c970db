//! Engine discovery (RFC 3414 Section 4).
//!
//! SNMPv3 requires knowing the authoritative engine's ID, boot counter,
//! and time before any authenticated or encrypted message can be sent.
//! Discovery is a single unauthenticated round trip, run once per session:
//!
//! 1. A [`SecurityContext`] at `noAuthNoPriv` encodes a minimal probe
//!    (reportable flags, empty engine ID in the USM header, empty
//!    GetRequest scoped PDU).
//! 2. The probe goes out through the [`Transport`] collaborator.
//! 3. The agent answers with a Report message whose USM header carries its
//!    engine ID, boots, and time; [`discover`] extracts that triple.
//!
//! The caller then binds the engine ID into the fully-credentialed context
//! with [`SecurityContext::bind_engine`] and keeps boots/time for
//! subsequent encode calls. No retry happens at this layer; retry policy
//! belongs to the session.

use bytes::Bytes;

use crate::SecurityLevel;
use crate::ber::{Decoder, EncodeBuf, tag};
use crate::context::SecurityContext;
use crate::error::{DecodeErrorKind, Error, Result};
use crate::usm::UsmSecurityParams;

/// Maximum message size advertised in the probe header
/// (65535 - 20 IPv4 - 8 UDP = 65507).
pub const MSG_MAX_SIZE: i32 = 65507;

/// msgFlags byte for the probe: reportable, noAuthNoPriv.
const PROBE_FLAGS: u8 = 0x04;

/// USM security model identifier in msgGlobalData.
const SECURITY_MODEL_USM: i32 = 3;

/// Synchronous request/response transport, implemented by the session
/// layer (UDP, TCP, a test double).
///
/// The single round trip blocks inside the implementation; timeout and
/// cancellation policy belong there, not to this core. Failures map to
/// [`Error::Transport`] and propagate unchanged.
pub trait Transport {
    /// Send a request and return the raw reply bytes.
    fn send(&mut self, request: &[u8]) -> Result<Bytes>;
}

/// Engine parameters learned from a discovery reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredEngine {
    /// Authoritative engine ID (never empty)
    pub engine_id: Bytes,
    /// Engine boot count
    pub engine_boots: u32,
    /// Engine time (seconds since last boot)
    pub engine_time: u32,
}

/// Run the discovery exchange.
///
/// `context` must be an unauthenticated context
/// ([`SecurityLevel::NoAuthNoPriv`]); discovery happens before any keys
/// exist. `msg_id` correlates the probe with its reply and is chosen by
/// the caller.
///
/// # Errors
///
/// - [`Error::Config`] if the context is not `noAuthNoPriv`
/// - [`Error::Transport`] surfaced unchanged from the transport
/// - [`Error::Malformed`] for an unparseable reply or one missing the
///   engine ID
pub fn discover<T: Transport>(
    transport: &mut T,
    context: &SecurityContext,
    msg_id: i32,
) -> Result<DiscoveredEngine> {
    if context.security_level() != SecurityLevel::NoAuthNoPriv {
        return Err(Error::config(
            "engine discovery requires a noAuthNoPriv context",
        ));
    }

    let scoped_pdu = probe_scoped_pdu(msg_id);
    // Pass-through at noAuthNoPriv: no signing, no encryption
    let (payload, _salt) = context.encode(&scoped_pdu, Bytes::new(), 0, 0)?;
    let request = probe_message(msg_id, context.username().as_bytes(), &payload);

    tracing::debug!(target: "snmp_usm::discovery", msg_id, "sending discovery probe");
    let reply = transport.send(&request)?;

    let reply = context.decode(reply, &[], 0, 0)?;
    let engine = parse_discovery_response(reply)?;
    tracing::debug!(
        target: "snmp_usm::discovery",
        engine_boots = engine.engine_boots,
        engine_time = engine.engine_time,
        "engine discovered"
    );
    Ok(engine)
}

/// Build the probe's scoped PDU: empty context engine ID and name, and an
/// empty GetRequest.
fn probe_scoped_pdu(request_id: i32) -> Bytes {
    let mut buf = EncodeBuf::new();
    buf.push_sequence(|buf| {
        // GetRequest-PDU { request-id, error-status 0, error-index 0, no varbinds }
        buf.push_constructed(tag::context::GET_REQUEST, |buf| {
            buf.push_sequence(|_| {});
            buf.push_integer(0);
            buf.push_integer(0);
            buf.push_integer(request_id);
        });
        buf.push_octet_string(&[]); // contextName
        buf.push_octet_string(&[]); // contextEngineID
    });
    buf.finish()
}

/// Frame the full probe message around the encoded scoped PDU.
fn probe_message(msg_id: i32, username: &[u8], scoped_pdu: &[u8]) -> Bytes {
    let usm_params = UsmSecurityParams {
        engine_id: Bytes::new(),
        engine_boots: 0,
        engine_time: 0,
        username: Bytes::copy_from_slice(username),
        auth_params: Bytes::new(),
        priv_params: Bytes::new(),
    }
    .encode();

    let mut buf = EncodeBuf::new();
    buf.push_sequence(|buf| {
        buf.push_raw(scoped_pdu); // msgData
        buf.push_octet_string(&usm_params); // msgSecurityParameters
        buf.push_sequence(|buf| {
            // msgGlobalData
            buf.push_integer(SECURITY_MODEL_USM);
            buf.push_octet_string(&[PROBE_FLAGS]);
            buf.push_integer(MSG_MAX_SIZE);
            buf.push_integer(msg_id);
        });
        buf.push_integer(3); // version
    });
    buf.finish()
}

/// Extract the engine triple from a discovery reply.
///
/// Walks the v3 message header far enough to reach the USM security
/// parameters; the Report PDU body itself is not interpreted here.
pub fn parse_discovery_response(message: Bytes) -> Result<DiscoveredEngine> {
    let mut decoder = Decoder::new(message);
    let mut seq = decoder.read_sequence()?;

    let version = seq.read_integer()?;
    if version != 3 {
        tracing::debug!(target: "snmp_usm::discovery", kind = %DecodeErrorKind::UnknownVersion { value: version }, "decode error");
        return Err(Error::Malformed.boxed());
    }

    // msgGlobalData
    let mut global = seq.read_sequence()?;
    let _msg_id = global.read_integer()?;
    let _msg_max_size = global.read_integer()?;
    let flags = global.read_octet_string()?;
    // One byte; 0x02 (priv without auth) is the one invalid combination
    if flags.len() != 1 || flags[0] & 0x03 == 0x02 {
        let value = flags.first().copied().unwrap_or(0);
        tracing::debug!(target: "snmp_usm::discovery", kind = %DecodeErrorKind::InvalidMsgFlags { value }, "decode error");
        return Err(Error::Malformed.boxed());
    }
    let _security_model = global.read_integer()?;

    // msgSecurityParameters: OCTET STRING wrapping the USM sequence
    let security_params = seq.read_octet_string()?;
    let usm = UsmSecurityParams::decode(security_params)?;

    if usm.engine_id.is_empty() {
        tracing::debug!(target: "snmp_usm::discovery", kind = %DecodeErrorKind::EmptyEngineId, "discovery reply carried no engine id");
        return Err(Error::Malformed.boxed());
    }

    Ok(DiscoveredEngine {
        engine_id: usm.engine_id,
        engine_boots: usm.engine_boots,
        engine_time: usm.engine_time,
    })
}
