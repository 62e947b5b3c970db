//! Security context scenarios: construction validation, the sign/verify
//! contract, and encode/decode framing with and without privacy.

mod common;

use bytes::Bytes;
use common::decode_hex;
use snmp_usm::{AuthProtocol, Error, PrivProtocol, SecurityContext, SecurityLevel};

/// End-to-end authentication scenario: derive keys for a known
/// user/engine pair, sign a 20-byte message, and check that verification
/// accepts the produced code and rejects every single-bit corruption.
#[test]
fn test_auth_no_priv_sign_verify_scenario() {
    let engine_id = decode_hex("8000000001020304");

    let context = SecurityContext::builder("alice")
        .security_level(SecurityLevel::AuthNoPriv)
        .auth(AuthProtocol::Md5, "password123")
        .engine_id(engine_id.clone())
        .build()
        .expect("valid configuration");

    assert_eq!(context.username(), "alice");
    assert_eq!(context.engine_id().unwrap().as_ref(), &engine_id[..]);
    assert_eq!(context.auth_key().unwrap().as_bytes().len(), 16);

    let message = *b"twenty byte message!";
    let code = context
        .sign(&message)
        .unwrap()
        .expect("authenticated context produces a code");
    assert_eq!(code.len(), 12);

    context.verify(&message, &code).expect("own code verifies");

    // Every single-bit flip of the code must be rejected
    for byte in 0..code.len() {
        for bit in 0..8 {
            let mut tampered = code;
            tampered[byte] ^= 1 << bit;
            let err = context.verify(&message, &tampered).unwrap_err();
            assert!(
                matches!(*err, Error::Auth),
                "flip of byte {byte} bit {bit} must fail verification"
            );
        }
    }
}

#[test]
fn test_sign_deterministic_across_contexts() {
    let engine_id = decode_hex("8000000001020304");
    let build = || {
        SecurityContext::builder("alice")
            .auth(AuthProtocol::Sha1, "password123")
            .engine_id(engine_id.clone())
            .build()
            .unwrap()
    };

    let message = b"some protocol message";
    assert_eq!(
        build().sign(message).unwrap(),
        build().sign(message).unwrap()
    );
}

#[test]
fn test_construction_validation() {
    // AuthPriv without a priv password
    let err = SecurityContext::builder("alice")
        .security_level(SecurityLevel::AuthPriv)
        .auth(AuthProtocol::Md5, "password123")
        .build()
        .unwrap_err();
    assert!(matches!(*err, Error::Config(_)));

    // 7-character password
    let err = SecurityContext::builder("alice")
        .auth(AuthProtocol::Md5, "short77")
        .build()
        .unwrap_err();
    assert!(matches!(*err, Error::Config(_)));

    // 33-character password
    let err = SecurityContext::builder("alice")
        .auth(AuthProtocol::Md5, "x".repeat(33))
        .build()
        .unwrap_err();
    assert!(matches!(*err, Error::Config(_)));

    // 8 and 32 characters are the inclusive bounds
    SecurityContext::builder("alice")
        .auth(AuthProtocol::Md5, "exactly8")
        .build()
        .unwrap();
    SecurityContext::builder("alice")
        .auth(AuthProtocol::Md5, "y".repeat(32))
        .build()
        .unwrap();
}

#[test]
fn test_verify_never_fails_at_level_zero() {
    let context = SecurityContext::builder("alice").build().unwrap();

    context.verify(b"any stream", &[]).unwrap();
    context.verify(b"any stream", &[0u8; 12]).unwrap();
    context.verify(b"any stream", b"complete garbage, wrong length too").unwrap();
}

#[test]
fn test_priv_roundtrip_recovers_exact_pdu() {
    // A realistic scoped-PDU shape: SEQUENCE { OCTET STRING, OCTET STRING,
    // GetRequest }. Length 19, so DES exercises its block padding.
    let pdu: &[u8] = &[
        0x30, 0x11, 0x04, 0x00, 0x04, 0x00, 0xA0, 0x0B, 0x02, 0x01, 0x2A, 0x02, 0x01, 0x00, 0x02,
        0x01, 0x00, 0x30, 0x00,
    ];

    for protocol in [PrivProtocol::Des, PrivProtocol::Aes] {
        let context = SecurityContext::builder("alice")
            .auth(AuthProtocol::Sha1, "password123")
            .privacy(protocol, "privpass456")
            .engine_id(decode_hex("8000000001020304"))
            .build()
            .unwrap();

        let (payload, salt) = context
            .encode(pdu, Bytes::new(), 1000, 3)
            .expect("encode failed");
        assert_ne!(payload.as_ref(), pdu, "{protocol}: payload must be encrypted");

        let decoded = context
            .decode(payload, &salt, 1000, 3)
            .expect("decode failed");
        assert_eq!(decoded.as_ref(), pdu, "{protocol}: roundtrip must be exact");
    }
}

#[test]
fn test_priv_decode_with_wrong_salt_is_rejected_or_garbled() {
    let context = SecurityContext::builder("alice")
        .auth(AuthProtocol::Md5, "password123")
        .privacy(PrivProtocol::Des, "privpass456")
        .engine_id(decode_hex("8000000001020304"))
        .build()
        .unwrap();

    let pdu: &[u8] = &[0x30, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x02];
    let (payload, salt) = context.encode(pdu, Bytes::new(), 1000, 3).unwrap();

    // Flip the salt: the IV no longer matches, so decryption either fails
    // to parse or yields different bytes. It must never return the PDU.
    let mut wrong_salt = salt.to_vec();
    wrong_salt[7] ^= 0xFF;
    match context.decode(payload, &wrong_salt, 1000, 3) {
        Ok(garbled) => assert_ne!(garbled.as_ref(), pdu),
        Err(err) => assert!(matches!(*err, Error::Malformed)),
    }
}

#[test]
fn test_encode_without_privacy_passes_salt_through() {
    let context = SecurityContext::builder("alice")
        .auth(AuthProtocol::Md5, "password123")
        .engine_id(decode_hex("8000000001020304"))
        .build()
        .unwrap();

    let pdu: &[u8] = &[0x30, 0x03, 0x02, 0x01, 0x00];
    let salt_in = Bytes::from_static(b"caller-salt");
    let (payload, salt_out) = context.encode(pdu, salt_in.clone(), 0, 0).unwrap();

    assert_eq!(payload.as_ref(), pdu);
    assert_eq!(salt_out, salt_in);
}

#[test]
fn test_engine_rebind_rejected() {
    let mut context = SecurityContext::builder("alice")
        .auth(AuthProtocol::Md5, "password123")
        .build()
        .unwrap();

    context.bind_engine(decode_hex("8000000001020304")).unwrap();
    let err = context
        .bind_engine(decode_hex("0102030405060708"))
        .unwrap_err();
    assert!(matches!(*err, Error::Config(_)));
}
