use alloy::primitives::{eip191_hash_message, hex, keccak256, Address};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::Signer;
use k256::ecdsa::SigningKey;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use sigconfirm_adapters::verify::{bip137_message_hash, p2wpkh_address};
use sigconfirm_adapters::{LocalAddressValidator, SignatureVerifier};
use sigconfirm_core::{
    MessageVerification, NetworkId, NetworkRegistry, PortError, SignatureFormat, VerifyRequest,
};

const BIP322_ADDRESS: &str = "bc1q9vza2e8x573nczrlzms0wvx3gsqjx7vavgkx0l";
const BIP322_HELLO: &str = "AkcwRAIgZRfIY3p7/DoVTty6YZbWS71bc5Vct9p9Fia83eRmw2QCICK/ENGfwLtptFluMGs2KsqoNSk89pO7F29zJLUx9a/sASECx/EgAxlkQpQ9hYjgGu6EBCPMVPwVIVJqO4XCsMvViHI=";
const BIP322_EMPTY: &str = "AkcwRAIgM2gBAQqvZX15ZiysmKmQpDrG83avLIT492QBzLnQIxYCIBaTpOaD20qRlEylyxFSeEA2ba9YOixpX8z46TSDtS40ASECx/EgAxlkQpQ9hYjgGu6EBCPMVPwVIVJqO4XCsMvViHI=";
const TAPROOT_ADDRESS: &str = "bc1ppv609nr0vr25u07u95waq5lucwfm6tde4nydujnu8npg4q75mr5sxq8lt3";
const TAPROOT_HELLO: &str =
    "AUHd69PrJQEv+oKTfZ8l+WROBHuy9HKrbFCJu7U1iK2iiEy1vMU5EfMtjc+VSHM7aU0SDbak5IUZRVno2P5mjSafAQ==";

fn flow() -> MessageVerification<LocalAddressValidator, SignatureVerifier> {
    MessageVerification::new(
        NetworkRegistry::with_defaults(),
        LocalAddressValidator,
        SignatureVerifier,
    )
}

fn request(
    address: &str,
    message: &str,
    signature: &str,
    format: Option<SignatureFormat>,
) -> VerifyRequest {
    VerifyRequest {
        address: address.to_owned(),
        message: message.to_owned(),
        signature: signature.to_owned(),
        format,
        hex_format: false,
    }
}

fn evm_address(key: &SigningKey) -> Address {
    let point = key.verifying_key().to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let mut out = [0u8; 20];
    out.copy_from_slice(&Ripemd160::digest(sha));
    out
}

fn bip137_sign(key: &SigningKey, message: &[u8]) -> String {
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(&bip137_message_hash(message))
        .expect("sign");
    let mut raw = vec![31 + recovery_id.to_byte()];
    raw.extend_from_slice(&signature.to_bytes());
    BASE64.encode(raw)
}

#[test]
fn eip191_signature_is_detected_and_verified() {
    let key = SigningKey::from_slice(&[7u8; 32]).expect("key");
    let address = evm_address(&key).to_checksum(None);
    let message = "Sign in to example.org";
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(eip191_hash_message(message).as_slice())
        .expect("sign");
    let mut raw = signature.to_bytes().to_vec();
    raw.push(27 + recovery_id.to_byte());
    let signature = format!("0x{}", hex::encode(raw));

    let flow = flow();
    let outcome = flow
        .verify(&request(&address, message, &signature, None))
        .expect("verify");
    assert_eq!(outcome.network_id, NetworkId::new("evm--1"));
    assert_eq!(outcome.format, SignatureFormat::Eip191);
    assert!(outcome.valid);

    let tampered = flow
        .verify(&request(&address, "Sign in to example.com", &signature, None))
        .expect("verify");
    assert!(!tampered.valid);
}

#[test]
fn eip191_over_hex_message_uses_decoded_bytes() {
    let key = SigningKey::from_slice(&[8u8; 32]).expect("key");
    let address = evm_address(&key).to_checksum(None);
    let bytes = [0xde, 0xad, 0xbe, 0xef];
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(eip191_hash_message(bytes).as_slice())
        .expect("sign");
    let mut raw = signature.to_bytes().to_vec();
    raw.push(recovery_id.to_byte());

    let outcome = flow()
        .verify(&VerifyRequest {
            address,
            message: "0xdeadbeef".to_owned(),
            signature: hex::encode(raw),
            format: Some(SignatureFormat::Eip191),
            hex_format: true,
        })
        .expect("verify");
    assert!(outcome.valid);
}

#[test]
fn short_evm_signature_is_rejected_as_malformed() {
    let key = SigningKey::from_slice(&[7u8; 32]).expect("key");
    let address = evm_address(&key).to_checksum(None);
    assert!(matches!(
        flow().verify(&request(&address, "hello", "0x1234", None)),
        Err(PortError::Validation(_))
    ));
}

#[test]
fn bip137_verifies_for_legacy_and_segwit_addresses() {
    let key = SigningKey::from_slice(&[11u8; 32]).expect("key");
    let public_key = key.verifying_key().to_encoded_point(true);
    let message = b"proof of reserves";
    let signature = bip137_sign(&key, message);

    let mut payload = vec![0x00];
    payload.extend_from_slice(&hash160(public_key.as_bytes()));
    let legacy = bs58::encode(payload).with_check().into_string();
    let segwit = p2wpkh_address(public_key.as_bytes()).expect("p2wpkh");

    let flow = flow();
    for address in [legacy.as_str(), segwit.as_str()] {
        let outcome = flow
            .verify(&request(
                address,
                "proof of reserves",
                &signature,
                Some(SignatureFormat::Bip137),
            ))
            .expect("verify");
        assert_eq!(outcome.network_id, NetworkId::new("btc--0"));
        assert!(outcome.valid, "{address}");
    }

    let other = SigningKey::from_slice(&[12u8; 32]).expect("key");
    let other_address =
        p2wpkh_address(other.verifying_key().to_encoded_point(true).as_bytes()).expect("p2wpkh");
    let mismatch = flow
        .verify(&request(
            &other_address,
            "proof of reserves",
            &signature,
            Some(SignatureFormat::Bip137),
        ))
        .expect("verify");
    assert!(!mismatch.valid);
}

#[test]
fn bitcoin_requires_an_explicit_format() {
    assert!(matches!(
        flow().verify(&request(BIP322_ADDRESS, "Hello World", BIP322_HELLO, None)),
        Err(PortError::Validation(_))
    ));
}

#[test]
fn bip137_is_not_offered_for_taproot() {
    let flow = flow();
    let options = flow.format_options(&NetworkId::new("btc--0"), TAPROOT_ADDRESS);
    assert_eq!(options.available, vec![SignatureFormat::Bip322]);
    assert_eq!(options.suggested, Some(SignatureFormat::Bip322));
    assert!(matches!(
        flow.verify(&request(
            TAPROOT_ADDRESS,
            "Hello World",
            TAPROOT_HELLO,
            Some(SignatureFormat::Bip137),
        )),
        Err(PortError::Validation(_))
    ));
}

#[test]
fn bip322_reference_vectors_verify() {
    let flow = flow();
    for (message, signature) in [("Hello World", BIP322_HELLO), ("", BIP322_EMPTY)] {
        let outcome = flow
            .verify(&request(
                BIP322_ADDRESS,
                message,
                signature,
                Some(SignatureFormat::Bip322),
            ))
            .expect("verify");
        assert!(outcome.valid, "{message:?}");
    }

    let swapped = flow
        .verify(&request(
            BIP322_ADDRESS,
            "Hello World",
            BIP322_EMPTY,
            Some(SignatureFormat::Bip322),
        ))
        .expect("verify");
    assert!(!swapped.valid);
}

#[test]
fn bip322_taproot_key_path_verifies() {
    let flow = flow();
    let outcome = flow
        .verify(&request(
            TAPROOT_ADDRESS,
            "Hello World",
            TAPROOT_HELLO,
            Some(SignatureFormat::Bip322),
        ))
        .expect("verify");
    assert!(outcome.valid);

    let tampered = flow
        .verify(&request(
            TAPROOT_ADDRESS,
            "Hello World!",
            TAPROOT_HELLO,
            Some(SignatureFormat::Bip322),
        ))
        .expect("verify");
    assert!(!tampered.valid);
}

#[test]
fn ed25519_signature_verifies_against_solana_address() {
    let key = ed25519_dalek::SigningKey::from_bytes(&[9u8; 32]);
    let address = bs58::encode(key.verifying_key().to_bytes()).into_string();
    let message = "solana login";
    let signature = bs58::encode(key.sign(message.as_bytes()).to_bytes()).into_string();

    let flow = flow();
    let outcome = flow
        .verify(&request(&address, message, &signature, None))
        .expect("verify");
    assert_eq!(outcome.network_id, NetworkId::new("sol--101"));
    assert_eq!(outcome.format, SignatureFormat::Ed25519);
    assert!(outcome.valid);

    let tampered = flow
        .verify(&request(&address, "solana logout", &signature, None))
        .expect("verify");
    assert!(!tampered.valid);
}

#[test]
fn oversized_message_is_rejected_before_verifying() {
    let flow = flow().with_max_message_len(4);
    assert!(matches!(
        flow.verify(&request(
            BIP322_ADDRESS,
            "Hello World",
            BIP322_HELLO,
            Some(SignatureFormat::Bip322),
        )),
        Err(PortError::Validation(_))
    ));
}
