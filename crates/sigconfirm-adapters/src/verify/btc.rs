use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bech32::{ToBase32, Variant};
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use sigconfirm_core::PortError;

use crate::address::{
    decode_base58check, decode_segwit, BTC_HRP, BTC_P2PKH_VERSION, BTC_P2SH_VERSION,
};

const SIGNED_MESSAGE_PREFIX: &[u8] = b"Bitcoin Signed Message:\n";
const BIP322_TAG: &[u8] = b"BIP0322-signed-message";
const TAP_SIGHASH_TAG: &[u8] = b"TapSighash";
const SIGHASH_DEFAULT: u8 = 0x00;
const SIGHASH_ALL: u8 = 0x01;
const OP_RETURN: u8 = 0x6a;

/// What a given address commits to.
enum AddressKind {
    P2pkh([u8; 20]),
    P2sh([u8; 20]),
    P2wpkh([u8; 20]),
    P2tr([u8; 32]),
    Other,
}

fn parse_address(address: &str) -> Result<AddressKind, PortError> {
    if let Some(payload) = decode_base58check(address) {
        if payload.len() == 21 {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(&payload[1..]);
            return match payload[0] {
                BTC_P2PKH_VERSION => Ok(AddressKind::P2pkh(hash)),
                BTC_P2SH_VERSION => Ok(AddressKind::P2sh(hash)),
                _ => Ok(AddressKind::Other),
            };
        }
    }
    match decode_segwit(address) {
        Some((0, program)) if program.len() == 20 => {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(&program);
            Ok(AddressKind::P2wpkh(hash))
        }
        Some((1, program)) if program.len() == 32 => {
            let mut key = [0u8; 32];
            key.copy_from_slice(&program);
            Ok(AddressKind::P2tr(key))
        }
        Some(_) => Ok(AddressKind::Other),
        None => Err(PortError::Validation(format!(
            "invalid bitcoin address {address}"
        ))),
    }
}

fn sha256d(data: &[u8]) -> [u8; 32] {
    Sha256::digest(Sha256::digest(data)).into()
}

fn hash160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(Sha256::digest(data)).into()
}

fn tagged_hash(tag: &[u8], data: &[u8]) -> [u8; 32] {
    let tag_hash = Sha256::digest(tag);
    let mut hasher = Sha256::new();
    hasher.update(tag_hash);
    hasher.update(tag_hash);
    hasher.update(data);
    hasher.finalize().into()
}

fn write_compact_size(out: &mut Vec<u8>, n: usize) {
    match n {
        0..=0xfc => out.push(n as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&(n as u64).to_le_bytes());
        }
    }
}

fn read_compact_size(data: &[u8], pos: &mut usize) -> Option<usize> {
    let first = *data.get(*pos)?;
    *pos += 1;
    let width = match first {
        0xfd => 2,
        0xfe => 4,
        0xff => 8,
        n => return Some(n as usize),
    };
    let bytes = data.get(*pos..*pos + width)?;
    *pos += width;
    let mut buf = [0u8; 8];
    buf[..width].copy_from_slice(bytes);
    usize::try_from(u64::from_le_bytes(buf)).ok()
}

/// Double-SHA256 of the length-prefixed magic and message.
pub fn bip137_message_hash(message: &[u8]) -> [u8; 32] {
    let mut data = Vec::with_capacity(SIGNED_MESSAGE_PREFIX.len() + message.len() + 10);
    write_compact_size(&mut data, SIGNED_MESSAGE_PREFIX.len());
    data.extend_from_slice(SIGNED_MESSAGE_PREFIX);
    write_compact_size(&mut data, message.len());
    data.extend_from_slice(message);
    sha256d(&data)
}

pub fn bip322_message_hash(message: &[u8]) -> [u8; 32] {
    tagged_hash(BIP322_TAG, message)
}

/// Native segwit address of a compressed public key.
pub fn p2wpkh_address(public_key: &[u8]) -> Result<String, PortError> {
    encode_p2wpkh(&hash160(public_key))
}

fn encode_p2wpkh(key_hash: &[u8; 20]) -> Result<String, PortError> {
    let version = bech32::u5::try_from_u8(0)
        .map_err(|e| PortError::Protocol(format!("witness version: {e}")))?;
    let mut data = vec![version];
    data.extend(key_hash.to_base32());
    bech32::encode(BTC_HRP, data, Variant::Bech32)
        .map_err(|e| PortError::Protocol(format!("bech32 encode failed: {e}")))
}

/// Headers 27..=30 sign with an uncompressed key, 31..=42 with a compressed
/// one. Any compressed header is accepted for any compressed-key address type.
pub(super) fn verify_bip137(
    address: &str,
    message: &[u8],
    signature: &str,
) -> Result<bool, PortError> {
    let raw = BASE64
        .decode(signature.trim())
        .map_err(|e| PortError::Validation(format!("signature is not valid base64: {e}")))?;
    if raw.len() != 65 {
        return Err(PortError::Validation(format!(
            "signature must be 65 bytes, got {}",
            raw.len()
        )));
    }
    let header = raw[0];
    if !(27..=42).contains(&header) {
        return Err(PortError::Validation(format!(
            "invalid signature header {header}"
        )));
    }
    let compressed = header >= 31;
    let recovery_id = RecoveryId::from_byte((header - 27) % 4)
        .ok_or_else(|| PortError::Validation(format!("invalid signature header {header}")))?;
    let signature = Signature::from_slice(&raw[1..])
        .map_err(|e| PortError::Validation(format!("invalid signature: {e}")))?;
    let (signature, recovery_id) = match signature.normalize_s() {
        Some(normalized) => (
            normalized,
            RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced()),
        ),
        None => (signature, recovery_id),
    };

    let hash = bip137_message_hash(message);
    let Ok(key) = VerifyingKey::recover_from_prehash(&hash, &signature, recovery_id) else {
        return Ok(false);
    };
    let point = key.to_encoded_point(compressed);
    let key_hash = hash160(point.as_bytes());

    Ok(match parse_address(address)? {
        AddressKind::P2pkh(hash) => hash == key_hash,
        AddressKind::P2sh(hash) if compressed => {
            let mut redeem = vec![0x00, 0x14];
            redeem.extend_from_slice(&key_hash);
            hash == hash160(&redeem)
        }
        AddressKind::P2wpkh(hash) if compressed => hash == key_hash,
        _ => false,
    })
}

fn script_pubkey(kind: &AddressKind) -> Result<Vec<u8>, PortError> {
    match kind {
        AddressKind::P2wpkh(hash) => {
            let mut script = vec![0x00, 0x14];
            script.extend_from_slice(hash);
            Ok(script)
        }
        AddressKind::P2tr(key) => {
            let mut script = vec![0x51, 0x20];
            script.extend_from_slice(key);
            Ok(script)
        }
        _ => Err(PortError::Validation(
            "bip322 verification supports p2wpkh and p2tr addresses".to_owned(),
        )),
    }
}

/// Txid of the virtual `to_spend` transaction committing to `message_hash`.
fn to_spend_txid(message_hash: &[u8; 32], script_pubkey: &[u8]) -> [u8; 32] {
    let mut tx = Vec::with_capacity(128);
    tx.extend_from_slice(&0u32.to_le_bytes());
    write_compact_size(&mut tx, 1);
    tx.extend_from_slice(&[0u8; 32]);
    tx.extend_from_slice(&u32::MAX.to_le_bytes());
    write_compact_size(&mut tx, 34);
    tx.extend_from_slice(&[0x00, 0x20]);
    tx.extend_from_slice(message_hash);
    tx.extend_from_slice(&0u32.to_le_bytes());
    write_compact_size(&mut tx, 1);
    tx.extend_from_slice(&0u64.to_le_bytes());
    write_compact_size(&mut tx, script_pubkey.len());
    tx.extend_from_slice(script_pubkey);
    tx.extend_from_slice(&0u32.to_le_bytes());
    sha256d(&tx)
}

/// The single zero-value OP_RETURN output of `to_sign`.
fn to_sign_outputs() -> Vec<u8> {
    let mut outputs = Vec::with_capacity(10);
    outputs.extend_from_slice(&0u64.to_le_bytes());
    write_compact_size(&mut outputs, 1);
    outputs.push(OP_RETURN);
    outputs
}

fn prevout(txid: &[u8; 32]) -> Vec<u8> {
    let mut out = txid.to_vec();
    out.extend_from_slice(&0u32.to_le_bytes());
    out
}

/// BIP-143 digest of `to_sign` spending a p2wpkh `to_spend` output.
fn segwit_v0_sighash(txid: &[u8; 32], key_hash: &[u8; 20], sighash_type: u8) -> [u8; 32] {
    let mut preimage = Vec::with_capacity(160);
    preimage.extend_from_slice(&0u32.to_le_bytes());
    preimage.extend_from_slice(&sha256d(&prevout(txid)));
    preimage.extend_from_slice(&sha256d(&0u32.to_le_bytes()));
    preimage.extend_from_slice(&prevout(txid));
    preimage.extend_from_slice(&[0x19, 0x76, 0xa9, 0x14]);
    preimage.extend_from_slice(key_hash);
    preimage.extend_from_slice(&[0x88, 0xac]);
    preimage.extend_from_slice(&0u64.to_le_bytes());
    preimage.extend_from_slice(&0u32.to_le_bytes());
    preimage.extend_from_slice(&sha256d(&to_sign_outputs()));
    preimage.extend_from_slice(&0u32.to_le_bytes());
    preimage.extend_from_slice(&u32::from(sighash_type).to_le_bytes());
    sha256d(&preimage)
}

/// BIP-341 key-path digest of `to_sign`.
fn taproot_sighash(txid: &[u8; 32], script_pubkey: &[u8], sighash_type: u8) -> [u8; 32] {
    let mut script = Vec::with_capacity(script_pubkey.len() + 1);
    write_compact_size(&mut script, script_pubkey.len());
    script.extend_from_slice(script_pubkey);

    let mut msg = Vec::with_capacity(180);
    msg.push(0x00);
    msg.push(sighash_type);
    msg.extend_from_slice(&0u32.to_le_bytes());
    msg.extend_from_slice(&0u32.to_le_bytes());
    msg.extend_from_slice(&Sha256::digest(prevout(txid)));
    msg.extend_from_slice(&Sha256::digest(0u64.to_le_bytes()));
    msg.extend_from_slice(&Sha256::digest(&script));
    msg.extend_from_slice(&Sha256::digest(0u32.to_le_bytes()));
    msg.extend_from_slice(&Sha256::digest(to_sign_outputs()));
    msg.push(0x00);
    msg.extend_from_slice(&0u32.to_le_bytes());
    tagged_hash(TAP_SIGHASH_TAG, &msg)
}

fn parse_witness(raw: &[u8]) -> Result<Vec<Vec<u8>>, PortError> {
    let malformed = || PortError::Validation("malformed bip322 witness".to_owned());
    let mut pos = 0;
    let count = read_compact_size(raw, &mut pos).ok_or_else(malformed)?;
    let mut items = Vec::with_capacity(count.min(8));
    for _ in 0..count {
        let len = read_compact_size(raw, &mut pos).ok_or_else(malformed)?;
        let item = raw.get(pos..pos + len).ok_or_else(malformed)?;
        items.push(item.to_vec());
        pos += len;
    }
    if pos != raw.len() {
        return Err(malformed());
    }
    Ok(items)
}

/// Simple BIP-322: the signature is the base64 witness of `to_sign`.
pub(super) fn verify_bip322(
    address: &str,
    message: &[u8],
    signature: &str,
) -> Result<bool, PortError> {
    let kind = parse_address(address)?;
    let script = script_pubkey(&kind)?;
    let raw = BASE64
        .decode(signature.trim())
        .map_err(|e| PortError::Validation(format!("signature is not valid base64: {e}")))?;
    let witness = parse_witness(&raw)?;
    let txid = to_spend_txid(&bip322_message_hash(message), &script);

    match kind {
        AddressKind::P2wpkh(key_hash) => {
            let [sig, pubkey] = witness.as_slice() else {
                return Err(PortError::Validation(
                    "p2wpkh witness must hold a signature and a public key".to_owned(),
                ));
            };
            if hash160(pubkey) != key_hash {
                return Ok(false);
            }
            let Some((&sighash_type, der)) = sig.split_last() else {
                return Ok(false);
            };
            if sighash_type != SIGHASH_ALL {
                return Ok(false);
            }
            let key = VerifyingKey::from_sec1_bytes(pubkey)
                .map_err(|e| PortError::Validation(format!("invalid public key: {e}")))?;
            let Ok(signature) = Signature::from_der(der) else {
                return Ok(false);
            };
            let signature = signature.normalize_s().unwrap_or(signature);
            let digest = segwit_v0_sighash(&txid, &key_hash, sighash_type);
            Ok(key.verify_prehash(&digest, &signature).is_ok())
        }
        AddressKind::P2tr(output_key) => {
            let [sig] = witness.as_slice() else {
                return Err(PortError::Validation(
                    "p2tr key-path witness must hold one signature".to_owned(),
                ));
            };
            let (sig, sighash_type) = match sig.len() {
                64 => (sig.as_slice(), SIGHASH_DEFAULT),
                65 if sig[64] == SIGHASH_ALL => (&sig[..64], SIGHASH_ALL),
                _ => return Ok(false),
            };
            let key = k256::schnorr::VerifyingKey::from_bytes(&output_key)
                .map_err(|e| PortError::Validation(format!("invalid taproot output key: {e}")))?;
            let Ok(signature) = k256::schnorr::Signature::try_from(sig) else {
                return Ok(false);
            };
            let digest = taproot_sighash(&txid, &script, sighash_type);
            Ok(key.verify_prehash(&digest, &signature).is_ok())
        }
        _ => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bip322_message_hash_matches_reference_vectors() {
        assert_eq!(
            alloy::primitives::hex::encode(bip322_message_hash(b"")),
            "c90c269c4f8fcbe6880f72a721ddfbf1914268a794cbb21cfafee13770ae19f1"
        );
        assert_eq!(
            alloy::primitives::hex::encode(bip322_message_hash(b"Hello World")),
            "f0eb03b1a75ac6d9847f55c624a99169b5dccba2a31f5b23bea77ba270de0a7a"
        );
    }

    #[test]
    fn compact_size_round_trips_through_witness_parse() {
        let mut raw = Vec::new();
        write_compact_size(&mut raw, 2);
        write_compact_size(&mut raw, 3);
        raw.extend_from_slice(&[1, 2, 3]);
        write_compact_size(&mut raw, 0);
        assert_eq!(
            parse_witness(&raw).expect("witness"),
            vec![vec![1, 2, 3], Vec::new()]
        );
        raw.push(0);
        assert!(parse_witness(&raw).is_err());
    }

    #[test]
    fn p2wpkh_address_encodes_key_hash() {
        let address = encode_p2wpkh(&[0x75; 20]).expect("address");
        assert!(matches!(parse_address(&address), Ok(AddressKind::P2wpkh(hash)) if hash == [0x75; 20]));
    }
}
