//! Chain-specific validation of unsigned messages before they reach the signer.

use serde_json::Value;

use crate::domain::{MessageType, UnsignedMessage};
use crate::network::NetworkInfo;
use crate::ports::PortError;

pub fn validate_message(
    message: &UnsignedMessage,
    network: &NetworkInfo,
    allow_eth_sign: bool,
) -> Result<(), PortError> {
    if !network
        .capabilities
        .message_types
        .contains(&message.message_type)
    {
        return Err(PortError::Validation(format!(
            "{:?} messages are not supported on {}",
            message.message_type, network.name
        )));
    }

    match message.message_type {
        MessageType::Sign => {
            if !allow_eth_sign {
                return Err(PortError::Policy("eth_sign is disabled".to_string()));
            }
            validate_plain(&message.message)
        }
        MessageType::PersonalSign => validate_plain(&message.message),
        MessageType::TypedDataV1 => validate_typed_v1(&message.message),
        MessageType::TypedDataV3 | MessageType::TypedDataV4 => {
            validate_typed_v3_v4(&message.message, network.chain_id)
        }
    }
}

fn validate_plain(message: &str) -> Result<(), PortError> {
    if message.is_empty() {
        return Err(PortError::Validation("message is empty".to_string()));
    }
    if let Some(hex) = message.strip_prefix("0x") {
        alloy::primitives::hex::decode(hex)
            .map_err(|e| PortError::Validation(format!("invalid hex message: {e}")))?;
    }
    Ok(())
}

fn parse_json(message: &str) -> Result<Value, PortError> {
    serde_json::from_str(message)
        .map_err(|e| PortError::Validation(format!("typed data is not valid json: {e}")))
}

fn validate_typed_v1(message: &str) -> Result<(), PortError> {
    let value = parse_json(message)?;
    let entries = value
        .as_array()
        .ok_or_else(|| PortError::Validation("typed data v1 must be an array".to_string()))?;
    if entries.is_empty() {
        return Err(PortError::Validation("typed data v1 is empty".to_string()));
    }
    for entry in entries {
        let fields_present = ["type", "name", "value"]
            .iter()
            .all(|field| entry.get(field).is_some());
        if !fields_present {
            return Err(PortError::Validation(
                "typed data v1 entries need type, name and value".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_typed_v3_v4(message: &str, network_chain_id: Option<u64>) -> Result<(), PortError> {
    let value = parse_json(message)?;
    let object = value
        .as_object()
        .ok_or_else(|| PortError::Validation("typed data must be an object".to_string()))?;

    for field in ["types", "domain", "message"] {
        if !object.get(field).is_some_and(Value::is_object) {
            return Err(PortError::Validation(format!(
                "typed data field {field} must be an object"
            )));
        }
    }
    if !object.get("primaryType").is_some_and(Value::is_string) {
        return Err(PortError::Validation(
            "typed data primaryType must be a string".to_string(),
        ));
    }

    if let Some(raw_chain_id) = object.get("domain").and_then(|domain| domain.get("chainId")) {
        let chain_id = parse_chain_id(raw_chain_id)?;
        if Some(chain_id) != network_chain_id {
            return Err(PortError::Validation(format!(
                "typed data chainId {chain_id} does not match the active network"
            )));
        }
    }
    Ok(())
}

fn parse_chain_id(value: &Value) -> Result<u64, PortError> {
    let invalid = || PortError::Validation(format!("invalid typed data chainId {value}"));
    match value {
        Value::Number(number) => number.as_u64().ok_or_else(invalid),
        Value::String(text) => match text.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16).map_err(|_| invalid()),
            None => text.parse::<u64>().map_err(|_| invalid()),
        },
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ImplementationTag;

    fn ethereum() -> NetworkInfo {
        NetworkInfo::new("evm--1", "Ethereum", ImplementationTag::Evm, Some(1), "ETH", 18)
    }

    fn message(message_type: MessageType, message: &str) -> UnsignedMessage {
        UnsignedMessage {
            message_type,
            message: message.to_string(),
        }
    }

    #[test]
    fn eth_sign_requires_opt_in() {
        let msg = message(MessageType::Sign, "0xdeadbeef");
        let err = validate_message(&msg, &ethereum(), false).expect_err("disabled");
        assert!(matches!(err, PortError::Policy(_)));
        validate_message(&msg, &ethereum(), true).expect("enabled");
    }

    #[test]
    fn personal_sign_rejects_bad_hex() {
        let msg = message(MessageType::PersonalSign, "0xzz");
        let err = validate_message(&msg, &ethereum(), false).expect_err("bad hex");
        assert!(matches!(err, PortError::Validation(_)));
        validate_message(&message(MessageType::PersonalSign, "hello"), &ethereum(), false)
            .expect("plain text");
    }

    #[test]
    fn typed_data_v4_checks_chain_id() {
        let doc = |chain: &str| {
            format!(
                r#"{{"types":{{"EIP712Domain":[]}},"primaryType":"Mail","domain":{{"chainId":{chain}}},"message":{{}}}}"#
            )
        };
        validate_message(
            &message(MessageType::TypedDataV4, &doc("1")),
            &ethereum(),
            false,
        )
        .expect("matching chain");
        validate_message(
            &message(MessageType::TypedDataV4, &doc("\"0x1\"")),
            &ethereum(),
            false,
        )
        .expect("hex chain id");
        let err = validate_message(
            &message(MessageType::TypedDataV4, &doc("137")),
            &ethereum(),
            false,
        )
        .expect_err("mismatch");
        assert!(matches!(err, PortError::Validation(_)));
    }

    #[test]
    fn typed_data_v1_needs_entries() {
        validate_message(
            &message(
                MessageType::TypedDataV1,
                r#"[{"type":"string","name":"greeting","value":"hi"}]"#,
            ),
            &ethereum(),
            false,
        )
        .expect("v1");
        let err = validate_message(
            &message(MessageType::TypedDataV1, r#"[{"name":"greeting"}]"#),
            &ethereum(),
            false,
        )
        .expect_err("missing fields");
        assert!(matches!(err, PortError::Validation(_)));
    }
}
