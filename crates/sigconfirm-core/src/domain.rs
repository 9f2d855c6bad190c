use std::fmt;
use std::sync::Arc;

use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use crate::fee::FeeInfoUnit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimestampMs(pub u64);

/// Network identifier of the form `<impl>--<chain>`, e.g. `evm--1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetworkId(pub String);

impl NetworkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn impl_prefix(&self) -> &str {
        self.0.split("--").next().unwrap_or_default()
    }

    pub fn chain_part(&self) -> Option<&str> {
        self.0.split_once("--").map(|(_, chain)| chain)
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImplementationTag {
    Evm,
    Btc,
    Sol,
    Tron,
    Cosmos,
}

impl ImplementationTag {
    pub const ALL: [ImplementationTag; 5] = [
        ImplementationTag::Evm,
        ImplementationTag::Btc,
        ImplementationTag::Sol,
        ImplementationTag::Tron,
        ImplementationTag::Cosmos,
    ];

    pub fn as_prefix(self) -> &'static str {
        match self {
            ImplementationTag::Evm => "evm",
            ImplementationTag::Btc => "btc",
            ImplementationTag::Sol => "sol",
            ImplementationTag::Tron => "tron",
            ImplementationTag::Cosmos => "cosmos",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.as_prefix() == prefix)
    }
}

impl fmt::Display for ImplementationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_prefix())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    Sign,
    PersonalSign,
    TypedDataV1,
    TypedDataV3,
    TypedDataV4,
}

impl MessageType {
    pub fn is_typed_data(self) -> bool {
        matches!(
            self,
            MessageType::TypedDataV1 | MessageType::TypedDataV3 | MessageType::TypedDataV4
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedMessage {
    pub message_type: MessageType,
    /// Raw message. Typed-data variants carry the JSON document as text.
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmTx {
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    pub chain_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BtcInput {
    pub txid: String,
    pub vout: u32,
    pub address: String,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BtcOutput {
    pub address: String,
    pub value: u64,
    pub is_change: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BtcTx {
    pub inputs: Vec<BtcInput>,
    pub outputs: Vec<BtcOutput>,
}

impl BtcTx {
    /// Rough segwit vsize used until the signer reports the real weight.
    pub fn vsize_estimate(&self) -> u64 {
        11 + 68 * self.inputs.len() as u64 + 31 * self.outputs.len() as u64
    }

    pub fn total_in(&self) -> u64 {
        self.inputs.iter().map(|input| input.value).sum()
    }

    pub fn total_out(&self) -> u64 {
        self.outputs.iter().map(|output| output.value).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolInstruction {
    pub program_id: String,
    pub accounts: Vec<String>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolTx {
    pub fee_payer: String,
    pub recent_blockhash: String,
    pub instructions: Vec<SolInstruction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TronContract {
    Transfer {
        to_address: String,
        amount: u64,
    },
    TriggerSmartContract {
        contract_address: String,
        call_value: u64,
        data: Bytes,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TronTx {
    pub owner_address: String,
    pub contract: TronContract,
    pub fee_limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncodedTx {
    Evm(EvmTx),
    Btc(BtcTx),
    Sol(SolTx),
    Tron(TronTx),
    /// Payload of a chain without a local decoder.
    Opaque { bytes: Bytes },
}

impl EncodedTx {
    /// `None` for opaque payloads, which match any network.
    pub fn implementation(&self) -> Option<ImplementationTag> {
        match self {
            EncodedTx::Evm(_) => Some(ImplementationTag::Evm),
            EncodedTx::Btc(_) => Some(ImplementationTag::Btc),
            EncodedTx::Sol(_) => Some(ImplementationTag::Sol),
            EncodedTx::Tron(_) => Some(ImplementationTag::Tron),
            EncodedTx::Opaque { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    pub encoded: EncodedTx,
    pub nonce: Option<u64>,
    pub fee: Option<FeeInfoUnit>,
    /// Bumped every time a new intent is derived from this one.
    pub revision: u64,
}

impl UnsignedTransaction {
    pub fn new(encoded: EncodedTx) -> Self {
        Self {
            encoded,
            nonce: None,
            fee: None,
            revision: 0,
        }
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnsignedIntent {
    Transaction(UnsignedTransaction),
    Message(UnsignedMessage),
}

impl UnsignedIntent {
    pub fn as_transaction(&self) -> Option<&UnsignedTransaction> {
        match self {
            UnsignedIntent::Transaction(tx) => Some(tx),
            UnsignedIntent::Message(_) => None,
        }
    }

    pub fn as_message(&self) -> Option<&UnsignedMessage> {
        match self {
            UnsignedIntent::Message(message) => Some(message),
            UnsignedIntent::Transaction(_) => None,
        }
    }

    pub fn revision(&self) -> u64 {
        match self {
            UnsignedIntent::Transaction(tx) => tx.revision,
            UnsignedIntent::Message(_) => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostSecurityLevel {
    Trusted,
    Unknown,
    Risky,
    Malicious,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub origin: Option<String>,
    /// Set for wallet-internal flows that reuse the pipeline.
    pub internal: bool,
}

impl SourceInfo {
    pub fn internal() -> Self {
        Self {
            origin: None,
            internal: true,
        }
    }

    pub fn dapp(origin: impl Into<String>) -> Self {
        Self {
            origin: Some(origin.into()),
            internal: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountContext {
    pub id: AccountId,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    pub intents: Vec<Arc<UnsignedIntent>>,
    pub network_id: NetworkId,
    pub account_id: AccountId,
    pub source: SourceInfo,
    pub request_id: RequestId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplaceTxKind {
    SpeedUp,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedPayload {
    pub intent_revision: u64,
    pub raw: Bytes,
    pub signature: Bytes,
    pub tx_hash: Option<B256>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignResult {
    pub request_id: RequestId,
    pub payloads: Vec<SignedPayload>,
    pub replace: Option<ReplaceTxKind>,
}
