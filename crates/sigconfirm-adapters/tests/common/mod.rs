#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use alloy::primitives::{Address, Bytes, U256};

use sigconfirm_adapters::{
    AccountDirectoryAdapter, DeterministicSignerAdapter, FeeEstimatorAdapter, HostListAdapter,
    PendingNonceBook, PriceTableAdapter, TokenDirectoryAdapter,
};
use sigconfirm_core::display::{NftStandard, TokenRef};
use sigconfirm_core::domain::{EncodedTx, EvmTx};
use sigconfirm_core::ports::ClockPort;
use sigconfirm_core::{
    AccountId, ConfirmationPipeline, ConfirmationRequest, NetworkId, NetworkRegistry,
    PipelinePorts, PipelineSettings, PortError, RequestId, SourceInfo, UnsignedIntent,
    UnsignedTransaction,
};

pub const ACCOUNT_ADDRESS: &str = "0x1000000000000000000000000000000000000001";
pub const USDC: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";
pub const NFT_CONTRACT: &str = "0x000000000000000000000000000000000000bEEF";
pub const SPENDER: &str = "0x2000000000000000000000000000000000000002";
pub const RECIPIENT: &str = "0x3000000000000000000000000000000000000003";
pub const CURRENT_NONCE: u64 = 7;

#[derive(Debug, Default)]
pub struct TestClock {
    now: AtomicU64,
}

impl ClockPort for TestClock {
    fn now_ms(&self) -> Result<u64, PortError> {
        Ok(self.now.fetch_add(1, Ordering::SeqCst) + 1_739_750_400_000)
    }
}

pub type TestPipeline = ConfirmationPipeline<
    AccountDirectoryAdapter,
    TokenDirectoryAdapter,
    PriceTableAdapter,
    FeeEstimatorAdapter,
    DeterministicSignerAdapter,
    HostListAdapter,
    PendingNonceBook,
    TestClock,
>;

pub fn evm_network() -> NetworkId {
    NetworkId::new("evm--1")
}

pub fn account() -> AccountId {
    AccountId::new("acct-1")
}

pub fn address(raw: &str) -> Address {
    raw.parse().expect("address")
}

pub fn new_pipeline() -> TestPipeline {
    let network = evm_network();
    let accounts = AccountDirectoryAdapter::new();
    accounts
        .insert(
            &account(),
            &network,
            ACCOUNT_ADDRESS,
            Some(U256::from(10u64) * U256::from(10u64).pow(U256::from(18u64))),
        )
        .expect("account");

    let metadata = TokenDirectoryAdapter::new();
    metadata
        .insert_token(
            &network,
            TokenRef {
                address: Some(USDC.to_owned()),
                symbol: "USDC".to_owned(),
                decimals: Some(6),
                name: Some("USD Coin".to_owned()),
                icon: None,
            },
        )
        .expect("usdc");
    metadata
        .insert_nft(&network, NFT_CONTRACT, Some("Fixture Punks".to_owned()), NftStandard::Erc721)
        .expect("nft");

    let prices = PriceTableAdapter::new();
    prices.set_price(&network, None, 2_000.0).expect("eth price");
    prices.set_price(&network, Some(USDC), 1.0).expect("usdc price");

    let nonces = PendingNonceBook::new();
    nonces
        .set_current(&account(), &network, CURRENT_NONCE)
        .expect("nonce");

    ConfirmationPipeline::new(
        NetworkRegistry::with_defaults(),
        PipelinePorts {
            accounts,
            metadata,
            prices,
            fees: FeeEstimatorAdapter::deterministic(vec![9_000, 10_000, 12_500]),
            signer: DeterministicSignerAdapter::new(),
            host_security: HostListAdapter::new(
                vec!["app.uniswap.org".to_owned()],
                vec!["drainer.example".to_owned()],
            ),
            nonces,
            clock: TestClock::default(),
        },
        PipelineSettings::default(),
    )
}

pub fn evm_tx(to: &str, value: U256, data: Vec<u8>, nonce: Option<u64>) -> Arc<UnsignedIntent> {
    let tx = UnsignedTransaction::new(EncodedTx::Evm(EvmTx {
        from: address(ACCOUNT_ADDRESS),
        to: Some(address(to)),
        value,
        data: Bytes::from(data),
        chain_id: 1,
    }));
    let tx = match nonce {
        Some(nonce) => tx.with_nonce(nonce),
        None => tx,
    };
    Arc::new(UnsignedIntent::Transaction(tx))
}

pub fn request(
    id: &str,
    intents: Vec<Arc<UnsignedIntent>>,
    source: SourceInfo,
) -> ConfirmationRequest {
    ConfirmationRequest {
        intents,
        network_id: evm_network(),
        account_id: account(),
        source,
        request_id: RequestId::new(id),
    }
}
