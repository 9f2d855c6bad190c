mod common;

use std::sync::Arc;

use alloy::primitives::U256;
use sigconfirm_core::decode::calldata::encode_transfer;
use sigconfirm_core::display::{DisplayComponent, ExtraInfo};
use sigconfirm_core::domain::{
    BtcInput, BtcOutput, BtcTx, EncodedTx, MessageType, TronContract, TronTx,
};
use sigconfirm_core::{
    AccountId, ConfirmationRequest, FeeInfoUnit, FeeType, NetworkId, RequestId, SendFeeStatus,
    SessionEvent, SourceInfo, SubmitBlocker, UnsignedIntent, UnsignedMessage,
    UnsignedTransaction,
};

use common::{address, evm_tx, new_pipeline, request, CURRENT_NONCE, RECIPIENT, USDC};

const BTC_ADDRESS: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";
const TRON_ADDRESS: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";

fn one_eth() -> U256 {
    U256::from(10u64).pow(U256::from(18u64))
}

#[test]
fn fee_selection_total_matches_selected_units() {
    let pipeline = new_pipeline();
    let intents = vec![
        evm_tx(RECIPIENT, one_eth(), Vec::new(), Some(CURRENT_NONCE)),
        evm_tx(
            USDC,
            U256::ZERO,
            encode_transfer(address(RECIPIENT), U256::from(1_000_000u64)),
            Some(CURRENT_NONCE + 1),
        ),
    ];
    let (mut session, _receiver) = pipeline
        .request_confirmation(request("req-fees", intents, SourceInfo::internal()))
        .expect("request");

    assert_eq!(session.fee_status(), &SendFeeStatus::Ready);
    let estimate = session.fee_estimate().expect("estimate");
    assert_eq!(estimate.presets.len(), 3);
    assert!(!estimate.is_single_preset());

    let selection = session.fee_selection().expect("selection");
    assert_eq!(selection.fee_type(), FeeType::Standard);
    assert_eq!(selection.preset_index(), Some(1));
    assert_eq!(selection.fee_infos().len(), 2);
    let sum = selection
        .fee_infos()
        .iter()
        .fold(U256::ZERO, |acc, unit| acc + unit.total_native());
    assert_eq!(selection.total(), sum);
    assert!(selection.total_native_for_display().ends_with(" ETH"));
    assert!(selection.total_fiat_for_display().is_some());

    let normal = selection.total();
    session.select_fee_preset(2).expect("fast preset");
    assert!(session.fee_selection().expect("selection").total() > normal);
    assert!(session.select_fee_preset(7).is_err());

    session
        .set_custom_fee(FeeInfoUnit::Eip1559 {
            gas_limit: 1,
            max_fee_per_gas: U256::from(30_000_000_000u64),
            max_priority_fee_per_gas: U256::from(2_000_000_000u64),
        })
        .expect("custom fee");
    let selection = session.fee_selection().expect("selection");
    assert_eq!(selection.fee_type(), FeeType::Custom);
    for (unit, preset_unit) in selection
        .fee_infos()
        .iter()
        .zip(&session.fee_estimate().expect("estimate").presets[1].per_intent)
    {
        let (FeeInfoUnit::Eip1559 { gas_limit, max_fee_per_gas, .. }, FeeInfoUnit::Eip1559 { gas_limit: estimated, .. }) =
            (unit, preset_unit)
        else {
            panic!("unexpected fee units {unit:?} {preset_unit:?}");
        };
        assert_eq!(gas_limit, estimated);
        assert_eq!(*max_fee_per_gas, U256::from(30_000_000_000u64));
    }

    assert!(session
        .set_custom_fee(FeeInfoUnit::FeeRate {
            vsize: 1,
            sat_per_vbyte: 5,
        })
        .is_err());

    // Custom choice survives a re-estimate.
    pipeline.refresh_fee(&mut session).expect("refresh");
    assert_eq!(
        session.fee_selection().expect("selection").fee_type(),
        FeeType::Custom
    );

    let tree = session.decoded().expect("decoded");
    assert!(tree
        .summary
        .iter()
        .any(|component| matches!(component, DisplayComponent::Assets { symbol, .. } if symbol == "ETH")));
    assert!(tree
        .summary
        .iter()
        .any(|component| matches!(component, DisplayComponent::Assets { symbol, amount_parsed, .. } if symbol == "USDC" && amount_parsed == "1")));
}

#[test]
fn late_result_of_superseded_decode_is_discarded() {
    let pipeline = new_pipeline();
    let intent = evm_tx(RECIPIENT, one_eth(), Vec::new(), Some(CURRENT_NONCE));
    let (mut session, _receiver) = pipeline
        .request_confirmation(request("req-stale", vec![intent], SourceInfo::internal()))
        .expect("request");
    let mut events = session.subscribe();

    let first = session.begin_decode();
    let first_tree = pipeline.build_tree(session.intents(), session.network(), session.account());

    let doubled = vec![evm_tx(
        RECIPIENT,
        one_eth() * U256::from(2u64),
        Vec::new(),
        Some(CURRENT_NONCE),
    )];
    let second = session.begin_decode();
    let second_tree = pipeline.build_tree(&doubled, session.network(), session.account());
    assert_ne!(first_tree, second_tree);
    assert!(session.is_building());
    assert!(session
        .submit_blockers()
        .contains(&SubmitBlocker::DecodeBuilding));

    assert!(session.apply_decode(second, second_tree.clone()));
    assert!(!session.is_building());
    assert!(!session.apply_decode(first, first_tree));
    assert!(!session.is_building());
    assert_eq!(session.decoded(), Some(&second_tree));

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    let position = |wanted: &SessionEvent| seen.iter().position(|event| event == wanted);
    let applied = position(&SessionEvent::DecodeApplied {
        generation: second.generation(),
    })
    .expect("apply event");
    let discarded = position(&SessionEvent::DecodeDiscarded {
        generation: first.generation(),
    })
    .expect("discard event");
    assert!(applied < discarded);
    assert_eq!(
        position(&SessionEvent::DecodeApplied {
            generation: first.generation(),
        }),
        None
    );
}

#[test]
fn repeated_decode_is_equal_when_only_prices_move() {
    let pipeline = new_pipeline();
    let intents = vec![
        evm_tx(RECIPIENT, one_eth(), Vec::new(), Some(CURRENT_NONCE)),
        evm_tx(
            USDC,
            U256::ZERO,
            encode_transfer(address(RECIPIENT), U256::from(3_000_000u64)),
            Some(CURRENT_NONCE + 1),
        ),
    ];
    let (session, _receiver) = pipeline
        .request_confirmation(request("req-pure", intents, SourceInfo::internal()))
        .expect("request");

    let fiat_values = |tree: &sigconfirm_core::DecodedDisplayTree| -> Vec<Option<String>> {
        tree.components()
            .filter_map(|component| match component {
                DisplayComponent::Token { fiat, .. } => Some(fiat.0.clone()),
                _ => None,
            })
            .collect()
    };

    let before = pipeline.build_tree(session.intents(), session.network(), session.account());
    pipeline
        .ports
        .prices
        .set_price(&session.network().id, None, 3_100.0)
        .expect("eth price");
    pipeline
        .ports
        .prices
        .set_price(&session.network().id, Some(USDC), 0.5)
        .expect("usdc price");
    let after = pipeline.build_tree(session.intents(), session.network(), session.account());

    assert_eq!(before, after);
    assert_ne!(fiat_values(&before), fiat_values(&after));
    assert!(fiat_values(&after).iter().all(Option::is_some));
    assert_eq!(
        pipeline.build_tree(session.intents(), session.network(), session.account()),
        after
    );
}

#[test]
fn superseded_fee_estimates_are_discarded() {
    let pipeline = new_pipeline();
    let intent = evm_tx(RECIPIENT, one_eth(), Vec::new(), Some(CURRENT_NONCE));
    let (mut session, _receiver) = pipeline
        .request_confirmation(request("req-stale-fee", vec![intent], SourceInfo::internal()))
        .expect("request");
    let before = session.fee_selection().expect("selection").total();

    let stale = session.begin_fee_estimate().expect("ticket");
    let current = session.begin_fee_estimate().expect("ticket");
    assert_eq!(session.fee_status(), &SendFeeStatus::Estimating);

    let applied = session
        .apply_fee_estimate(
            stale,
            Err(sigconfirm_core::PortError::Transport("timeout".to_owned())),
            None,
        )
        .expect("apply");
    assert!(!applied);
    assert_eq!(session.fee_status(), &SendFeeStatus::Estimating);

    let estimate = session.fee_estimate().cloned().expect("estimate");
    assert!(session
        .apply_fee_estimate(current, Ok(estimate), Some(2_000.0))
        .expect("apply"));
    assert_eq!(session.fee_status(), &SendFeeStatus::Ready);
    assert_eq!(session.fee_selection().expect("selection").total(), before);
}

#[test]
fn failed_estimate_blocks_submit() {
    let pipeline = new_pipeline();
    let intent = evm_tx(RECIPIENT, one_eth(), Vec::new(), Some(CURRENT_NONCE));
    let (mut session, _receiver) = pipeline
        .request_confirmation(request("req-fee-error", vec![intent], SourceInfo::internal()))
        .expect("request");

    let ticket = session.begin_fee_estimate().expect("ticket");
    session
        .apply_fee_estimate(
            ticket,
            Err(sigconfirm_core::PortError::Transport("rpc down".to_owned())),
            None,
        )
        .expect("apply");
    assert!(matches!(session.fee_status(), SendFeeStatus::Error(reason) if reason.contains("rpc down")));
    assert!(session.fee_selection().is_none());
    assert!(session.submit_blockers().contains(&SubmitBlocker::FeeMissing));
}

#[test]
fn btc_send_uses_fee_rate_and_extra_info() {
    let pipeline = new_pipeline();
    let network = NetworkId::new("btc--0");
    let account = AccountId::new("acct-1");
    pipeline
        .ports
        .accounts
        .insert(&account, &network, BTC_ADDRESS, Some(U256::from(100_000u64)))
        .expect("btc account");

    let tx = BtcTx {
        inputs: vec![BtcInput {
            txid: "aa".repeat(32),
            vout: 0,
            address: BTC_ADDRESS.to_owned(),
            value: 60_000,
        }],
        outputs: vec![
            BtcOutput {
                address: "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa".to_owned(),
                value: 40_000,
                is_change: false,
            },
            BtcOutput {
                address: BTC_ADDRESS.to_owned(),
                value: 18_000,
                is_change: true,
            },
        ],
    };
    let intent = Arc::new(UnsignedIntent::Transaction(UnsignedTransaction::new(
        EncodedTx::Btc(tx),
    )));
    let (session, _receiver) = pipeline
        .request_confirmation(ConfirmationRequest {
            intents: vec![intent],
            network_id: network,
            account_id: account,
            source: SourceInfo::internal(),
            request_id: RequestId::new("req-btc"),
        })
        .expect("request");

    let tree = session.decoded().expect("decoded");
    assert_eq!(tree.native_total(), U256::from(40_000u64));
    assert!(tree.components().any(|component| matches!(
        component,
        DisplayComponent::ExtraInfo(ExtraInfo::Btc { input_count: 1, output_count: 2, change_value: 18_000, vsize: 141 })
    )));
    let selection = session.fee_selection().expect("selection");
    assert_eq!(
        selection.fee_infos()[0],
        FeeInfoUnit::FeeRate {
            vsize: 141,
            sat_per_vbyte: 10,
        }
    );
    assert_eq!(selection.total(), U256::from(1_410u64));
    assert!(session.can_submit(), "blockers: {:?}", session.submit_blockers());
}

#[test]
fn tron_transfer_reports_resources_and_single_preset() {
    let pipeline = new_pipeline();
    let network = NetworkId::new("tron--0x2b6653dc");
    let account = AccountId::new("acct-1");
    pipeline
        .ports
        .accounts
        .insert(&account, &network, TRON_ADDRESS, Some(U256::from(50_000_000u64)))
        .expect("tron account");

    let tx = TronTx {
        owner_address: TRON_ADDRESS.to_owned(),
        contract: TronContract::Transfer {
            to_address: "TLa2f6VPqDgRE67v1736s7bJ8Ray5wYjU7".to_owned(),
            amount: 1_500_000,
        },
        fee_limit: None,
    };
    let intent = Arc::new(UnsignedIntent::Transaction(UnsignedTransaction::new(
        EncodedTx::Tron(tx),
    )));
    let (session, _receiver) = pipeline
        .request_confirmation(ConfirmationRequest {
            intents: vec![intent],
            network_id: network,
            account_id: account,
            source: SourceInfo::internal(),
            request_id: RequestId::new("req-tron"),
        })
        .expect("request");

    assert!(session.fee_estimate().expect("estimate").is_single_preset());
    let selection = session.fee_selection().expect("selection");
    let resources = selection.resources().expect("resources");
    assert_eq!(resources.required_bandwidth, 268);
    assert_eq!(resources.bandwidth_shortfall, 0);
    assert_eq!(selection.total(), U256::ZERO);
    assert_eq!(session.decoded().expect("decoded").native_total(), U256::from(1_500_000u64));
}

#[test]
fn personal_sign_message_needs_no_fee() {
    let pipeline = new_pipeline();
    let message = Arc::new(UnsignedIntent::Message(UnsignedMessage {
        message_type: MessageType::PersonalSign,
        message: "Sign in to fixture.example".to_owned(),
    }));
    let (mut session, receiver) = pipeline
        .request_confirmation(request("req-message", vec![message], SourceInfo::internal()))
        .expect("request");
    assert!(session.is_message_session());
    assert_eq!(session.fee_status(), &SendFeeStatus::Idle);
    assert_eq!(session.decoded().expect("decoded").title, "Sign message");
    assert!(session.can_submit(), "blockers: {:?}", session.submit_blockers());

    let result = pipeline.confirm(&mut session).expect("confirm");
    assert_eq!(result.payloads[0].tx_hash, None);
    assert!(receiver.blocking_wait().is_ok());
}

#[test]
fn eth_sign_is_refused_by_default() {
    let pipeline = new_pipeline();
    let message = Arc::new(UnsignedIntent::Message(UnsignedMessage {
        message_type: MessageType::Sign,
        message: "0xdeadbeef".to_owned(),
    }));
    let (mut session, _receiver) = pipeline
        .request_confirmation(request("req-eth-sign", vec![message], SourceInfo::internal()))
        .expect("request");
    assert!(session
        .submit_blockers()
        .iter()
        .any(|blocker| matches!(blocker, SubmitBlocker::PrecheckFailed(_))));
    assert!(pipeline.confirm(&mut session).is_err());
    assert!(pipeline.ports.signer.signed().expect("signed").is_empty());
}

#[test]
fn message_mixed_with_transactions_is_rejected() {
    let pipeline = new_pipeline();
    let message = Arc::new(UnsignedIntent::Message(UnsignedMessage {
        message_type: MessageType::PersonalSign,
        message: "hello".to_owned(),
    }));
    let tx = evm_tx(RECIPIENT, one_eth(), Vec::new(), Some(CURRENT_NONCE));
    assert!(pipeline
        .request_confirmation(request("req-mixed", vec![message, tx], SourceInfo::internal()))
        .is_err());
    assert!(pipeline
        .request_confirmation(request("req-empty", Vec::new(), SourceInfo::internal()))
        .is_err());
    assert_eq!(pipeline.broker.pending_count(), 0);
}

#[test]
fn intent_for_another_chain_is_neutralised() {
    let pipeline = new_pipeline();
    let tx = BtcTx {
        inputs: Vec::new(),
        outputs: Vec::new(),
    };
    let intent = Arc::new(UnsignedIntent::Transaction(UnsignedTransaction::new(
        EncodedTx::Btc(tx),
    )));
    let (mut session, _receiver) = pipeline
        .request_confirmation(request("req-mismatch", vec![intent], SourceInfo::internal()))
        .expect("request");
    let tree = session.decoded().expect("decoded");
    assert!(tree
        .alerts()
        .iter()
        .any(|alert| alert.severity == sigconfirm_core::AlertSeverity::Critical));
    assert!(session.precheck_error().is_some());
    session.acknowledge(true);
    assert!(pipeline.confirm(&mut session).is_err());
    assert!(pipeline.ports.signer.signed().expect("signed").is_empty());
}
