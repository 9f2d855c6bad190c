use alloy::primitives::U256;

use super::{DecodeEngine, EntryDecode};
use crate::display::{Alert, AlertSeverity, AlertSource, DisplayComponent, ExtraInfo};
use crate::domain::BtcTx;
use crate::network::NetworkInfo;
use crate::ports::{PricePort, TokenMetadataPort};

pub(crate) fn decode_btc<M, P>(
    engine: &DecodeEngine<'_, M, P>,
    tx: &BtcTx,
    network: &NetworkInfo,
) -> EntryDecode
where
    M: TokenMetadataPort,
    P: PricePort,
{
    let mut components = Vec::new();
    let mut sent = 0u64;
    for output in tx.outputs.iter().filter(|output| !output.is_change) {
        sent = sent.saturating_add(output.value);
        components.push(engine.token_component(
            "Send",
            Some(output.address.clone()),
            U256::from(output.value),
            engine.native_token(network),
            network,
        ));
    }

    if tx.total_out() > tx.total_in() {
        components.push(DisplayComponent::Alert(Alert::new(
            AlertSeverity::Critical,
            AlertSource::ChainCheck,
            format!(
                "outputs spend {} sat but inputs only provide {} sat",
                tx.total_out(),
                tx.total_in()
            ),
        )));
    }

    EntryDecode {
        components,
        native_amount: U256::from(sent),
    }
}

pub(crate) fn extra_info(tx: &BtcTx) -> ExtraInfo {
    ExtraInfo::Btc {
        input_count: tx.inputs.len(),
        output_count: tx.outputs.len(),
        change_value: tx
            .outputs
            .iter()
            .filter(|output| output.is_change)
            .map(|output| output.value)
            .sum(),
        vsize: tx.vsize_estimate(),
    }
}
