//! sigconfirm: verify signed messages and quote fees from the command line.

use std::process::ExitCode;
use std::sync::Arc;

use alloy::primitives::{hex, Address, Bytes, U256};
use clap::{Parser, Subcommand};
use eyre::{bail, Result, WrapErr};

use sigconfirm_adapters::{
    init_tracing, AdapterConfig, FeeEstimatorAdapter, LocalAddressValidator, SignatureVerifier,
};
use sigconfirm_core::domain::{EncodedTx, EvmTx};
use sigconfirm_core::fee::format_amount;
use sigconfirm_core::ports::FeeEstimatorPort;
use sigconfirm_core::{
    ImplementationTag, MessageVerification, NetworkId, NetworkRegistry, SignatureFormat,
    UnsignedIntent, UnsignedTransaction, VerifyRequest,
};

#[derive(Parser)]
#[command(
    name = "sigconfirm",
    about = "Multi-chain signature verification and fee quoting.",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the known networks.
    Networks,
    /// Detect the chain family of an address and the signature formats it supports.
    Detect { address: String },
    /// Check a signature over a message.
    Verify {
        #[arg(long)]
        address: String,
        #[arg(long)]
        message: String,
        #[arg(long)]
        signature: String,
        /// bip137, bip322, eip191 or ed25519.
        #[arg(long)]
        format: Option<String>,
        /// Treat the message as hex and verify the decoded bytes.
        #[arg(long)]
        hex: bool,
    },
    /// Quote fee presets for a native EVM transfer.
    Fee {
        #[arg(long, default_value = "evm--1")]
        network: String,
        #[arg(long)]
        from: Address,
        #[arg(long)]
        to: Address,
        #[arg(long, default_value = "0")]
        value_wei: U256,
        /// Hex calldata.
        #[arg(long)]
        data: Option<String>,
    },
}

fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();
    let config = AdapterConfig::from_env();
    let registry = NetworkRegistry::with_defaults();

    match cli.command {
        Command::Networks => {
            for info in registry.networks() {
                println!(
                    "{:<22} {:<16} {:<7} {}",
                    info.id, info.name, info.implementation, info.native.symbol
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Detect { address } => {
            let flow = verification(registry, &config);
            let Some(network_id) = flow.detect_network(&address) else {
                bail!("no known network accepts {address}");
            };
            let options = flow.format_options(&network_id, &address);
            println!("network:   {network_id}");
            println!("formats:   {:?}", options.available);
            if let Some(suggested) = options.suggested {
                println!("suggested: {suggested:?}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Verify {
            address,
            message,
            signature,
            format,
            hex,
        } => {
            let format = format
                .as_deref()
                .map(SignatureFormat::parse)
                .transpose()?;
            let flow = verification(registry, &config);
            let outcome = flow.verify(&VerifyRequest {
                address,
                message,
                signature,
                format,
                hex_format: hex,
            })?;
            let verdict = if outcome.valid { "valid" } else { "invalid" };
            println!("{verdict} ({:?} on {})", outcome.format, outcome.network_id);
            Ok(if outcome.valid {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Fee {
            network,
            from,
            to,
            value_wei,
            data,
        } => {
            let info = registry.get(&NetworkId::new(network))?;
            if info.implementation != ImplementationTag::Evm {
                bail!("fee quotes from the command line support EVM networks only");
            }
            let data = match data {
                Some(raw) => hex::decode(raw.trim_start_matches("0x"))
                    .wrap_err("calldata is not valid hex")?,
                None => Vec::new(),
            };
            let intent = Arc::new(UnsignedIntent::Transaction(UnsignedTransaction::new(
                EncodedTx::Evm(EvmTx {
                    from,
                    to: Some(to),
                    value: value_wei,
                    data: Bytes::from(data),
                    chain_id: info.chain_id.unwrap_or_default(),
                }),
            )));

            let fees = FeeEstimatorAdapter::with_config(&config);
            let estimate = fees.estimate(info, &[intent])?;
            for preset in &estimate.presets {
                let total = preset
                    .per_intent
                    .iter()
                    .fold(U256::ZERO, |acc, unit| acc.saturating_add(unit.total_native()));
                println!(
                    "{:<8} {} {}",
                    preset.label,
                    format_amount(total, info.native.decimals)?,
                    info.native.symbol
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn verification(
    registry: NetworkRegistry,
    config: &AdapterConfig,
) -> MessageVerification<LocalAddressValidator, SignatureVerifier> {
    MessageVerification::new(registry, LocalAddressValidator, SignatureVerifier)
        .with_max_message_len(config.max_verify_message_len)
}
