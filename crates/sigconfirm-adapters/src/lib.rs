pub mod accounts;
pub mod address;
pub mod clock;
pub mod config;
pub mod fee;
pub mod host_security;
pub mod logging;
pub mod signer;
pub mod token;
pub mod verify;

pub use accounts::{AccountDirectoryAdapter, PendingNonceBook};
pub use address::LocalAddressValidator;
pub use clock::SystemClockAdapter;
pub use config::AdapterConfig;
pub use fee::{DeterministicFees, FeeEstimatorAdapter};
pub use host_security::HostListAdapter;
pub use logging::init_tracing;
pub use signer::DeterministicSignerAdapter;
pub use token::{PriceTableAdapter, TokenDirectoryAdapter};
pub use verify::SignatureVerifier;
