pub mod approval;
pub mod broker;
pub mod decode;
pub mod display;
pub mod domain;
pub mod fee;
pub mod message;
pub mod network;
pub mod pipeline;
pub mod ports;
pub mod risk;
pub mod session;
pub mod state_machine;
pub mod verify;

pub use approval::{ApprovalEditState, UNLIMITED_ALLOWANCE};
pub use broker::{ApprovalBroker, ApprovalError, ApprovalHandle, ApprovalReceiver, ApprovalState};
pub use decode::DecodeEngine;
pub use display::{Alert, AlertSeverity, AlertSource, DecodedDisplayTree, DisplayComponent};
pub use domain::{
    AccountId, ConfirmationRequest, HostSecurityLevel, ImplementationTag, NetworkId, RequestId,
    SignResult, SignedPayload, SourceInfo, TimestampMs, UnsignedIntent, UnsignedMessage,
    UnsignedTransaction,
};
pub use fee::{FeeEstimate, FeeInfoUnit, FeePreset, FeeSelection, FeeType, SendFeeStatus};
pub use network::{NetworkInfo, NetworkRegistry};
pub use pipeline::{ConfirmationPipeline, PipelinePorts, PipelineSettings};
pub use ports::{ErrorClass, PortError};
pub use risk::RiskGate;
pub use session::{ConfirmationSession, SessionEvent, SubmitBlocker};
pub use state_machine::{SessionStatus, StateTransition};
pub use verify::{MessageVerification, SignatureFormat, VerifyOutcome, VerifyRequest};
