use serde::{Deserialize, Serialize};

use crate::fee::SendFeeStatus;
use crate::ports::PortError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Open,
    Submitting,
    Confirmed,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    Submit,
    SubmitFailed,
    SubmitSucceeded,
    Dismiss,
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition<S> {
    pub from: S,
    pub to: S,
    pub reason: &'static str,
}

pub fn session_transition(
    status: SessionStatus,
    action: SessionAction,
) -> Result<(SessionStatus, StateTransition<SessionStatus>), PortError> {
    let (next, reason) = match (status, action) {
        (SessionStatus::Open, SessionAction::Submit) => (SessionStatus::Submitting, "submit"),
        (SessionStatus::Submitting, SessionAction::SubmitFailed) => {
            (SessionStatus::Open, "submit_failed")
        }
        (SessionStatus::Submitting, SessionAction::SubmitSucceeded) => {
            (SessionStatus::Confirmed, "submit_succeeded")
        }
        (SessionStatus::Open, SessionAction::Dismiss) => (SessionStatus::Closing, "dismiss"),
        (SessionStatus::Confirmed, SessionAction::Close) => (SessionStatus::Closed, "close"),
        (SessionStatus::Closing, SessionAction::Close) => (SessionStatus::Closed, "close"),
        _ => {
            return Err(PortError::Validation(format!(
                "illegal session transition: {status:?} -> {action:?}"
            )))
        }
    };

    Ok((
        next,
        StateTransition {
            from: status,
            to: next,
            reason,
        },
    ))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeeAction {
    Estimate,
    Succeeded,
    Failed(String),
}

pub fn fee_transition(
    status: &SendFeeStatus,
    action: FeeAction,
) -> Result<SendFeeStatus, PortError> {
    match (status, action) {
        (_, FeeAction::Estimate) => Ok(SendFeeStatus::Estimating),
        (SendFeeStatus::Estimating, FeeAction::Succeeded) => Ok(SendFeeStatus::Ready),
        (SendFeeStatus::Estimating, FeeAction::Failed(message)) => {
            Ok(SendFeeStatus::Error(message))
        }
        (status, action) => Err(PortError::Validation(format!(
            "illegal fee transition: {status:?} -> {action:?}"
        ))),
    }
}
