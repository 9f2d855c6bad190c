//! Exactly-once settlement of a caller's outstanding confirmation request.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::domain::{RequestId, SignResult};
use crate::ports::PortError;

/// Error delivered to the caller, shaped like an EIP-1193 provider error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (code {code})")]
pub struct ApprovalError {
    pub code: i64,
    pub message: String,
}

impl ApprovalError {
    pub fn user_rejected() -> Self {
        Self::from(&PortError::UserRejected)
    }
}

impl From<&PortError> for ApprovalError {
    fn from(error: &PortError) -> Self {
        Self {
            code: error.provider_code(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Resolved(SignResult),
    Rejected(ApprovalError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalState {
    Pending,
    Settled,
}

#[derive(Debug)]
struct PendingApproval {
    request_id: RequestId,
    settled: AtomicBool,
    sender: Mutex<Option<oneshot::Sender<ApprovalOutcome>>>,
}

type Registry = Arc<Mutex<HashMap<RequestId, Arc<PendingApproval>>>>;

fn lock_registry(registry: &Registry) -> MutexGuard<'_, HashMap<RequestId, Arc<PendingApproval>>> {
    registry
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Settles `approval` unless it already was. The atomic swap is the single
/// writer check; everything after it runs at most once per approval.
fn settle(registry: &Registry, approval: &PendingApproval, outcome: ApprovalOutcome) -> bool {
    if approval.settled.swap(true, Ordering::AcqRel) {
        warn!(
            request_id = %approval.request_id,
            "ignoring duplicate settlement of approval"
        );
        return false;
    }

    let sender = approval
        .sender
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take();
    if let Some(sender) = sender {
        if sender.send(outcome).is_err() {
            debug!(request_id = %approval.request_id, "caller dropped approval receiver");
        }
    }

    lock_registry(registry).remove(&approval.request_id);
    debug!(request_id = %approval.request_id, "approval settled");
    true
}

/// Owned by the confirmation session. Dropping an unsettled handle rejects
/// the request as user-rejected so the caller is never left waiting.
#[derive(Debug)]
pub struct ApprovalHandle {
    approval: Arc<PendingApproval>,
    registry: Registry,
}

impl ApprovalHandle {
    pub fn request_id(&self) -> &RequestId {
        &self.approval.request_id
    }

    pub fn state(&self) -> ApprovalState {
        if self.approval.settled.load(Ordering::Acquire) {
            ApprovalState::Settled
        } else {
            ApprovalState::Pending
        }
    }
}

impl Drop for ApprovalHandle {
    fn drop(&mut self) {
        if self.state() == ApprovalState::Pending {
            debug!(request_id = %self.approval.request_id, "approval handle dropped while pending");
            settle(
                &self.registry,
                &self.approval,
                ApprovalOutcome::Rejected(ApprovalError::user_rejected()),
            );
        }
    }
}

/// Caller side of a pending approval.
#[derive(Debug)]
pub struct ApprovalReceiver {
    request_id: RequestId,
    receiver: oneshot::Receiver<ApprovalOutcome>,
}

impl ApprovalReceiver {
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    fn into_result(outcome: ApprovalOutcome) -> Result<SignResult, ApprovalError> {
        match outcome {
            ApprovalOutcome::Resolved(result) => Ok(result),
            ApprovalOutcome::Rejected(error) => Err(error),
        }
    }

    fn closed() -> ApprovalError {
        ApprovalError::from(&PortError::Protocol(
            "approval closed without settlement".to_string(),
        ))
    }

    pub async fn wait(self) -> Result<SignResult, ApprovalError> {
        match self.receiver.await {
            Ok(outcome) => Self::into_result(outcome),
            Err(_) => Err(Self::closed()),
        }
    }

    /// Blocking variant of [`ApprovalReceiver::wait`]; must not be called
    /// from inside an async runtime.
    pub fn blocking_wait(self) -> Result<SignResult, ApprovalError> {
        match self.receiver.blocking_recv() {
            Ok(outcome) => Self::into_result(outcome),
            Err(_) => Err(Self::closed()),
        }
    }

    /// `None` while the approval is still pending.
    pub fn try_outcome(&mut self) -> Option<Result<SignResult, ApprovalError>> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(Self::into_result(outcome)),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(Self::closed())),
        }
    }
}

/// Registry of outstanding approvals keyed by request id. Cloning shares the
/// registry.
#[derive(Debug, Clone, Default)]
pub struct ApprovalBroker {
    registry: Registry,
}

impl ApprovalBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        request_id: RequestId,
    ) -> Result<(ApprovalHandle, ApprovalReceiver), PortError> {
        let mut registry = lock_registry(&self.registry);
        if registry.contains_key(&request_id) {
            return Err(PortError::Conflict(format!(
                "request {request_id} already has a pending approval"
            )));
        }

        let (sender, receiver) = oneshot::channel();
        let approval = Arc::new(PendingApproval {
            request_id: request_id.clone(),
            settled: AtomicBool::new(false),
            sender: Mutex::new(Some(sender)),
        });
        registry.insert(request_id.clone(), Arc::clone(&approval));
        drop(registry);

        debug!(request_id = %request_id, "approval registered");
        Ok((
            ApprovalHandle {
                approval,
                registry: Arc::clone(&self.registry),
            },
            ApprovalReceiver {
                request_id,
                receiver,
            },
        ))
    }

    /// Returns `false` (and logs) when the approval was already settled.
    pub fn resolve(&self, handle: &ApprovalHandle, result: SignResult) -> bool {
        settle(&handle.registry, &handle.approval, ApprovalOutcome::Resolved(result))
    }

    /// Returns `false` (and logs) when the approval was already settled.
    pub fn reject(&self, handle: &ApprovalHandle, error: ApprovalError) -> bool {
        settle(&handle.registry, &handle.approval, ApprovalOutcome::Rejected(error))
    }

    /// Rejects by id, for cancellations that arrive from the provider side.
    pub fn reject_request(&self, request_id: &RequestId, error: ApprovalError) -> bool {
        let approval = lock_registry(&self.registry).get(request_id).cloned();
        match approval {
            Some(approval) => settle(&self.registry, &approval, ApprovalOutcome::Rejected(error)),
            None => {
                warn!(request_id = %request_id, "reject for unknown or settled request ignored");
                false
            }
        }
    }

    pub fn is_pending(&self, request_id: &RequestId) -> bool {
        lock_registry(&self.registry).contains_key(request_id)
    }

    pub fn pending_count(&self) -> usize {
        lock_registry(&self.registry).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str) -> SignResult {
        SignResult {
            request_id: RequestId::new(id),
            payloads: Vec::new(),
            replace: None,
        }
    }

    #[test]
    fn resolve_then_reject_settles_once() {
        let broker = ApprovalBroker::new();
        let (handle, mut receiver) = broker.register(RequestId::new("r1")).expect("register");
        assert!(broker.is_pending(&RequestId::new("r1")));

        assert!(broker.resolve(&handle, result("r1")));
        assert!(!broker.reject(&handle, ApprovalError::user_rejected()));
        assert!(!broker.resolve(&handle, result("r1")));
        assert_eq!(handle.state(), ApprovalState::Settled);
        assert!(!broker.is_pending(&RequestId::new("r1")));

        let outcome = receiver.try_outcome().expect("settled");
        assert_eq!(outcome, Ok(result("r1")));
    }

    #[test]
    fn duplicate_pending_request_id_conflicts() {
        let broker = ApprovalBroker::new();
        let (_handle, _receiver) = broker.register(RequestId::new("dup")).expect("register");
        let err = broker.register(RequestId::new("dup")).expect_err("duplicate");
        assert!(matches!(err, PortError::Conflict(_)));
    }

    #[test]
    fn dropped_handle_rejects_as_user_rejected() {
        let broker = ApprovalBroker::new();
        let (handle, receiver) = broker.register(RequestId::new("r2")).expect("register");
        drop(handle);
        let err = receiver.blocking_wait().expect_err("rejected");
        assert_eq!(err.code, 4001);
        assert_eq!(broker.pending_count(), 0);
    }

    #[test]
    fn request_id_is_reusable_after_settlement() {
        let broker = ApprovalBroker::new();
        let (handle, _receiver) = broker.register(RequestId::new("r3")).expect("register");
        assert!(broker.reject_request(&RequestId::new("r3"), ApprovalError::user_rejected()));
        assert!(!broker.reject(&handle, ApprovalError::user_rejected()));
        broker.register(RequestId::new("r3")).expect("register again");
    }

    #[tokio::test]
    async fn receiver_wait_yields_resolution() {
        let broker = ApprovalBroker::new();
        let (handle, receiver) = broker.register(RequestId::new("r4")).expect("register");
        let waiter = tokio::spawn(receiver.wait());
        assert!(broker.resolve(&handle, result("r4")));
        let outcome = waiter.await.expect("join");
        assert_eq!(outcome, Ok(result("r4")));
    }
}
