//! Confirmation session store: the single source of truth for one dialog.

use std::sync::Arc;

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::approval::ApprovalEditState;
use crate::broker::{ApprovalHandle, ApprovalState};
use crate::display::{Alert, AlertSeverity, AlertSource, DecodedDisplayTree};
use crate::domain::{
    AccountContext, EncodedTx, HostSecurityLevel, ReplaceTxKind, RequestId, SourceInfo,
    TimestampMs, UnsignedIntent, UnsignedTransaction,
};
use crate::fee::{FeeEstimate, FeeInfoUnit, FeeSelection, FeeType, SendFeeStatus};
use crate::network::NetworkInfo;
use crate::ports::PortError;
use crate::risk::RiskGate;
use crate::state_machine::{
    fee_transition, session_transition, FeeAction, SessionAction, SessionStatus,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvancedSettings {
    pub nonce: Option<String>,
    /// Raw transaction data was edited by hand; signing is blocked until reset.
    pub data_changed: bool,
}

/// Issued when a decode starts; only the ticket of the latest decode applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeTicket {
    generation: u64,
}

impl DecodeTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeTicket {
    generation: u64,
}

impl FeeTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    DecodeStarted { generation: u64 },
    DecodeApplied { generation: u64 },
    DecodeDiscarded { generation: u64 },
    IntentChanged { index: usize, revision: u64 },
    FeeStatusChanged(SendFeeStatus),
    FeeSelectionChanged { total: U256 },
    ApprovalEdited,
    AdvancedSettingsChanged,
    RiskChanged { can_confirm: bool },
    StatusChanged(SessionStatus),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitBlocker {
    NotOpen(SessionStatus),
    /// The caller's request was already resolved or rejected elsewhere.
    Settled,
    RiskNotAcknowledged,
    DecodeBuilding,
    DecodeMissing,
    FeeMissing,
    FeeNotReady(SendFeeStatus),
    PrecheckFailed(String),
    DataChanged,
    BalanceUnknown,
    InsufficientBalance { required: U256, available: U256 },
}

pub struct ConfirmationSession {
    request_id: RequestId,
    network: NetworkInfo,
    account: AccountContext,
    source: SourceInfo,
    created_at: TimestampMs,
    intents: Vec<Arc<UnsignedIntent>>,
    status: SessionStatus,

    decode_generation: u64,
    decode_building: bool,
    decoded: Option<DecodedDisplayTree>,

    fee_generation: u64,
    fee_status: SendFeeStatus,
    fee_estimate: Option<FeeEstimate>,
    native_price: Option<f64>,
    fee_selection: Option<FeeSelection>,

    approval: Option<ApprovalEditState>,
    approval_intent: Option<usize>,
    settings: AdvancedSettings,

    host_alerts: Vec<Alert>,
    nonce_alert: Option<Alert>,
    risk: RiskGate,
    precheck_error: Option<String>,
    native_balance: Option<U256>,
    last_error: Option<String>,

    approval_handle: ApprovalHandle,
    observers: Vec<mpsc::UnboundedSender<SessionEvent>>,
}

impl ConfirmationSession {
    pub fn new(
        network: NetworkInfo,
        account: AccountContext,
        source: SourceInfo,
        intents: Vec<Arc<UnsignedIntent>>,
        host_security_level: HostSecurityLevel,
        created_at: TimestampMs,
        approval_handle: ApprovalHandle,
    ) -> Self {
        let host_alerts = host_alerts(host_security_level, &source);
        let mut session = Self {
            request_id: approval_handle.request_id().clone(),
            network,
            account,
            source,
            created_at,
            intents,
            status: SessionStatus::Open,
            decode_generation: 0,
            decode_building: false,
            decoded: None,
            fee_generation: 0,
            fee_status: SendFeeStatus::Idle,
            fee_estimate: None,
            native_price: None,
            fee_selection: None,
            approval: None,
            approval_intent: None,
            settings: AdvancedSettings::default(),
            host_alerts,
            nonce_alert: None,
            risk: RiskGate::new(host_security_level),
            precheck_error: None,
            native_balance: None,
            last_error: None,
            approval_handle,
            observers: Vec::new(),
        };
        session.refresh_risk();
        session
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn network(&self) -> &NetworkInfo {
        &self.network
    }

    pub fn account(&self) -> &AccountContext {
        &self.account
    }

    pub fn source(&self) -> &SourceInfo {
        &self.source
    }

    pub fn created_at(&self) -> TimestampMs {
        self.created_at
    }

    pub fn intents(&self) -> &[Arc<UnsignedIntent>] {
        &self.intents
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn decoded(&self) -> Option<&DecodedDisplayTree> {
        self.decoded.as_ref()
    }

    pub fn is_building(&self) -> bool {
        self.decode_building
    }

    pub fn fee_status(&self) -> &SendFeeStatus {
        &self.fee_status
    }

    pub fn fee_estimate(&self) -> Option<&FeeEstimate> {
        self.fee_estimate.as_ref()
    }

    pub fn fee_selection(&self) -> Option<&FeeSelection> {
        self.fee_selection.as_ref()
    }

    pub fn approval(&self) -> Option<&ApprovalEditState> {
        self.approval.as_ref()
    }

    pub fn approval_intent(&self) -> Option<usize> {
        self.approval_intent
    }

    pub fn advanced_settings(&self) -> &AdvancedSettings {
        &self.settings
    }

    pub fn risk(&self) -> &RiskGate {
        &self.risk
    }

    pub fn precheck_error(&self) -> Option<&str> {
        self.precheck_error.as_deref()
    }

    pub fn native_balance(&self) -> Option<U256> {
        self.native_balance
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn approval_handle(&self) -> &ApprovalHandle {
        &self.approval_handle
    }

    pub fn is_settled(&self) -> bool {
        self.approval_handle.state() == ApprovalState::Settled
    }

    pub fn is_message_session(&self) -> bool {
        self.intents
            .iter()
            .all(|intent| intent.as_message().is_some())
    }

    fn single_transaction(&self) -> Option<&UnsignedTransaction> {
        match self.intents.as_slice() {
            [intent] => intent.as_transaction(),
            _ => None,
        }
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.observers.push(sender);
        receiver
    }

    fn emit(&mut self, event: SessionEvent) {
        self.observers
            .retain(|observer| observer.send(event.clone()).is_ok());
    }

    fn transition(&mut self, action: SessionAction) -> Result<(), PortError> {
        let (next, transition) = session_transition(self.status, action)?;
        debug!(
            request_id = %self.request_id,
            from = ?transition.from,
            to = ?transition.to,
            reason = transition.reason,
            "session transition"
        );
        self.status = next;
        self.emit(SessionEvent::StatusChanged(next));
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), PortError> {
        if self.status != SessionStatus::Open {
            return Err(PortError::Conflict(format!(
                "session {} is {:?}",
                self.request_id, self.status
            )));
        }
        Ok(())
    }

    // ---- decode ---------------------------------------------------------

    pub fn begin_decode(&mut self) -> DecodeTicket {
        self.decode_generation += 1;
        self.decode_building = true;
        let generation = self.decode_generation;
        self.emit(SessionEvent::DecodeStarted { generation });
        DecodeTicket { generation }
    }

    /// Applies `tree` if `ticket` belongs to the latest decode. Results of a
    /// superseded decode are dropped and `false` is returned.
    pub fn apply_decode(&mut self, ticket: DecodeTicket, tree: DecodedDisplayTree) -> bool {
        if ticket.generation != self.decode_generation {
            warn!(
                request_id = %self.request_id,
                stale = ticket.generation,
                current = self.decode_generation,
                "discarding superseded decode result"
            );
            self.emit(SessionEvent::DecodeDiscarded {
                generation: ticket.generation,
            });
            return false;
        }

        if let Some((intent_index, approval)) = tree.first_approval() {
            let state = self.approval.get_or_insert_with(ApprovalEditState::default);
            state.capture_original(&approval.amount_parsed, approval.is_infinite_amount);
            self.approval_intent = Some(intent_index);
        }
        self.decoded = Some(tree);
        self.decode_building = false;
        self.emit(SessionEvent::DecodeApplied {
            generation: ticket.generation,
        });
        self.refresh_risk();
        true
    }

    /// Swaps in a newly built intent; the previous one is never mutated.
    pub fn replace_intent(&mut self, index: usize, intent: UnsignedIntent) -> Result<(), PortError> {
        self.ensure_open()?;
        let slot = self.intents.get_mut(index).ok_or_else(|| {
            PortError::NotFound(format!("intent {index} does not exist"))
        })?;
        if intent.revision() <= slot.revision() {
            return Err(PortError::Protocol(format!(
                "intent {index} revision must increase (was {}, got {})",
                slot.revision(),
                intent.revision()
            )));
        }
        let revision = intent.revision();
        *slot = Arc::new(intent);
        self.emit(SessionEvent::IntentChanged { index, revision });
        Ok(())
    }

    // ---- fees -----------------------------------------------------------

    pub fn begin_fee_estimate(&mut self) -> Result<FeeTicket, PortError> {
        self.fee_status = fee_transition(&self.fee_status, FeeAction::Estimate)?;
        self.fee_generation += 1;
        self.emit(SessionEvent::FeeStatusChanged(self.fee_status.clone()));
        Ok(FeeTicket {
            generation: self.fee_generation,
        })
    }

    /// Applies the outcome of an estimate. Estimator failures become the
    /// `Error` status rather than an `Err`; returns `false` for stale tickets.
    pub fn apply_fee_estimate(
        &mut self,
        ticket: FeeTicket,
        estimate: Result<FeeEstimate, PortError>,
        native_price: Option<f64>,
    ) -> Result<bool, PortError> {
        if ticket.generation != self.fee_generation {
            warn!(
                request_id = %self.request_id,
                stale = ticket.generation,
                current = self.fee_generation,
                "discarding superseded fee estimate"
            );
            return Ok(false);
        }

        let outcome = estimate.and_then(|estimate| {
            self.check_estimate(&estimate)?;
            let previous = self.fee_selection.take();
            self.fee_estimate = Some(estimate);
            self.native_price = native_price;
            self.reselect(previous)
        });

        let action = match outcome {
            Ok(()) => FeeAction::Succeeded,
            Err(e) => {
                warn!(request_id = %self.request_id, error = %e, "fee estimation failed");
                self.fee_estimate = None;
                self.fee_selection = None;
                FeeAction::Failed(e.to_string())
            }
        };
        self.fee_status = fee_transition(&self.fee_status, action)?;
        self.emit(SessionEvent::FeeStatusChanged(self.fee_status.clone()));
        Ok(true)
    }

    fn check_estimate(&self, estimate: &FeeEstimate) -> Result<(), PortError> {
        if estimate.presets.is_empty() {
            return Err(PortError::Validation("estimator returned no fee presets".to_string()));
        }
        let expected = self.intents.len();
        if let Some(preset) = estimate
            .presets
            .iter()
            .find(|preset| preset.per_intent.len() != expected)
        {
            return Err(PortError::Validation(format!(
                "fee preset {} covers {} intents, expected {expected}",
                preset.label,
                preset.per_intent.len()
            )));
        }
        Ok(())
    }

    /// Keeps the user's previous choice across a re-estimate when it still applies.
    fn reselect(&mut self, previous: Option<FeeSelection>) -> Result<(), PortError> {
        if let Some(previous) = previous {
            let kept = match previous.fee_type() {
                FeeType::Custom => previous
                    .custom_fee()
                    .cloned()
                    .map(|custom| self.recompute_selection(FeeType::Custom, None, Some(custom))),
                FeeType::Standard => previous
                    .preset_index()
                    .map(|index| self.recompute_selection(FeeType::Standard, Some(index), None)),
            };
            if let Some(Ok(())) = kept {
                return Ok(());
            }
        }
        let default_index = self
            .fee_estimate
            .as_ref()
            .map(FeeEstimate::default_preset_index)
            .unwrap_or_default();
        self.recompute_selection(FeeType::Standard, Some(default_index), None)
    }

    fn recompute_selection(
        &mut self,
        fee_type: FeeType,
        preset_index: Option<usize>,
        custom: Option<FeeInfoUnit>,
    ) -> Result<(), PortError> {
        let estimate = self
            .fee_estimate
            .as_ref()
            .ok_or_else(|| PortError::Validation("no fee estimate available".to_string()))?;
        let base_index = preset_index.unwrap_or_else(|| estimate.default_preset_index());
        let preset = estimate.presets.get(base_index).ok_or_else(|| {
            PortError::Validation(format!("fee preset {base_index} does not exist"))
        })?;
        let fee_infos = match &custom {
            Some(custom) => preset
                .per_intent
                .iter()
                .map(|unit| unit.reprice(custom))
                .collect::<Result<Vec<_>, _>>()?,
            None => preset.per_intent.clone(),
        };

        let selection = FeeSelection::compute(
            fee_type,
            preset_index,
            custom,
            fee_infos,
            &self.network.native,
            self.native_price,
        )?;
        let total = selection.total();
        self.fee_selection = Some(selection);
        self.emit(SessionEvent::FeeSelectionChanged { total });
        Ok(())
    }

    pub fn select_fee_preset(&mut self, index: usize) -> Result<(), PortError> {
        self.ensure_open()?;
        self.recompute_selection(FeeType::Standard, Some(index), None)
    }

    pub fn set_custom_fee(&mut self, custom: FeeInfoUnit) -> Result<(), PortError> {
        self.ensure_open()?;
        self.recompute_selection(FeeType::Custom, None, Some(custom))
    }

    // ---- approval & advanced settings ------------------------------------

    pub fn set_approval_current(&mut self, allowance: &str, is_unlimited: bool) -> Result<(), PortError> {
        self.ensure_open()?;
        let state = self
            .approval
            .as_mut()
            .ok_or_else(|| PortError::NotFound("session has no token approval".to_string()))?;
        state.set_current(allowance, is_unlimited);
        self.emit(SessionEvent::ApprovalEdited);
        Ok(())
    }

    /// Validates and stores a nonce override for the single transaction.
    /// `pending` lists nonces of local transactions that are not mined yet.
    pub fn set_nonce_override(
        &mut self,
        nonce: Option<&str>,
        current_nonce: u64,
        pending: &[u64],
    ) -> Result<(), PortError> {
        self.ensure_open()?;
        if !self.network.capabilities.nonce_editable {
            return Err(PortError::Validation(format!(
                "nonce is not editable on {}",
                self.network.name
            )));
        }
        let tx_nonce = self
            .single_transaction()
            .and_then(|tx| tx.nonce)
            .ok_or_else(|| {
                PortError::Validation(
                    "nonce can only be edited on a single transaction with a known nonce"
                        .to_string(),
                )
            })?;

        let (setting, alert) = match nonce.map(str::trim).filter(|text| !text.is_empty()) {
            None => (None, None),
            Some(text) => {
                let value: u64 = text
                    .parse()
                    .map_err(|_| PortError::Validation(format!("invalid nonce {text}")))?;
                if value < current_nonce {
                    return Err(PortError::Validation(format!(
                        "nonce {value} is lower than the current nonce {current_nonce}"
                    )));
                }
                if value != tx_nonce && pending.contains(&value) {
                    return Err(PortError::Validation(format!(
                        "nonce {value} is already used by a pending transaction"
                    )));
                }
                let next_expected = pending
                    .iter()
                    .map(|nonce| nonce.saturating_add(1))
                    .fold(current_nonce, u64::max);
                let alert = (value > next_expected).then(|| {
                    Alert::new(
                        AlertSeverity::Warning,
                        AlertSource::ChainCheck,
                        format!(
                            "nonce {value} skips ahead of {next_expected}; the transaction stays queued until the gap is filled"
                        ),
                    )
                });
                (Some(text.to_string()), alert)
            }
        };

        self.settings.nonce = setting;
        self.nonce_alert = alert;
        self.emit(SessionEvent::AdvancedSettingsChanged);
        self.refresh_risk();
        Ok(())
    }

    pub fn set_data_changed(&mut self, data_changed: bool) {
        self.settings.data_changed = data_changed;
        self.emit(SessionEvent::AdvancedSettingsChanged);
    }

    // ---- risk & prechecks -------------------------------------------------

    pub fn acknowledge(&mut self, acknowledged: bool) {
        self.risk.acknowledge(acknowledged);
        let can_confirm = self.risk.can_confirm();
        self.emit(SessionEvent::RiskChanged { can_confirm });
    }

    pub fn set_host_security_level(&mut self, level: HostSecurityLevel) {
        self.host_alerts = host_alerts(level, &self.source);
        self.risk.set_host_security_level(level);
        self.refresh_risk();
    }

    fn refresh_risk(&mut self) {
        let mut alerts = self
            .decoded
            .as_ref()
            .map(DecodedDisplayTree::alerts)
            .unwrap_or_default();
        alerts.extend(self.host_alerts.iter().cloned());
        alerts.extend(self.nonce_alert.iter().cloned());
        self.risk.set_alerts(alerts);
        let can_confirm = self.risk.can_confirm();
        self.emit(SessionEvent::RiskChanged { can_confirm });
    }

    pub fn set_precheck_error(&mut self, error: Option<String>) {
        self.precheck_error = error;
    }

    pub fn set_native_balance(&mut self, balance: Option<U256>) {
        self.native_balance = balance;
    }

    pub fn submit_blockers(&self) -> Vec<SubmitBlocker> {
        let mut blockers = Vec::new();
        if self.status != SessionStatus::Open {
            blockers.push(SubmitBlocker::NotOpen(self.status));
        }
        if self.is_settled() {
            blockers.push(SubmitBlocker::Settled);
        }
        if !self.risk.can_confirm() {
            blockers.push(SubmitBlocker::RiskNotAcknowledged);
        }
        if self.decode_building {
            blockers.push(SubmitBlocker::DecodeBuilding);
        } else if self.decoded.is_none() {
            blockers.push(SubmitBlocker::DecodeMissing);
        }
        if let Some(error) = &self.precheck_error {
            blockers.push(SubmitBlocker::PrecheckFailed(error.clone()));
        }
        if self.settings.data_changed {
            blockers.push(SubmitBlocker::DataChanged);
        }
        if self.is_message_session() {
            return blockers;
        }

        if self.fee_status != SendFeeStatus::Ready {
            blockers.push(SubmitBlocker::FeeNotReady(self.fee_status.clone()));
        }
        match (&self.fee_selection, self.native_balance) {
            (None, _) => blockers.push(SubmitBlocker::FeeMissing),
            (Some(_), None) => blockers.push(SubmitBlocker::BalanceUnknown),
            (Some(selection), Some(available)) => {
                let sending = self
                    .decoded
                    .as_ref()
                    .map(DecodedDisplayTree::native_total)
                    .unwrap_or_default();
                let required = sending.saturating_add(selection.total());
                if required > available {
                    blockers.push(SubmitBlocker::InsufficientBalance {
                        required,
                        available,
                    });
                }
            }
        }
        blockers
    }

    pub fn can_submit(&self) -> bool {
        self.submit_blockers().is_empty()
    }

    // ---- submission -----------------------------------------------------

    pub fn begin_submit(&mut self) -> Result<(), PortError> {
        let blockers = self.submit_blockers();
        if !blockers.is_empty() {
            return Err(PortError::Validation(format!(
                "confirm is disabled: {blockers:?}"
            )));
        }
        self.last_error = None;
        self.transition(SessionAction::Submit)
    }

    pub fn submit_failed(&mut self, error: &PortError) -> Result<(), PortError> {
        self.last_error = Some(error.to_string());
        self.transition(SessionAction::SubmitFailed)
    }

    pub fn submit_succeeded(&mut self) -> Result<(), PortError> {
        self.transition(SessionAction::SubmitSucceeded)
    }

    pub fn mark_closing(&mut self) -> Result<(), PortError> {
        self.transition(SessionAction::Dismiss)
    }

    pub fn close(&mut self) -> Result<(), PortError> {
        self.transition(SessionAction::Close)
    }

    /// Intents handed to the fee estimator, with the nonce override applied.
    pub fn estimation_intents(&self) -> Vec<Arc<UnsignedIntent>> {
        let Some(nonce) = self
            .settings
            .nonce
            .as_deref()
            .and_then(|text| text.parse::<u64>().ok())
        else {
            return self.intents.clone();
        };
        self.intents
            .iter()
            .map(|intent| match intent.as_ref() {
                UnsignedIntent::Transaction(tx) => {
                    Arc::new(UnsignedIntent::Transaction(UnsignedTransaction {
                        nonce: Some(nonce),
                        ..tx.clone()
                    }))
                }
                UnsignedIntent::Message(_) => Arc::clone(intent),
            })
            .collect()
    }

    /// Intents as they must be signed: selected fee units and the nonce
    /// override written into new intents.
    pub fn finalized_intents(&self) -> Result<Vec<UnsignedIntent>, PortError> {
        let nonce_override = self
            .settings
            .nonce
            .as_deref()
            .map(|text| {
                text.parse::<u64>()
                    .map_err(|_| PortError::Validation(format!("invalid nonce {text}")))
            })
            .transpose()?;

        self.intents
            .iter()
            .enumerate()
            .map(|(index, intent)| match intent.as_ref() {
                UnsignedIntent::Message(message) => Ok(UnsignedIntent::Message(message.clone())),
                UnsignedIntent::Transaction(tx) => {
                    let fee = self
                        .fee_selection
                        .as_ref()
                        .and_then(|selection| selection.fee_infos().get(index))
                        .cloned()
                        .ok_or_else(|| {
                            PortError::Validation(format!("no fee selected for intent {index}"))
                        })?;
                    let mut tx = tx.clone();
                    tx.fee = Some(fee);
                    if let Some(nonce) = nonce_override {
                        tx.nonce = Some(nonce);
                    }
                    tx.revision += 1;
                    Ok(UnsignedIntent::Transaction(tx))
                }
            })
            .collect()
    }

    /// Replacement kind when the transaction reuses a locally pending nonce.
    pub fn replace_kind(&self, pending: &[u64]) -> Option<ReplaceTxKind> {
        let tx = self.single_transaction()?;
        let nonce = tx.nonce?;
        if !pending.contains(&nonce) {
            return None;
        }
        match &tx.encoded {
            EncodedTx::Evm(evm) if evm.value.is_zero() && evm.data.is_empty() => {
                Some(ReplaceTxKind::Cancel)
            }
            EncodedTx::Evm(_) => Some(ReplaceTxKind::SpeedUp),
            _ => None,
        }
    }
}

fn host_alerts(level: HostSecurityLevel, source: &SourceInfo) -> Vec<Alert> {
    let origin = source.origin.as_deref().unwrap_or("unknown origin");
    match level {
        HostSecurityLevel::Trusted | HostSecurityLevel::Unknown => Vec::new(),
        HostSecurityLevel::Risky => vec![Alert::new(
            AlertSeverity::Warning,
            AlertSource::HostSecurity,
            format!("{origin} is flagged as risky"),
        )],
        HostSecurityLevel::Malicious => vec![Alert::new(
            AlertSeverity::Critical,
            AlertSource::HostSecurity,
            format!("{origin} is a known malicious site"),
        )],
    }
}
