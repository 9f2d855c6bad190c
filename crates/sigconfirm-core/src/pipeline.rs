use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::approval::{apply_allowance, parse_allowance, UNLIMITED_ALLOWANCE};
use crate::broker::{ApprovalBroker, ApprovalError, ApprovalReceiver};
use crate::decode::{DecodeEngine, UNLIMITED_LABEL};
use crate::display::DecodedDisplayTree;
use crate::domain::{
    AccountContext, ConfirmationRequest, HostSecurityLevel, ImplementationTag, SignResult,
    TimestampMs, UnsignedIntent,
};
use crate::fee::format_amount;
use crate::message;
use crate::network::{NetworkInfo, NetworkRegistry};
use crate::ports::{
    AccountPort, ClockPort, FeeEstimatorPort, HostSecurityPort, PendingTxPort, PortError,
    PricePort, SignerPort, TokenMetadataPort,
};
use crate::session::ConfirmationSession;
use crate::state_machine::SessionStatus;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Accept legacy `eth_sign` requests.
    pub allow_eth_sign: bool,
}

pub struct PipelinePorts<A, M, P, F, S, H, N, C> {
    pub accounts: A,
    pub metadata: M,
    pub prices: P,
    pub fees: F,
    pub signer: S,
    pub host_security: H,
    pub nonces: N,
    pub clock: C,
}

/// Entry point shared by provider dispatch and internal wallet flows.
pub struct ConfirmationPipeline<A, M, P, F, S, H, N, C>
where
    A: AccountPort,
    M: TokenMetadataPort,
    P: PricePort,
    F: FeeEstimatorPort,
    S: SignerPort,
    H: HostSecurityPort,
    N: PendingTxPort,
    C: ClockPort,
{
    pub registry: NetworkRegistry,
    pub ports: PipelinePorts<A, M, P, F, S, H, N, C>,
    pub broker: ApprovalBroker,
    pub settings: PipelineSettings,
}

impl<A, M, P, F, S, H, N, C> ConfirmationPipeline<A, M, P, F, S, H, N, C>
where
    A: AccountPort,
    M: TokenMetadataPort,
    P: PricePort,
    F: FeeEstimatorPort,
    S: SignerPort,
    H: HostSecurityPort,
    N: PendingTxPort,
    C: ClockPort,
{
    pub fn new(
        registry: NetworkRegistry,
        ports: PipelinePorts<A, M, P, F, S, H, N, C>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            registry,
            ports,
            broker: ApprovalBroker::new(),
            settings,
        }
    }

    /// Opens a session for `request`. The receiver settles exactly once, when
    /// the session is confirmed, dismissed or dropped.
    pub fn request_confirmation(
        &self,
        request: ConfirmationRequest,
    ) -> Result<(ConfirmationSession, ApprovalReceiver), PortError> {
        let ConfirmationRequest {
            intents,
            network_id,
            account_id,
            source,
            request_id,
        } = request;

        if intents.is_empty() {
            return Err(PortError::Validation("request contains no intents".to_string()));
        }
        let has_message = intents.iter().any(|intent| intent.as_message().is_some());
        if has_message && intents.len() > 1 {
            return Err(PortError::Validation(
                "a message must be confirmed on its own".to_string(),
            ));
        }

        let network = self.registry.get(&network_id)?.clone();
        let address = self.ports.accounts.address(&account_id, &network_id)?;
        let account = AccountContext {
            id: account_id,
            address,
        };
        let host_level = self.ports.host_security.classify(&source).unwrap_or_else(|e| {
            warn!(error = %e, "host security classification failed");
            HostSecurityLevel::Unknown
        });
        let created_at = TimestampMs(self.ports.clock.now_ms()?);
        let (handle, receiver) = self.broker.register(request_id)?;

        let mut session = ConfirmationSession::new(
            network,
            account,
            source,
            intents,
            host_level,
            created_at,
            handle,
        );
        info!(
            request_id = %session.request_id(),
            network = %session.network().id,
            intents = session.intents().len(),
            host_security = ?host_level,
            "confirmation requested"
        );

        if let Err(e) = self.precheck(&session) {
            warn!(request_id = %session.request_id(), error = %e, "precheck failed");
            session.set_precheck_error(Some(e.to_string()));
        }
        if !session.is_message_session() {
            let balance = self
                .ports
                .accounts
                .native_balance(&session.account().id, &session.network().id)
                .map_err(|e| warn!(error = %e, "native balance lookup failed"))
                .ok();
            session.set_native_balance(balance);
        }

        self.decode_session(&mut session);
        self.refresh_fee(&mut session)?;
        Ok((session, receiver))
    }

    fn precheck(&self, session: &ConfirmationSession) -> Result<(), PortError> {
        let network = session.network();
        for (index, intent) in session.intents().iter().enumerate() {
            match intent.as_ref() {
                UnsignedIntent::Message(msg) => {
                    message::validate_message(msg, network, self.settings.allow_eth_sign)?
                }
                UnsignedIntent::Transaction(tx) => {
                    if let Some(tag) = tx
                        .encoded
                        .implementation()
                        .filter(|tag| *tag != network.implementation)
                    {
                        return Err(PortError::Protocol(format!(
                            "intent {index} is a {tag} transaction but the network is {}",
                            network.implementation
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Pure decode of `intents` in the context of `network` and `account`.
    pub fn build_tree(
        &self,
        intents: &[Arc<UnsignedIntent>],
        network: &NetworkInfo,
        account: &AccountContext,
    ) -> DecodedDisplayTree {
        DecodeEngine::new(&self.ports.metadata, &self.ports.prices).decode(intents, network, account)
    }

    pub fn decode_session(&self, session: &mut ConfirmationSession) -> bool {
        let ticket = session.begin_decode();
        let tree = self.build_tree(session.intents(), session.network(), session.account());
        session.apply_decode(ticket, tree)
    }

    /// Re-estimates fees. Estimator failures end up in the session's fee
    /// status, not in the returned result.
    pub fn refresh_fee(&self, session: &mut ConfirmationSession) -> Result<(), PortError> {
        if session.is_message_session() {
            return Ok(());
        }
        let ticket = session.begin_fee_estimate()?;
        let intents = session.estimation_intents();
        let estimate = self.ports.fees.estimate(session.network(), &intents);
        let native_price = self
            .ports
            .prices
            .price_usd(&session.network().id, None)
            .unwrap_or_else(|e| {
                debug!(error = %e, "native price unavailable");
                None
            });
        session.apply_fee_estimate(ticket, estimate, native_price)?;
        Ok(())
    }

    /// Sets a new allowance on the session's token approval. `input` is in
    /// token units and ignored when `unlimited` is set.
    pub fn edit_approval(
        &self,
        session: &mut ConfirmationSession,
        input: &str,
        unlimited: bool,
    ) -> Result<(), PortError> {
        if session.is_building() {
            return Err(PortError::Conflict(
                "approval cannot be edited while decoding".to_string(),
            ));
        }
        if !session.network().capabilities.approval_editable {
            return Err(PortError::Validation(format!(
                "approvals are not editable on {}",
                session.network().name
            )));
        }
        let (intent_index, decimals) = session
            .decoded()
            .and_then(DecodedDisplayTree::first_approval)
            .map(|(index, approval)| (index, approval.token.decimals))
            .ok_or_else(|| PortError::NotFound("no token approval to edit".to_string()))?;

        let (amount, display_amount) = if unlimited {
            (UNLIMITED_ALLOWANCE, UNLIMITED_LABEL.to_string())
        } else {
            let amount = parse_allowance(input, decimals)?;
            let display_amount = match decimals {
                Some(decimals) => format_amount(amount, decimals)?,
                None => amount.to_string(),
            };
            (amount, display_amount)
        };

        let current = session.intents().get(intent_index).cloned().ok_or_else(|| {
            PortError::NotFound(format!("intent {intent_index} does not exist"))
        })?;
        let edited = apply_allowance(&current, amount)?;
        session.replace_intent(intent_index, edited)?;
        session.set_approval_current(&display_amount, unlimited)?;
        debug!(request_id = %session.request_id(), allowance = %display_amount, "approval edited");

        self.decode_session(session);
        self.refresh_fee(session)
    }

    pub fn update_nonce(
        &self,
        session: &mut ConfirmationSession,
        nonce: Option<&str>,
    ) -> Result<(), PortError> {
        let account = &session.account().id;
        let network = &session.network().id;
        let current = self.ports.nonces.current_nonce(account, network)?;
        let pending = self.ports.nonces.pending_nonces(account, network)?;
        session.set_nonce_override(nonce, current, &pending)?;
        self.refresh_fee(session)
    }

    /// Signs the current intents and resolves the caller. On failure the
    /// session returns to `Open` and the caller stays pending.
    pub fn confirm(&self, session: &mut ConfirmationSession) -> Result<SignResult, PortError> {
        if session.status() == SessionStatus::Open && session.is_settled() {
            warn!(request_id = %session.request_id(), "request was settled before confirm");
            session.mark_closing()?;
            session.close()?;
            return Err(PortError::Conflict(format!(
                "request {} is already settled",
                session.request_id()
            )));
        }
        session.begin_submit()?;
        match self.sign_all(session) {
            Ok(result) => {
                session.submit_succeeded()?;
                if !self.broker.resolve(session.approval_handle(), result.clone()) {
                    warn!(request_id = %session.request_id(), "session was already settled");
                }
                session.close()?;
                info!(
                    request_id = %session.request_id(),
                    payloads = result.payloads.len(),
                    replace = ?result.replace,
                    "confirmation resolved"
                );
                Ok(result)
            }
            Err(e) => {
                warn!(
                    request_id = %session.request_id(),
                    error = %e,
                    class = ?e.class(),
                    "confirmation failed"
                );
                session.submit_failed(&e)?;
                Err(e)
            }
        }
    }

    fn sign_all(&self, session: &ConfirmationSession) -> Result<SignResult, PortError> {
        self.precheck(session)?;
        if session.is_settled() {
            return Err(PortError::Conflict(format!(
                "request {} is already settled",
                session.request_id()
            )));
        }
        let intents = session.finalized_intents()?;
        let network = &session.network().id;
        let account = &session.account().id;

        let replace = match (session.network().implementation, session.is_message_session()) {
            (ImplementationTag::Evm, false) => match self.ports.nonces.pending_nonces(account, network) {
                Ok(pending) => session.replace_kind(&pending),
                Err(e) => {
                    warn!(error = %e, "pending nonce lookup failed");
                    None
                }
            },
            _ => None,
        };

        let payloads = intents
            .iter()
            .map(|intent| self.ports.signer.sign(intent, network, account))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SignResult {
            request_id: session.request_id().clone(),
            payloads,
            replace,
        })
    }

    /// Dismisses the dialog and rejects the caller with a user-rejected error.
    pub fn dismiss(&self, session: &mut ConfirmationSession) -> Result<(), PortError> {
        session.mark_closing()?;
        if !self
            .broker
            .reject(session.approval_handle(), ApprovalError::user_rejected())
        {
            debug!(request_id = %session.request_id(), "dismissed an already settled session");
        }
        session.close()
    }
}
