use std::{fmt::Debug, time::Duration};

use log::*;

use crate::{
    authorization::{AuthContext, SCOPE_TRANSACTIONS_WRITE},
    config::{LedgerConfig, DEFAULT_GATEWAY_TIMEOUT_MS},
    db_types::{
        Amount,
        AttemptFingerprint,
        GroupId,
        MerchantId,
        PendingTransaction,
        TransactionId,
        TransactionMetadata,
        TransactionType,
        VoidTarget,
    },
    events::{EventProducers, GroupClosedEvent, TransactionRecordedEvent},
    helpers::group_id_for_root,
    ledger_api::{
        errors::LedgerApiError,
        group_state::{FollowOnOperation, GroupRoot, GroupState, GroupStatus},
        mutation_coordinator::{MutationCoordinator, MutationOutcome},
        transaction_objects::{
            AuthorizeRequest,
            CaptureRequest,
            OperationResponse,
            PreNoteRequest,
            RefundRequest,
            SaleRequest,
            VoidRequest,
        },
    },
    traits::{GatewayRequest, GroupLock, LedgerStore, PaymentGateway},
};

/// `TransactionFlowApi` handles the five mutating payment operations (plus pre-notes).
///
/// Root operations (authorize, sale, pre-note) open a new group and need no lock, since nothing else can refer to a
/// group before its root exists. Follow-on operations (capture, void, refund) run entirely inside the group's lock:
/// the state they check is the state they act on.
pub struct TransactionFlowApi<B, G> {
    db: B,
    gateway: G,
    producers: EventProducers,
    coordinator: MutationCoordinator,
}

impl<B, G> Debug for TransactionFlowApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TransactionFlowApi")
    }
}

impl<B, G> TransactionFlowApi<B, G> {
    pub fn new(db: B, gateway: G, producers: EventProducers) -> Self {
        let coordinator = MutationCoordinator::new(Duration::from_millis(DEFAULT_GATEWAY_TIMEOUT_MS));
        Self { db, gateway, producers, coordinator }
    }

    pub fn with_config(mut self, config: &LedgerConfig) -> Self {
        self.coordinator = MutationCoordinator::new(config.gateway_timeout);
        self
    }

    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.coordinator = MutationCoordinator::new(timeout);
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }
}

/// What a follow-on request asks for, before the group state is consulted.
enum FollowOnKind {
    Capture(Amount),
    Refund(Amount),
    Void(VoidTarget),
}

impl FollowOnKind {
    fn transaction_type(&self) -> TransactionType {
        match self {
            FollowOnKind::Capture(_) => TransactionType::Capture,
            FollowOnKind::Refund(_) => TransactionType::Refund,
            FollowOnKind::Void(_) => TransactionType::Void,
        }
    }

    fn requested_amount(&self) -> Option<Amount> {
        match self {
            FollowOnKind::Capture(amount) | FollowOnKind::Refund(amount) => Some(*amount),
            FollowOnKind::Void(_) => None,
        }
    }

    fn void_target(&self) -> Option<VoidTarget> {
        match self {
            FollowOnKind::Void(target) => Some(target.clone()),
            _ => None,
        }
    }
}

impl<B, G> TransactionFlowApi<B, G>
where
    B: LedgerStore,
    G: PaymentGateway,
{
    /// Places a hold on the customer's funds. Opens a new group.
    pub async fn authorize(
        &self,
        ctx: &AuthContext,
        request: AuthorizeRequest,
    ) -> Result<OperationResponse, LedgerApiError> {
        request.validate()?;
        let merchant_id = self.resolve_merchant(ctx, request.merchant_id.as_ref())?;
        let metadata = TransactionMetadata::Auth { session_id: request.session_id };
        let pending = PendingTransaction {
            group_id: group_id_for_root(&request.id),
            id: request.id,
            merchant_id,
            customer_id: request.customer_id,
            amount: request.amount,
            currency: request.currency,
            metadata,
        };
        self.record_root(pending).await
    }

    /// Authorizes and captures in a single step. Opens a new group.
    pub async fn sale(&self, ctx: &AuthContext, request: SaleRequest) -> Result<OperationResponse, LedgerApiError> {
        request.validate()?;
        let merchant_id = self.resolve_merchant(ctx, request.merchant_id.as_ref())?;
        let metadata = TransactionMetadata::Sale { session_id: request.session_id };
        let pending = PendingTransaction {
            group_id: group_id_for_root(&request.id),
            id: request.id,
            merchant_id,
            customer_id: request.customer_id,
            amount: request.amount,
            currency: request.currency,
            metadata,
        };
        self.record_root(pending).await
    }

    /// Zero-amount account verification. Opens a group that admits no follow-on operations.
    pub async fn pre_note(
        &self,
        ctx: &AuthContext,
        request: PreNoteRequest,
    ) -> Result<OperationResponse, LedgerApiError> {
        request.validate()?;
        let merchant_id = self.resolve_merchant(ctx, request.merchant_id.as_ref())?;
        let metadata = TransactionMetadata::PreNote { session_id: request.session_id };
        let pending = PendingTransaction {
            group_id: group_id_for_root(&request.id),
            id: request.id,
            merchant_id,
            customer_id: request.customer_id,
            amount: Amount::ZERO,
            currency: request.currency,
            metadata,
        };
        self.record_root(pending).await
    }

    /// Settles part or all of the group's open authorization.
    pub async fn capture(
        &self,
        ctx: &AuthContext,
        request: CaptureRequest,
    ) -> Result<OperationResponse, LedgerApiError> {
        request.validate()?;
        let merchant_id = self.resolve_merchant(ctx, request.merchant_id.as_ref())?;
        let kind = FollowOnKind::Capture(request.amount);
        self.record_follow_on(&request.id, &request.group_id, merchant_id, kind).await
    }

    /// Reverses the open authorization, or one unsettled capture, as named by the request's target.
    pub async fn void(&self, ctx: &AuthContext, request: VoidRequest) -> Result<OperationResponse, LedgerApiError> {
        request.validate()?;
        let merchant_id = self.resolve_merchant(ctx, request.merchant_id.as_ref())?;
        let kind = FollowOnKind::Void(request.target);
        self.record_follow_on(&request.id, &request.group_id, merchant_id, kind).await
    }

    /// Returns captured funds to the customer.
    pub async fn refund(&self, ctx: &AuthContext, request: RefundRequest) -> Result<OperationResponse, LedgerApiError> {
        request.validate()?;
        let merchant_id = self.resolve_merchant(ctx, request.merchant_id.as_ref())?;
        let kind = FollowOnKind::Refund(request.amount);
        self.record_follow_on(&request.id, &request.group_id, merchant_id, kind).await
    }

    fn resolve_merchant(
        &self,
        ctx: &AuthContext,
        requested: Option<&MerchantId>,
    ) -> Result<MerchantId, LedgerApiError> {
        ctx.require_scope(SCOPE_TRANSACTIONS_WRITE)?;
        let merchant_id = ctx.resolve_merchant_id(requested)?;
        ctx.check_allow_list(&merchant_id)?;
        trace!("🔐️ {} {} acts for merchant {merchant_id}", ctx.actor_type(), ctx.actor_id());
        Ok(merchant_id)
    }

    async fn record_root(&self, pending: PendingTransaction) -> Result<OperationResponse, LedgerApiError> {
        let request = GatewayRequest {
            operation: pending.transaction_type().into(),
            amount: pending.amount,
            currency: pending.currency.clone(),
            operation_reference: None,
            transaction_id: pending.id.clone(),
        };
        let mut writer = self.db.clone();
        let outcome = self.coordinator.create_transaction(&mut writer, pending, || self.gateway.process(request)).await?;
        self.publish(&outcome, None).await;
        Ok(OperationResponse::from(&outcome.transaction))
    }

    async fn record_follow_on(
        &self,
        id: &TransactionId,
        group_id: &GroupId,
        merchant_id: MerchantId,
        kind: FollowOnKind,
    ) -> Result<OperationResponse, LedgerApiError> {
        let mut lock = self.db.lock_group(group_id).await?;
        let result = self.follow_on_under_lock(&mut lock, id, group_id, merchant_id, kind).await;
        if let Err(e) = lock.release().await {
            warn!("🔄️ Could not release the lock on group {group_id}: {e}. It will lapse on its own.");
        }
        let (outcome, transition) = result?;
        if let Some((root, before, after)) = &transition {
            self.publish(&outcome, Some((root, *before, *after))).await;
        }
        Ok(OperationResponse::from(&outcome.transaction))
    }

    /// Validates and records a follow-on operation. Replays come back with no status transition.
    async fn follow_on_under_lock(
        &self,
        lock: &mut B::Lock,
        id: &TransactionId,
        group_id: &GroupId,
        merchant_id: MerchantId,
        kind: FollowOnKind,
    ) -> Result<(MutationOutcome, Option<(GroupRoot, GroupStatus, GroupStatus)>), LedgerApiError> {
        let transaction_type = kind.transaction_type();
        let transactions = lock.transactions().await?;
        let mut state = GroupState::compute(&transactions);
        // A missing group and somebody else's group must be indistinguishable
        let root = match state.root() {
            Some(root) if root.merchant_id == merchant_id => root.clone(),
            Some(_) => {
                warn!("🔄️ {transaction_type} {id}: merchant {merchant_id} does not own group {group_id}");
                return Err(LedgerApiError::NotFound);
            },
            None => {
                debug!("🔄️ {transaction_type} {id}: group {group_id} does not exist");
                return Err(LedgerApiError::NotFound);
            },
        };
        let fingerprint = AttemptFingerprint {
            group_id: group_id.clone(),
            merchant_id: merchant_id.clone(),
            transaction_type,
            amount: kind.requested_amount(),
            currency: Some(root.currency.clone()),
            void_target: kind.void_target(),
        };
        // Replays take precedence over the state checks, which a recorded attempt may no longer pass
        if let Some(existing) = self.coordinator.replay(lock, id, &fingerprint).await? {
            return Ok((MutationOutcome { transaction: existing, inserted: false }, None));
        }
        let (amount, operation) = Self::plan_follow_on(&state, kind)?;
        let operation_reference = state.reference_for_operation(&operation);
        if operation_reference.is_none() {
            warn!("🔄️ {transaction_type} {id}: group {group_id} has no gateway reference to chain from");
        }
        let metadata = match &operation {
            FollowOnOperation::Capture => TransactionMetadata::Capture,
            FollowOnOperation::Refund => TransactionMetadata::Refund,
            FollowOnOperation::Void(target) => TransactionMetadata::Void { target: target.clone() },
        };
        let pending = PendingTransaction {
            id: id.clone(),
            group_id: group_id.clone(),
            merchant_id,
            customer_id: root.customer_id.clone(),
            amount,
            currency: root.currency.clone(),
            metadata,
        };
        let request = GatewayRequest {
            operation: transaction_type.into(),
            amount,
            currency: root.currency.clone(),
            operation_reference,
            transaction_id: id.clone(),
        };
        let status_before = state.status();
        let outcome = self.coordinator.create_transaction(lock, pending, || self.gateway.process(request)).await?;
        if outcome.inserted {
            state.apply(&outcome.transaction);
        }
        let status_after = state.status();
        Ok((outcome, Some((root, status_before, status_after))))
    }

    /// Checks the request against the group state and works out the amount the operation moves.
    fn plan_follow_on(state: &GroupState, kind: FollowOnKind) -> Result<(Amount, FollowOnOperation), LedgerApiError> {
        match kind {
            FollowOnKind::Capture(amount) => {
                if state.can_capture(amount) {
                    Ok((amount, FollowOnOperation::Capture))
                } else {
                    Err(LedgerApiError::StateConflict(format!(
                        "a capture of {amount} exceeds the remaining authorization of {}",
                        state.remaining_authorization()
                    )))
                }
            },
            FollowOnKind::Refund(amount) => {
                if state.can_refund(amount) {
                    Ok((amount, FollowOnOperation::Refund))
                } else {
                    Err(LedgerApiError::StateConflict(format!(
                        "a refund of {amount} exceeds the refundable amount of {}",
                        state.refundable_amount()
                    )))
                }
            },
            FollowOnKind::Void(target) => match state.void_amount(&target) {
                Some(amount) if state.can_void_target(&target) => Ok((amount, FollowOnOperation::Void(target))),
                _ => Err(LedgerApiError::StateConflict(format!("the {target} cannot be voided"))),
            },
        }
    }

    async fn publish(&self, outcome: &MutationOutcome, transition: Option<(&GroupRoot, GroupStatus, GroupStatus)>) {
        if !outcome.inserted {
            return;
        }
        let tx = &outcome.transaction;
        debug!("📬️ Notifying transaction recorded hook subscribers of {}", tx.id);
        self.producers.publish_transaction_recorded(TransactionRecordedEvent::new(tx.clone())).await;
        if let Some((root, before, after)) = transition {
            if !before.is_terminal() && after.is_terminal() {
                info!("🔄️ Group {} is now {after}", tx.group_id);
                let event = GroupClosedEvent::new(tx.group_id.clone(), root.merchant_id.clone(), after);
                self.producers.publish_group_closed(event).await;
            }
        }
    }
}
