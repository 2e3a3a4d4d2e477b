//! Group state derivation
//!
//! A group's state is never stored. It is recomputed from the group's transactions every time a decision depends on
//! it, by folding the rows in creation order. Only approved rows contribute; declines are part of the audit trail
//! and nothing else.
//!
//! The predicates in this module (`can_capture`, `can_void_target`, `can_refund`) are only meaningful when evaluated
//! against a state computed inside the group's lock, and acted upon before that lock is released.
use std::fmt::Display;

use log::*;
use serde::{Deserialize, Serialize};

use crate::db_types::{
    Amount,
    Currency,
    CustomerId,
    GatewayReference,
    GroupId,
    MerchantId,
    SessionId,
    Transaction,
    TransactionId,
    TransactionType,
    VoidTarget,
};

//--------------------------------------      GroupStatus     ---------------------------------------------------------
/// A coarse, human-readable summary of where a group is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    /// No transactions
    Empty,
    /// The root attempt was declined.
    Declined,
    /// An approved pre-note. Nothing can follow it.
    Verified,
    OpenAuth,
    PartiallyCaptured,
    FullyCaptured,
    PartiallyRefunded,
    FullyRefunded,
    Voided,
}

impl GroupStatus {
    /// Terminal groups accept no further successful mutations.
    pub fn is_terminal(&self) -> bool {
        matches!(self, GroupStatus::Voided | GroupStatus::FullyRefunded)
    }
}

impl Display for GroupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GroupStatus::Empty => "empty",
            GroupStatus::Declined => "declined",
            GroupStatus::Verified => "verified",
            GroupStatus::OpenAuth => "open_auth",
            GroupStatus::PartiallyCaptured => "partially_captured",
            GroupStatus::FullyCaptured => "fully_captured",
            GroupStatus::PartiallyRefunded => "partially_refunded",
            GroupStatus::FullyRefunded => "fully_refunded",
            GroupStatus::Voided => "voided",
        };
        f.write_str(s)
    }
}

//--------------------------------------     Root / captures    -------------------------------------------------------
/// The transaction that opened the group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRoot {
    pub id: TransactionId,
    pub transaction_type: TransactionType,
    pub merchant_id: MerchantId,
    pub customer_id: Option<CustomerId>,
    pub session_id: Option<SessionId>,
    pub amount: Amount,
    pub currency: Currency,
    pub gateway_reference: Option<GatewayReference>,
    pub approved: bool,
}

impl From<&Transaction> for GroupRoot {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id.clone(),
            transaction_type: tx.transaction_type,
            merchant_id: tx.merchant_id.clone(),
            customer_id: tx.customer_id.clone(),
            session_id: tx.session_id().cloned(),
            amount: tx.amount,
            currency: tx.currency.clone(),
            gateway_reference: tx.gateway_reference.clone(),
            approved: tx.is_approved(),
        }
    }
}

/// An approved capture, or the capture implied by an approved sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureEntry {
    pub transaction_id: TransactionId,
    pub amount: Amount,
    pub gateway_reference: Option<GatewayReference>,
    pub voided: bool,
}

//--------------------------------------      GroupState      ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupState {
    /// The authorization currently backing the group. A void of the authorization shrinks this to what has already
    /// been captured.
    pub active_auth_amount: Amount,
    pub captured_amount: Amount,
    pub refunded_amount: Amount,
    pub is_auth_voided: bool,
    /// The gateway reference refunds chain from: the latest capture still standing, or the root if there is none.
    pub operation_reference: Option<GatewayReference>,
    root: Option<GroupRoot>,
    captures: Vec<CaptureEntry>,
    transaction_count: usize,
}

impl GroupState {
    /// Folds `transactions`, which must be in creation order, into a state.
    pub fn compute(transactions: &[Transaction]) -> Self {
        transactions.iter().fold(Self::default(), |mut state, tx| {
            state.apply(tx);
            state
        })
    }

    /// Applies one more transaction to the state.
    pub fn apply(&mut self, tx: &Transaction) {
        self.transaction_count += 1;
        if tx.transaction_type.is_root() {
            if let Some(root) = &self.root {
                warn!(
                    "🧮️ Ignoring {} transaction {} in group {}; it already has root {}",
                    tx.transaction_type, tx.id, tx.group_id, root.id
                );
                return;
            }
            self.root = Some(GroupRoot::from(tx));
        }
        if !tx.is_approved() {
            trace!("🧮️ Transaction {} was declined ({}). Skipping.", tx.id, tx.gateway_result_code);
            return;
        }
        match tx.transaction_type {
            TransactionType::Auth => {
                self.active_auth_amount = tx.amount;
                self.operation_reference = tx.gateway_reference.clone();
            },
            TransactionType::Sale => {
                self.active_auth_amount = tx.amount;
                self.captured_amount += tx.amount;
                self.push_capture(tx);
            },
            TransactionType::Capture => {
                self.captured_amount += tx.amount;
                self.push_capture(tx);
            },
            TransactionType::Void => match tx.metadata.void_target() {
                Some(VoidTarget::Authorization) => {
                    self.is_auth_voided = true;
                    self.active_auth_amount = self.captured_amount;
                },
                Some(VoidTarget::Capture(capture_id)) => self.void_capture(capture_id),
                None => warn!("🧮️ Void {} has no target. Skipping.", tx.id),
            },
            TransactionType::Refund => self.refunded_amount += tx.amount,
            TransactionType::PreNote => {},
        }
    }

    fn push_capture(&mut self, tx: &Transaction) {
        self.operation_reference = tx.gateway_reference.clone();
        self.captures.push(CaptureEntry {
            transaction_id: tx.id.clone(),
            amount: tx.amount,
            gateway_reference: tx.gateway_reference.clone(),
            voided: false,
        });
    }

    fn void_capture(&mut self, capture_id: &TransactionId) {
        match self.captures.iter_mut().find(|c| &c.transaction_id == capture_id && !c.voided) {
            Some(capture) => {
                capture.voided = true;
                self.captured_amount -= capture.amount;
            },
            None => {
                warn!("🧮️ Void of capture {capture_id} does not match an open capture. Skipping.");
                return;
            },
        }
        // Chain from the latest capture still standing, or the root if there is none
        self.operation_reference = self
            .captures
            .iter()
            .rev()
            .find(|c| !c.voided)
            .and_then(|c| c.gateway_reference.clone())
            .or_else(|| self.approved_root().and_then(|r| r.gateway_reference.clone()));
    }

    pub fn root(&self) -> Option<&GroupRoot> {
        self.root.as_ref()
    }

    fn approved_root(&self) -> Option<&GroupRoot> {
        self.root.as_ref().filter(|r| r.approved)
    }

    fn open_auth(&self) -> Option<&GroupRoot> {
        self.approved_root().filter(|r| r.transaction_type == TransactionType::Auth && !self.is_auth_voided)
    }

    /// The captures in the group, in creation order, including voided ones.
    pub fn captures(&self) -> &[CaptureEntry] {
        &self.captures
    }

    pub fn transaction_count(&self) -> usize {
        self.transaction_count
    }

    pub fn is_empty(&self) -> bool {
        self.transaction_count == 0
    }

    /// How much more can be captured against the authorization.
    pub fn remaining_authorization(&self) -> Amount {
        match self.open_auth() {
            Some(_) => self.active_auth_amount.saturating_sub_to_zero(self.captured_amount),
            None => Amount::ZERO,
        }
    }

    /// How much more can be refunded.
    pub fn refundable_amount(&self) -> Amount {
        self.captured_amount.saturating_sub_to_zero(self.refunded_amount)
    }

    pub fn can_capture(&self, requested: Amount) -> bool {
        if !requested.is_positive() || self.open_auth().is_none() {
            return false;
        }
        self.captured_amount.checked_add(requested).is_some_and(|total| total <= self.active_auth_amount)
    }

    /// True if anything in the group can still be voided.
    pub fn can_void(&self) -> bool {
        self.can_void_target(&VoidTarget::Authorization) ||
            self.captures.iter().any(|c| self.can_void_target(&VoidTarget::Capture(c.transaction_id.clone())))
    }

    pub fn can_void_target(&self, target: &VoidTarget) -> bool {
        match target {
            VoidTarget::Authorization => self.remaining_authorization().is_positive(),
            VoidTarget::Capture(capture_id) => self.open_capture(capture_id).is_some_and(|c| {
                // Money that has been refunded can no longer be un-captured
                self.captured_amount.checked_sub(c.amount).is_some_and(|left| left >= self.refunded_amount)
            }),
        }
    }

    pub fn can_refund(&self, requested: Amount) -> bool {
        if !requested.is_positive() {
            return false;
        }
        self.refunded_amount.checked_add(requested).is_some_and(|total| total <= self.captured_amount)
    }

    fn open_capture(&self, capture_id: &TransactionId) -> Option<&CaptureEntry> {
        self.captures.iter().find(|c| &c.transaction_id == capture_id && !c.voided)
    }

    /// The amount a void of `target` reverses, if the target is open.
    pub fn void_amount(&self, target: &VoidTarget) -> Option<Amount> {
        match target {
            VoidTarget::Authorization => Some(self.remaining_authorization()).filter(|a| a.is_positive()),
            VoidTarget::Capture(capture_id) => self.open_capture(capture_id).map(|c| c.amount),
        }
    }

    /// The gateway reference a follow-on operation must quote.
    pub fn reference_for_operation(&self, operation: &FollowOnOperation) -> Option<GatewayReference> {
        match operation {
            FollowOnOperation::Capture | FollowOnOperation::Void(VoidTarget::Authorization) => {
                self.approved_root().and_then(|r| r.gateway_reference.clone())
            },
            FollowOnOperation::Void(VoidTarget::Capture(capture_id)) => {
                self.open_capture(capture_id).and_then(|c| c.gateway_reference.clone())
            },
            FollowOnOperation::Refund => self.operation_reference.clone(),
        }
    }

    pub fn status(&self) -> GroupStatus {
        let root = match &self.root {
            None => return GroupStatus::Empty,
            Some(root) if !root.approved => return GroupStatus::Declined,
            Some(root) => root,
        };
        match root.transaction_type {
            TransactionType::PreNote => return GroupStatus::Verified,
            TransactionType::Sale if self.captured_amount.is_zero() => return GroupStatus::Voided,
            _ => {},
        }
        if self.captured_amount.is_zero() {
            return if self.is_auth_voided { GroupStatus::Voided } else { GroupStatus::OpenAuth };
        }
        if self.refunded_amount >= self.captured_amount {
            GroupStatus::FullyRefunded
        } else if self.refunded_amount.is_positive() {
            GroupStatus::PartiallyRefunded
        } else if self.remaining_authorization().is_positive() {
            GroupStatus::PartiallyCaptured
        } else {
            GroupStatus::FullyCaptured
        }
    }
}

/// A follow-on operation, as far as reference selection is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowOnOperation {
    Capture,
    Void(VoidTarget),
    Refund,
}
