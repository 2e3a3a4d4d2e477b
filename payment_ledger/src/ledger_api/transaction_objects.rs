use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{
        Amount,
        Currency,
        CustomerId,
        GroupId,
        MerchantId,
        SessionId,
        Transaction,
        TransactionId,
        TransactionStatus,
        TransactionType,
        VoidTarget,
    },
    ledger_api::{errors::LedgerApiError, group_state::GroupState, GroupStatus},
};

//--------------------------------------  TransactionQueryFilter  -----------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionQueryFilter {
    /// `Some(vec![])` is a legitimate value and matches nothing.
    pub merchant_ids: Option<Vec<MerchantId>>,
    pub customer_id: Option<CustomerId>,
    pub group_id: Option<GroupId>,
    pub transaction_types: Option<Vec<TransactionType>>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl TransactionQueryFilter {
    pub fn with_merchant_id(mut self, merchant_id: MerchantId) -> Self {
        self.merchant_ids.get_or_insert_with(Vec::new).push(merchant_id);
        self
    }

    pub fn with_customer_id(mut self, customer_id: CustomerId) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn with_group_id(mut self, group_id: GroupId) -> Self {
        self.group_id = Some(group_id);
        self
    }

    pub fn with_transaction_type(mut self, transaction_type: TransactionType) -> Self {
        self.transaction_types.get_or_insert_with(Vec::new).push(transaction_type);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.merchant_ids.is_none() &&
            self.customer_id.is_none() &&
            self.group_id.is_none() &&
            self.transaction_types.is_none() &&
            self.since.is_none() &&
            self.until.is_none()
    }

    /// True if the filter can be shown to match nothing without asking the database.
    pub fn matches_nothing(&self) -> bool {
        self.merchant_ids.as_ref().is_some_and(|m| m.is_empty()) ||
            self.transaction_types.as_ref().is_some_and(|t| t.is_empty())
    }
}

impl Display for TransactionQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "No filters.")?;
            return Ok(());
        }
        if let Some(merchant_ids) = &self.merchant_ids {
            let ids = merchant_ids.iter().map(|m| m.to_string()).collect::<Vec<String>>().join(",");
            write!(f, "merchants: [{ids}]. ")?;
        }
        if let Some(customer_id) = &self.customer_id {
            write!(f, "customer_id: {customer_id}. ")?;
        }
        if let Some(group_id) = &self.group_id {
            write!(f, "group_id: {group_id}. ")?;
        }
        if let Some(types) = &self.transaction_types {
            let types = types.iter().map(|t| t.to_string()).collect::<Vec<String>>().join(",");
            write!(f, "types: [{types}]. ")?;
        }
        if let Some(since) = &self.since {
            write!(f, "since {since}. ")?;
        }
        if let Some(until) = &self.until {
            write!(f, "until {until}. ")?;
        }
        Ok(())
    }
}

//--------------------------------------    Request objects     -------------------------------------------------------
fn check_id(kind: &str, ok: bool) -> Result<(), LedgerApiError> {
    if ok {
        Ok(())
    } else {
        Err(LedgerApiError::Validation(format!("{kind} is missing or malformed")))
    }
}

fn check_positive(amount: Amount) -> Result<(), LedgerApiError> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(LedgerApiError::Validation("amount must be greater than zero".into()))
    }
}

fn check_optional_merchant(merchant_id: &Option<MerchantId>) -> Result<(), LedgerApiError> {
    match merchant_id {
        Some(m) => check_id("merchant_id", m.is_well_formed()),
        None => Ok(()),
    }
}

/// The request shape shared by `authorize` and `sale`. Both open a new group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub id: TransactionId,
    #[serde(default)]
    pub merchant_id: Option<MerchantId>,
    pub amount: Amount,
    #[serde(default)]
    pub currency: Currency,
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    #[serde(default)]
    pub session_id: Option<SessionId>,
}

pub type AuthorizeRequest = ChargeRequest;
pub type SaleRequest = ChargeRequest;

impl ChargeRequest {
    pub fn new<T: Into<TransactionId>>(id: T, amount: Amount) -> Self {
        Self {
            id: id.into(),
            merchant_id: None,
            amount,
            currency: Currency::default(),
            customer_id: None,
            session_id: None,
        }
    }

    pub fn with_merchant_id<M: Into<MerchantId>>(mut self, merchant_id: M) -> Self {
        self.merchant_id = Some(merchant_id.into());
        self
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    pub fn with_customer_id<C: Into<CustomerId>>(mut self, customer_id: C) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn with_session_id<S: Into<SessionId>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn validate(&self) -> Result<(), LedgerApiError> {
        check_id("id", self.id.is_well_formed())?;
        check_optional_merchant(&self.merchant_id)?;
        check_positive(self.amount)
    }
}

/// Zero-amount account verification. Opens a group of its own that never accepts follow-on operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreNoteRequest {
    pub id: TransactionId,
    #[serde(default)]
    pub merchant_id: Option<MerchantId>,
    #[serde(default)]
    pub currency: Currency,
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    #[serde(default)]
    pub session_id: Option<SessionId>,
}

impl PreNoteRequest {
    pub fn new<T: Into<TransactionId>>(id: T) -> Self {
        Self { id: id.into(), merchant_id: None, currency: Currency::default(), customer_id: None, session_id: None }
    }

    pub fn with_merchant_id<M: Into<MerchantId>>(mut self, merchant_id: M) -> Self {
        self.merchant_id = Some(merchant_id.into());
        self
    }

    pub fn with_customer_id<C: Into<CustomerId>>(mut self, customer_id: C) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn validate(&self) -> Result<(), LedgerApiError> {
        check_id("id", self.id.is_well_formed())?;
        check_optional_merchant(&self.merchant_id)
    }
}

/// The request shape shared by `capture` and `refund`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowOnRequest {
    pub id: TransactionId,
    pub group_id: GroupId,
    #[serde(default)]
    pub merchant_id: Option<MerchantId>,
    pub amount: Amount,
}

pub type CaptureRequest = FollowOnRequest;
pub type RefundRequest = FollowOnRequest;

impl FollowOnRequest {
    pub fn new<T: Into<TransactionId>, G: Into<GroupId>>(id: T, group_id: G, amount: Amount) -> Self {
        Self { id: id.into(), group_id: group_id.into(), merchant_id: None, amount }
    }

    pub fn with_merchant_id<M: Into<MerchantId>>(mut self, merchant_id: M) -> Self {
        self.merchant_id = Some(merchant_id.into());
        self
    }

    pub fn validate(&self) -> Result<(), LedgerApiError> {
        check_id("id", self.id.is_well_formed())?;
        check_id("group_id", self.group_id.is_well_formed())?;
        check_optional_merchant(&self.merchant_id)?;
        check_positive(self.amount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidRequest {
    pub id: TransactionId,
    pub group_id: GroupId,
    #[serde(default)]
    pub merchant_id: Option<MerchantId>,
    pub target: VoidTarget,
}

impl VoidRequest {
    pub fn new<T: Into<TransactionId>, G: Into<GroupId>>(id: T, group_id: G, target: VoidTarget) -> Self {
        Self { id: id.into(), group_id: group_id.into(), merchant_id: None, target }
    }

    pub fn with_merchant_id<M: Into<MerchantId>>(mut self, merchant_id: M) -> Self {
        self.merchant_id = Some(merchant_id.into());
        self
    }

    pub fn validate(&self) -> Result<(), LedgerApiError> {
        check_id("id", self.id.is_well_formed())?;
        check_id("group_id", self.group_id.is_well_formed())?;
        check_optional_merchant(&self.merchant_id)?;
        match &self.target {
            VoidTarget::Capture(capture_id) => check_id("target transaction_id", capture_id.is_well_formed()),
            VoidTarget::Authorization => Ok(()),
        }
    }
}

//--------------------------------------    Response objects    -------------------------------------------------------
/// What every mutating handler returns. A replayed call returns exactly what the first call returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResponse {
    pub transaction_id: TransactionId,
    pub group_id: GroupId,
    pub status: TransactionStatus,
    pub amount: Amount,
    pub currency: Currency,
}

impl From<&Transaction> for OperationResponse {
    fn from(tx: &Transaction) -> Self {
        Self {
            transaction_id: tx.id.clone(),
            group_id: tx.group_id.clone(),
            status: tx.status(),
            amount: tx.amount,
            currency: tx.currency.clone(),
        }
    }
}

/// A group, its derived state and the rows it was derived from.
#[derive(Debug, Clone)]
pub struct GroupSummary {
    pub group_id: GroupId,
    pub merchant_id: MerchantId,
    pub status: GroupStatus,
    pub state: GroupState,
    pub transactions: Vec<Transaction>,
}
