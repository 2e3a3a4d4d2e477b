use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use ledger_common::{Amount, Currency};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

/// The gateway result code that denotes an approved operation. Every other code is a decline.
pub const APPROVED_RESULT_CODE: &str = "00";

static IDENTIFIER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.:\-]{1,128}$").expect("identifier pattern is a valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {kind}: '{value}'")]
pub struct ConversionError {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
        #[sqlx(transparent)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true if the identifier is non-empty and only uses the permitted character set.
            pub fn is_well_formed(&self) -> bool {
                IDENTIFIER_PATTERN.is_match(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let id = Self(s.to_string());
                if id.is_well_formed() {
                    Ok(id)
                } else {
                    Err(ConversionError { kind: $kind, value: s.to_string() })
                }
            }
        }
    };
}

//--------------------------------------      Identifiers     ---------------------------------------------------------
string_id!(
    /// The caller-supplied transaction identifier. It is the primary key of the ledger and the idempotency key of
    /// the attempt it names.
    TransactionId,
    "transaction id"
);
string_id!(
    /// Correlates every transaction that belongs to one funding lifecycle.
    GroupId,
    "group id"
);
string_id!(MerchantId, "merchant id");
string_id!(CustomerId, "customer id");
string_id!(SessionId, "session id");
string_id!(
    /// Opaque token handed back by the payment gateway. Follow-on operations must quote the right one.
    GatewayReference,
    "gateway reference"
);

//--------------------------------------   TransactionType    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Auth,
    Sale,
    Capture,
    Void,
    Refund,
    PreNote,
}

impl TransactionType {
    /// Root transactions open a new group. Every other type must address an existing one.
    pub fn is_root(&self) -> bool {
        matches!(self, TransactionType::Auth | TransactionType::Sale | TransactionType::PreNote)
    }
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransactionType::Auth => "auth",
            TransactionType::Sale => "sale",
            TransactionType::Capture => "capture",
            TransactionType::Void => "void",
            TransactionType::Refund => "refund",
            TransactionType::PreNote => "pre_note",
        };
        f.write_str(s)
    }
}

impl FromStr for TransactionType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auth" => Ok(Self::Auth),
            "sale" => Ok(Self::Sale),
            "capture" => Ok(Self::Capture),
            "void" => Ok(Self::Void),
            "refund" => Ok(Self::Refund),
            "pre_note" => Ok(Self::PreNote),
            s => Err(ConversionError { kind: "transaction type", value: s.to_string() }),
        }
    }
}

//--------------------------------------      VoidTarget      ---------------------------------------------------------
/// What a void reverses. Voids must name their target explicitly; a group id alone is ambiguous once a group holds
/// both an open authorization and a settled capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", content = "transaction_id", rename_all = "snake_case")]
pub enum VoidTarget {
    /// Release the uncaptured remainder of the group's root authorization.
    Authorization,
    /// Reverse one specific capture (or the capture implied by a sale) before settlement.
    Capture(TransactionId),
}

impl Display for VoidTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoidTarget::Authorization => write!(f, "authorization"),
            VoidTarget::Capture(id) => write!(f, "capture {id}"),
        }
    }
}

//--------------------------------------  TransactionMetadata ---------------------------------------------------------
/// Type-specific transaction fields. Each variant carries only what its transaction type needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransactionMetadata {
    Auth {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
    },
    Sale {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
    },
    Capture,
    Void {
        target: VoidTarget,
    },
    Refund,
    PreNote {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
    },
}

impl TransactionMetadata {
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            TransactionMetadata::Auth { .. } => TransactionType::Auth,
            TransactionMetadata::Sale { .. } => TransactionType::Sale,
            TransactionMetadata::Capture => TransactionType::Capture,
            TransactionMetadata::Void { .. } => TransactionType::Void,
            TransactionMetadata::Refund => TransactionType::Refund,
            TransactionMetadata::PreNote { .. } => TransactionType::PreNote,
        }
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            TransactionMetadata::Auth { session_id } |
            TransactionMetadata::Sale { session_id } |
            TransactionMetadata::PreNote { session_id } => session_id.as_ref(),
            _ => None,
        }
    }

    pub fn void_target(&self) -> Option<&VoidTarget> {
        match self {
            TransactionMetadata::Void { target } => Some(target),
            _ => None,
        }
    }
}

//--------------------------------------  TransactionStatus   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Approved,
    Declined,
}

impl Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Approved => write!(f, "approved"),
            TransactionStatus::Declined => write!(f, "declined"),
        }
    }
}

//--------------------------------------     Transaction      ---------------------------------------------------------
/// An immutable ledger row. Once stored it is never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub group_id: GroupId,
    pub merchant_id: MerchantId,
    /// Absent for guest/anonymous charges
    pub customer_id: Option<CustomerId>,
    pub transaction_type: TransactionType,
    pub amount: Amount,
    pub currency: Currency,
    /// Declines do not always come with a reference.
    pub gateway_reference: Option<GatewayReference>,
    pub gateway_result_code: String,
    pub metadata: TransactionMetadata,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn is_approved(&self) -> bool {
        self.gateway_result_code == APPROVED_RESULT_CODE
    }

    pub fn status(&self) -> TransactionStatus {
        if self.is_approved() {
            TransactionStatus::Approved
        } else {
            TransactionStatus::Declined
        }
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.metadata.session_id()
    }
}

//--------------------------------------   GatewayDecision    ---------------------------------------------------------
/// A decision obtained from the payment gateway. Approved and declined are both decisions; the absence of a
/// decision is always an error instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayDecision {
    pub gateway_reference: Option<GatewayReference>,
    pub result_code: String,
}

impl GatewayDecision {
    pub fn approved<R: Into<GatewayReference>>(reference: R) -> Self {
        Self { gateway_reference: Some(reference.into()), result_code: APPROVED_RESULT_CODE.to_string() }
    }

    pub fn declined<S: Into<String>>(result_code: S) -> Self {
        Self { gateway_reference: None, result_code: result_code.into() }
    }

    pub fn with_reference<R: Into<GatewayReference>>(mut self, reference: R) -> Self {
        self.gateway_reference = Some(reference.into());
        self
    }

    pub fn is_approved(&self) -> bool {
        self.result_code == APPROVED_RESULT_CODE
    }
}

//--------------------------------------  PendingTransaction  ---------------------------------------------------------
/// A transaction attempt whose gateway decision is not known yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    pub id: TransactionId,
    pub group_id: GroupId,
    pub merchant_id: MerchantId,
    pub customer_id: Option<CustomerId>,
    pub amount: Amount,
    pub currency: Currency,
    pub metadata: TransactionMetadata,
}

impl PendingTransaction {
    pub fn transaction_type(&self) -> TransactionType {
        self.metadata.transaction_type()
    }

    /// Combines the attempt with the gateway's decision, producing the row to be stored.
    pub fn with_decision(self, decision: GatewayDecision) -> NewTransaction {
        NewTransaction {
            id: self.id,
            group_id: self.group_id,
            merchant_id: self.merchant_id,
            customer_id: self.customer_id,
            amount: self.amount,
            currency: self.currency,
            metadata: self.metadata,
            gateway_reference: decision.gateway_reference,
            gateway_result_code: decision.result_code,
        }
    }

    pub fn fingerprint(&self) -> AttemptFingerprint {
        AttemptFingerprint {
            group_id: self.group_id.clone(),
            merchant_id: self.merchant_id.clone(),
            transaction_type: self.transaction_type(),
            amount: Some(self.amount),
            currency: Some(self.currency.clone()),
            void_target: self.metadata.void_target().cloned(),
        }
    }

    /// Checks whether `existing` records the same logical attempt as this one.
    pub fn is_equivalent(&self, existing: &Transaction) -> bool {
        self.id == existing.id && self.fingerprint().matches(existing)
    }
}

//--------------------------------------  AttemptFingerprint  ---------------------------------------------------------
/// The caller-visible parameters of an attempt, used to tell a genuine retry from a transaction id being reused for
/// something else.
///
/// Gateway fields and timestamps are never compared, since those belong to whichever attempt landed first. `amount`
/// and `currency` are optional because a void's amount is derived from group state and so is not known to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFingerprint {
    pub group_id: GroupId,
    pub merchant_id: MerchantId,
    pub transaction_type: TransactionType,
    pub amount: Option<Amount>,
    pub currency: Option<Currency>,
    pub void_target: Option<VoidTarget>,
}

impl AttemptFingerprint {
    pub fn matches(&self, existing: &Transaction) -> bool {
        self.group_id == existing.group_id &&
            self.merchant_id == existing.merchant_id &&
            self.transaction_type == existing.transaction_type &&
            self.amount.map_or(true, |a| a == existing.amount) &&
            self.currency.as_ref().map_or(true, |c| c == &existing.currency) &&
            self.void_target.as_ref() == existing.metadata.void_target()
    }
}

//--------------------------------------    NewTransaction    ---------------------------------------------------------
/// A decided transaction, ready for the conditional insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub id: TransactionId,
    pub group_id: GroupId,
    pub merchant_id: MerchantId,
    pub customer_id: Option<CustomerId>,
    pub amount: Amount,
    pub currency: Currency,
    pub metadata: TransactionMetadata,
    pub gateway_reference: Option<GatewayReference>,
    pub gateway_result_code: String,
}

impl NewTransaction {
    pub fn transaction_type(&self) -> TransactionType {
        self.metadata.transaction_type()
    }

    pub fn is_approved(&self) -> bool {
        self.gateway_result_code == APPROVED_RESULT_CODE
    }
}
