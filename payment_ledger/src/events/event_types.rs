use serde::{Deserialize, Serialize};

use crate::{
    db_types::{GroupId, MerchantId, Transaction},
    ledger_api::GroupStatus,
};

/// Published once per transaction id, by the call whose insert created the row. Replays do not publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecordedEvent {
    pub transaction: Transaction,
}

impl TransactionRecordedEvent {
    pub fn new(transaction: Transaction) -> Self {
        Self { transaction }
    }
}

/// Published when a mutation moves a group into a terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupClosedEvent {
    pub group_id: GroupId,
    pub merchant_id: MerchantId,
    pub status: GroupStatus,
}

impl GroupClosedEvent {
    pub fn new(group_id: GroupId, merchant_id: MerchantId, status: GroupStatus) -> Self {
        Self { group_id, merchant_id, status }
    }
}
