use std::fmt::Debug;

use log::*;

use crate::{
    authorization::{AuthContext, ResourceOwner, SCOPE_TRANSACTIONS_READ},
    db_types::{GroupId, Transaction, TransactionId},
    ledger_api::{
        errors::LedgerApiError,
        group_state::GroupState,
        transaction_objects::{GroupSummary, TransactionQueryFilter},
    },
    traits::LedgerStore,
};

/// Read-only access to the ledger, subject to the caller's authorization context.
///
/// Every lookup of something the caller may not see fails with [`LedgerApiError::NotFound`], exactly as if it did not
/// exist.
pub struct LedgerQueryApi<B> {
    db: B,
}

impl<B> Debug for LedgerQueryApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LedgerQueryApi")
    }
}

impl<B> LedgerQueryApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> LedgerQueryApi<B>
where B: LedgerStore
{
    pub async fn fetch_transaction(
        &self,
        ctx: &AuthContext,
        id: &TransactionId,
    ) -> Result<Transaction, LedgerApiError> {
        ctx.require_scope(SCOPE_TRANSACTIONS_READ)?;
        let tx = self.db.fetch_transaction(id).await?.ok_or(LedgerApiError::NotFound)?;
        let owner = self.owner_of(&tx).await?;
        if !ctx.can_access(&owner) {
            debug!("🔐️ {} {} may not read transaction {id}", ctx.actor_type(), ctx.actor_id());
            return Err(LedgerApiError::NotFound);
        }
        Ok(tx)
    }

    /// The group, its derived state and its full history.
    pub async fn fetch_group(&self, ctx: &AuthContext, group_id: &GroupId) -> Result<GroupSummary, LedgerApiError> {
        ctx.require_scope(SCOPE_TRANSACTIONS_READ)?;
        let transactions = self.db.list_transactions(group_id).await?;
        let state = GroupState::compute(&transactions);
        let root = match transactions.iter().find(|t| t.transaction_type.is_root()) {
            Some(root) => root,
            None => {
                trace!("🗃️ Group {group_id} has no root transaction");
                return Err(LedgerApiError::NotFound);
            },
        };
        if !ctx.can_access(&ResourceOwner::from(root)) {
            debug!("🔐️ {} {} may not read group {group_id}", ctx.actor_type(), ctx.actor_id());
            return Err(LedgerApiError::NotFound);
        }
        Ok(GroupSummary {
            group_id: group_id.clone(),
            merchant_id: root.merchant_id.clone(),
            status: state.status(),
            state,
            transactions,
        })
    }

    /// Lists the transactions matching `filter`, narrowed down to what the caller may see.
    pub async fn list_transactions(
        &self,
        ctx: &AuthContext,
        filter: TransactionQueryFilter,
    ) -> Result<Vec<Transaction>, LedgerApiError> {
        ctx.require_scope(SCOPE_TRANSACTIONS_READ)?;
        let filter = ctx.build_list_filters(filter)?;
        let transactions = self.db.search_transactions(filter).await?;
        Ok(transactions)
    }

    /// Follow-on rows do not carry the guest session that opened the group, so it is taken from the group's root.
    async fn owner_of(&self, tx: &Transaction) -> Result<ResourceOwner, LedgerApiError> {
        let mut owner = ResourceOwner::from(tx);
        if owner.session_id.is_none() && !tx.transaction_type.is_root() {
            let group = self.db.list_transactions(&tx.group_id).await?;
            owner.session_id = group.iter().find(|t| t.transaction_type.is_root()).and_then(|t| t.session_id().cloned());
        }
        Ok(owner)
    }
}
