use std::collections::BTreeSet;

use log::*;

use super::AuthorizationError;
use crate::{
    db_types::{CustomerId, MerchantId, SessionId, Transaction},
    ledger_api::transaction_objects::TransactionQueryFilter,
};

/// Allow-list entry that lets a service act for any merchant.
pub const ALLOW_ALL_MERCHANTS: &str = "*";

/// The ownership facts of a resource that single-item reads are checked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceOwner {
    pub merchant_id: MerchantId,
    pub customer_id: Option<CustomerId>,
    pub session_id: Option<SessionId>,
}

impl From<&Transaction> for ResourceOwner {
    fn from(tx: &Transaction) -> Self {
        Self {
            merchant_id: tx.merchant_id.clone(),
            customer_id: tx.customer_id.clone(),
            session_id: tx.session_id().cloned(),
        }
    }
}

/// The rules one actor type applies to the requests it makes.
pub trait AccessPolicy {
    /// Decides which merchant a merchant-charged mutation is made against.
    fn resolve_merchant_id(&self, requested: Option<&MerchantId>) -> Result<MerchantId, AuthorizationError>;

    /// Rewrites a listing request so that it can only match what this actor may see.
    fn build_list_filters(&self, filters: TransactionQueryFilter)
        -> Result<TransactionQueryFilter, AuthorizationError>;

    /// Whether this actor may read a single resource with the given owner.
    fn can_access(&self, resource: &ResourceOwner) -> bool;
}

/// One variant per actor type, selected once when the [`super::AuthContext`] is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    Customer(CustomerPolicy),
    Guest(GuestPolicy),
    Merchant(MerchantPolicy),
    Admin(AdminPolicy),
    Service(ServicePolicy),
}

impl AccessPolicy for Actor {
    fn resolve_merchant_id(&self, requested: Option<&MerchantId>) -> Result<MerchantId, AuthorizationError> {
        match self {
            Actor::Customer(p) => p.resolve_merchant_id(requested),
            Actor::Guest(p) => p.resolve_merchant_id(requested),
            Actor::Merchant(p) => p.resolve_merchant_id(requested),
            Actor::Admin(p) => p.resolve_merchant_id(requested),
            Actor::Service(p) => p.resolve_merchant_id(requested),
        }
    }

    fn build_list_filters(
        &self,
        filters: TransactionQueryFilter,
    ) -> Result<TransactionQueryFilter, AuthorizationError> {
        match self {
            Actor::Customer(p) => p.build_list_filters(filters),
            Actor::Guest(p) => p.build_list_filters(filters),
            Actor::Merchant(p) => p.build_list_filters(filters),
            Actor::Admin(p) => p.build_list_filters(filters),
            Actor::Service(p) => p.build_list_filters(filters),
        }
    }

    fn can_access(&self, resource: &ResourceOwner) -> bool {
        match self {
            Actor::Customer(p) => p.can_access(resource),
            Actor::Guest(p) => p.can_access(resource),
            Actor::Merchant(p) => p.can_access(resource),
            Actor::Admin(p) => p.can_access(resource),
            Actor::Service(p) => p.can_access(resource),
        }
    }
}

fn intersect_merchants(mut filters: TransactionQueryFilter, allowed: &BTreeSet<MerchantId>) -> TransactionQueryFilter {
    let merchant_ids = match filters.merchant_ids.take() {
        Some(requested) => requested.into_iter().filter(|m| allowed.contains(m)).collect(),
        None => allowed.iter().cloned().collect(),
    };
    filters.merchant_ids = Some(merchant_ids);
    filters
}

fn required_merchant_id(requested: Option<&MerchantId>) -> Result<MerchantId, AuthorizationError> {
    requested.cloned().ok_or(AuthorizationError::MissingMerchantId)
}

//--------------------------------------       Customer       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerPolicy {
    customer_id: CustomerId,
}

impl CustomerPolicy {
    pub fn new(customer_id: CustomerId) -> Self {
        Self { customer_id }
    }
}

impl AccessPolicy for CustomerPolicy {
    fn resolve_merchant_id(&self, _requested: Option<&MerchantId>) -> Result<MerchantId, AuthorizationError> {
        Err(AuthorizationError::PermissionDenied("customers must transact through a service".into()))
    }

    fn build_list_filters(
        &self,
        mut filters: TransactionQueryFilter,
    ) -> Result<TransactionQueryFilter, AuthorizationError> {
        filters.customer_id = Some(self.customer_id.clone());
        filters.merchant_ids = None;
        Ok(filters)
    }

    fn can_access(&self, resource: &ResourceOwner) -> bool {
        resource.customer_id.as_ref() == Some(&self.customer_id)
    }
}

//--------------------------------------        Guest         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestPolicy {
    session_id: SessionId,
}

impl GuestPolicy {
    pub fn new(session_id: SessionId) -> Self {
        Self { session_id }
    }
}

impl AccessPolicy for GuestPolicy {
    fn resolve_merchant_id(&self, _requested: Option<&MerchantId>) -> Result<MerchantId, AuthorizationError> {
        Err(AuthorizationError::PermissionDenied("guests must transact through a service".into()))
    }

    fn build_list_filters(
        &self,
        _filters: TransactionQueryFilter,
    ) -> Result<TransactionQueryFilter, AuthorizationError> {
        Err(AuthorizationError::PermissionDenied("guests cannot list transactions".into()))
    }

    fn can_access(&self, resource: &ResourceOwner) -> bool {
        resource.session_id.as_ref() == Some(&self.session_id)
    }
}

//--------------------------------------       Merchant       ---------------------------------------------------------
/// A single-tenant merchant (one id) or an operator spanning several merchants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerchantPolicy {
    merchant_ids: BTreeSet<MerchantId>,
}

impl MerchantPolicy {
    pub fn new(merchant_ids: BTreeSet<MerchantId>) -> Self {
        Self { merchant_ids }
    }

    fn single_tenant(&self) -> Option<&MerchantId> {
        match self.merchant_ids.len() {
            1 => self.merchant_ids.iter().next(),
            _ => None,
        }
    }
}

impl AccessPolicy for MerchantPolicy {
    fn resolve_merchant_id(&self, requested: Option<&MerchantId>) -> Result<MerchantId, AuthorizationError> {
        if let Some(own) = self.single_tenant() {
            if requested.is_some_and(|r| r != own) {
                warn!("🔐️ Single-tenant merchant token asked for a different merchant. Using the token's merchant.");
            }
            return Ok(own.clone());
        }
        let requested = required_merchant_id(requested)?;
        if self.merchant_ids.contains(&requested) {
            Ok(requested)
        } else {
            warn!("🔐️ Operator token asked for a merchant outside its set.");
            Err(AuthorizationError::NotFound)
        }
    }

    fn build_list_filters(
        &self,
        filters: TransactionQueryFilter,
    ) -> Result<TransactionQueryFilter, AuthorizationError> {
        Ok(intersect_merchants(filters, &self.merchant_ids))
    }

    fn can_access(&self, resource: &ResourceOwner) -> bool {
        self.merchant_ids.contains(&resource.merchant_id)
    }
}

//--------------------------------------        Admin         ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdminPolicy;

impl AccessPolicy for AdminPolicy {
    fn resolve_merchant_id(&self, requested: Option<&MerchantId>) -> Result<MerchantId, AuthorizationError> {
        required_merchant_id(requested)
    }

    fn build_list_filters(
        &self,
        filters: TransactionQueryFilter,
    ) -> Result<TransactionQueryFilter, AuthorizationError> {
        Ok(filters)
    }

    fn can_access(&self, _resource: &ResourceOwner) -> bool {
        true
    }
}

//--------------------------------------       Service        ---------------------------------------------------------
/// A trusted backend acting on behalf of customers and guests, restricted to an allow-list of merchants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePolicy {
    allow_list: BTreeSet<MerchantId>,
    allow_all: bool,
}

impl ServicePolicy {
    pub fn new(allow_list: BTreeSet<MerchantId>) -> Self {
        let allow_all = allow_list.iter().any(|m| m.as_str() == ALLOW_ALL_MERCHANTS);
        Self { allow_list, allow_all }
    }

    pub fn permits(&self, merchant_id: &MerchantId) -> bool {
        self.allow_all || self.allow_list.contains(merchant_id)
    }
}

impl AccessPolicy for ServicePolicy {
    /// The allow-list is enforced separately, by [`super::AuthContext::check_allow_list`].
    fn resolve_merchant_id(&self, requested: Option<&MerchantId>) -> Result<MerchantId, AuthorizationError> {
        required_merchant_id(requested)
    }

    fn build_list_filters(
        &self,
        filters: TransactionQueryFilter,
    ) -> Result<TransactionQueryFilter, AuthorizationError> {
        if self.allow_all {
            Ok(filters)
        } else {
            Ok(intersect_merchants(filters, &self.allow_list))
        }
    }

    fn can_access(&self, resource: &ResourceOwner) -> bool {
        self.permits(&resource.merchant_id)
    }
}
