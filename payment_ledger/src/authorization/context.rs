use std::{collections::BTreeSet, fmt::Display};

use serde::{Deserialize, Serialize};

use super::{
    policies::{AccessPolicy, Actor, AdminPolicy, CustomerPolicy, GuestPolicy, MerchantPolicy, ServicePolicy},
    AuthorizationError,
    ResourceOwner,
};
use crate::{
    db_types::{CustomerId, MerchantId, SessionId},
    ledger_api::transaction_objects::TransactionQueryFilter,
};

pub const SCOPE_TRANSACTIONS_READ: &str = "transactions:read";
pub const SCOPE_TRANSACTIONS_WRITE: &str = "transactions:write";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    Customer,
    Guest,
    Merchant,
    Admin,
    Service,
}

impl Display for ActorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActorType::Customer => "customer",
            ActorType::Guest => "guest",
            ActorType::Merchant => "merchant",
            ActorType::Admin => "admin",
            ActorType::Service => "service",
        };
        f.write_str(s)
    }
}

/// The claims handed over by the authentication boundary once a token has been verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthClaims {
    pub actor_type: ActorType,
    pub actor_id: String,
    #[serde(default)]
    pub merchant_ids: Vec<MerchantId>,
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl AuthClaims {
    pub fn new<S: Into<String>>(actor_type: ActorType, actor_id: S) -> Self {
        Self {
            actor_type,
            actor_id: actor_id.into(),
            merchant_ids: Vec::new(),
            customer_id: None,
            session_id: None,
            scopes: Vec::new(),
        }
    }

    pub fn with_merchant_ids<S: AsRef<str>>(mut self, ids: &[S]) -> Self {
        self.merchant_ids = ids.iter().map(|s| MerchantId::from(s.as_ref())).collect();
        self
    }

    pub fn with_customer_id<S: Into<CustomerId>>(mut self, customer_id: S) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn with_session_id<S: Into<SessionId>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_scopes<S: AsRef<str>>(mut self, scopes: &[S]) -> Self {
        self.scopes = scopes.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }
}

/// The request-scoped authorization context.
///
/// Built once per request from [`AuthClaims`] and immutable afterwards. The actor-specific rules are selected at
/// construction time, so every later check is a single dispatch on [`Actor`].
#[derive(Debug, Clone)]
pub struct AuthContext {
    actor_type: ActorType,
    actor_id: String,
    merchant_ids: BTreeSet<MerchantId>,
    customer_id: Option<CustomerId>,
    session_id: Option<SessionId>,
    scopes: BTreeSet<String>,
    actor: Actor,
}

impl TryFrom<AuthClaims> for AuthContext {
    type Error = AuthorizationError;

    fn try_from(claims: AuthClaims) -> Result<Self, Self::Error> {
        let AuthClaims { actor_type, actor_id, merchant_ids, customer_id, session_id, scopes } = claims;
        if actor_id.trim().is_empty() {
            return Err(AuthorizationError::InvalidContext("actor id is empty".into()));
        }
        let merchant_ids = merchant_ids.into_iter().collect::<BTreeSet<MerchantId>>();
        let actor = match actor_type {
            ActorType::Customer => {
                let customer_id = customer_id
                    .clone()
                    .ok_or_else(|| AuthorizationError::InvalidContext("customer token without a customer id".into()))?;
                Actor::Customer(CustomerPolicy::new(customer_id))
            },
            ActorType::Guest => {
                let session_id = session_id
                    .clone()
                    .ok_or_else(|| AuthorizationError::InvalidContext("guest token without a session id".into()))?;
                Actor::Guest(GuestPolicy::new(session_id))
            },
            ActorType::Merchant => {
                if merchant_ids.is_empty() {
                    return Err(AuthorizationError::InvalidContext("merchant token without merchant ids".into()));
                }
                Actor::Merchant(MerchantPolicy::new(merchant_ids.clone()))
            },
            ActorType::Admin => Actor::Admin(AdminPolicy),
            ActorType::Service => {
                if merchant_ids.is_empty() {
                    return Err(AuthorizationError::InvalidContext("service token without an allow-list".into()));
                }
                Actor::Service(ServicePolicy::new(merchant_ids.clone()))
            },
        };
        let scopes = scopes.into_iter().collect();
        Ok(Self { actor_type, actor_id, merchant_ids, customer_id, session_id, scopes, actor })
    }
}

impl AuthContext {
    pub fn new(claims: AuthClaims) -> Result<Self, AuthorizationError> {
        Self::try_from(claims)
    }

    pub fn actor_type(&self) -> ActorType {
        self.actor_type
    }

    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    pub fn merchant_ids(&self) -> &BTreeSet<MerchantId> {
        &self.merchant_ids
    }

    pub fn customer_id(&self) -> Option<&CustomerId> {
        self.customer_id.as_ref()
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn scopes(&self) -> &BTreeSet<String> {
        &self.scopes
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    /// Admins are not scope-restricted. Every other actor must hold `scope` explicitly.
    pub fn require_scope(&self, scope: &str) -> Result<(), AuthorizationError> {
        if self.actor_type == ActorType::Admin || self.has_scope(scope) {
            Ok(())
        } else {
            Err(AuthorizationError::PermissionDenied(format!("missing scope {scope}")))
        }
    }

    pub fn resolve_merchant_id(&self, requested: Option<&MerchantId>) -> Result<MerchantId, AuthorizationError> {
        self.actor.resolve_merchant_id(requested)
    }

    pub fn build_list_filters(
        &self,
        filters: TransactionQueryFilter,
    ) -> Result<TransactionQueryFilter, AuthorizationError> {
        self.actor.build_list_filters(filters)
    }

    pub fn can_access(&self, resource: &ResourceOwner) -> bool {
        self.actor.can_access(resource)
    }

    /// Services may only act for merchants on their own allow-list. A no-op for every other actor type.
    pub fn check_allow_list(&self, merchant_id: &MerchantId) -> Result<(), AuthorizationError> {
        match &self.actor {
            Actor::Service(policy) if !policy.permits(merchant_id) => Err(AuthorizationError::NotFound),
            _ => Ok(()),
        }
    }
}
