//! # Authorization resolution
//!
//! Every request reaches the ledger with an [`AuthContext`], built once from a verified token and never mutated
//! afterwards. The context selects one [`Actor`] variant, and each variant carries its own implementation of the
//! [`AccessPolicy`] rules:
//!
//! * [`AccessPolicy::resolve_merchant_id`] decides which merchant a mutation is charged against.
//! * [`AccessPolicy::build_list_filters`] narrows a listing request down to what the caller may see.
//! * [`AccessPolicy::can_access`] gates single-item reads.
//!
//! A caller that is denied access to somebody else's data always sees [`AuthorizationError::NotFound`], the very same
//! error it would get for an identifier that does not exist. `PermissionDenied` is reserved for a caller's own
//! insufficient scope.
mod context;
mod errors;
mod policies;

pub use context::{ActorType, AuthClaims, AuthContext, SCOPE_TRANSACTIONS_READ, SCOPE_TRANSACTIONS_WRITE};
pub use errors::AuthorizationError;
pub use policies::{
    AccessPolicy,
    Actor,
    AdminPolicy,
    CustomerPolicy,
    GuestPolicy,
    MerchantPolicy,
    ResourceOwner,
    ServicePolicy,
    ALLOW_ALL_MERCHANTS,
};
