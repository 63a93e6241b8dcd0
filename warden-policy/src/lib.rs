//! WARDEN Policy - Authorization Decisions and Fact Operations
//!
//! The policy algorithm itself is external: this crate defines the
//! [`AuthorizationProvider`] seam it plugs into, the combinator used for
//! per-field query decisions, a decision cache that participates in cache
//! invalidation, and the operation framework used while evaluating policy
//! patterns (ownership and token-scope checks).

pub mod authorization;
pub mod cache;
pub mod combine;
pub mod fact;
pub mod operation;
pub mod token;

pub use authorization::{AuthorizationProvider, PolicySubject};
pub use cache::CachingAuthorizer;
pub use combine::combine_decisions;
pub use fact::Fact;
pub use operation::{
    Operation, OperationContext, OperationRegistry, OwnerOperation, TokenScopeOperation,
};
pub use token::{JwtSecret, JwtTokenService, TokenClaims, TokenService};
