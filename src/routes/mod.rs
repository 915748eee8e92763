//! Router Module Index
//!
//! Routes are split by access requirement. Every request passes through
//! `auth::authenticate` first; the authenticated group additionally requires
//! the resolved identity to hold a principal.

/// Routes reachable without a principal: health check, registration and login.
pub mod public;

/// Routes guarded by the `AuthUser` route layer. Theme-scoped content is further
/// gated per request by the `AuthorizationGate` inside the handlers.
pub mod authenticated;
