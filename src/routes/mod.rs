//! Routers grouped by who may call them. Access control is attached per group in
//! `create_router`.

/// Open to anonymous callers. Handlers resolve an optional `Viewer` and apply the
/// visibility rules themselves.
pub mod public;

/// Wrapped in `auth_middleware`; every request needs a valid token.
pub mod authenticated;

/// Nested under `/admin`. Handlers require a staff or superuser account.
pub mod admin;
