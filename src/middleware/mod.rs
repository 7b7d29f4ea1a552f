/// Middleware module
///
/// Bearer authentication and role enforcement for protected scopes.

mod access_control;

pub use access_control::{
    bearer_token, restrict_to, AccessControl, Authenticate, Identity, RequireRole,
};
