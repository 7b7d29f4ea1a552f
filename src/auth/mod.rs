/// Authentication module
///
/// Password hashing, bearer token issuing/verification, the lockout
/// protocol, and the service that ties them to the credential store.

mod claims;
mod jwt;
mod lockout;
mod password;
mod service;

pub use claims::Claims;
pub use jwt::TokenIssuer;
pub use lockout::{record_failure, LockState, LockoutPolicy};
pub use password::PasswordHasher;
pub use service::{
    AuthOutcome, AuthService, LockoutStatus, SigninRequest, SignupRequest, UpdatePasswordRequest,
};
