mod admin;
mod auth;
mod health_check;

pub use admin::lockout_status;
pub use auth::{check_email, get_current_user, logout, signin, signup, update_password};
pub use health_check::health_check;
