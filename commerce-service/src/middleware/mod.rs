pub mod admin;
pub mod auth;
pub mod verification_gate;

pub use admin::admin_auth_middleware;
pub use auth::{bearer_token, AuthContext, OptionalAuthContext};
pub use verification_gate::verification_gate_middleware;
