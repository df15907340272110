pub mod auth;
pub mod customers;
pub mod events;
pub mod metrics;

pub use auth::{authenticate, register, reset_password, update_provider};
pub use customers::{create_customer, login, send_verification, verify_email};
pub use events::publish_event;
