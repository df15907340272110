pub mod email;
pub mod password;
pub mod validation;

pub use email::{normalize_email, EmailCandidates};
pub use password::{Password, PasswordHashString};
pub use validation::{JsonBody, ValidatedJson};
