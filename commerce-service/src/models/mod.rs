pub mod auth_identity;
pub mod customer;
pub mod event;
pub mod notification;
pub mod order;
pub mod verification;

/// Free-form key/value bag attached to identities and customers.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

pub use auth_identity::{AuthIdentity, ProviderIdentity, CUSTOMER_ID_KEY, EMAILPASS_PROVIDER};
pub use customer::{Customer, NewCustomer};
pub use event::{DomainEvent, EventEnvelope};
pub use notification::{
    Channel, CreateNotification, Notification, NotificationStatus, NotificationTemplate,
};
pub use order::Order;
pub use verification::VerificationStatus;
