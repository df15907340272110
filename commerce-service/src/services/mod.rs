pub mod auth;
pub mod email;
pub mod error;
pub mod login;
pub mod memory;
pub mod metrics;
pub mod mongo;
pub mod notifications;
pub mod repository;
pub mod templates;
pub mod tokens;
pub mod verification;

pub use auth::{AuthModule, AuthOutcome, AuthProvider, AuthRequest, EmailPassProvider};
pub use email::{EmailError, EmailMessage, EmailProvider, MockEmailProvider, SmtpEmailProvider};
pub use error::{RepositoryError, ServiceError};
pub use login::{AuthResult, LoginService};
pub use memory::MemoryStore;
pub use mongo::MongoStore;
pub use notifications::{NotificationOutcome, NotificationService};
pub use repository::{
    AuthIdentityRepository, CustomerRepository, NotificationRepository, OrderRepository,
    StoreHealth, Stores,
};
pub use tokens::{ActionTokenClaims, ActorType, AppTokenClaims, TokenPurpose, TokenService};
pub use verification::{MissingCustomer, VerificationService};
