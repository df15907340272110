//! Storage seams. Every backend implements all of them; see `MemoryStore` and
//! `MongoStore`.

use async_trait::async_trait;
use std::sync::Arc;

use super::error::RepositoryError;
use crate::models::{AuthIdentity, Customer, Metadata, NewCustomer, Notification, NotificationStatus, Order};

#[async_trait]
pub trait AuthIdentityRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<AuthIdentity>, RepositoryError>;

    async fn find_by_provider_entity(
        &self,
        provider: &str,
        entity_id: &str,
    ) -> Result<Option<AuthIdentity>, RepositoryError>;

    /// Fails with `Conflict` when the provider entity is already taken.
    async fn create(&self, identity: AuthIdentity) -> Result<AuthIdentity, RepositoryError>;

    /// Shallow-merges `patch` into `app_metadata`.
    async fn update_app_metadata(
        &self,
        id: &str,
        patch: Metadata,
    ) -> Result<AuthIdentity, RepositoryError>;

    /// Shallow-merges `patch` into the provider entry's `provider_metadata`.
    async fn update_provider_metadata(
        &self,
        id: &str,
        provider: &str,
        patch: Metadata,
    ) -> Result<AuthIdentity, RepositoryError>;
}

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Customer>, RepositoryError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Customer>, RepositoryError>;

    /// First customer matching any of `emails`, tried in order.
    async fn find_by_emails(&self, emails: &[String]) -> Result<Option<Customer>, RepositoryError> {
        for email in emails {
            if let Some(customer) = self.find_by_email(email).await? {
                return Ok(Some(customer));
            }
        }
        Ok(None)
    }

    /// Fails with `Conflict` when the email is already taken.
    async fn create(&self, customer: NewCustomer) -> Result<Customer, RepositoryError>;

    /// Shallow-merges `patch` into `metadata`.
    async fn update_metadata(&self, id: &str, patch: Metadata) -> Result<Customer, RepositoryError>;

    /// Applies `patch` to every customer whose email is in `emails`; returns how many matched.
    async fn update_metadata_by_emails(
        &self,
        emails: &[String],
        patch: Metadata,
    ) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn find_order(&self, id: &str) -> Result<Option<Order>, RepositoryError>;

    async fn find_order_by_fulfillment(
        &self,
        fulfillment_id: &str,
    ) -> Result<Option<Order>, RepositoryError>;
}

pub enum RecordOutcome {
    /// The caller owns delivery of this notification.
    Recorded(Notification),
    /// Another delivery with the same idempotency key already exists.
    Duplicate(Notification),
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Stores a pending notification. A key whose earlier delivery failed is
    /// handed back as `Recorded` so it can be retried.
    async fn record(&self, notification: Notification) -> Result<RecordOutcome, RepositoryError>;

    async fn set_status(
        &self,
        id: &str,
        status: NotificationStatus,
        error: Option<String>,
    ) -> Result<(), RepositoryError>;

    async fn list_by_recipient(&self, to: &str) -> Result<Vec<Notification>, RepositoryError>;
}

#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn health_check(&self) -> Result<(), RepositoryError>;
}

/// Handles to one backend's repositories.
#[derive(Clone)]
pub struct Stores {
    pub identities: Arc<dyn AuthIdentityRepository>,
    pub customers: Arc<dyn CustomerRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub health: Arc<dyn StoreHealth>,
}

impl Stores {
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: AuthIdentityRepository
            + CustomerRepository
            + OrderRepository
            + NotificationRepository
            + StoreHealth
            + 'static,
    {
        Self {
            identities: backend.clone(),
            customers: backend.clone(),
            orders: backend.clone(),
            notifications: backend.clone(),
            health: backend,
        }
    }
}

/// Shallow merge used by every backend for metadata patches.
pub fn merge_metadata(target: &mut Metadata, patch: Metadata) {
    for (key, value) in patch {
        target.insert(key, value);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::services::memory::MemoryStore;

    /// How [`StubCustomers`] misbehaves on reads.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Lookup {
        /// Every lookup fails with a backend error.
        Fail,
        /// Multi-email lookups find nothing; everything else hits the store.
        Miss,
    }

    /// Customer repository over a `MemoryStore` with scripted lookup failures.
    pub struct StubCustomers {
        pub store: Arc<MemoryStore>,
        pub lookup: Lookup,
    }

    impl StubCustomers {
        pub fn new(store: Arc<MemoryStore>, lookup: Lookup) -> Arc<Self> {
            Arc::new(Self { store, lookup })
        }

        fn unavailable() -> RepositoryError {
            RepositoryError::Backend(anyhow::anyhow!("customer store unavailable"))
        }
    }

    #[async_trait]
    impl CustomerRepository for StubCustomers {
        async fn find_by_id(&self, id: &str) -> Result<Option<Customer>, RepositoryError> {
            CustomerRepository::find_by_id(self.store.as_ref(), id).await
        }

        async fn find_by_email(&self, email: &str) -> Result<Option<Customer>, RepositoryError> {
            match self.lookup {
                Lookup::Fail => Err(Self::unavailable()),
                Lookup::Miss => self.store.find_by_email(email).await,
            }
        }

        async fn find_by_emails(
            &self,
            _emails: &[String],
        ) -> Result<Option<Customer>, RepositoryError> {
            match self.lookup {
                Lookup::Fail => Err(Self::unavailable()),
                Lookup::Miss => Ok(None),
            }
        }

        async fn create(&self, customer: NewCustomer) -> Result<Customer, RepositoryError> {
            CustomerRepository::create(self.store.as_ref(), customer).await
        }

        async fn update_metadata(
            &self,
            id: &str,
            patch: Metadata,
        ) -> Result<Customer, RepositoryError> {
            self.store.update_metadata(id, patch).await
        }

        async fn update_metadata_by_emails(
            &self,
            emails: &[String],
            patch: Metadata,
        ) -> Result<u64, RepositoryError> {
            self.store.update_metadata_by_emails(emails, patch).await
        }
    }
}
