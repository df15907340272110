use async_trait::async_trait;
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};

use super::error::RepositoryError;
use super::repository::{
    merge_metadata, AuthIdentityRepository, CustomerRepository, NotificationRepository,
    OrderRepository, RecordOutcome, StoreHealth,
};
use crate::models::{
    AuthIdentity, Customer, Metadata, NewCustomer, Notification, NotificationStatus, Order,
};

/// Process-local store backed by concurrent maps.
///
/// Uniqueness (customer email, provider entity, notification key) is enforced
/// through index maps claimed with the entry API, so concurrent creators see
/// the same conflicts a database would report.
#[derive(Default)]
pub struct MemoryStore {
    identities: DashMap<String, AuthIdentity>,
    identity_index: DashMap<String, String>,
    customers: DashMap<String, Customer>,
    customer_index: DashMap<String, String>,
    orders: DashMap<String, Order>,
    notifications: DashMap<String, Notification>,
    notification_index: DashMap<String, String>,
}

fn identity_key(provider: &str, entity_id: &str) -> String {
    format!("{}:{}", provider, entity_id)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_order(&self, order: Order) {
        self.orders.insert(order.id.clone(), order);
    }

    pub fn notifications(&self) -> Vec<Notification> {
        let mut all: Vec<Notification> = self
            .notifications
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by_key(|n| n.created_at);
        all
    }
}

#[async_trait]
impl AuthIdentityRepository for MemoryStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<AuthIdentity>, RepositoryError> {
        Ok(self.identities.get(id).map(|entry| entry.value().clone()))
    }

    async fn find_by_provider_entity(
        &self,
        provider: &str,
        entity_id: &str,
    ) -> Result<Option<AuthIdentity>, RepositoryError> {
        let Some(id) = self
            .identity_index
            .get(&identity_key(provider, entity_id))
            .map(|entry| entry.value().clone())
        else {
            return Ok(None);
        };
        Ok(self.identities.get(&id).map(|entry| entry.value().clone()))
    }

    async fn create(&self, identity: AuthIdentity) -> Result<AuthIdentity, RepositoryError> {
        let keys: Vec<String> = identity
            .provider_identities
            .iter()
            .map(|p| identity_key(&p.provider, &p.entity_id))
            .collect();

        let mut claimed = Vec::with_capacity(keys.len());
        let mut conflict = None;
        for key in keys {
            match self.identity_index.entry(key.clone()) {
                Entry::Occupied(_) => {
                    conflict = Some(key);
                    break;
                }
                Entry::Vacant(slot) => {
                    slot.insert(identity.id.clone());
                    claimed.push(key);
                }
            }
        }

        // Roll back only once the entry guard is gone; it holds a shard lock.
        if let Some(key) = conflict {
            for key in claimed {
                self.identity_index.remove(&key);
            }
            return Err(RepositoryError::Conflict(format!(
                "Auth identity for {} already exists",
                key
            )));
        }

        self.identities.insert(identity.id.clone(), identity.clone());
        Ok(identity)
    }

    async fn update_app_metadata(
        &self,
        id: &str,
        patch: Metadata,
    ) -> Result<AuthIdentity, RepositoryError> {
        let mut entry = self
            .identities
            .get_mut(id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Auth identity {} not found", id)))?;
        merge_metadata(&mut entry.app_metadata, patch);
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    async fn update_provider_metadata(
        &self,
        id: &str,
        provider: &str,
        patch: Metadata,
    ) -> Result<AuthIdentity, RepositoryError> {
        let mut entry = self
            .identities
            .get_mut(id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Auth identity {} not found", id)))?;
        let provider_identity = entry
            .provider_identities
            .iter_mut()
            .find(|p| p.provider == provider)
            .ok_or_else(|| {
                RepositoryError::NotFound(format!("Provider {} not linked to {}", provider, id))
            })?;
        merge_metadata(&mut provider_identity.provider_metadata, patch);
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }
}

#[async_trait]
impl CustomerRepository for MemoryStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Customer>, RepositoryError> {
        Ok(self.customers.get(id).map(|entry| entry.value().clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Customer>, RepositoryError> {
        let Some(id) = self
            .customer_index
            .get(email)
            .map(|entry| entry.value().clone())
        else {
            return Ok(None);
        };
        Ok(self.customers.get(&id).map(|entry| entry.value().clone()))
    }

    async fn create(&self, customer: NewCustomer) -> Result<Customer, RepositoryError> {
        let customer = Customer::new(customer);
        match self.customer_index.entry(customer.email.clone()) {
            Entry::Occupied(_) => Err(RepositoryError::Conflict(format!(
                "Customer with email {} already exists",
                customer.email
            ))),
            Entry::Vacant(slot) => {
                slot.insert(customer.id.clone());
                self.customers.insert(customer.id.clone(), customer.clone());
                Ok(customer)
            }
        }
    }

    async fn update_metadata(&self, id: &str, patch: Metadata) -> Result<Customer, RepositoryError> {
        let mut entry = self
            .customers
            .get_mut(id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Customer {} not found", id)))?;
        merge_metadata(&mut entry.metadata, patch);
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    async fn update_metadata_by_emails(
        &self,
        emails: &[String],
        patch: Metadata,
    ) -> Result<u64, RepositoryError> {
        let mut updated = 0;
        for mut entry in self.customers.iter_mut() {
            if emails.iter().any(|email| *email == entry.email) {
                merge_metadata(&mut entry.metadata, patch.clone());
                entry.updated_at = Utc::now();
                updated += 1;
            }
        }
        Ok(updated)
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn find_order(&self, id: &str) -> Result<Option<Order>, RepositoryError> {
        Ok(self.orders.get(id).map(|entry| entry.value().clone()))
    }

    async fn find_order_by_fulfillment(
        &self,
        fulfillment_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        Ok(self
            .orders
            .iter()
            .find(|entry| entry.fulfillment_ids.iter().any(|id| id == fulfillment_id))
            .map(|entry| entry.value().clone()))
    }
}

#[async_trait]
impl NotificationRepository for MemoryStore {
    async fn record(&self, notification: Notification) -> Result<RecordOutcome, RepositoryError> {
        let Some(key) = notification.idempotency_key.clone() else {
            self.notifications
                .insert(notification.id.clone(), notification.clone());
            return Ok(RecordOutcome::Recorded(notification));
        };

        match self.notification_index.entry(key) {
            Entry::Occupied(slot) => {
                let existing_id = slot.get().clone();
                let mut existing = self.notifications.get_mut(&existing_id).ok_or_else(|| {
                    RepositoryError::NotFound(format!("Notification {} not found", existing_id))
                })?;
                if existing.status == NotificationStatus::Failed {
                    existing.status = NotificationStatus::Pending;
                    existing.error = None;
                    existing.updated_at = Utc::now();
                    Ok(RecordOutcome::Recorded(existing.clone()))
                } else {
                    Ok(RecordOutcome::Duplicate(existing.clone()))
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(notification.id.clone());
                self.notifications
                    .insert(notification.id.clone(), notification.clone());
                Ok(RecordOutcome::Recorded(notification))
            }
        }
    }

    async fn set_status(
        &self,
        id: &str,
        status: NotificationStatus,
        error: Option<String>,
    ) -> Result<(), RepositoryError> {
        let mut entry = self
            .notifications
            .get_mut(id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Notification {} not found", id)))?;
        entry.status = status;
        entry.error = error;
        entry.updated_at = Utc::now();
        Ok(())
    }

    async fn list_by_recipient(&self, to: &str) -> Result<Vec<Notification>, RepositoryError> {
        Ok(self
            .notifications()
            .into_iter()
            .filter(|n| n.to == to)
            .collect())
    }
}

#[async_trait]
impl StoreHealth for MemoryStore {
    async fn health_check(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}
