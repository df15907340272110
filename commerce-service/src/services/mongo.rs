use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use serde::Serialize;
use service_core::mongodb::{
    bson::{doc, to_bson, Bson, Document},
    error::{ErrorKind, WriteFailure},
    options::{FindOneAndUpdateOptions, IndexOptions, ReturnDocument},
    Client as MongoClient, Collection, Database, IndexModel,
};
use service_core::error::AppError;

use super::error::RepositoryError;
use super::repository::{
    AuthIdentityRepository, CustomerRepository, NotificationRepository, OrderRepository,
    RecordOutcome, StoreHealth,
};
use crate::models::{
    AuthIdentity, Customer, Metadata, NewCustomer, Notification, NotificationStatus, Order,
};

const DUPLICATE_KEY: i32 = 11000;

#[derive(Clone)]
pub struct MongoStore {
    client: MongoClient,
    db: Database,
}

fn is_duplicate_key(err: &service_core::mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

fn bson_value<T: Serialize>(value: &T) -> Result<Bson, RepositoryError> {
    to_bson(value).map_err(|e| RepositoryError::Backend(anyhow::Error::new(e)))
}

/// `$set` document writing each patch key under `prefix`.
fn metadata_set(prefix: &str, patch: &Metadata) -> Result<Document, RepositoryError> {
    let mut set = Document::new();
    for (key, value) in patch {
        set.insert(format!("{}.{}", prefix, key), bson_value(value)?);
    }
    set.insert("updated_at", bson_value(&Utc::now())?);
    Ok(set)
}

fn return_updated() -> FindOneAndUpdateOptions {
    FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build()
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        tracing::info!(database = %database, "Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to MongoDB");
            AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        tracing::info!("Creating MongoDB indexes for commerce-service");

        let unique = |name: &str| {
            IndexOptions::builder()
                .name(name.to_string())
                .unique(true)
                .build()
        };

        self.identities()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "id": 1 })
                    .options(unique("auth_identity_id_idx"))
                    .build(),
                None,
            )
            .await?;

        self.identities()
            .create_index(
                IndexModel::builder()
                    .keys(doc! {
                        "provider_identities.provider": 1,
                        "provider_identities.entity_id": 1,
                    })
                    .options(unique("provider_entity_idx"))
                    .build(),
                None,
            )
            .await?;

        self.customers()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "id": 1 })
                    .options(unique("customer_id_idx"))
                    .build(),
                None,
            )
            .await?;

        self.customers()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(unique("customer_email_idx"))
                    .build(),
                None,
            )
            .await?;

        self.orders()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "id": 1 })
                    .options(unique("order_id_idx"))
                    .build(),
                None,
            )
            .await?;

        self.orders()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "fulfillment_ids": 1 })
                    .options(
                        IndexOptions::builder()
                            .name("order_fulfillment_idx".to_string())
                            .build(),
                    )
                    .build(),
                None,
            )
            .await?;

        self.notifications()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "idempotency_key": 1 })
                    .options(
                        IndexOptions::builder()
                            .name("notification_idempotency_idx".to_string())
                            .unique(true)
                            .sparse(true)
                            .build(),
                    )
                    .build(),
                None,
            )
            .await?;

        self.notifications()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "to": 1, "created_at": -1 })
                    .options(
                        IndexOptions::builder()
                            .name("notification_recipient_idx".to_string())
                            .build(),
                    )
                    .build(),
                None,
            )
            .await?;

        tracing::info!("Successfully created all MongoDB indexes");
        Ok(())
    }

    fn identities(&self) -> Collection<AuthIdentity> {
        self.db.collection("auth_identities")
    }

    fn customers(&self) -> Collection<Customer> {
        self.db.collection("customers")
    }

    fn orders(&self) -> Collection<Order> {
        self.db.collection("orders")
    }

    fn notifications(&self) -> Collection<Notification> {
        self.db.collection("notifications")
    }
}

#[async_trait]
impl AuthIdentityRepository for MongoStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<AuthIdentity>, RepositoryError> {
        Ok(self.identities().find_one(doc! { "id": id }, None).await?)
    }

    async fn find_by_provider_entity(
        &self,
        provider: &str,
        entity_id: &str,
    ) -> Result<Option<AuthIdentity>, RepositoryError> {
        let filter = doc! {
            "provider_identities": {
                "$elemMatch": { "provider": provider, "entity_id": entity_id }
            }
        };
        Ok(self.identities().find_one(filter, None).await?)
    }

    async fn create(&self, identity: AuthIdentity) -> Result<AuthIdentity, RepositoryError> {
        match self.identities().insert_one(&identity, None).await {
            Ok(_) => Ok(identity),
            Err(e) if is_duplicate_key(&e) => Err(RepositoryError::Conflict(
                "Auth identity already exists".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_app_metadata(
        &self,
        id: &str,
        patch: Metadata,
    ) -> Result<AuthIdentity, RepositoryError> {
        let update = doc! { "$set": metadata_set("app_metadata", &patch)? };
        self.identities()
            .find_one_and_update(doc! { "id": id }, update, return_updated())
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("Auth identity {} not found", id)))
    }

    async fn update_provider_metadata(
        &self,
        id: &str,
        provider: &str,
        patch: Metadata,
    ) -> Result<AuthIdentity, RepositoryError> {
        let filter = doc! { "id": id, "provider_identities.provider": provider };
        let update = doc! {
            "$set": metadata_set("provider_identities.$.provider_metadata", &patch)?
        };
        self.identities()
            .find_one_and_update(filter, update, return_updated())
            .await?
            .ok_or_else(|| {
                RepositoryError::NotFound(format!("Provider {} not linked to {}", provider, id))
            })
    }
}

#[async_trait]
impl CustomerRepository for MongoStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Customer>, RepositoryError> {
        Ok(self.customers().find_one(doc! { "id": id }, None).await?)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Customer>, RepositoryError> {
        Ok(self.customers().find_one(doc! { "email": email }, None).await?)
    }

    async fn create(&self, customer: NewCustomer) -> Result<Customer, RepositoryError> {
        let customer = Customer::new(customer);
        match self.customers().insert_one(&customer, None).await {
            Ok(_) => Ok(customer),
            Err(e) if is_duplicate_key(&e) => Err(RepositoryError::Conflict(format!(
                "Customer with email {} already exists",
                customer.email
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_metadata(&self, id: &str, patch: Metadata) -> Result<Customer, RepositoryError> {
        let update = doc! { "$set": metadata_set("metadata", &patch)? };
        self.customers()
            .find_one_and_update(doc! { "id": id }, update, return_updated())
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("Customer {} not found", id)))
    }

    async fn update_metadata_by_emails(
        &self,
        emails: &[String],
        patch: Metadata,
    ) -> Result<u64, RepositoryError> {
        let update = doc! { "$set": metadata_set("metadata", &patch)? };
        let result = self
            .customers()
            .update_many(doc! { "email": { "$in": emails.to_vec() } }, update, None)
            .await?;
        Ok(result.matched_count)
    }
}

#[async_trait]
impl OrderRepository for MongoStore {
    async fn find_order(&self, id: &str) -> Result<Option<Order>, RepositoryError> {
        Ok(self.orders().find_one(doc! { "id": id }, None).await?)
    }

    async fn find_order_by_fulfillment(
        &self,
        fulfillment_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        Ok(self
            .orders()
            .find_one(doc! { "fulfillment_ids": fulfillment_id }, None)
            .await?)
    }
}

#[async_trait]
impl NotificationRepository for MongoStore {
    async fn record(&self, notification: Notification) -> Result<RecordOutcome, RepositoryError> {
        let error = match self.notifications().insert_one(&notification, None).await {
            Ok(_) => return Ok(RecordOutcome::Recorded(notification)),
            Err(e) => e,
        };

        let Some(key) = notification
            .idempotency_key
            .as_deref()
            .filter(|_| is_duplicate_key(&error))
        else {
            return Err(error.into());
        };

        let reclaim = doc! {
            "$set": {
                "status": bson_value(&NotificationStatus::Pending)?,
                "error": Bson::Null,
                "updated_at": bson_value(&Utc::now())?,
            }
        };
        let failed = doc! {
            "idempotency_key": key,
            "status": bson_value(&NotificationStatus::Failed)?,
        };
        if let Some(reclaimed) = self
            .notifications()
            .find_one_and_update(failed, reclaim, return_updated())
            .await?
        {
            return Ok(RecordOutcome::Recorded(reclaimed));
        }

        self.notifications()
            .find_one(doc! { "idempotency_key": key }, None)
            .await?
            .map(RecordOutcome::Duplicate)
            .ok_or_else(|| RepositoryError::Backend(anyhow::Error::new(error)))
    }

    async fn set_status(
        &self,
        id: &str,
        status: NotificationStatus,
        error: Option<String>,
    ) -> Result<(), RepositoryError> {
        let update = doc! {
            "$set": {
                "status": bson_value(&status)?,
                "error": bson_value(&error)?,
                "updated_at": bson_value(&Utc::now())?,
            }
        };
        let result = self
            .notifications()
            .update_one(doc! { "id": id }, update, None)
            .await?;
        if result.matched_count == 0 {
            return Err(RepositoryError::NotFound(format!(
                "Notification {} not found",
                id
            )));
        }
        Ok(())
    }

    async fn list_by_recipient(&self, to: &str) -> Result<Vec<Notification>, RepositoryError> {
        let cursor = self.notifications().find(doc! { "to": to }, None).await?;
        Ok(cursor.try_collect().await?)
    }
}

#[async_trait]
impl StoreHealth for MongoStore {
    async fn health_check(&self) -> Result<(), RepositoryError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await?;
        Ok(())
    }
}
