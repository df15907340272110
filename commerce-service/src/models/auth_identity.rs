use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{Metadata, VerificationStatus};

pub const EMAILPASS_PROVIDER: &str = "emailpass";
pub const CUSTOMER_ID_KEY: &str = "customer_id";
pub const PASSWORD_HASH_KEY: &str = "password";

/// Credential record owned by the auth module.
///
/// Each identity holds one entry per provider; for `emailpass` the entity id is
/// the normalized email and the password hash lives in `provider_metadata`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthIdentity {
    pub id: String,
    pub provider_identities: Vec<ProviderIdentity>,
    #[serde(default)]
    pub app_metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderIdentity {
    pub provider: String,
    pub entity_id: String,
    #[serde(default)]
    pub user_metadata: Metadata,
    #[serde(default)]
    pub provider_metadata: Metadata,
}

impl AuthIdentity {
    pub fn new(provider_identity: ProviderIdentity, app_metadata: Metadata) -> Self {
        let now = Utc::now();
        Self {
            id: format!("authid_{}", Uuid::new_v4().simple()),
            provider_identities: vec![provider_identity],
            app_metadata,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn provider_identity(&self, provider: &str) -> Option<&ProviderIdentity> {
        self.provider_identities
            .iter()
            .find(|p| p.provider == provider)
    }

    /// Id of the actor this identity is linked to, e.g. `customer_id`.
    pub fn actor_id(&self, actor_type: &str) -> Option<&str> {
        self.app_metadata
            .get(&format!("{}_id", actor_type))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    pub fn customer_id(&self) -> Option<&str> {
        self.actor_id("customer")
    }

    pub fn verification(&self) -> VerificationStatus {
        VerificationStatus::from_metadata(&self.app_metadata)
    }
}

impl ProviderIdentity {
    pub fn new(provider: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            entity_id: entity_id.into(),
            user_metadata: Metadata::new(),
            provider_metadata: Metadata::new(),
        }
    }

    pub fn password_hash(&self) -> Option<&str> {
        self.provider_metadata
            .get(PASSWORD_HASH_KEY)
            .and_then(Value::as_str)
    }
}
