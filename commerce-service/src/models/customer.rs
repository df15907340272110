use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{Metadata, VerificationStatus};

/// Commerce-facing customer profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Customer {
    pub id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub has_account: bool,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewCustomer {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub metadata: Metadata,
}

impl Customer {
    pub fn new(new: NewCustomer) -> Self {
        let now = Utc::now();
        Self {
            id: format!("cus_{}", Uuid::new_v4().simple()),
            email: new.email,
            first_name: new.first_name,
            last_name: new.last_name,
            phone: new.phone,
            has_account: true,
            metadata: new.metadata,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn verification(&self) -> VerificationStatus {
        VerificationStatus::from_metadata(&self.metadata)
    }
}
