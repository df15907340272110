use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use super::Metadata;

pub const EMAIL_VERIFIED: &str = "email_verified";
pub const EMAIL_VERIFICATION_REQUIRED: &str = "email_verification_required";
pub const EMAIL_VERIFIED_AT: &str = "email_verified_at";

/// Verification flags as read from a metadata bag.
///
/// Verification is required unless the bag says `false` explicitly, and the
/// address counts as verified only when the bag says `true` explicitly. A
/// record that does not exist reads the same as an empty bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationStatus {
    pub required: bool,
    pub verified: bool,
}

impl VerificationStatus {
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            required: metadata.get(EMAIL_VERIFICATION_REQUIRED) != Some(&Value::Bool(false)),
            verified: metadata.get(EMAIL_VERIFIED) == Some(&Value::Bool(true)),
        }
    }

    pub fn from_optional(metadata: Option<&Metadata>) -> Self {
        metadata.map(Self::from_metadata).unwrap_or(Self::UNKNOWN)
    }

    /// Status of a record that could not be found.
    pub const UNKNOWN: Self = Self {
        required: true,
        verified: false,
    };

    pub fn blocks_login(&self) -> bool {
        self.required && !self.verified
    }

    /// Merge the customer and auth identity views used by the login route.
    ///
    /// Both the requirement and the satisfaction are unions, so one verified
    /// record is enough to let the login through.
    pub fn combine(customer: Self, identity: Self) -> Self {
        Self {
            required: customer.required || identity.required,
            verified: customer.verified || identity.verified,
        }
    }

    /// Flags to seed a customer record with, mirroring this status.
    pub fn seed_metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert(EMAIL_VERIFIED.to_string(), Value::Bool(self.verified));
        metadata.insert(
            EMAIL_VERIFICATION_REQUIRED.to_string(),
            Value::Bool(!self.verified),
        );
        metadata
    }
}

/// Patch applied when an address is confirmed.
///
/// An already verified record keeps its original `email_verified_at`, so a
/// repeated confirmation leaves the record unchanged.
pub fn verified_patch(existing: Option<&Metadata>, now: DateTime<Utc>) -> Metadata {
    let already_verified_at = existing
        .filter(|m| VerificationStatus::from_metadata(m).verified)
        .and_then(|m| m.get(EMAIL_VERIFIED_AT))
        .filter(|v| v.is_string())
        .cloned();

    let mut patch = Metadata::new();
    patch.insert(EMAIL_VERIFIED.to_string(), Value::Bool(true));
    patch.insert(
        EMAIL_VERIFIED_AT.to_string(),
        already_verified_at.unwrap_or_else(|| {
            Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true))
        }),
    );
    patch.insert(EMAIL_VERIFICATION_REQUIRED.to_string(), Value::Bool(false));
    patch
}

/// Patch applied when a verification link is requested.
pub fn pending_patch(existing: &Metadata) -> Metadata {
    let mut patch = Metadata::new();
    patch.insert(EMAIL_VERIFICATION_REQUIRED.to_string(), Value::Bool(true));
    patch.insert(
        EMAIL_VERIFIED.to_string(),
        Value::Bool(VerificationStatus::from_metadata(existing).verified),
    );
    patch
}

/// Defaults for a freshly registered identity or customer; keys already set win.
pub fn with_defaults(mut metadata: Metadata) -> Metadata {
    metadata
        .entry(EMAIL_VERIFICATION_REQUIRED.to_string())
        .or_insert(Value::Bool(true));
    metadata
        .entry(EMAIL_VERIFIED.to_string())
        .or_insert(Value::Bool(false));
    metadata
}
