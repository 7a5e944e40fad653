//! User identity types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A chat user, keyed by the caller-supplied external identifier.
///
/// The `external_id` is whatever opaque string the storefront front end
/// uses to identify a visitor (wallet address, cookie id, account id).
/// It is unique; user resolution is idempotent on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub external_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Construct a fresh user for the given external identifier.
    pub fn new(external_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            external_id: external_id.into(),
            created_at: now,
            updated_at: now,
        }
    }
}
