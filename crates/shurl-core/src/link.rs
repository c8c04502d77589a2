use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// One shortened-URL mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Store-assigned identifier, never reused.
    pub id: u64,
    /// The URL the token redirects to. Unique across live rows.
    #[serde(rename = "url")]
    pub target_url: String,
    /// Set once at creation.
    #[serde(rename = "ct")]
    pub created_at: Timestamp,
    /// After this instant the link no longer redirects.
    #[serde(rename = "et", default)]
    pub expired_at: Option<Timestamp>,
    /// Soft-delete marker.
    #[serde(rename = "dt", default)]
    pub deleted_at: Option<Timestamp>,
    /// Successful redirects so far.
    #[serde(rename = "hs", default)]
    pub hits: u64,
}

impl Link {
    /// Creates a fresh row with zero hits.
    pub fn new(id: u64, target_url: impl Into<String>, expired_at: Option<Timestamp>) -> Self {
        Self {
            id,
            target_url: target_url.into(),
            created_at: Timestamp::now(),
            expired_at,
            deleted_at: None,
            hits: 0,
        }
    }

    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expired_at.is_some_and(|expired_at| now > expired_at)
    }

    pub fn is_deleted_at(&self, now: Timestamp) -> bool {
        self.deleted_at.is_some_and(|deleted_at| now > deleted_at)
    }

    /// A link redirects only while it is neither soft-deleted nor expired.
    pub fn is_accessible_at(&self, now: Timestamp) -> bool {
        !self.is_deleted_at(now) && !self.is_expired_at(now)
    }
}
