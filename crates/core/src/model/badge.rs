use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::model::ids::BadgeId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BadgeError {
    #[error("badge title cannot be empty")]
    EmptyTitle,

    #[error("badge title cannot exceed 50 characters (got {len})")]
    TitleTooLong { len: usize },

    #[error("badge content cannot exceed 200 characters (got {len})")]
    ContentTooLong { len: usize },
}

//
// ─── BADGE ─────────────────────────────────────────────────────────────────────
//

/// Immutable catalog entry: a badge granted once a user's XP reaches its
/// threshold and revoked if XP later drops below it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    id: BadgeId,
    title: String,
    content: String,
    xp_threshold: i64,
    asset: Option<Url>,
    created_at: DateTime<Utc>,
}

impl Badge {
    /// Creates a new badge.
    ///
    /// # Errors
    ///
    /// Returns `BadgeError` for an empty title, a title over 50 characters,
    /// or content over 200 characters.
    pub fn new(
        id: BadgeId,
        title: impl Into<String>,
        content: impl Into<String>,
        xp_threshold: i64,
        asset: Option<Url>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, BadgeError> {
        let title = title.into().trim().to_owned();
        if title.is_empty() {
            return Err(BadgeError::EmptyTitle);
        }
        let title_len = title.chars().count();
        if title_len > 50 {
            return Err(BadgeError::TitleTooLong { len: title_len });
        }

        let content = content.into().trim().to_owned();
        let content_len = content.chars().count();
        if content_len > 200 {
            return Err(BadgeError::ContentTooLong { len: content_len });
        }

        Ok(Self {
            id,
            title,
            content,
            xp_threshold,
            asset,
            created_at,
        })
    }

    /// Rebuild a badge from storage without re-validating.
    #[must_use]
    pub fn from_persisted(
        id: BadgeId,
        title: String,
        content: String,
        xp_threshold: i64,
        asset: Option<Url>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title,
            content,
            xp_threshold,
            asset,
            created_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> BadgeId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub fn xp_threshold(&self) -> i64 {
        self.xp_threshold
    }

    #[must_use]
    pub fn asset(&self) -> Option<&Url> {
        self.asset.as_ref()
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

//
// ─── CHANGE SET ────────────────────────────────────────────────────────────────
//

/// Direction of a badge change produced by reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeStatus {
    Acquired,
    Removed,
}

/// One grant or revoke from a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeChange {
    pub badge: Badge,
    pub status: BadgeStatus,
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
