use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error};
use url::Url;

use lms_core::model::{
    Badge, BadgeChange, BadgeId, BadgeStatus, EngineSettings, UserId,
};
use lms_core::Clock;
use storage::repository::{BadgeRepository, StorageError, UserRepository};

use crate::error::{BadgeServiceError, NotFound};

/// Result of the badge pass attached to an XP-changing operation.
///
/// The XP write commits before badges are reconciled, so a reconciliation
/// failure cannot be reported as a plain error without losing the new XP.
/// It surfaces here instead of being silently dropped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BadgeOutcome {
    /// Reconciliation ran to completion and applied these changes.
    Reconciled { changes: Vec<BadgeChange> },
    /// Reconciliation failed after the XP write committed. Badge state may
    /// lag the ledger until the next XP-changing request heals it.
    Unreconciled { reason: String },
}

impl BadgeOutcome {
    /// Applied changes, empty when unreconciled.
    #[must_use]
    pub fn changes(&self) -> &[BadgeChange] {
        match self {
            BadgeOutcome::Reconciled { changes } => changes,
            BadgeOutcome::Unreconciled { .. } => &[],
        }
    }

    #[must_use]
    pub fn is_reconciled(&self) -> bool {
        matches!(self, BadgeOutcome::Reconciled { .. })
    }
}

/// One leaderboard row with resolved badge details.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub xp: i64,
    pub badges: Vec<Badge>,
}

/// Reconciles user badge sets against the badge catalog, and administers
/// the catalog itself.
#[derive(Clone)]
pub struct BadgeService {
    clock: Clock,
    settings: EngineSettings,
    users: Arc<dyn UserRepository>,
    badges: Arc<dyn BadgeRepository>,
}

impl BadgeService {
    #[must_use]
    pub fn new(
        clock: Clock,
        settings: EngineSettings,
        users: Arc<dyn UserRepository>,
        badges: Arc<dyn BadgeRepository>,
    ) -> Self {
        Self {
            clock,
            settings,
            users,
            badges,
        }
    }

    /// Bring the user's badge set in line with their current XP and return
    /// the applied grant/revoke change-set, in catalog order.
    ///
    /// Runs as an optimistic-concurrency loop: snapshot (XP, badges,
    /// version), compute the diff against the snapshot's XP, apply it
    /// conditionally on the version. A concurrent writer moves the version
    /// and the write conflicts, so the applied diff always matches a ledger
    /// state that was current at apply time.
    ///
    /// # Errors
    ///
    /// Returns `BadgeServiceError::ReconcileContention` when the attempt
    /// budget is exhausted, or storage errors.
    pub async fn reconcile(&self, user_id: UserId) -> Result<Vec<BadgeChange>, BadgeServiceError> {
        let catalog = self.badges.list_badges().await?;
        let attempts = self.settings.reconcile_max_attempts();

        for attempt in 1..=attempts {
            let ledger = self.users.ledger_snapshot(user_id).await?;

            let mut grant = Vec::new();
            let mut revoke = Vec::new();
            let mut changes = Vec::new();
            for badge in &catalog {
                let held = ledger.badges.contains(&badge.id());
                if badge.xp_threshold() <= ledger.xp && !held {
                    grant.push(badge.id());
                    changes.push(BadgeChange {
                        badge: badge.clone(),
                        status: BadgeStatus::Acquired,
                    });
                } else if badge.xp_threshold() > ledger.xp && held {
                    revoke.push(badge.id());
                    changes.push(BadgeChange {
                        badge: badge.clone(),
                        status: BadgeStatus::Removed,
                    });
                }
            }

            if changes.is_empty() {
                return Ok(changes);
            }

            match self
                .users
                .apply_badge_diff(user_id, ledger.version, &grant, &revoke)
                .await
            {
                Ok(()) => {
                    debug!(
                        %user_id,
                        granted = grant.len(),
                        revoked = revoke.len(),
                        "badge set reconciled"
                    );
                    return Ok(changes);
                }
                Err(StorageError::Conflict) => {
                    debug!(%user_id, attempt, "badge reconciliation conflicted; retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(BadgeServiceError::ReconcileContention { attempts })
    }

    /// Reconcile and fold the result into a `BadgeOutcome`, logging the
    /// degraded case. Used after an XP write has already committed.
    pub async fn reconcile_outcome(&self, user_id: UserId) -> BadgeOutcome {
        match self.reconcile(user_id).await {
            Ok(changes) => BadgeOutcome::Reconciled { changes },
            Err(err) => {
                error!(
                    %user_id,
                    error = %err,
                    "badge reconciliation failed after XP commit; badge state lags the ledger"
                );
                BadgeOutcome::Unreconciled {
                    reason: err.to_string(),
                }
            }
        }
    }

    /// Create and persist a badge.
    ///
    /// # Errors
    ///
    /// Returns `BadgeServiceError::Badge` for validation failures and
    /// storage errors if persistence fails.
    pub async fn create_badge(
        &self,
        title: impl Into<String>,
        content: impl Into<String>,
        xp_threshold: i64,
        asset: Option<Url>,
    ) -> Result<Badge, BadgeServiceError> {
        let badge = Badge::new(
            BadgeId::generate(),
            title,
            content,
            xp_threshold,
            asset,
            self.clock.now(),
        )?;
        self.badges.upsert_badge(&badge).await?;
        Ok(badge)
    }

    /// All badges, ordered by XP threshold.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn list_badges(&self) -> Result<Vec<Badge>, BadgeServiceError> {
        let badges = self.badges.list_badges().await?;
        Ok(badges)
    }

    /// Delete a badge; holdings are purged with it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound::Badge` if no such badge exists.
    pub async fn delete_badge(&self, id: BadgeId) -> Result<(), BadgeServiceError> {
        match self.badges.delete_badge(id).await {
            Ok(()) => Ok(()),
            Err(StorageError::NotFound) => Err(NotFound::Badge(id).into()),
            Err(err) => Err(err.into()),
        }
    }

    /// Users ordered by XP descending, with resolved badge details.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn leaderboard(&self, limit: u32) -> Result<Vec<LeaderboardEntry>, BadgeServiceError> {
        let rows = self.users.leaderboard(limit).await?;
        let catalog: HashMap<BadgeId, Badge> = self
            .badges
            .list_badges()
            .await?
            .into_iter()
            .map(|b| (b.id(), b))
            .collect();

        Ok(rows
            .into_iter()
            .map(|row| LeaderboardEntry {
                user_id: row.user_id,
                xp: row.xp,
                badges: row
                    .badge_ids
                    .iter()
                    .filter_map(|id| catalog.get(id).cloned())
                    .collect(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lms_core::time::fixed_clock;
    use storage::repository::InMemoryRepository;

    fn service(repo: &InMemoryRepository) -> BadgeService {
        BadgeService::new(
            fixed_clock(),
            EngineSettings::standard(),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        )
    }

    #[tokio::test]
    async fn reconcile_grants_and_revokes_around_thresholds() {
        let repo = InMemoryRepository::new();
        let badges = service(&repo);
        let user = UserId::generate();

        let bronze = badges.create_badge("Bronze", "first steps", 10, None).await.unwrap();
        badges.create_badge("Silver", "keep going", 50, None).await.unwrap();

        repo.apply_xp_delta(user, 12).await.unwrap();
        let changes = badges.reconcile(user).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].badge.id(), bronze.id());
        assert_eq!(changes[0].status, BadgeStatus::Acquired);

        // Nothing to do on a second pass.
        assert!(badges.reconcile(user).await.unwrap().is_empty());

        repo.apply_xp_delta(user, -6).await.unwrap();
        let changes = badges.reconcile(user).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].badge.id(), bronze.id());
        assert_eq!(changes[0].status, BadgeStatus::Removed);
    }

    /// Delegates to the in-memory store but loses the version race a fixed
    /// number of times first.
    #[derive(Clone)]
    struct FlakyUsers {
        inner: InMemoryRepository,
        conflicts_left: Arc<std::sync::atomic::AtomicU32>,
    }

    #[async_trait::async_trait]
    impl UserRepository for FlakyUsers {
        async fn apply_xp_delta(
            &self,
            user_id: UserId,
            delta: i64,
        ) -> Result<i64, StorageError> {
            self.inner.apply_xp_delta(user_id, delta).await
        }

        async fn xp(&self, user_id: UserId) -> Result<i64, StorageError> {
            self.inner.xp(user_id).await
        }

        async fn ledger_snapshot(
            &self,
            user_id: UserId,
        ) -> Result<storage::repository::UserLedger, StorageError> {
            self.inner.ledger_snapshot(user_id).await
        }

        async fn apply_badge_diff(
            &self,
            user_id: UserId,
            expected_version: u64,
            grant: &[BadgeId],
            revoke: &[BadgeId],
        ) -> Result<(), StorageError> {
            use std::sync::atomic::Ordering;
            if self
                .conflicts_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StorageError::Conflict);
            }
            self.inner
                .apply_badge_diff(user_id, expected_version, grant, revoke)
                .await
        }

        async fn leaderboard(
            &self,
            limit: u32,
        ) -> Result<Vec<storage::repository::LeaderboardRow>, StorageError> {
            self.inner.leaderboard(limit).await
        }
    }

    fn flaky_service(repo: &InMemoryRepository, conflicts: u32) -> BadgeService {
        BadgeService::new(
            fixed_clock(),
            EngineSettings::standard(),
            Arc::new(FlakyUsers {
                inner: repo.clone(),
                conflicts_left: Arc::new(std::sync::atomic::AtomicU32::new(conflicts)),
            }),
            Arc::new(repo.clone()),
        )
    }

    #[tokio::test]
    async fn reconcile_retries_past_a_conflicting_writer() {
        let repo = InMemoryRepository::new();
        let badges = flaky_service(&repo, 2);
        let user = UserId::generate();

        badges.create_badge("Bronze", "first steps", 10, None).await.unwrap();
        repo.apply_xp_delta(user, 12).await.unwrap();

        // Two lost races, then the third (and final budgeted) attempt lands.
        let changes = badges.reconcile(user).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert!(badges.reconcile(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reconcile_gives_up_after_the_attempt_budget() {
        let repo = InMemoryRepository::new();
        let badges = flaky_service(&repo, u32::MAX);
        let user = UserId::generate();

        badges.create_badge("Bronze", "first steps", 10, None).await.unwrap();
        repo.apply_xp_delta(user, 12).await.unwrap();

        let err = badges.reconcile(user).await.unwrap_err();
        assert!(matches!(
            err,
            BadgeServiceError::ReconcileContention { attempts: 3 }
        ));

        let outcome = badges.reconcile_outcome(user).await;
        assert!(!outcome.is_reconciled());
    }

    #[tokio::test]
    async fn leaderboard_resolves_badge_details() {
        let repo = InMemoryRepository::new();
        let badges = service(&repo);
        let user = UserId::generate();

        let bronze = badges.create_badge("Bronze", "first steps", 10, None).await.unwrap();
        repo.apply_xp_delta(user, 20).await.unwrap();
        badges.reconcile(user).await.unwrap();

        let board = badges.leaderboard(10).await.unwrap();
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].xp, 20);
        assert_eq!(board[0].badges, [bronze]);
    }

    #[tokio::test]
    async fn delete_badge_maps_missing_to_not_found() {
        let repo = InMemoryRepository::new();
        let badges = service(&repo);
        let id = BadgeId::generate();

        let err = badges.delete_badge(id).await.unwrap_err();
        assert!(matches!(err, BadgeServiceError::NotFound(NotFound::Badge(b)) if b == id));
    }
}
