/// Badge evaluation
///
/// Count badges are derived from the number of distinct problems a user has
/// passed. Awards go through `ON CONFLICT DO NOTHING` on `(user_id,
/// badge_type)` so they are idempotent and never revoked.
use crate::{
    db::models::{BadgeType, ModuleStatus, UserBadge},
    error::LmsResult,
    metrics,
};
use chrono::Utc;
use sqlx::SqlitePool;

/// Count badges in ascending threshold order
pub const BADGE_THRESHOLDS: [BadgeType; 4] = [
    BadgeType::Problems50,
    BadgeType::Problems100,
    BadgeType::Problems150,
    BadgeType::Problems200,
];

/// Highest count badge among a set of newly awarded ones
pub fn highest_new_badge(awarded: &[BadgeType]) -> Option<BadgeType> {
    awarded
        .iter()
        .copied()
        .filter(|b| b.threshold().is_some())
        .max_by_key(|b| b.threshold())
}

/// Count badges crossed by `solved` that are not in `owned`, lowest first
fn crossed_unearned(solved: i64, owned: &[BadgeType]) -> Vec<BadgeType> {
    BADGE_THRESHOLDS
        .iter()
        .copied()
        .filter(|b| b.threshold().is_some_and(|t| solved >= t))
        .filter(|b| !owned.contains(b))
        .collect()
}

#[derive(Clone)]
pub struct BadgeEvaluator {
    db: SqlitePool,
    /// Module whose completion earns `MODULE_MASTERY`
    mastery_module_id: Option<String>,
}

impl BadgeEvaluator {
    pub fn new(db: SqlitePool, mastery_module_id: Option<String>) -> Self {
        Self {
            db,
            mastery_module_id,
        }
    }

    /// Distinct problems with at least one PASSED submission
    pub async fn solved_count(&self, user_id: &str) -> LmsResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT problem_id) FROM submission WHERE user_id = ?1 AND status = 'PASSED'",
        )
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }

    pub async fn list_badges(&self, user_id: &str) -> LmsResult<Vec<UserBadge>> {
        Ok(sqlx::query_as::<_, UserBadge>(
            "SELECT * FROM user_badge WHERE user_id = ?1 ORDER BY awarded_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?)
    }

    /// Award the lowest crossed count badge the user does not hold yet.
    ///
    /// At most one badge per call; the next call picks up the next one.
    pub async fn check_and_award_badges(&self, user_id: &str) -> LmsResult<Option<BadgeType>> {
        let solved = self.solved_count(user_id).await?;
        let owned = self.owned(user_id).await?;

        for badge in crossed_unearned(solved, &owned) {
            // A concurrent call may have won the insert; try the next one
            if self.award(user_id, badge).await? {
                return Ok(Some(badge));
            }
        }

        Ok(None)
    }

    /// Award every crossed count badge plus the module badge when eligible.
    ///
    /// Returns the badges this call created.
    pub async fn check_all_badges(&self, user_id: &str) -> LmsResult<Vec<BadgeType>> {
        let solved = self.solved_count(user_id).await?;
        let owned = self.owned(user_id).await?;

        let mut awarded = Vec::new();
        for badge in crossed_unearned(solved, &owned) {
            if self.award(user_id, badge).await? {
                awarded.push(badge);
            }
        }

        if let Some(module_id) = self.mastery_module_id.clone() {
            if self.check_module_badge(user_id, &module_id).await? {
                awarded.push(BadgeType::ModuleMastery);
            }
        }

        tracing::debug!(user_id, solved, awarded = awarded.len(), "Batch badge check");
        Ok(awarded)
    }

    /// Award `MODULE_MASTERY` if `module_id` is the mastery module and the
    /// user completed it. Returns whether this call awarded it.
    pub async fn check_module_badge(&self, user_id: &str, module_id: &str) -> LmsResult<bool> {
        if self.mastery_module_id.as_deref() != Some(module_id) {
            return Ok(false);
        }

        let status: Option<ModuleStatus> = sqlx::query_scalar(
            "SELECT status FROM module_progress WHERE user_id = ?1 AND module_id = ?2",
        )
        .bind(user_id)
        .bind(module_id)
        .fetch_optional(&self.db)
        .await?;

        if status != Some(ModuleStatus::Completed) {
            return Ok(false);
        }

        self.award(user_id, BadgeType::ModuleMastery).await
    }

    async fn owned(&self, user_id: &str) -> LmsResult<Vec<BadgeType>> {
        Ok(
            sqlx::query_scalar::<_, BadgeType>("SELECT badge_type FROM user_badge WHERE user_id = ?1")
                .bind(user_id)
                .fetch_all(&self.db)
                .await?,
        )
    }

    async fn award(&self, user_id: &str, badge: BadgeType) -> LmsResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_badge (user_id, badge_type, awarded_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (user_id, badge_type) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(badge)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        let created = result.rows_affected() > 0;
        if created {
            metrics::record_badge_awarded(badge.as_str());
            tracing::info!(user_id, badge = badge.as_str(), "Badge awarded");
        }

        Ok(created)
    }
}
