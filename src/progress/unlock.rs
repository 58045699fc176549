/// Module unlock engine
///
/// Item completion cascades into module completion and unlocks the next
/// module in course order. Every state change is a single upsert guarded by
/// a `WHERE` on the current status, so progress only moves forward and a
/// repeated or concurrent call changes nothing twice.
use crate::{
    authz::{self, Action, Resource, Role},
    db::models::{Module, ModuleItem, ModuleItemProgress, ModuleProgress, ModuleStatus, ReviewStatus},
    error::{LmsError, LmsResult},
    metrics,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// What an item completion did to module state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockOutcome {
    pub course_id: String,
    pub module_id: String,
    /// True only for the call that moved the module to COMPLETED
    pub module_completed: bool,
    /// Next module by ascending order, if any
    pub next_module_id: Option<String>,
    /// True when this call moved the next module out of LOCKED
    pub next_module_unlocked: bool,
    /// Every item done and no later module exists
    pub course_finished: bool,
}

/// Module state for one user, LOCKED when no row exists
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleState {
    pub module: Module,
    pub status: ModuleStatus,
}

/// Module unlock engine
#[derive(Clone)]
pub struct UnlockEngine {
    db: SqlitePool,
}

impl UnlockEngine {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Mark an item completed for a user and run the unlock cascade
    pub async fn complete_item(&self, user_id: &str, item_id: &str) -> LmsResult<UnlockOutcome> {
        self.get_item(item_id).await?;

        sqlx::query(
            r#"
            INSERT INTO module_item_progress (user_id, module_item_id, is_completed, completed_at)
            VALUES (?1, ?2, 1, ?3)
            ON CONFLICT (user_id, module_item_id) DO UPDATE
            SET is_completed = 1,
                completed_at = COALESCE(module_item_progress.completed_at, excluded.completed_at)
            "#,
        )
        .bind(user_id)
        .bind(item_id)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        self.on_item_completed(user_id, item_id).await
    }

    /// Cascade after an item's progress row was marked completed
    pub async fn on_item_completed(
        &self,
        user_id: &str,
        item_id: &str,
    ) -> LmsResult<UnlockOutcome> {
        let module = sqlx::query_as::<_, Module>(
            r#"
            SELECT m.* FROM module m
            JOIN module_item i ON i.module_id = m.id
            WHERE i.id = ?1
            "#,
        )
        .bind(item_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| LmsError::NotFound(format!("Module item {} not found", item_id)))?;

        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COALESCE(SUM(CASE WHEN p.is_completed THEN 1 ELSE 0 END), 0) AS done
            FROM module_item i
            LEFT JOIN module_item_progress p
                   ON p.module_item_id = i.id AND p.user_id = ?2
            WHERE i.module_id = ?1
            "#,
        )
        .bind(&module.id)
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;

        let total: i64 = row.try_get("total")?;
        let done: i64 = row.try_get("done")?;
        let now = Utc::now();

        let mut outcome = UnlockOutcome {
            course_id: module.course_id.clone(),
            module_id: module.id.clone(),
            module_completed: false,
            next_module_id: None,
            next_module_unlocked: false,
            course_finished: false,
        };

        if !all_items_completed(total, done) {
            self.activate(user_id, &module.id, now).await?;
            tracing::debug!(user_id, module_id = %module.id, done, total, "Module still in progress");
            return Ok(outcome);
        }

        outcome.module_completed = self.mark_completed(user_id, &module.id, now).await?;
        if outcome.module_completed {
            metrics::record_module_completed();
            tracing::info!(user_id, module_id = %module.id, "Module completed");
        }

        match self.next_module(&module).await? {
            Some(next) => {
                outcome.next_module_unlocked = self.activate(user_id, &next.id, now).await?;
                if outcome.next_module_unlocked {
                    metrics::record_module_unlocked();
                    tracing::info!(user_id, module_id = %next.id, "Next module unlocked");
                }
                outcome.next_module_id = Some(next.id);
            }
            None => outcome.course_finished = true,
        }

        Ok(outcome)
    }

    /// Gate the first interaction with a module.
    ///
    /// Index 0 is open to every enrolled user; any later module needs the
    /// module right before it in list order to be COMPLETED.
    pub async fn on_module_start(&self, user_id: &str, module_id: &str) -> LmsResult<ModuleProgress> {
        let module = self.get_module(module_id).await?;
        self.ensure_reachable(user_id, &module).await?;

        if self.activate(user_id, &module.id, Utc::now()).await? {
            tracing::info!(user_id, module_id, "Module started");
        }

        self.module_progress(user_id, &module.id)
            .await?
            .ok_or_else(|| LmsError::Internal("Module progress missing after start".to_string()))
    }

    /// Check the access order for the module that holds `item_id`.
    ///
    /// Fails with `Forbidden` when the user is not enrolled or the module
    /// is still locked for them.
    pub async fn ensure_item_reachable(&self, user_id: &str, item_id: &str) -> LmsResult<Module> {
        let item = self.get_item(item_id).await?;
        let module = self.get_module(&item.module_id).await?;
        self.ensure_reachable(user_id, &module).await?;
        Ok(module)
    }

    async fn ensure_reachable(&self, user_id: &str, module: &Module) -> LmsResult<()> {
        let enrolled: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM enrollment WHERE user_id = ?1 AND course_id = ?2",
        )
        .bind(user_id)
        .bind(&module.course_id)
        .fetch_one(&self.db)
        .await?;
        if enrolled == 0 {
            return Err(LmsError::Forbidden(format!(
                "Not enrolled in course {}",
                module.course_id
            )));
        }

        if self.module_status(user_id, &module.id).await? != ModuleStatus::Locked {
            return Ok(());
        }

        let modules = self.course_modules(&module.course_id).await?;
        let index = modules
            .iter()
            .position(|m| m.id == module.id)
            .ok_or_else(|| LmsError::Internal("Module missing from its course".to_string()))?;

        if index > 0 {
            let previous = &modules[index - 1];
            let status = self.module_status(user_id, &previous.id).await?;
            if status != ModuleStatus::Completed {
                tracing::debug!(user_id, module_id = %module.id, previous = %previous.id, "Module locked");
                return Err(LmsError::Forbidden(format!(
                    "Module locked: complete '{}' first",
                    previous.title
                )));
            }
        }

        Ok(())
    }

    /// Add time spent on an item
    pub async fn record_item_time(&self, user_id: &str, item_id: &str, seconds: i64) -> LmsResult<i64> {
        if seconds <= 0 {
            return Err(LmsError::Validation("Duration must be positive".to_string()));
        }
        self.get_item(item_id).await?;

        let duration: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO module_item_progress (user_id, module_item_id, duration)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (user_id, module_item_id) DO UPDATE
            SET duration = module_item_progress.duration + excluded.duration
            RETURNING duration
            "#,
        )
        .bind(user_id)
        .bind(item_id)
        .bind(seconds)
        .fetch_one(&self.db)
        .await?;

        Ok(duration)
    }

    /// Queue a manually graded item for review
    pub async fn submit_for_review(&self, user_id: &str, item_id: &str) -> LmsResult<()> {
        let item = self.get_item(item_id).await?;
        self.ensure_item_reachable(user_id, item_id).await?;
        if !item.requires_review {
            return Err(LmsError::Validation(format!(
                "Item {} is not manually graded",
                item_id
            )));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO module_item_progress (user_id, module_item_id, review_status)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (user_id, module_item_id) DO UPDATE
            SET review_status = excluded.review_status
            WHERE module_item_progress.is_completed = 0
            "#,
        )
        .bind(user_id)
        .bind(item_id)
        .bind(ReviewStatus::Pending)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LmsError::Conflict("Item already completed".to_string()));
        }

        Ok(())
    }

    /// Approve or reject a pending review.
    ///
    /// Approval completes the item and runs the cascade. Rejection never
    /// uncompletes anything.
    pub async fn review_item(
        &self,
        reviewer_role: Role,
        user_id: &str,
        item_id: &str,
        decision: ReviewStatus,
    ) -> LmsResult<Option<UnlockOutcome>> {
        authz::require(reviewer_role, Resource::ItemReview, Action::Review)?;

        if decision == ReviewStatus::Pending {
            return Err(LmsError::Validation(
                "A review decision must approve or reject".to_string(),
            ));
        }

        let progress = self
            .item_progress(user_id, item_id)
            .await?
            .filter(|p| p.review_status == Some(ReviewStatus::Pending))
            .ok_or_else(|| LmsError::NotFound("No pending review for this item".to_string()))?;

        if decision == ReviewStatus::Approved {
            self.ensure_item_reachable(user_id, item_id).await?;
        }

        sqlx::query(
            "UPDATE module_item_progress SET review_status = ?1 WHERE user_id = ?2 AND module_item_id = ?3",
        )
        .bind(decision)
        .bind(&progress.user_id)
        .bind(&progress.module_item_id)
        .execute(&self.db)
        .await?;

        tracing::info!(user_id, item_id, ?decision, "Item reviewed");

        match decision {
            ReviewStatus::Approved => Ok(Some(self.complete_item(user_id, item_id).await?)),
            _ => Ok(None),
        }
    }

    /// Status of a module for a user
    pub async fn module_status(&self, user_id: &str, module_id: &str) -> LmsResult<ModuleStatus> {
        Ok(self
            .module_progress(user_id, module_id)
            .await?
            .map(|p| p.status)
            .unwrap_or(ModuleStatus::Locked))
    }

    pub async fn module_progress(
        &self,
        user_id: &str,
        module_id: &str,
    ) -> LmsResult<Option<ModuleProgress>> {
        Ok(sqlx::query_as::<_, ModuleProgress>(
            "SELECT * FROM module_progress WHERE user_id = ?1 AND module_id = ?2",
        )
        .bind(user_id)
        .bind(module_id)
        .fetch_optional(&self.db)
        .await?)
    }

    pub async fn item_progress(
        &self,
        user_id: &str,
        item_id: &str,
    ) -> LmsResult<Option<ModuleItemProgress>> {
        Ok(sqlx::query_as::<_, ModuleItemProgress>(
            "SELECT * FROM module_item_progress WHERE user_id = ?1 AND module_item_id = ?2",
        )
        .bind(user_id)
        .bind(item_id)
        .fetch_optional(&self.db)
        .await?)
    }

    /// Every module of a course with this user's status
    pub async fn course_progress(&self, user_id: &str, course_id: &str) -> LmsResult<Vec<ModuleState>> {
        let modules = self.course_modules(course_id).await?;

        let mut states = Vec::with_capacity(modules.len());
        for module in modules {
            let status = self.module_status(user_id, &module.id).await?;
            states.push(ModuleState { module, status });
        }

        Ok(states)
    }

    /// Move a module to COMPLETED. Returns whether this call did it.
    async fn mark_completed(&self, user_id: &str, module_id: &str, now: DateTime<Utc>) -> LmsResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO module_progress (user_id, module_id, status, started_at, completed_at)
            VALUES (?1, ?2, 'COMPLETED', ?3, ?3)
            ON CONFLICT (user_id, module_id) DO UPDATE
            SET status = 'COMPLETED',
                completed_at = excluded.completed_at,
                started_at = COALESCE(module_progress.started_at, excluded.started_at)
            WHERE module_progress.status <> 'COMPLETED'
            "#,
        )
        .bind(user_id)
        .bind(module_id)
        .bind(now)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Move a module out of LOCKED. COMPLETED rows and existing
    /// `started_at` values are left alone.
    async fn activate(&self, user_id: &str, module_id: &str, now: DateTime<Utc>) -> LmsResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO module_progress (user_id, module_id, status, started_at)
            VALUES (?1, ?2, 'IN_PROGRESS', ?3)
            ON CONFLICT (user_id, module_id) DO UPDATE
            SET status = 'IN_PROGRESS',
                started_at = COALESCE(module_progress.started_at, excluded.started_at)
            WHERE module_progress.status = 'LOCKED'
            "#,
        )
        .bind(user_id)
        .bind(module_id)
        .bind(now)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn next_module(&self, module: &Module) -> LmsResult<Option<Module>> {
        Ok(sqlx::query_as::<_, Module>(
            r#"
            SELECT * FROM module
            WHERE course_id = ?1 AND sort_order > ?2
            ORDER BY sort_order ASC
            LIMIT 1
            "#,
        )
        .bind(&module.course_id)
        .bind(module.order)
        .fetch_optional(&self.db)
        .await?)
    }

    async fn course_modules(&self, course_id: &str) -> LmsResult<Vec<Module>> {
        Ok(sqlx::query_as::<_, Module>(
            "SELECT * FROM module WHERE course_id = ?1 ORDER BY sort_order ASC",
        )
        .bind(course_id)
        .fetch_all(&self.db)
        .await?)
    }

    async fn get_module(&self, module_id: &str) -> LmsResult<Module> {
        sqlx::query_as::<_, Module>("SELECT * FROM module WHERE id = ?1")
            .bind(module_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| LmsError::NotFound(format!("Module {} not found", module_id)))
    }

    async fn get_item(&self, item_id: &str) -> LmsResult<ModuleItem> {
        sqlx::query_as::<_, ModuleItem>("SELECT * FROM module_item WHERE id = ?1")
            .bind(item_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| LmsError::NotFound(format!("Module item {} not found", item_id)))
    }
}

/// A module with no items is never complete through this path
fn all_items_completed(total: i64, done: i64) -> bool {
    total > 0 && done >= total
}
