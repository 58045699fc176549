/// Submission and reward orchestration
///
/// A passing submission drives, in order: the unlock cascade for its module
/// item, the streak tracker (which runs the badge check), the module badge,
/// enrollment completion, the first-pass wallet reward and the best-effort
/// integrations. Validation, the module access-order gate and the insert
/// can fail the call; everything after the insert is logged and skipped on
/// error.
use crate::{
    account::AccountManager,
    catalog::CatalogManager,
    config::RewardConfig,
    db::models::{BadgeType, Submission, SubmissionKind, SubmissionStatus, User},
    error::{LmsError, LmsResult},
    integrations::{CodeSync, ComplexityAnalyzer, SolutionFile},
    metrics,
    progress::{BadgeEvaluator, StreakTracker, StreakUpdate, UnlockEngine, UnlockOutcome},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::{sync::Arc, time::Duration};
use validator::Validate;

/// A graded attempt coming from one of the submission handlers
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionEvent {
    #[validate(length(min = 1))]
    pub user_id: String,
    #[validate(length(min = 1))]
    pub problem_id: String,
    pub module_item_id: Option<String>,
    pub contest_id: Option<String>,
    pub kind: SubmissionKind,
    pub code: String,
    #[validate(length(min = 1, max = 32))]
    pub language: String,
    pub passed: bool,
    /// Seconds spent on the attempt
    #[validate(range(min = 0))]
    #[serde(default)]
    pub duration: i64,
}

/// Everything a submission changed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionOutcome {
    pub submission: Submission,
    pub unlock: Option<UnlockOutcome>,
    pub streak: Option<StreakUpdate>,
    pub module_badge: Option<BadgeType>,
    pub enrollment_completed: bool,
    /// No earlier PASSED submission exists for this problem
    pub first_pass: bool,
    /// Wallet currency credited by this submission
    pub reward: i64,
}

/// One leaderboard row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    #[sqlx(default)]
    pub rank: i64,
    pub user_id: String,
    pub name: String,
    pub solved: i64,
    /// When the most recent new problem was first solved
    pub last_solved_at: DateTime<Utc>,
}

/// Submission and reward orchestrator
#[derive(Clone)]
pub struct SubmissionService {
    db: SqlitePool,
    rewards: RewardConfig,
    accounts: Arc<AccountManager>,
    catalog: Arc<CatalogManager>,
    unlock: Arc<UnlockEngine>,
    streaks: Arc<StreakTracker>,
    badges: Arc<BadgeEvaluator>,
    code_sync: Option<(Arc<dyn CodeSync>, Duration)>,
    analyzer: Option<(Arc<dyn ComplexityAnalyzer>, Duration)>,
}

impl SubmissionService {
    pub fn new(
        db: SqlitePool,
        rewards: RewardConfig,
        accounts: Arc<AccountManager>,
        catalog: Arc<CatalogManager>,
        unlock: Arc<UnlockEngine>,
        streaks: Arc<StreakTracker>,
        badges: Arc<BadgeEvaluator>,
    ) -> Self {
        Self {
            db,
            rewards,
            accounts,
            catalog,
            unlock,
            streaks,
            badges,
            code_sync: None,
            analyzer: None,
        }
    }

    /// Push accepted solutions to linked repositories
    pub fn with_code_sync(mut self, sync: Arc<dyn CodeSync>, timeout: Duration) -> Self {
        self.code_sync = Some((sync, timeout));
        self
    }

    /// Attach complexity notes to accepted solutions
    pub fn with_analyzer(mut self, analyzer: Arc<dyn ComplexityAnalyzer>, timeout: Duration) -> Self {
        self.analyzer = Some((analyzer, timeout));
        self
    }

    /// Persist a submission and run the reward pipeline when it passed
    pub async fn submit(&self, event: SubmissionEvent) -> LmsResult<SubmissionOutcome> {
        event
            .validate()
            .map_err(|e| LmsError::Validation(e.to_string()))?;
        if event.kind == SubmissionKind::Contest && event.contest_id.is_none() {
            return Err(LmsError::Validation(
                "Contest submissions need a contest id".to_string(),
            ));
        }

        let user = self.accounts.get_user(&event.user_id).await?;
        if let Some(item_id) = &event.module_item_id {
            self.unlock.ensure_item_reachable(&user.id, item_id).await?;
        }

        let submission = self.insert(&event).await?;
        metrics::record_submission(event.kind.as_str(), event.passed);
        tracing::info!(
            submission_id = submission.id,
            user_id = %user.id,
            problem_id = %submission.problem_id,
            kind = event.kind.as_str(),
            passed = event.passed,
            "Submission recorded"
        );

        let mut outcome = SubmissionOutcome {
            submission,
            unlock: None,
            streak: None,
            module_badge: None,
            enrollment_completed: false,
            first_pass: false,
            reward: 0,
        };

        if !event.passed {
            return Ok(outcome);
        }

        if let Some(item_id) = &event.module_item_id {
            outcome.unlock = match self.unlock.complete_item(&user.id, item_id).await {
                Ok(unlock) => Some(unlock),
                Err(e) => {
                    tracing::warn!(user_id = %user.id, item_id = %item_id, error = %e, "Unlock cascade failed");
                    None
                }
            };
        }

        outcome.streak = match self.streaks.record_activity(&user.id).await {
            Ok(update) => Some(update),
            Err(e) => {
                tracing::warn!(user_id = %user.id, error = %e, "Streak update failed");
                None
            }
        };

        if let Some(unlock) = outcome.unlock.clone() {
            if unlock.module_completed {
                outcome.module_badge = self.module_badge(&user.id, &unlock.module_id).await;
            }
            if unlock.course_finished {
                outcome.enrollment_completed = self.finish_course(&user.id, &unlock.course_id).await;
            }
        }

        match self.is_first_pass(&outcome.submission).await {
            Ok(true) => {
                outcome.first_pass = true;
                outcome.reward = self.reward(&user.id, event.kind).await;
            }
            Ok(false) => {}
            Err(e) => tracing::warn!(user_id = %user.id, error = %e, "First-pass check failed"),
        }

        self.spawn_code_sync(&user, &outcome.submission);
        self.spawn_analysis(&outcome.submission);

        Ok(outcome)
    }

    async fn insert(&self, event: &SubmissionEvent) -> LmsResult<Submission> {
        let status = if event.passed {
            SubmissionStatus::Passed
        } else {
            SubmissionStatus::Failed
        };

        Ok(sqlx::query_as::<_, Submission>(
            r#"
            INSERT INTO submission
                (user_id, problem_id, module_item_id, contest_id, kind, code, language, status, duration, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            RETURNING *
            "#,
        )
        .bind(&event.user_id)
        .bind(&event.problem_id)
        .bind(&event.module_item_id)
        .bind(&event.contest_id)
        .bind(event.kind)
        .bind(&event.code)
        .bind(&event.language)
        .bind(status)
        .bind(event.duration)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?)
    }

    /// No PASSED submission for the same (user, problem) precedes this one.
    ///
    /// Ids are monotonic, so of two concurrent first passes only the
    /// earlier insert qualifies.
    async fn is_first_pass(&self, submission: &Submission) -> LmsResult<bool> {
        let earlier: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM submission
            WHERE user_id = ?1 AND problem_id = ?2 AND status = 'PASSED' AND id < ?3
            "#,
        )
        .bind(&submission.user_id)
        .bind(&submission.problem_id)
        .bind(submission.id)
        .fetch_one(&self.db)
        .await?;

        Ok(earlier == 0)
    }

    async fn reward(&self, user_id: &str, kind: SubmissionKind) -> i64 {
        let amount = self.rewards.for_kind(kind);
        if amount <= 0 {
            return 0;
        }

        match self.accounts.credit_wallet(user_id, amount).await {
            Ok(balance) => {
                metrics::record_wallet_credit(kind.as_str(), amount);
                tracing::info!(user_id, amount, balance, "First pass rewarded");
                amount
            }
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Wallet credit failed");
                0
            }
        }
    }

    async fn module_badge(&self, user_id: &str, module_id: &str) -> Option<BadgeType> {
        match self.badges.check_module_badge(user_id, module_id).await {
            Ok(true) => Some(BadgeType::ModuleMastery),
            Ok(false) => None,
            Err(e) => {
                tracing::warn!(user_id, module_id, error = %e, "Module badge check failed");
                None
            }
        }
    }

    async fn finish_course(&self, user_id: &str, course_id: &str) -> bool {
        match self.catalog.complete_enrollment(user_id, course_id).await {
            Ok(completed) => completed,
            Err(e) => {
                tracing::warn!(user_id, course_id, error = %e, "Enrollment completion failed");
                false
            }
        }
    }

    fn spawn_code_sync(&self, user: &User, submission: &Submission) {
        let Some((sync, limit)) = self.code_sync.clone() else {
            return;
        };
        let (Some(repo), Some(token)) = (&user.github_repo, &user.github_token) else {
            return;
        };

        let file = SolutionFile::for_submission(
            repo,
            token,
            &submission.problem_id,
            &submission.language,
            &submission.code,
        );
        let submission_id = submission.id;

        tokio::spawn(async move {
            match tokio::time::timeout(limit, sync.push_solution(&file)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    metrics::record_integration_failure("github");
                    tracing::warn!(submission_id, error = %e, "GitHub sync failed");
                }
                Err(_) => {
                    metrics::record_integration_failure("github");
                    tracing::warn!(submission_id, "GitHub sync timed out");
                }
            }
        });
    }

    fn spawn_analysis(&self, submission: &Submission) {
        let Some((analyzer, limit)) = self.analyzer.clone() else {
            return;
        };

        let db = self.db.clone();
        let submission_id = submission.id;
        let code = submission.code.clone();
        let language = submission.language.clone();

        tokio::spawn(async move {
            let note = match tokio::time::timeout(limit, analyzer.analyze(&code, &language)).await {
                Ok(Ok(note)) => note,
                Ok(Err(e)) => {
                    metrics::record_integration_failure("openai");
                    tracing::warn!(submission_id, error = %e, "Complexity analysis failed");
                    return;
                }
                Err(_) => {
                    metrics::record_integration_failure("openai");
                    tracing::warn!(submission_id, "Complexity analysis timed out");
                    return;
                }
            };

            let stored = sqlx::query(
                r#"
                INSERT INTO submission_analysis (submission_id, note, created_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT (submission_id) DO NOTHING
                "#,
            )
            .bind(submission_id)
            .bind(&note)
            .bind(Utc::now())
            .execute(&db)
            .await;

            if let Err(e) = stored {
                tracing::warn!(submission_id, error = %e, "Failed to store complexity note");
            }
        });
    }

    /// Complexity note for a submission, once the analysis finished
    pub async fn analysis(&self, submission_id: i64) -> LmsResult<Option<String>> {
        Ok(
            sqlx::query_scalar("SELECT note FROM submission_analysis WHERE submission_id = ?1")
                .bind(submission_id)
                .fetch_optional(&self.db)
                .await?,
        )
    }

    /// Users ranked by distinct solved problems.
    ///
    /// Ties go to whoever reached the count first. With a contest id only
    /// that contest's submissions count.
    pub async fn leaderboard(
        &self,
        contest_id: Option<&str>,
        limit: i64,
    ) -> LmsResult<Vec<LeaderboardEntry>> {
        let rows = sqlx::query_as::<_, LeaderboardEntry>(
            r#"
            SELECT f.user_id, u.name, COUNT(*) AS solved, MAX(f.first_at) AS last_solved_at
            FROM (
                SELECT user_id, problem_id, MIN(created_at) AS first_at
                FROM submission
                WHERE status = 'PASSED' AND (?1 IS NULL OR contest_id = ?1)
                GROUP BY user_id, problem_id
            ) f
            JOIN users u ON u.id = f.user_id
            GROUP BY f.user_id, u.name
            ORDER BY solved DESC, last_solved_at ASC, f.user_id ASC
            LIMIT ?2
            "#,
        )
        .bind(contest_id)
        .bind(limit.clamp(1, 500))
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .enumerate()
            .map(|(i, entry)| LeaderboardEntry {
                rank: i as i64 + 1,
                ..entry
            })
            .collect())
    }

    /// Distinct problems the user has passed
    pub async fn solved_problems(&self, user_id: &str) -> LmsResult<Vec<String>> {
        Ok(sqlx::query_scalar(
            r#"
            SELECT DISTINCT problem_id FROM submission
            WHERE user_id = ?1 AND status = 'PASSED'
            ORDER BY problem_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?)
    }

    /// Most recent submissions first
    pub async fn user_submissions(&self, user_id: &str, limit: i64) -> LmsResult<Vec<Submission>> {
        Ok(sqlx::query_as::<_, Submission>(
            "SELECT * FROM submission WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
        )
        .bind(user_id)
        .bind(limit.clamp(1, 500))
        .fetch_all(&self.db)
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        authz::Role,
        catalog::tests::{insert_user, module, video},
        config::ServerConfig,
        db::{
            models::{EnrollmentStatus, ModuleStatus},
            test_pool,
        },
    };
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct Harness {
        service: SubmissionService,
        catalog: Arc<CatalogManager>,
        accounts: Arc<AccountManager>,
        db: SqlitePool,
    }

    async fn harness(mastery_module_id: Option<String>) -> Harness {
        let db = test_pool().await;
        insert_user(&db, "u1").await;
        insert_user(&db, "u2").await;
        insert_user(&db, "teacher").await;

        let config = Arc::new(ServerConfig::for_tests());
        let accounts = Arc::new(AccountManager::new(db.clone(), config.clone()));
        let catalog = Arc::new(CatalogManager::new(db.clone()));
        let badges = BadgeEvaluator::new(db.clone(), mastery_module_id);
        let streaks = Arc::new(StreakTracker::new(
            db.clone(),
            config.progression.streak_utc_offset_minutes,
            badges.clone(),
        ));
        let service = SubmissionService::new(
            db.clone(),
            config.rewards.clone(),
            accounts.clone(),
            catalog.clone(),
            Arc::new(UnlockEngine::new(db.clone())),
            streaks,
            Arc::new(badges),
        );

        Harness {
            service,
            catalog,
            accounts,
            db,
        }
    }

    fn event(user_id: &str, problem_id: &str, passed: bool) -> SubmissionEvent {
        SubmissionEvent {
            user_id: user_id.to_string(),
            problem_id: problem_id.to_string(),
            module_item_id: None,
            contest_id: None,
            kind: SubmissionKind::Practice,
            code: "print(42)".to_string(),
            language: "python".to_string(),
            passed,
            duration: 30,
        }
    }

    struct RecordingSync(mpsc::UnboundedSender<SolutionFile>);

    #[async_trait]
    impl CodeSync for RecordingSync {
        async fn push_solution(&self, file: &SolutionFile) -> LmsResult<()> {
            let _ = self.0.send(file.clone());
            Ok(())
        }
    }

    struct FailingSync(mpsc::UnboundedSender<()>);

    #[async_trait]
    impl CodeSync for FailingSync {
        async fn push_solution(&self, _file: &SolutionFile) -> LmsResult<()> {
            let _ = self.0.send(());
            Err(LmsError::Integration("GitHub returned 502".to_string()))
        }
    }

    struct StuckAnalyzer;

    #[async_trait]
    impl ComplexityAnalyzer for StuckAnalyzer {
        async fn analyze(&self, _code: &str, _language: &str) -> LmsResult<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("never".to_string())
        }
    }

    struct FixedAnalyzer(mpsc::UnboundedSender<()>);

    #[async_trait]
    impl ComplexityAnalyzer for FixedAnalyzer {
        async fn analyze(&self, _code: &str, _language: &str) -> LmsResult<String> {
            let _ = self.0.send(());
            Ok("Time: O(1)\nSpace: O(1)".to_string())
        }
    }

    #[tokio::test]
    async fn test_first_pass_rewarded_once() {
        let h = harness(None).await;

        let failed = h.service.submit(event("u1", "two-sum", false)).await.unwrap();
        assert!(!failed.first_pass);
        assert_eq!(failed.submission.status, SubmissionStatus::Failed);
        assert!(failed.streak.is_none());

        let first = h.service.submit(event("u1", "two-sum", true)).await.unwrap();
        assert!(first.first_pass);
        assert_eq!(first.reward, 10);
        assert_eq!(first.streak.as_ref().map(|s| s.streak), Some(1));

        let second = h.service.submit(event("u1", "two-sum", true)).await.unwrap();
        assert!(!second.first_pass);
        assert_eq!(second.reward, 0);

        assert_eq!(h.accounts.wallet_balance("u1").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_concurrent_first_passes_reward_once() {
        let h = harness(None).await;

        let calls = (0..4).map(|_| {
            let service = h.service.clone();
            async move { service.submit(event("u1", "fizzbuzz", true)).await }
        });
        let outcomes = futures::future::join_all(calls).await;

        let rewarded = outcomes
            .iter()
            .filter(|o| o.as_ref().unwrap().first_pass)
            .count();
        assert_eq!(rewarded, 1);
        assert_eq!(h.accounts.wallet_balance("u1").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_contest_needs_contest_id() {
        let h = harness(None).await;
        let mut contest = event("u1", "p1", true);
        contest.kind = SubmissionKind::Contest;

        assert!(matches!(
            h.service.submit(contest.clone()).await,
            Err(LmsError::Validation(_))
        ));

        contest.contest_id = Some("weekly-1".to_string());
        let outcome = h.service.submit(contest).await.unwrap();
        assert_eq!(outcome.reward, 50);
    }

    #[tokio::test]
    async fn test_invalid_event_rejected_before_insert() {
        let h = harness(None).await;
        let mut bad = event("u1", "", true);
        bad.language = String::new();

        assert!(matches!(h.service.submit(bad).await, Err(LmsError::Validation(_))));
        assert!(matches!(
            h.service.submit(event("ghost", "p1", true)).await,
            Err(LmsError::NotFound(_))
        ));
        assert!(h.service.user_submissions("u1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_passing_item_drives_cascade() {
        let h = harness(None).await;
        let course = h
            .catalog
            .create_course(Role::Teacher, "teacher", "DSA", None)
            .await
            .unwrap();
        h.catalog.enroll("u1", &course.id).await.unwrap();
        let m = h
            .catalog
            .add_module(Role::Teacher, &course.id, module(1))
            .await
            .unwrap();
        let item = h.catalog.add_item(Role::Teacher, &m.id, video(1)).await.unwrap();

        let mut pass = event("u1", "two-sum", true);
        pass.module_item_id = Some(item.id.clone());
        let outcome = h.service.submit(pass).await.unwrap();

        let unlock = outcome.unlock.unwrap();
        assert!(unlock.module_completed);
        assert!(unlock.course_finished);
        assert!(outcome.enrollment_completed);

        let enrollment = h.catalog.get_enrollment("u1", &course.id).await.unwrap().unwrap();
        assert_eq!(enrollment.status, EnrollmentStatus::Completed);
    }

    #[tokio::test]
    async fn test_mastery_badge_on_module_completion() {
        let h = harness(Some("mastery".to_string())).await;
        let course = h
            .catalog
            .create_course(Role::Teacher, "teacher", "DSA", None)
            .await
            .unwrap();
        sqlx::query("INSERT INTO module (id, course_id, title, sort_order) VALUES ('mastery', ?1, 'Final', 1)")
            .bind(&course.id)
            .execute(&h.db)
            .await
            .unwrap();
        h.catalog.enroll("u1", &course.id).await.unwrap();
        let item = h.catalog.add_item(Role::Teacher, "mastery", video(1)).await.unwrap();

        let mut pass = event("u1", "final", true);
        pass.module_item_id = Some(item.id.clone());
        let outcome = h.service.submit(pass.clone()).await.unwrap();
        assert_eq!(outcome.module_badge, Some(BadgeType::ModuleMastery));

        let again = h.service.submit(pass).await.unwrap();
        assert_eq!(again.module_badge, None);
    }

    async fn submission_count(db: &SqlitePool, user_id: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM submission WHERE user_id = ?1")
            .bind(user_id)
            .fetch_one(db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_locked_module_item_rejected() {
        let h = harness(None).await;
        let course = h
            .catalog
            .create_course(Role::Teacher, "teacher", "DSA", None)
            .await
            .unwrap();
        h.catalog.enroll("u1", &course.id).await.unwrap();
        let mut items = Vec::new();
        for order in 1..=3 {
            let m = h
                .catalog
                .add_module(Role::Teacher, &course.id, module(order))
                .await
                .unwrap();
            let item = h.catalog.add_item(Role::Teacher, &m.id, video(1)).await.unwrap();
            items.push((m, item));
        }
        let unlock = UnlockEngine::new(h.db.clone());

        let mut pass = event("u1", "p2", true);
        pass.module_item_id = Some(items[1].1.id.clone());
        assert!(matches!(
            h.service.submit(pass.clone()).await,
            Err(LmsError::Forbidden(_))
        ));

        // Not enrolled at all
        let mut outsider = pass.clone();
        outsider.user_id = "u2".to_string();
        assert!(matches!(
            h.service.submit(outsider).await,
            Err(LmsError::Forbidden(_))
        ));

        assert_eq!(submission_count(&h.db, "u1").await, 0);
        assert_eq!(submission_count(&h.db, "u2").await, 0);
        for (m, _) in &items {
            assert_eq!(unlock.module_status("u1", &m.id).await.unwrap(), ModuleStatus::Locked);
            assert_eq!(unlock.module_status("u2", &m.id).await.unwrap(), ModuleStatus::Locked);
        }
        assert!(unlock.item_progress("u1", &items[1].1.id).await.unwrap().is_none());

        // Open once the module before it is done
        let mut first = event("u1", "p1", true);
        first.module_item_id = Some(items[0].1.id.clone());
        h.service.submit(first).await.unwrap();
        let outcome = h.service.submit(pass).await.unwrap();
        assert!(outcome.unlock.unwrap().module_completed);
    }

    #[tokio::test]
    async fn test_streak_failure_keeps_submission() {
        let h = harness(None).await;
        sqlx::query(
            r#"
            CREATE TRIGGER streak_down BEFORE UPDATE OF current_streak ON users
            BEGIN SELECT RAISE(ABORT, 'streak store unavailable'); END
            "#,
        )
        .execute(&h.db)
        .await
        .unwrap();

        let outcome = h.service.submit(event("u1", "two-sum", true)).await.unwrap();
        assert!(outcome.streak.is_none());
        assert!(outcome.first_pass);
        assert_eq!(outcome.reward, 10);
        assert_eq!(submission_count(&h.db, "u1").await, 1);
        assert_eq!(h.accounts.wallet_balance("u1").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_badge_failure_keeps_submission() {
        let h = harness(Some("mastery".to_string())).await;
        let course = h
            .catalog
            .create_course(Role::Teacher, "teacher", "DSA", None)
            .await
            .unwrap();
        sqlx::query("INSERT INTO module (id, course_id, title, sort_order) VALUES ('mastery', ?1, 'Final', 1)")
            .bind(&course.id)
            .execute(&h.db)
            .await
            .unwrap();
        h.catalog.enroll("u1", &course.id).await.unwrap();
        let item = h.catalog.add_item(Role::Teacher, "mastery", video(1)).await.unwrap();
        sqlx::query("DROP TABLE user_badge").execute(&h.db).await.unwrap();

        let mut pass = event("u1", "final", true);
        pass.module_item_id = Some(item.id.clone());
        let outcome = h.service.submit(pass).await.unwrap();

        assert_eq!(outcome.module_badge, None);
        let streak = outcome.streak.unwrap();
        assert_eq!(streak.streak, 1);
        assert_eq!(streak.badge_awarded, None);
        assert!(outcome.unlock.unwrap().module_completed);
        assert!(outcome.enrollment_completed);
        assert_eq!(submission_count(&h.db, "u1").await, 1);
    }

    #[tokio::test]
    async fn test_code_sync_failure_keeps_submission() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let h = harness(None).await;
        sqlx::query("UPDATE users SET github_repo = 'u1/solutions', github_token = 'ghp_x' WHERE id = 'u1'")
            .execute(&h.db)
            .await
            .unwrap();
        let service = h
            .service
            .clone()
            .with_code_sync(Arc::new(FailingSync(tx)), Duration::from_secs(5));

        let outcome = service.submit(event("u1", "two-sum", true)).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();

        assert!(outcome.first_pass);
        let history = service.user_submissions("u1", 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, outcome.submission.id);
        assert_eq!(history[0].status, SubmissionStatus::Passed);
    }

    #[tokio::test]
    async fn test_unknown_item_rejected() {
        let h = harness(None).await;
        let mut pass = event("u1", "p1", true);
        pass.module_item_id = Some("missing".to_string());

        assert!(matches!(h.service.submit(pass).await, Err(LmsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_leaderboard_ranking() {
        let h = harness(None).await;

        for problem in ["a", "b"] {
            h.service.submit(event("u1", problem, true)).await.unwrap();
        }
        for problem in ["a", "b"] {
            h.service.submit(event("u2", problem, true)).await.unwrap();
        }
        // Re-solving doesn't move u1's tie-break
        h.service.submit(event("u1", "a", true)).await.unwrap();
        h.service.submit(event("teacher", "a", true)).await.unwrap();

        let board = h.service.leaderboard(None, 10).await.unwrap();
        let order: Vec<(&str, i64, i64)> = board
            .iter()
            .map(|e| (e.user_id.as_str(), e.solved, e.rank))
            .collect();
        assert_eq!(order, vec![("u1", 2, 1), ("u2", 2, 2), ("teacher", 1, 3)]);
    }

    #[tokio::test]
    async fn test_contest_leaderboard_is_scoped() {
        let h = harness(None).await;
        let mut contest = event("u2", "c1", true);
        contest.kind = SubmissionKind::Contest;
        contest.contest_id = Some("weekly-1".to_string());
        h.service.submit(contest).await.unwrap();
        h.service.submit(event("u1", "p1", true)).await.unwrap();

        let board = h.service.leaderboard(Some("weekly-1"), 10).await.unwrap();
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].user_id, "u2");
    }

    #[tokio::test]
    async fn test_solved_problems_and_history() {
        let h = harness(None).await;
        h.service.submit(event("u1", "b", true)).await.unwrap();
        h.service.submit(event("u1", "a", true)).await.unwrap();
        h.service.submit(event("u1", "c", false)).await.unwrap();

        assert_eq!(h.service.solved_problems("u1").await.unwrap(), vec!["a", "b"]);

        let history = h.service.user_submissions("u1", 2).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].problem_id, "c");
    }

    #[tokio::test]
    async fn test_code_sync_spawned_for_linked_user() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let h = harness(None).await;
        let service = h
            .service
            .clone()
            .with_code_sync(Arc::new(RecordingSync(tx)), Duration::from_secs(5));

        // Not linked yet
        service.submit(event("u1", "p0", true)).await.unwrap();

        sqlx::query("UPDATE users SET github_repo = 'u1/solutions', github_token = 'ghp_x' WHERE id = 'u1'")
            .execute(&h.db)
            .await
            .unwrap();
        service.submit(event("u1", "two-sum", true)).await.unwrap();

        let file = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(file.repo, "u1/solutions");
        assert_eq!(file.path, "solutions/two-sum.py");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_analysis_stored() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let h = harness(None).await;
        let service = h
            .service
            .clone()
            .with_analyzer(Arc::new(FixedAnalyzer(tx)), Duration::from_secs(5));

        let outcome = service.submit(event("u1", "p1", true)).await.unwrap();
        rx.recv().await.unwrap();

        let mut note = None;
        for _ in 0..50 {
            note = service.analysis(outcome.submission.id).await.unwrap();
            if note.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(note.as_deref(), Some("Time: O(1)\nSpace: O(1)"));
    }

    #[tokio::test]
    async fn test_slow_analyzer_does_not_block_submit() {
        let h = harness(None).await;
        let service = h
            .service
            .clone()
            .with_analyzer(Arc::new(StuckAnalyzer), Duration::from_millis(50));

        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            service.submit(event("u1", "p1", true)),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(outcome.first_pass);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(service.analysis(outcome.submission.id).await.unwrap(), None);
    }
}
