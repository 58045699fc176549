/// Application context and dependency injection
use crate::{
    account::AccountManager,
    catalog::CatalogManager,
    config::ServerConfig,
    db,
    error::{LmsError, LmsResult},
    integrations::{GithubSync, OpenAiAnalyzer},
    progress::{BadgeEvaluator, StreakTracker, UnlockEngine},
    referral::ReferralManager,
    submissions::SubmissionService,
};
use sqlx::SqlitePool;
use std::{sync::Arc, time::Duration, time::Instant};

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub accounts: Arc<AccountManager>,
    pub catalog: Arc<CatalogManager>,
    // Progression
    pub unlock: Arc<UnlockEngine>,
    pub streaks: Arc<StreakTracker>,
    pub badges: Arc<BadgeEvaluator>,
    // Rewards
    pub referrals: Arc<ReferralManager>,
    pub submissions: Arc<SubmissionService>,
    pub started_at: Instant,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> LmsResult<Self> {
        // Validate configuration
        config.validate()?;

        // Create data directories if they don't exist
        Self::ensure_directories(&config).await?;

        let options = db::DatabaseOptions {
            max_connections: config.storage.max_connections,
            ..Default::default()
        };
        let pool = db::create_pool(&config.storage.database, options).await?;

        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;

        Self::with_pool(config, pool)
    }

    /// Wire every service over an already migrated pool
    pub fn with_pool(config: ServerConfig, db: SqlitePool) -> LmsResult<Self> {
        let config = Arc::new(config);

        let accounts = Arc::new(AccountManager::new(db.clone(), config.clone()));
        let catalog = Arc::new(CatalogManager::new(db.clone()));
        let unlock = Arc::new(UnlockEngine::new(db.clone()));

        let badges = BadgeEvaluator::new(db.clone(), config.progression.mastery_module_id.clone());
        let streaks = Arc::new(StreakTracker::new(
            db.clone(),
            config.progression.streak_utc_offset_minutes,
            badges.clone(),
        ));
        let badges = Arc::new(badges);

        let referrals = Arc::new(ReferralManager::new(
            db.clone(),
            config.rewards.referral_trial_days,
        ));

        let mut submissions = SubmissionService::new(
            db.clone(),
            config.rewards.clone(),
            accounts.clone(),
            catalog.clone(),
            unlock.clone(),
            streaks.clone(),
            badges.clone(),
        );

        // Integrations are optional and only enabled when configured
        if let Some(github) = &config.github {
            tracing::info!(api_url = %github.api_url, "GitHub sync enabled");
            submissions = submissions.with_code_sync(
                Arc::new(GithubSync::new(github)?),
                Duration::from_secs(github.timeout_secs),
            );
        } else {
            tracing::info!("GitHub sync disabled");
        }

        if let Some(ai) = &config.ai {
            tracing::info!(model = %ai.model, "Complexity analysis enabled");
            submissions = submissions.with_analyzer(
                Arc::new(OpenAiAnalyzer::new(ai)?),
                Duration::from_secs(ai.timeout_secs),
            );
        } else {
            tracing::info!("Complexity analysis disabled");
        }

        Ok(Self {
            config,
            db,
            accounts,
            catalog,
            unlock,
            streaks,
            badges,
            referrals,
            submissions: Arc::new(submissions),
            started_at: Instant::now(),
        })
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &ServerConfig) -> LmsResult<()> {
        let dir = &config.storage.data_directory;
        if !dir.exists() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                LmsError::Internal(format!("Failed to create directory {:?}: {}", dir, e))
            })?;
        }

        Ok(())
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}
