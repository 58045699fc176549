/// Account manager implementation using runtime queries
use crate::{
    account::{CreateUserRequest, GithubLink},
    authz::{self, Action, Resource, Role},
    config::ServerConfig,
    db::models::User,
    error::{LmsError, LmsResult},
    progress::civil_offset,
};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

/// Account manager service
pub struct AccountManager {
    db: SqlitePool,
    config: Arc<ServerConfig>,
}

impl AccountManager {
    /// Create a new account manager
    pub fn new(db: SqlitePool, config: Arc<ServerConfig>) -> Self {
        Self { db, config }
    }

    /// Create a new user
    pub async fn create_user(&self, req: CreateUserRequest) -> LmsResult<User> {
        let name = req.name.trim().to_string();
        let email = req.email.trim().to_lowercase();

        if name.is_empty() {
            return Err(LmsError::Validation("Name cannot be empty".to_string()));
        }
        self.validate_email(&email)?;

        if self.email_exists(&email).await? {
            return Err(LmsError::Conflict("Email already registered".to_string()));
        }

        let id = Uuid::new_v4().to_string();
        let role = req.role.unwrap_or(Role::Student);
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO users (id, name, email, role, subscription_status, created_at)
             VALUES (?1, ?2, ?3, ?4, 'FREE', ?5)",
        )
        .bind(&id)
        .bind(&name)
        .bind(&email)
        .bind(role)
        .bind(now)
        .execute(&self.db)
        .await?;

        tracing::info!(user_id = %id, role = role.as_str(), "User created");

        self.get_user(&id).await
    }

    /// Get user by id
    pub async fn get_user(&self, user_id: &str) -> LmsResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?1")
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| LmsError::NotFound(format!("User {} not found", user_id)))
    }

    async fn email_exists(&self, email: &str) -> LmsResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?1")
            .bind(email)
            .fetch_one(&self.db)
            .await?;

        Ok(count > 0)
    }

    /// Change a user's role; only admins may do this
    pub async fn set_role(&self, actor_role: Role, user_id: &str, role: Role) -> LmsResult<()> {
        authz::require(actor_role, Resource::User, Action::Update)?;

        let result = sqlx::query("UPDATE users SET role = ?1 WHERE id = ?2")
            .bind(role)
            .bind(user_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LmsError::NotFound(format!("User {} not found", user_id)));
        }

        tracing::info!(user_id, role = role.as_str(), "Role updated");
        Ok(())
    }

    /// Link the repository accepted solutions are pushed to
    pub async fn link_github(&self, user_id: &str, link: GithubLink) -> LmsResult<()> {
        let repo = link.repo.trim();
        let valid = repo
            .split_once('/')
            .map(|(owner, name)| !owner.is_empty() && !name.is_empty() && !name.contains('/'))
            .unwrap_or(false);
        if !valid {
            return Err(LmsError::Validation(format!(
                "Repository must be owner/name, got '{}'",
                repo
            )));
        }
        if link.token.trim().is_empty() {
            return Err(LmsError::Validation("GitHub token cannot be empty".to_string()));
        }

        let result =
            sqlx::query("UPDATE users SET github_repo = ?1, github_token = ?2 WHERE id = ?3")
                .bind(repo)
                .bind(link.token.trim())
                .bind(user_id)
                .execute(&self.db)
                .await?;

        if result.rows_affected() == 0 {
            return Err(LmsError::NotFound(format!("User {} not found", user_id)));
        }

        Ok(())
    }

    /// Wallet month (`YYYY-MM`) an instant belongs to
    pub fn wallet_period(&self, now: DateTime<Utc>) -> String {
        let offset = civil_offset(self.config.progression.streak_utc_offset_minutes);
        now.with_timezone(&offset).format("%Y-%m").to_string()
    }

    /// Add reward currency, starting from zero when the stored month is stale.
    ///
    /// Returns the new balance.
    pub async fn credit_wallet(&self, user_id: &str, amount: i64) -> LmsResult<i64> {
        if amount < 0 {
            return Err(LmsError::Validation("Wallet credit must be positive".to_string()));
        }

        let period = self.wallet_period(Utc::now());

        let balance: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE users
            SET wallet_balance = CASE WHEN wallet_period = ?1 THEN wallet_balance + ?2 ELSE ?2 END,
                wallet_period = ?1
            WHERE id = ?3
            RETURNING wallet_balance
            "#,
        )
        .bind(&period)
        .bind(amount)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        balance.ok_or_else(|| LmsError::NotFound(format!("User {} not found", user_id)))
    }

    /// Current balance; a balance from a previous month reads as zero
    pub async fn wallet_balance(&self, user_id: &str) -> LmsResult<i64> {
        let user = self.get_user(user_id).await?;
        let period = self.wallet_period(Utc::now());

        Ok(match user.wallet_period {
            Some(p) if p == period => user.wallet_balance,
            _ => 0,
        })
    }

    /// Zero every balance that belongs to an earlier month
    pub async fn reset_stale_wallets(&self, now: DateTime<Utc>) -> LmsResult<u64> {
        let period = self.wallet_period(now);

        let result = sqlx::query(
            "UPDATE users SET wallet_balance = 0, wallet_period = ?1
             WHERE wallet_period IS NOT NULL AND wallet_period <> ?1",
        )
        .bind(&period)
        .execute(&self.db)
        .await?;

        let reset = result.rows_affected();
        if reset > 0 {
            tracing::info!(reset, period = %period, "Reset stale wallets");
        } else {
            tracing::debug!("Wallet reset: nothing to do");
        }

        Ok(reset)
    }

    fn validate_email(&self, email: &str) -> LmsResult<()> {
        let valid = email
            .split_once('@')
            .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
            .unwrap_or(false);

        if !valid {
            return Err(LmsError::Validation(format!("Invalid email: {}", email)));
        }

        Ok(())
    }
}
