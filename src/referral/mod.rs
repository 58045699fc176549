/// Referral codes and trial access
///
/// A code is single-use: redeeming it deletes the row and grants the
/// redeeming user a trial, both inside one transaction.
use crate::{
    authz::{self, Action, Resource, Role},
    db::models::{ReferralCode, SubscriptionStatus},
    error::{LmsError, LmsResult},
    metrics,
};
use chrono::{DateTime, Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// Result of a successful redemption
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialGrant {
    pub user_id: String,
    pub referred_by: String,
    pub trial_expires_at: DateTime<Utc>,
}

/// Referral code manager
#[derive(Clone)]
pub struct ReferralManager {
    db: SqlitePool,
    trial_days: i64,
}

impl ReferralManager {
    pub fn new(db: SqlitePool, trial_days: i64) -> Self {
        Self { db, trial_days }
    }

    /// Generate a new referral code
    pub fn generate_code() -> String {
        let code: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(10)
            .map(char::from)
            .collect();

        format!("ref-{}", code)
    }

    /// Create a referral code owned by `created_by`
    pub async fn create_code(&self, created_by: &str) -> LmsResult<ReferralCode> {
        let code = ReferralCode {
            code: Self::generate_code(),
            created_by: created_by.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO referral_code (code, created_by, created_at)
            VALUES (?1, ?2, ?3)
            "#,
        )
        .bind(&code.code)
        .bind(&code.created_by)
        .bind(code.created_at)
        .execute(&self.db)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                LmsError::NotFound(format!("User {} not found", created_by))
            }
            _ => LmsError::Database(e),
        })?;

        tracing::info!(created_by, "Referral code created");
        Ok(code)
    }

    /// Unredeemed codes a user created, newest first
    pub async fn list_codes(&self, created_by: &str) -> LmsResult<Vec<ReferralCode>> {
        Ok(sqlx::query_as::<_, ReferralCode>(
            "SELECT * FROM referral_code WHERE created_by = ?1 ORDER BY created_at DESC",
        )
        .bind(created_by)
        .fetch_all(&self.db)
        .await?)
    }

    /// Delete an unredeemed code; admins only
    pub async fn revoke_code(&self, role: Role, code: &str) -> LmsResult<()> {
        authz::require(role, Resource::ReferralCode, Action::Delete)?;

        let result = sqlx::query("DELETE FROM referral_code WHERE code = ?1")
            .bind(code)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LmsError::NotFound("Referral code not found".to_string()));
        }

        Ok(())
    }

    /// Redeem a code for `user_id`, granting a trial.
    ///
    /// The code deletion and the trial grant commit together or not at all.
    pub async fn redeem(&self, code: &str, user_id: &str) -> LmsResult<TrialGrant> {
        let result = self.redeem_in_tx(code, user_id).await;
        metrics::record_referral_redemption(result.is_ok());

        match &result {
            Ok(grant) => tracing::info!(
                user_id,
                referred_by = %grant.referred_by,
                expires_at = %grant.trial_expires_at,
                "Referral redeemed"
            ),
            Err(e) => tracing::debug!(user_id, error = %e, "Referral redemption rejected"),
        }

        result
    }

    async fn redeem_in_tx(&self, code: &str, user_id: &str) -> LmsResult<TrialGrant> {
        let mut tx = self.db.begin().await?;

        let referred_by: String =
            sqlx::query_scalar("DELETE FROM referral_code WHERE code = ?1 RETURNING created_by")
                .bind(code)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| LmsError::NotFound("Referral code not found".to_string()))?;

        if referred_by == user_id {
            return Err(LmsError::Validation(
                "Cannot redeem your own referral code".to_string(),
            ));
        }

        let status: SubscriptionStatus =
            sqlx::query_scalar("SELECT subscription_status FROM users WHERE id = ?1")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| LmsError::NotFound(format!("User {} not found", user_id)))?;

        if status == SubscriptionStatus::Paid {
            return Err(LmsError::Conflict("User already has a paid plan".to_string()));
        }

        let trial_expires_at = Utc::now() + Duration::days(self.trial_days);

        sqlx::query(
            "UPDATE users SET subscription_status = ?1, trial_expires_at = ?2 WHERE id = ?3",
        )
        .bind(SubscriptionStatus::Trial)
        .bind(trial_expires_at)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(TrialGrant {
            user_id: user_id.to_string(),
            referred_by,
            trial_expires_at,
        })
    }

    /// Paid users, and trial users whose trial has not ended
    pub async fn has_access(&self, user_id: &str, now: DateTime<Utc>) -> LmsResult<bool> {
        let row = sqlx::query("SELECT subscription_status, trial_expires_at FROM users WHERE id = ?1")
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| LmsError::NotFound(format!("User {} not found", user_id)))?;

        let status: SubscriptionStatus = row.try_get("subscription_status")?;
        let expires_at: Option<DateTime<Utc>> = row.try_get("trial_expires_at")?;

        Ok(match status {
            SubscriptionStatus::Paid => true,
            SubscriptionStatus::Trial => expires_at.is_some_and(|t| t > now),
            SubscriptionStatus::Free => false,
        })
    }

    /// Move lapsed trials back to FREE
    pub async fn expire_trials(&self, now: DateTime<Utc>) -> LmsResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE users SET subscription_status = 'FREE'
            WHERE subscription_status = 'TRIAL'
              AND (trial_expires_at IS NULL OR trial_expires_at <= ?1)
            "#,
        )
        .bind(now)
        .execute(&self.db)
        .await?;

        let expired = result.rows_affected();
        if expired > 0 {
            tracing::info!(expired, "Expired referral trials");
        }

        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::insert_user;
    use crate::db::test_pool;

    async fn manager() -> ReferralManager {
        let db = test_pool().await;
        for id in ["alice", "bob", "carol"] {
            insert_user(&db, id).await;
        }
        ReferralManager::new(db, 4)
    }

    async fn status(manager: &ReferralManager, user_id: &str) -> SubscriptionStatus {
        sqlx::query_scalar("SELECT subscription_status FROM users WHERE id = ?1")
            .bind(user_id)
            .fetch_one(&manager.db)
            .await
            .unwrap()
    }

    #[test]
    fn test_generate_code_format() {
        let code = ReferralManager::generate_code();
        assert!(code.starts_with("ref-"));
        assert_eq!(code.len(), 14);
        assert!(code[4..].chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(code, ReferralManager::generate_code());
    }

    #[tokio::test]
    async fn test_redeem_grants_four_day_trial() {
        let manager = manager().await;
        let code = manager.create_code("alice").await.unwrap();

        let before = Utc::now();
        let grant = manager.redeem(&code.code, "bob").await.unwrap();
        let after = Utc::now();

        assert_eq!(grant.referred_by, "alice");
        assert!(grant.trial_expires_at >= before + Duration::days(4));
        assert!(grant.trial_expires_at <= after + Duration::days(4));
        assert_eq!(status(&manager, "bob").await, SubscriptionStatus::Trial);
        assert!(manager.has_access("bob", Utc::now()).await.unwrap());

        // Single use
        assert!(matches!(
            manager.redeem(&code.code, "carol").await,
            Err(LmsError::NotFound(_))
        ));
        assert!(manager.list_codes("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_self_redeem_rolls_back() {
        let manager = manager().await;
        let code = manager.create_code("alice").await.unwrap();

        assert!(matches!(
            manager.redeem(&code.code, "alice").await,
            Err(LmsError::Validation(_))
        ));
        assert_eq!(manager.list_codes("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_paid_user_rolls_back() {
        let manager = manager().await;
        let code = manager.create_code("alice").await.unwrap();
        sqlx::query("UPDATE users SET subscription_status = 'PAID' WHERE id = 'bob'")
            .execute(&manager.db)
            .await
            .unwrap();

        assert!(matches!(
            manager.redeem(&code.code, "bob").await,
            Err(LmsError::Conflict(_))
        ));

        // Neither write happened
        assert_eq!(status(&manager, "bob").await, SubscriptionStatus::Paid);
        assert_eq!(manager.list_codes("alice").await.unwrap().len(), 1);

        // The code still works for someone else
        manager.redeem(&code.code, "carol").await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_user_keeps_code() {
        let manager = manager().await;
        let code = manager.create_code("alice").await.unwrap();

        assert!(matches!(
            manager.redeem(&code.code, "ghost").await,
            Err(LmsError::NotFound(_))
        ));
        assert_eq!(manager.list_codes("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_expire_trials() {
        let manager = manager().await;
        let code = manager.create_code("alice").await.unwrap();
        manager.redeem(&code.code, "bob").await.unwrap();

        assert_eq!(manager.expire_trials(Utc::now()).await.unwrap(), 0);

        let later = Utc::now() + Duration::days(5);
        assert!(!manager.has_access("bob", later).await.unwrap());
        assert_eq!(manager.expire_trials(later).await.unwrap(), 1);
        assert_eq!(status(&manager, "bob").await, SubscriptionStatus::Free);
    }

    #[tokio::test]
    async fn test_revoke_requires_admin() {
        let manager = manager().await;
        let code = manager.create_code("alice").await.unwrap();

        assert!(matches!(
            manager.revoke_code(Role::Teacher, &code.code).await,
            Err(LmsError::Forbidden(_))
        ));
        manager.revoke_code(Role::Admin, &code.code).await.unwrap();
        assert!(matches!(
            manager.revoke_code(Role::Admin, &code.code).await,
            Err(LmsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_code_for_unknown_user() {
        let manager = manager().await;
        assert!(matches!(
            manager.create_code("ghost").await,
            Err(LmsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_free_user_has_no_access() {
        let manager = manager().await;
        assert!(!manager.has_access("carol", Utc::now()).await.unwrap());
        tokio_test::assert_ok!(manager.has_access("alice", Utc::now()).await);
    }
}
