/// Background task implementations
use crate::{context::AppContext, error::LmsResult};
use chrono::Utc;

/// Move lapsed referral trials back to FREE
pub async fn expire_trials(ctx: &AppContext) -> LmsResult<u64> {
    ctx.referrals.expire_trials(Utc::now()).await
}

/// Zero wallet balances that belong to an earlier month
pub async fn reset_stale_wallets(ctx: &AppContext) -> LmsResult<u64> {
    ctx.accounts.reset_stale_wallets(Utc::now()).await
}

/// Health check - verify all systems are operational
pub async fn health_check(ctx: &AppContext) -> LmsResult<()> {
    // Check database connectivity
    sqlx::query("SELECT 1").fetch_one(&ctx.db).await?;

    // All checks passed
    Ok(())
}
