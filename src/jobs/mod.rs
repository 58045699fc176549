use std::sync::Arc;
use std::time::Instant;
use tokio::time::{interval, Duration};
use tracing::{error, info};

use crate::metrics;

pub mod tasks;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        // Spawn maintenance tasks
        tokio::spawn(Self::trial_expiry_job(Arc::clone(&self)));
        tokio::spawn(Self::wallet_reset_job(Arc::clone(&self)));

        // Spawn monitoring tasks
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Downgrade lapsed referral trials (runs every 15 minutes)
    async fn trial_expiry_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(900)); // Every 15 minutes

        loop {
            interval.tick().await;
            let started = Instant::now();

            match tasks::expire_trials(&scheduler.context).await {
                Ok(count) => {
                    metrics::record_background_job("trial_expiry", "success", started.elapsed().as_secs_f64());
                    if count > 0 {
                        info!("Expired {} referral trials", count);
                    }
                }
                Err(e) => {
                    metrics::record_background_job("trial_expiry", "failure", started.elapsed().as_secs_f64());
                    error!("Failed to expire trials: {}", e);
                }
            }
        }
    }

    /// Zero wallets left over from a previous month (runs hourly)
    async fn wallet_reset_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(3600)); // Every hour

        loop {
            interval.tick().await;
            let started = Instant::now();

            match tasks::reset_stale_wallets(&scheduler.context).await {
                Ok(count) => {
                    metrics::record_background_job("wallet_reset", "success", started.elapsed().as_secs_f64());
                    if count > 0 {
                        info!("Reset {} wallets for the new month", count);
                    }
                }
                Err(e) => {
                    metrics::record_background_job("wallet_reset", "failure", started.elapsed().as_secs_f64());
                    error!("Failed to reset wallets: {}", e);
                }
            }
        }
    }

    /// Health check job (runs every 5 minutes)
    async fn health_check_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(300)); // Every 5 minutes

        loop {
            interval.tick().await;

            metrics::UPTIME_SECONDS.set(scheduler.context.uptime().as_secs_f64());

            match tasks::health_check(&scheduler.context).await {
                Ok(_) => {
                    // Silent success - health is good
                }
                Err(e) => error!("Health check failed: {}", e),
            }
        }
    }
}
