/// Metrics for the Learnhub progression service
///
/// Prometheus counters for:
/// - Module completions and unlocks
/// - Badge awards and streak updates
/// - Submissions, wallet rewards and referral redemptions
/// - Integration failures and background jobs

use lazy_static::lazy_static;
use prometheus::{
    register_gauge, register_histogram_vec, register_int_counter, register_int_counter_vec,
    Encoder, Gauge, HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Ops HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    // ========== Progression Metrics ==========

    /// Modules moved to COMPLETED
    pub static ref MODULE_COMPLETIONS_TOTAL: IntCounter = register_int_counter!(
        "module_completions_total",
        "Total number of module completions"
    )
    .unwrap();

    /// Modules moved out of LOCKED by the cascade
    pub static ref MODULE_UNLOCKS_TOTAL: IntCounter = register_int_counter!(
        "module_unlocks_total",
        "Total number of modules unlocked by completing the previous one"
    )
    .unwrap();

    /// Badges awarded by badge type
    pub static ref BADGES_AWARDED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "badges_awarded_total",
        "Total number of badges awarded",
        &["badge_type"]
    )
    .unwrap();

    /// Streak updates by outcome (extended, reset, unchanged)
    pub static ref STREAK_UPDATES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "streak_updates_total",
        "Total number of activity records by streak outcome",
        &["outcome"]
    )
    .unwrap();

    // ========== Reward Metrics ==========

    /// Submissions by kind and status
    pub static ref SUBMISSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "submissions_total",
        "Total number of submissions",
        &["kind", "status"]
    )
    .unwrap();

    /// Wallet currency credited by submission kind
    pub static ref WALLET_CREDITS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "wallet_credits_total",
        "Total wallet currency credited for first passes",
        &["kind"]
    )
    .unwrap();

    /// Referral redemptions by result
    pub static ref REFERRAL_REDEMPTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "referral_redemptions_total",
        "Total number of referral redemption attempts",
        &["status"]
    )
    .unwrap();

    // ========== Integration Metrics ==========

    /// Failed or timed out best-effort integration calls
    pub static ref INTEGRATION_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "integration_failures_total",
        "Total number of failed integration calls",
        &["integration"]
    )
    .unwrap();

    // ========== Background Job Metrics ==========

    /// Background job executions by job type and status
    pub static ref BACKGROUND_JOBS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "background_jobs_total",
        "Total number of background job executions",
        &["job_type", "status"]
    )
    .unwrap();

    /// Background job duration in seconds
    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "background_job_duration_seconds",
        "Background job execution time in seconds",
        &["job_type"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]
    )
    .unwrap();

    // ========== System Metrics ==========

    /// Application uptime in seconds
    pub static ref UPTIME_SECONDS: Gauge = register_gauge!(
        "uptime_seconds",
        "Application uptime in seconds"
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Record an ops HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
}

pub fn record_module_completed() {
    MODULE_COMPLETIONS_TOTAL.inc();
}

pub fn record_module_unlocked() {
    MODULE_UNLOCKS_TOTAL.inc();
}

pub fn record_badge_awarded(badge_type: &str) {
    BADGES_AWARDED_TOTAL.with_label_values(&[badge_type]).inc();
}

pub fn record_streak_update(outcome: &str) {
    STREAK_UPDATES_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record a persisted submission
pub fn record_submission(kind: &str, passed: bool) {
    SUBMISSIONS_TOTAL
        .with_label_values(&[kind, if passed { "passed" } else { "failed" }])
        .inc();
}

/// Record a first-pass wallet credit
pub fn record_wallet_credit(kind: &str, amount: i64) {
    if amount > 0 {
        WALLET_CREDITS_TOTAL
            .with_label_values(&[kind])
            .inc_by(amount as u64);
    }
}

pub fn record_referral_redemption(success: bool) {
    REFERRAL_REDEMPTIONS_TOTAL
        .with_label_values(&[if success { "success" } else { "failure" }])
        .inc();
}

pub fn record_integration_failure(integration: &str) {
    INTEGRATION_FAILURES_TOTAL
        .with_label_values(&[integration])
        .inc();
}

/// Record a background job execution
pub fn record_background_job(job_type: &str, status: &str, duration: f64) {
    BACKGROUND_JOBS_TOTAL
        .with_label_values(&[job_type, status])
        .inc();
    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job_type])
        .observe(duration);
}
