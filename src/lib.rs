//! Learnhub - course progression service
//!
//! Module unlocking, daily streaks, badges, submission rewards and referral
//! trials for the Learnhub learning platform, backed by SQLite. Handlers
//! call these services in-process through an [`AppContext`].

pub mod account;
pub mod api;
pub mod authz;
pub mod catalog;
pub mod config;
pub mod content;
pub mod context;
pub mod db;
pub mod error;
pub mod integrations;
pub mod jobs;
pub mod metrics;
pub mod progress;
pub mod referral;
pub mod server;
pub mod submissions;

pub use config::ServerConfig;
pub use context::AppContext;
pub use error::{LmsError, LmsResult};
