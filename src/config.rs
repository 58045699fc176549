/// Configuration management for Learnhub
use crate::{
    db::models::SubmissionKind,
    error::{LmsError, LmsResult},
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub progression: ProgressionConfig,
    pub rewards: RewardConfig,
    pub github: Option<GithubConfig>,
    pub ai: Option<AiConfig>,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
    pub max_connections: u32,
}

/// Streak and badge rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressionConfig {
    /// Offset east of UTC, in minutes, that defines the civil activity day
    pub streak_utc_offset_minutes: i32,
    /// Module whose completion earns the module mastery badge
    pub mastery_module_id: Option<String>,
}

/// Wallet rewards for first passing submissions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardConfig {
    pub practice: i64,
    pub assignment: i64,
    pub contest: i64,
    pub web_dev: i64,
    pub test: i64,
    /// Length of a referral trial in days
    pub referral_trial_days: i64,
}

/// GitHub repository sync
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    pub api_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

/// AI complexity analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            streak_utc_offset_minutes: 330,
            mastery_module_id: None,
        }
    }
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            practice: 10,
            assignment: 20,
            contest: 50,
            web_dev: 30,
            test: 20,
            referral_trial_days: 4,
        }
    }
}

impl RewardConfig {
    /// Wallet reward for a first pass of the given kind
    pub fn for_kind(&self, kind: SubmissionKind) -> i64 {
        match kind {
            SubmissionKind::Practice => self.practice,
            SubmissionKind::Assignment => self.assignment,
            SubmissionKind::Contest => self.contest,
            SubmissionKind::WebDev => self.web_dev,
            SubmissionKind::Test => self.test,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> LmsResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("LMS_HOSTNAME").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("LMS_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| LmsError::Validation("Invalid port number".to_string()))?;
        let version =
            env::var("LMS_VERSION").unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

        let data_directory: PathBuf = env::var("LMS_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("LMS_DATABASE_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("learnhub.sqlite"));
        let max_connections = env_parse("LMS_DATABASE_MAX_CONNECTIONS", 10);

        let progression = ProgressionConfig {
            streak_utc_offset_minutes: env_parse("LMS_STREAK_UTC_OFFSET_MINUTES", 330),
            mastery_module_id: env::var("LMS_MASTERY_MODULE_ID")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        };

        let defaults = RewardConfig::default();
        let rewards = RewardConfig {
            practice: env_parse("LMS_REWARD_PRACTICE", defaults.practice),
            assignment: env_parse("LMS_REWARD_ASSIGNMENT", defaults.assignment),
            contest: env_parse("LMS_REWARD_CONTEST", defaults.contest),
            web_dev: env_parse("LMS_REWARD_WEB_DEV", defaults.web_dev),
            test: env_parse("LMS_REWARD_TEST", defaults.test),
            referral_trial_days: env_parse("LMS_REFERRAL_TRIAL_DAYS", defaults.referral_trial_days),
        };

        let github_enabled = env_parse("LMS_GITHUB_SYNC_ENABLED", false);
        let github = if github_enabled {
            Some(GithubConfig {
                api_url: env::var("LMS_GITHUB_API_URL")
                    .unwrap_or_else(|_| "https://api.github.com".to_string()),
                user_agent: format!("learnhub/{}", env!("CARGO_PKG_VERSION")),
                timeout_secs: env_parse("LMS_GITHUB_TIMEOUT_SECS", 10),
            })
        } else {
            None
        };

        let ai = if let Ok(api_key) = env::var("LMS_OPENAI_API_KEY") {
            Some(AiConfig {
                api_key,
                base_url: env::var("LMS_OPENAI_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                model: env::var("LMS_OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                timeout_secs: env_parse("LMS_OPENAI_TIMEOUT_SECS", 20),
            })
        } else {
            None
        };

        let level = env::var("RUST_LOG")
            .unwrap_or_else(|_| "learnhub=debug,tower_http=debug".to_string());
        let json = env::var("LMS_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
            },
            storage: StorageConfig {
                data_directory,
                database,
                max_connections,
            },
            progression,
            rewards,
            github,
            ai,
            logging: LoggingConfig { level, json },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> LmsResult<()> {
        if self.service.hostname.is_empty() {
            return Err(LmsError::Validation("Hostname cannot be empty".to_string()));
        }

        // chrono::FixedOffset accepts strictly less than a day either way
        if self.progression.streak_utc_offset_minutes.abs() >= 24 * 60 {
            return Err(LmsError::Validation(format!(
                "Streak UTC offset out of range: {} minutes",
                self.progression.streak_utc_offset_minutes
            )));
        }

        if self.rewards.referral_trial_days <= 0 {
            return Err(LmsError::Validation(
                "Referral trial length must be positive".to_string(),
            ));
        }

        if self.storage.max_connections == 0 {
            return Err(LmsError::Validation(
                "Database pool needs at least one connection".to_string(),
            ));
        }

        Ok(())
    }

    /// Configuration used by unit tests
    #[cfg(test)]
    pub fn for_tests() -> Self {
        ServerConfig {
            service: ServiceConfig {
                hostname: "localhost".to_string(),
                port: 8080,
                version: "0.1.0".to_string(),
            },
            storage: StorageConfig {
                data_directory: PathBuf::from("./data"),
                database: PathBuf::from(":memory:"),
                max_connections: 1,
            },
            progression: ProgressionConfig::default(),
            rewards: RewardConfig::default(),
            github: None,
            ai: None,
            logging: LoggingConfig {
                level: "info".to_string(),
                json: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ServerConfig::for_tests().validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_offset() {
        let mut config = ServerConfig::for_tests();
        config.progression.streak_utc_offset_minutes = 24 * 60;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_non_positive_trial() {
        let mut config = ServerConfig::for_tests();
        config.rewards.referral_trial_days = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reward_per_kind() {
        let rewards = RewardConfig::default();
        assert_eq!(rewards.for_kind(SubmissionKind::Contest), 50);
        assert_eq!(rewards.for_kind(SubmissionKind::Practice), 10);
    }
}
