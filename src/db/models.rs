/// Row models and status enums for the progression schema
use crate::authz::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Subscription tier gating paid content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Free,
    Trial,
    Paid,
}

/// Per-user module state. A missing row reads as `Locked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleStatus {
    Locked,
    InProgress,
    Completed,
}

/// Kinds of module items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemKind {
    Video,
    Leetcode,
    Assignment,
    AiInterview,
    WebDev,
    Test,
}

/// Manual grading outcome for review-required items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrollmentStatus {
    Active,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    Passed,
    Failed,
}

/// Which handler produced a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionKind {
    Assignment,
    Practice,
    Contest,
    WebDev,
    Test,
}

impl SubmissionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionKind::Assignment => "assignment",
            SubmissionKind::Practice => "practice",
            SubmissionKind::Contest => "contest",
            SubmissionKind::WebDev => "web_dev",
            SubmissionKind::Test => "test",
        }
    }
}

/// One-time achievements
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
pub enum BadgeType {
    #[serde(rename = "PROBLEMS_50")]
    #[sqlx(rename = "PROBLEMS_50")]
    Problems50,
    #[serde(rename = "PROBLEMS_100")]
    #[sqlx(rename = "PROBLEMS_100")]
    Problems100,
    #[serde(rename = "PROBLEMS_150")]
    #[sqlx(rename = "PROBLEMS_150")]
    Problems150,
    #[serde(rename = "PROBLEMS_200")]
    #[sqlx(rename = "PROBLEMS_200")]
    Problems200,
    #[serde(rename = "MODULE_MASTERY")]
    #[sqlx(rename = "MODULE_MASTERY")]
    ModuleMastery,
}

impl BadgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BadgeType::Problems50 => "PROBLEMS_50",
            BadgeType::Problems100 => "PROBLEMS_100",
            BadgeType::Problems150 => "PROBLEMS_150",
            BadgeType::Problems200 => "PROBLEMS_200",
            BadgeType::ModuleMastery => "MODULE_MASTERY",
        }
    }

    /// Solved-problem threshold, `None` for non-count badges
    pub fn threshold(&self) -> Option<i64> {
        match self {
            BadgeType::Problems50 => Some(50),
            BadgeType::Problems100 => Some(100),
            BadgeType::Problems150 => Some(150),
            BadgeType::Problems200 => Some(200),
            BadgeType::ModuleMastery => None,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub subscription_status: SubscriptionStatus,
    pub trial_expires_at: Option<DateTime<Utc>>,
    pub wallet_balance: i64,
    /// Month (`YYYY-MM`) the balance belongs to
    pub wallet_period: Option<String>,
    pub current_streak: i64,
    pub last_activity_date: Option<DateTime<Utc>>,
    /// `owner/name` of the linked repository
    pub github_repo: Option<String>,
    #[serde(skip_serializing)]
    pub github_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Module {
    pub id: String,
    pub course_id: String,
    pub title: String,
    #[sqlx(rename = "sort_order")]
    pub order: i64,
    pub time_limit_minutes: Option<i64>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ModuleItem {
    pub id: String,
    pub module_id: String,
    pub title: String,
    pub kind: ItemKind,
    #[sqlx(rename = "sort_order")]
    pub order: i64,
    /// Versioned JSON, see `content::ItemContent`
    pub content: String,
    pub problem_id: Option<String>,
    pub requires_review: bool,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Enrollment {
    pub user_id: String,
    pub course_id: String,
    pub status: EnrollmentStatus,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ModuleProgress {
    pub user_id: String,
    pub module_id: String,
    pub status: ModuleStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ModuleItemProgress {
    pub user_id: String,
    pub module_item_id: String,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub review_status: Option<ReviewStatus>,
    /// Accumulated seconds spent on the item
    pub duration: i64,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Submission {
    pub id: i64,
    pub user_id: String,
    pub problem_id: String,
    pub module_item_id: Option<String>,
    pub contest_id: Option<String>,
    pub kind: SubmissionKind,
    pub code: String,
    pub language: String,
    pub status: SubmissionStatus,
    pub duration: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserBadge {
    pub user_id: String,
    pub badge_type: BadgeType,
    pub awarded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ReferralCode {
    pub code: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_badge_serialization_names() {
        assert_eq!(
            serde_json::to_string(&BadgeType::Problems100).unwrap(),
            "\"PROBLEMS_100\""
        );
        assert_eq!(BadgeType::ModuleMastery.as_str(), "MODULE_MASTERY");
        assert_eq!(BadgeType::ModuleMastery.threshold(), None);
    }

    #[test]
    fn test_status_serialization_names() {
        assert_eq!(
            serde_json::to_string(&ModuleStatus::InProgress).unwrap(),
            "\"IN_PROGRESS\""
        );
        assert_eq!(
            serde_json::to_string(&ItemKind::AiInterview).unwrap(),
            "\"AI_INTERVIEW\""
        );
    }
}
