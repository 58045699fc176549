/// Authorization capability checks
///
/// Every role decision goes through `authorize`, keyed on
/// `(role, resource, action)`.
use crate::error::{LmsError, LmsResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// User role levels
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Takes courses and submits solutions
    Student,
    /// Authors courses and reviews submissions
    Teacher,
    /// Full access
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "STUDENT",
            Role::Teacher => "TEACHER",
            Role::Admin => "ADMIN",
        }
    }

    /// Check if this role can perform actions requiring another role
    pub fn can_act_as(&self, required: Role) -> bool {
        self >= &required
    }
}

impl FromStr for Role {
    type Err = LmsError;

    fn from_str(s: &str) -> LmsResult<Self> {
        match s.to_uppercase().as_str() {
            "STUDENT" => Ok(Role::Student),
            "TEACHER" => Ok(Role::Teacher),
            "ADMIN" => Ok(Role::Admin),
            _ => Err(LmsError::Validation(format!("Invalid role: {}", s))),
        }
    }
}

/// Things a capability can be checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Course,
    Module,
    ModuleItem,
    ItemReview,
    Submission,
    ReferralCode,
    Leaderboard,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
    Review,
}

/// Minimum role needed for an action on a resource, `None` when nobody may
fn required_role(resource: Resource, action: Action) -> Option<Role> {
    use Action::*;
    use Resource::*;

    match (resource, action) {
        (Course | Module | ModuleItem | Leaderboard, Read) => Some(Role::Student),
        (Course | Module | ModuleItem, Create | Update) => Some(Role::Teacher),
        (Course | Module | ModuleItem, Delete) => Some(Role::Admin),

        (ItemReview, Read | Review) => Some(Role::Teacher),
        (ItemReview, Create) => Some(Role::Student),
        (ItemReview, Update | Delete) => Some(Role::Admin),

        // Submissions are append-only
        (Submission, Create | Read) => Some(Role::Student),
        (Submission, Update | Delete) => None,

        (ReferralCode, Create | Read) => Some(Role::Student),
        (ReferralCode, Delete) => Some(Role::Admin),

        (User, Read) => Some(Role::Teacher),
        (User, Update | Delete) => Some(Role::Admin),

        _ => None,
    }
}

/// Decide whether `role` may perform `action` on `resource`
pub fn authorize(role: Role, resource: Resource, action: Action) -> bool {
    required_role(resource, action)
        .map(|required| role.can_act_as(required))
        .unwrap_or(false)
}

/// Like `authorize`, but as a `Forbidden` error
pub fn require(role: Role, resource: Resource, action: Action) -> LmsResult<()> {
    if authorize(role, resource, action) {
        Ok(())
    } else {
        tracing::warn!(
            role = role.as_str(),
            ?resource,
            ?action,
            "authorization denied"
        );
        Err(LmsError::Forbidden(format!(
            "{} may not {:?} {:?}",
            role.as_str(),
            action,
            resource
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_hierarchy() {
        assert!(Role::Admin > Role::Teacher);
        assert!(Role::Teacher > Role::Student);

        assert!(Role::Admin.can_act_as(Role::Teacher));
        assert!(Role::Teacher.can_act_as(Role::Student));
        assert!(!Role::Student.can_act_as(Role::Teacher));
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!(Role::from_str("student").unwrap(), Role::Student);
        assert_eq!(Role::from_str("TEACHER").unwrap(), Role::Teacher);
        assert_eq!(Role::from_str("Admin").unwrap(), Role::Admin);
        assert!(Role::from_str("moderator").is_err());
        assert_eq!(" admin".trim().parse::<Role>().unwrap(), Role::Admin);
    }

    #[test]
    fn test_authoring_requires_teacher() {
        assert!(!authorize(Role::Student, Resource::Course, Action::Create));
        assert!(authorize(Role::Teacher, Resource::Module, Action::Create));
        assert!(authorize(Role::Admin, Resource::ModuleItem, Action::Update));
        assert!(!authorize(Role::Teacher, Resource::Course, Action::Delete));
    }

    #[test]
    fn test_review_capability() {
        assert!(authorize(Role::Student, Resource::ItemReview, Action::Create));
        assert!(!authorize(Role::Student, Resource::ItemReview, Action::Review));
        assert!(authorize(Role::Teacher, Resource::ItemReview, Action::Review));
    }

    #[test]
    fn test_submissions_are_immutable() {
        assert!(!authorize(Role::Admin, Resource::Submission, Action::Update));
        assert!(!authorize(Role::Admin, Resource::Submission, Action::Delete));
        assert!(require(Role::Student, Resource::Submission, Action::Create).is_ok());
    }

    #[test]
    fn test_unlisted_pairs_are_denied() {
        assert!(!authorize(Role::Admin, Resource::Leaderboard, Action::Review));
        assert!(matches!(
            require(Role::Admin, Resource::ReferralCode, Action::Review),
            Err(LmsError::Forbidden(_))
        ));
    }
}
