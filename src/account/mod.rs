/// User account management
///
/// Handles user records, roles, GitHub links and the monthly wallet.

mod manager;

pub use manager::AccountManager;

use serde::{Deserialize, Serialize};

/// Account creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub role: Option<crate::authz::Role>,
}

/// Repository a user's accepted solutions are pushed to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubLink {
    /// `owner/name`
    pub repo: String,
    pub token: String,
}
