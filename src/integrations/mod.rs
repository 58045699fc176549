/// Best-effort external integrations
///
/// Accepted solutions can be pushed to the user's GitHub repository and sent
/// to an LLM for a complexity note. Neither may ever fail a submission; the
/// orchestrator spawns them and only logs their errors.

pub mod github;
pub mod openai;

pub use github::GithubSync;
pub use openai::OpenAiAnalyzer;

use crate::error::LmsResult;
use async_trait::async_trait;

/// A file to write into a user's repository
#[derive(Debug, Clone)]
pub struct SolutionFile {
    /// `owner/name`
    pub repo: String,
    pub token: String,
    pub path: String,
    pub content: String,
    pub message: String,
}

impl SolutionFile {
    pub fn for_submission(
        repo: &str,
        token: &str,
        problem_id: &str,
        language: &str,
        code: &str,
    ) -> Self {
        Self {
            repo: repo.to_string(),
            token: token.to_string(),
            path: solution_path(problem_id, language),
            content: code.to_string(),
            message: format!("Add solution for {}", problem_id),
        }
    }
}

/// Pushes solution files to a code host
#[async_trait]
pub trait CodeSync: Send + Sync {
    async fn push_solution(&self, file: &SolutionFile) -> LmsResult<()>;
}

/// Produces a short time/space complexity note for a solution
#[async_trait]
pub trait ComplexityAnalyzer: Send + Sync {
    async fn analyze(&self, code: &str, language: &str) -> LmsResult<String>;
}

/// Repository path for a problem's solution
pub fn solution_path(problem_id: &str, language: &str) -> String {
    let slug: String = problem_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    format!("solutions/{}.{}", slug, extension(language))
}

fn extension(language: &str) -> &'static str {
    match language.to_ascii_lowercase().as_str() {
        "python" | "python3" | "py" => "py",
        "javascript" | "js" | "node" => "js",
        "typescript" | "ts" => "ts",
        "java" => "java",
        "cpp" | "c++" => "cpp",
        "c" => "c",
        "go" | "golang" => "go",
        "rust" | "rs" => "rs",
        "html" => "html",
        _ => "txt",
    }
}
