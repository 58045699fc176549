/// GitHub contents API client
use crate::{
    config::GithubConfig,
    error::{LmsError, LmsResult},
    integrations::{CodeSync, SolutionFile},
};
use async_trait::async_trait;
use base64::Engine;
use reqwest::{header::ACCEPT, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct GithubSync {
    client: reqwest::Client,
    api_url: String,
}

#[derive(Deserialize)]
struct ExistingFile {
    sha: String,
}

#[derive(Serialize)]
struct PutContents<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

impl GithubSync {
    pub fn new(config: &GithubConfig) -> LmsResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LmsError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    fn contents_url(&self, repo: &str, path: &str) -> String {
        format!("{}/repos/{}/contents/{}", self.api_url, repo, path)
    }

    /// Blob sha of an existing file, needed to overwrite it
    async fn existing_sha(&self, url: &str, token: &str) -> LmsResult<Option<String>> {
        let res = self
            .client
            .get(url)
            .bearer_auth(token)
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| LmsError::Integration(format!("GitHub request failed: {}", e)))?;

        match res.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let file: ExistingFile = res
                    .json()
                    .await
                    .map_err(|e| LmsError::Integration(format!("Bad GitHub response: {}", e)))?;
                Ok(Some(file.sha))
            }
            status => Err(LmsError::Integration(format!("GitHub HTTP {} reading file", status))),
        }
    }
}

#[async_trait]
impl CodeSync for GithubSync {
    async fn push_solution(&self, file: &SolutionFile) -> LmsResult<()> {
        let url = self.contents_url(&file.repo, &file.path);
        let sha = self.existing_sha(&url, &file.token).await?;

        let body = PutContents {
            message: &file.message,
            content: base64::engine::general_purpose::STANDARD.encode(file.content.as_bytes()),
            sha,
        };

        let res = self
            .client
            .put(&url)
            .bearer_auth(&file.token)
            .header(ACCEPT, "application/vnd.github+json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LmsError::Integration(format!("GitHub request failed: {}", e)))?;

        if !res.status().is_success() {
            return Err(LmsError::Integration(format!(
                "GitHub HTTP {} writing {}",
                res.status(),
                file.path
            )));
        }

        tracing::info!(repo = %file.repo, path = %file.path, "Solution pushed to GitHub");
        Ok(())
    }
}
