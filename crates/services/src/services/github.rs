//! Read-only repository introspection against the GitHub REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

const API_BASE: &str = "https://api.github.com";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw+json";
pub const MAX_DOC_FILES: usize = 5;
pub const MAX_DOC_BYTES: u64 = 20 * 1024;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("not a GitHub repository URL: {0}")]
    InvalidUrl(String),
    #[error("repository not found or not accessible: {0}")]
    NotFound(String),
    #[error("network error: {0}")]
    Transport(String),
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone)]
pub struct RepoDocument {
    pub path: String,
    pub content: String,
}

/// Accepts `https://github.com/{owner}/{repo}[.git][/...]` and
/// `git@github.com:{owner}/{repo}.git`.
pub fn parse_repo_url(input: &str) -> Result<RepoRef, GitHubError> {
    let input = input.trim();
    let invalid = || GitHubError::InvalidUrl(input.to_string());

    let path = if let Some(rest) = input.strip_prefix("git@github.com:") {
        rest.to_string()
    } else {
        let url = Url::parse(input).map_err(|_| invalid())?;
        if !matches!(url.scheme(), "https" | "http") {
            return Err(invalid());
        }
        match url.host_str() {
            Some("github.com") | Some("www.github.com") => {}
            _ => return Err(invalid()),
        }
        url.path().to_string()
    };

    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let owner = segments.next().ok_or_else(invalid)?;
    let name = segments.next().ok_or_else(invalid)?;
    let name = name.strip_suffix(".git").unwrap_or(name);

    let valid = |s: &str| {
        !s.is_empty()
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };
    if !valid(owner) || !valid(name) {
        return Err(invalid());
    }

    Ok(RepoRef {
        owner: owner.to_string(),
        name: name.to_string(),
    })
}

/// Source of repository text used as context for campaign generation.
#[async_trait]
pub trait SourceHost: Send + Sync {
    async fn fetch_readme(
        &self,
        repo: &RepoRef,
        token: Option<&str>,
    ) -> Result<Option<String>, GitHubError>;

    async fn fetch_docs(
        &self,
        repo: &RepoRef,
        token: Option<&str>,
    ) -> Result<Vec<RepoDocument>, GitHubError>;
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
    size: u64,
}

#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    default_token: Option<SecretString>,
    api_base: String,
}

impl GitHubClient {
    pub fn new(default_token: Option<SecretString>) -> Result<Self, GitHubError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("vibefunder/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GitHubError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            default_token,
            api_base: API_BASE.to_string(),
        })
    }

    fn get(&self, path: &str, token: Option<&str>) -> RequestBuilder {
        let request = self
            .http
            .get(format!("{}{}", self.api_base, path))
            .header("X-GitHub-Api-Version", "2022-11-28");
        let token = token.or(self.default_token.as_ref().map(|t| t.expose_secret()));
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Raw file body, or None on 404.
    async fn fetch_raw(&self, path: &str, token: Option<&str>) -> Result<Option<String>, GitHubError> {
        let res = self
            .get(path, token)
            .header("Accept", RAW_MEDIA_TYPE)
            .send()
            .await
            .map_err(|e| GitHubError::Transport(e.to_string()))?;

        match res.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => res
                .text()
                .await
                .map(Some)
                .map_err(|e| GitHubError::Transport(e.to_string())),
            s => Err(GitHubError::Http {
                status: s.as_u16(),
                body: res.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[async_trait]
impl SourceHost for GitHubClient {
    async fn fetch_readme(
        &self,
        repo: &RepoRef,
        token: Option<&str>,
    ) -> Result<Option<String>, GitHubError> {
        self.fetch_raw(&format!("/repos/{}/{}/readme", repo.owner, repo.name), token)
            .await
    }

    async fn fetch_docs(
        &self,
        repo: &RepoRef,
        token: Option<&str>,
    ) -> Result<Vec<RepoDocument>, GitHubError> {
        let res = self
            .get(&format!("/repos/{}/{}/contents/docs", repo.owner, repo.name), token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| GitHubError::Transport(e.to_string()))?;

        let entries: Vec<ContentEntry> = match res.status() {
            StatusCode::NOT_FOUND => return Ok(Vec::new()),
            s if s.is_success() => res
                .json()
                .await
                .map_err(|e| GitHubError::Transport(e.to_string()))?,
            s => {
                return Err(GitHubError::Http {
                    status: s.as_u16(),
                    body: res.text().await.unwrap_or_default(),
                });
            }
        };

        let mut docs = Vec::new();
        for entry in select_doc_entries(entries) {
            let path = format!("/repos/{}/{}/contents/{}", repo.owner, repo.name, entry.path);
            if let Some(content) = self.fetch_raw(&path, token).await? {
                docs.push(RepoDocument {
                    path: entry.path,
                    content: truncate_bytes(content, MAX_DOC_BYTES as usize),
                });
            }
        }
        debug!(repo = %repo, count = docs.len(), "Fetched repository docs");
        Ok(docs)
    }
}

fn select_doc_entries(entries: Vec<ContentEntry>) -> Vec<ContentEntry> {
    let mut selected: Vec<ContentEntry> = entries
        .into_iter()
        .filter(|e| e.kind == "file")
        .filter(|e| {
            let name = e.name.to_ascii_lowercase();
            name.ends_with(".md") || name.ends_with(".markdown")
        })
        .filter(|e| e.size <= MAX_DOC_BYTES)
        .collect();
    selected.sort_by(|a, b| a.path.cmp(&b.path));
    selected.truncate(MAX_DOC_FILES);
    selected
}

pub(crate) fn truncate_bytes(mut text: String, max: usize) -> String {
    if text.len() > max {
        let mut cut = max;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}
