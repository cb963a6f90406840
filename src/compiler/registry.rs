use std::collections::HashMap;

use serde::Serialize;

use crate::error::{Error, Result};

/// Canonical locator for a template source string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateSource {
    pub org: String,
    pub repo: String,
    /// Path to the template file within the repo.
    pub name: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
}

impl TemplateSource {
    fn key(&self) -> String {
        format!("{}/{}/{}@{}", self.org, self.repo, self.name, self.git_ref)
    }
}

/// Client for resolving template references and fetching their bytes.
///
/// Safe for concurrent use: every fetch is an independent outbound call
/// with no shared mutable cache.
#[derive(Debug, Clone)]
pub enum Registry {
    Github(GithubRegistry),
    Memory(MemoryRegistry),
}

impl Registry {
    /// Resolves a template source string to a canonical locator.
    ///
    /// Accepted forms: `org/repo/path/to/file.yml@ref`, optionally
    /// prefixed with a scheme and registry host. A missing `@ref`
    /// defaults to `main`.
    pub fn parse_source(&self, name: &str, source: &str) -> Result<TemplateSource> {
        let trimmed = source
            .trim()
            .trim_start_matches("https://")
            .trim_start_matches("http://");

        let (path, git_ref) = match trimmed.rsplit_once('@') {
            Some((path, r)) if !r.is_empty() => (path, r.to_string()),
            Some((path, _)) => (path, "main".to_string()),
            None => (trimmed, "main".to_string()),
        };

        let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        // A leading host segment (contains a dot) is informational only.
        if segments.first().is_some_and(|s| s.contains('.') && !s.ends_with(".yml") && !s.ends_with(".yaml")) {
            segments.remove(0);
        }

        if segments.len() < 3 {
            return Err(Error::TemplateResolution {
                name: name.to_string(),
                locator: source.to_string(),
                reason: "source must take the form org/repo/path@ref".to_string(),
            });
        }

        Ok(TemplateSource {
            org: segments[0].to_string(),
            repo: segments[1].to_string(),
            name: segments[2..].join("/"),
            git_ref,
        })
    }

    /// Fetches the raw template document bytes for a resolved locator.
    pub async fn fetch(&self, name: &str, src: &TemplateSource) -> Result<Vec<u8>> {
        match self {
            Registry::Github(github) => github.fetch(name, src).await,
            Registry::Memory(memory) => memory.fetch(name, src),
        }
    }

    /// Human-facing link to the template file.
    pub fn html_url(&self, src: &TemplateSource) -> String {
        match self {
            Registry::Github(github) => format!(
                "{}/{}/{}/blob/{}/{}",
                github.base_url, src.org, src.repo, src.git_ref, src.name
            ),
            Registry::Memory(_) => format!("memory://{}", src.key()),
        }
    }
}

/// Fetches templates from a GitHub-style raw content endpoint.
#[derive(Debug, Clone)]
pub struct GithubRegistry {
    client: reqwest::Client,
    base_url: String,
    raw_url: String,
    token: Option<String>,
}

impl GithubRegistry {
    pub fn new(base_url: &str, raw_url: &str, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            raw_url: raw_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    async fn fetch(&self, name: &str, src: &TemplateSource) -> Result<Vec<u8>> {
        let url = format!(
            "{}/{}/{}/{}/{}",
            self.raw_url, src.org, src.repo, src.git_ref, src.name
        );

        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| Error::TemplateResolution {
            name: name.to_string(),
            locator: src.key(),
            reason: e.to_string(),
        })?;

        if !response.status().is_success() {
            return Err(Error::TemplateResolution {
                name: name.to_string(),
                locator: src.key(),
                reason: format!("registry returned {}", response.status()),
            });
        }

        let body = response.bytes().await.map_err(|e| Error::TemplateResolution {
            name: name.to_string(),
            locator: src.key(),
            reason: e.to_string(),
        })?;

        Ok(body.to_vec())
    }
}

/// In-memory registry used by the local `validate` command and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    templates: HashMap<String, Vec<u8>>,
}

impl MemoryRegistry {
    pub fn insert(&mut self, org: &str, repo: &str, name: &str, git_ref: &str, data: &[u8]) {
        let key = format!("{org}/{repo}/{name}@{git_ref}");
        self.templates.insert(key, data.to_vec());
    }

    fn fetch(&self, name: &str, src: &TemplateSource) -> Result<Vec<u8>> {
        self.templates
            .get(&src.key())
            .cloned()
            .ok_or_else(|| Error::TemplateResolution {
                name: name.to_string(),
                locator: src.key(),
                reason: "template source not found".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        Registry::Memory(MemoryRegistry::default())
    }

    #[test]
    fn parses_source_with_host_and_ref() {
        let src = registry()
            .parse_source("golang", "github.com/octocat/templates/golang.yml@v1")
            .unwrap();
        assert_eq!(src.org, "octocat");
        assert_eq!(src.repo, "templates");
        assert_eq!(src.name, "golang.yml");
        assert_eq!(src.git_ref, "v1");
    }

    #[test]
    fn parses_source_without_host() {
        let src = registry()
            .parse_source("golang", "octocat/templates/ci/golang.yml")
            .unwrap();
        assert_eq!(src.org, "octocat");
        assert_eq!(src.name, "ci/golang.yml");
        assert_eq!(src.git_ref, "main");
    }

    #[test]
    fn parses_source_with_scheme() {
        let src = registry()
            .parse_source("golang", "https://github.com/octocat/templates/golang.yml@main")
            .unwrap();
        assert_eq!(src.org, "octocat");
    }

    #[test]
    fn rejects_short_source() {
        let err = registry().parse_source("golang", "octocat/templates").unwrap_err();
        assert!(matches!(err, Error::TemplateResolution { .. }));
    }

    #[tokio::test]
    async fn memory_fetch_round_trips() {
        let mut memory = MemoryRegistry::default();
        memory.insert("octocat", "templates", "golang.yml", "main", b"steps: []");
        let registry = Registry::Memory(memory);

        let src = registry
            .parse_source("golang", "octocat/templates/golang.yml@main")
            .unwrap();
        let data = registry.fetch("golang", &src).await.unwrap();
        assert_eq!(data, b"steps: []");
    }

    #[tokio::test]
    async fn memory_fetch_missing_is_resolution_error() {
        let registry = Registry::Memory(MemoryRegistry::default());
        let src = registry
            .parse_source("golang", "octocat/templates/golang.yml@main")
            .unwrap();
        let err = registry.fetch("golang", &src).await.unwrap_err();
        assert!(matches!(err, Error::TemplateResolution { .. }));
    }

    #[test]
    fn github_html_url() {
        let registry = Registry::Github(GithubRegistry::new(
            "https://github.com",
            "https://raw.githubusercontent.com",
            None,
        ));
        let src = registry
            .parse_source("golang", "octocat/templates/golang.yml@main")
            .unwrap();
        assert_eq!(
            registry.html_url(&src),
            "https://github.com/octocat/templates/blob/main/golang.yml"
        );
    }
}
