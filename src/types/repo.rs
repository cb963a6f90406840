use serde::{Deserialize, Serialize};

/// Minimal repository identity used to resolve `{org}/{repo}` path
/// segments to the `repo_id` the pipeline store is keyed by. Full repo
/// management lives elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repo {
    pub id: i64,
    pub org: String,
    pub name: String,
}

impl Repo {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.org, self.name)
    }
}
