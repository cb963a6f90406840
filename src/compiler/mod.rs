mod expand;
mod parser;
mod registry;
mod substitute;
mod validate;

pub use expand::{ExpandedStages, ExpandedSteps};
pub use registry::{GithubRegistry, MemoryRegistry, Registry, TemplateSource};

use crate::error::Result;
use crate::types::PipelineDocument;

/// Upper bounds on document size, guarding against pathological
/// template expansion.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_stages: usize,
    pub max_steps: usize,
    pub max_services: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_stages: 50,
            max_steps: 200,
            max_services: 30,
        }
    }
}

/// Precedence for secrets and services a template declares when their
/// name collides with a parent declaration. Environment keys always
/// resolve parent-wins regardless of this policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergePolicy {
    /// Drop the template's declaration on collision.
    #[default]
    ParentWins,
    /// Keep both declarations; downstream consumers see the parent's first.
    Append,
}

/// Stateless pipeline compiler.
///
/// Each request clones a fresh instance and binds it to request-scoped
/// context through the builder methods, so concurrent compilations never
/// share mutable state. The only shared resource is the registry client,
/// which issues independent fetches per call.
#[derive(Debug, Clone)]
pub struct Compiler {
    registry: Registry,
    limits: Limits,
    merge_policy: MergePolicy,
    repo: String,
    git_ref: String,
}

impl Compiler {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            limits: Limits::default(),
            merge_policy: MergePolicy::default(),
            repo: String::new(),
            git_ref: String::new(),
        }
    }

    #[must_use]
    pub fn with_repo(mut self, org: &str, name: &str) -> Self {
        self.repo = format!("{org}/{name}");
        self
    }

    #[must_use]
    pub fn with_ref(mut self, git_ref: &str) -> Self {
        self.git_ref = git_ref.to_string();
        self
    }

    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn with_merge_policy(mut self, policy: MergePolicy) -> Self {
        self.merge_policy = policy;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub(crate) fn limits(&self) -> Limits {
        self.limits
    }

    pub(crate) fn merge_policy(&self) -> MergePolicy {
        self.merge_policy
    }

    /// Repo/ref identifier used in log lines and error messages.
    pub fn entry(&self) -> String {
        format!("{}/{}", self.repo, self.git_ref)
    }

    /// Runs template expansion and, optionally, environment substitution
    /// over whichever shape the document carries, writing the results
    /// back into the document.
    pub async fn expand_pipeline(
        &self,
        doc: &mut PipelineDocument,
        substitute_env: bool,
    ) -> Result<()> {
        let templates = doc.template_map();

        if doc.has_stages() {
            let expanded = self.expand_stages(doc, &templates).await?;
            doc.stages = expanded.stages;
            doc.secrets = expanded.secrets;
            doc.services = expanded.services;
            doc.environment = expanded.environment;

            if substitute_env {
                let stages = std::mem::take(&mut doc.stages);
                doc.stages = self.substitute_stages(stages, &doc.environment)?;
            }
        } else {
            let expanded = self.expand_steps(doc, &templates).await?;
            doc.steps = expanded.steps;
            doc.secrets = expanded.secrets;
            doc.services = expanded.services;
            doc.environment = expanded.environment;

            if substitute_env {
                let steps = std::mem::take(&mut doc.steps);
                doc.steps = self.substitute_steps(steps, &doc.environment)?;
            }
        }

        Ok(())
    }
}
