use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Environment variable mapping. Keys are ordered; later writes win.
pub type Environment = BTreeMap<String, String>;

fn default_version() -> String {
    "1".to_string()
}

fn default_format() -> String {
    "yaml".to_string()
}

/// The parsed, in-memory form of a CI configuration file.
///
/// A document is either stage-shaped or step-shaped: exactly one of
/// `stages` and `steps` may be non-empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineDocument {
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub flavor: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub platform: String,

    #[serde(default, rename = "ref", skip_serializing_if = "String::is_empty")]
    pub git_ref: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: Environment,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<Service>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<Secret>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<Stage>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<Step>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<Template>,
}

impl PipelineDocument {
    /// Lookup from template logical name to its declaration. The parser
    /// guarantees names are unique, so collisions cannot drop entries.
    pub fn template_map(&self) -> HashMap<String, Template> {
        self.templates
            .iter()
            .map(|t| (t.name.clone(), t.clone()))
            .collect()
    }

    pub fn has_stages(&self) -> bool {
        !self.stages.is_empty()
    }

    pub fn has_steps(&self) -> bool {
        !self.steps.is_empty()
    }
}

/// A named group of steps with declared dependencies on other stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<Step>,
}

/// A single unit of work: container image plus an ordered command list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: Environment,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ruleset: Option<Ruleset>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<TemplateDirective>,
}

/// Conditional inclusion rules. Matching is an execution-time concern;
/// the compiler only carries these through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ruleset {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branch: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub status: Vec<String>,
}

/// Reference from a step to a declared template, with the variable
/// bindings for this instantiation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateDirective {
    pub name: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: BTreeMap<String, String>,
}

/// A reusable, externally-sourced fragment declared once per document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub source: String,

    #[serde(default = "default_format")]
    pub format: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: Environment,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
}

/// Opaque reference to an externally-managed secret.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Secret {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub engine: String,
}
