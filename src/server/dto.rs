use serde::{Deserialize, Serialize};

use crate::compiler::TemplateSource;

/// Query parameters shared by the pipeline endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct PipelineQuery {
    /// Revision selector; overrides the `{pipeline}` path segment.
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
    /// Output serialization: `yaml` (default) or `json`.
    pub output: Option<String>,
    /// Whether validate expands templates first. Defaults to true.
    pub template: Option<bool>,
}

/// Partial update payload; only provided fields are applied.
#[derive(Debug, Default, Deserialize)]
pub struct UpdatePipelineRequest {
    pub flavor: Option<String>,
    pub platform: Option<String>,
    pub version: Option<String>,
    pub services: Option<bool>,
    pub stages: Option<bool>,
    pub steps: Option<bool>,
    pub templates: Option<bool>,
    /// Raw configuration bytes, base64-encoded.
    pub data: Option<String>,
}

/// Template metadata returned by the templates endpoint.
#[derive(Debug, Serialize)]
pub struct TemplateMeta {
    pub name: String,
    pub source: String,
    pub format: String,
    /// Canonical locator the source string resolves to.
    pub resolved: TemplateSource,
    /// Human-facing link to the template file.
    pub link: String,
}
