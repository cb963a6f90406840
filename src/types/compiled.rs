use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::PipelineDocument;

/// Persisted shape of a pipeline configuration, keyed by `(repo_id, ref)`.
///
/// `data` holds the configuration bytes; the store compresses them on
/// write and decompresses on read, so in-memory instances always carry
/// plain bytes. The presence booleans record what the parsed document
/// contained before compression.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompiledPipeline {
    pub id: i64,
    pub repo_id: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub flavor: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub platform: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub version: String,
    pub services: bool,
    pub stages: bool,
    pub steps: bool,
    pub templates: bool,
    #[serde(default, with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl CompiledPipeline {
    /// Builds a persistable record from a parsed document and the raw
    /// configuration bytes it was parsed from.
    pub fn from_document(repo_id: i64, git_ref: &str, doc: &PipelineDocument, data: &[u8]) -> Self {
        Self {
            id: 0,
            repo_id,
            flavor: doc.flavor.clone(),
            platform: doc.platform.clone(),
            git_ref: git_ref.to_string(),
            version: doc.version.clone(),
            services: !doc.services.is_empty(),
            stages: !doc.stages.is_empty(),
            steps: !doc.steps.is_empty(),
            templates: !doc.templates.is_empty(),
            data: data.to_vec(),
        }
    }

    /// Checks the fields the store requires before a write.
    pub fn validate(&self) -> Result<()> {
        if self.repo_id <= 0 {
            return Err(Error::BadRequest("pipeline repo_id is not set".into()));
        }
        if self.git_ref.is_empty() {
            return Err(Error::BadRequest("pipeline ref is not set".into()));
        }
        if self.version.is_empty() {
            return Err(Error::BadRequest("pipeline version is not set".into()));
        }
        Ok(())
    }
}

/// Raw bytes serialize as base64 in API payloads.
mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
