use std::collections::HashSet;

use super::Compiler;
use crate::error::{Error, Result};
use crate::types::PipelineDocument;

/// Top-level keys the document schema knows about. Anything else is a
/// parse error, except `x-` prefixed keys which are tolerated as
/// extension anchors.
const KNOWN_KEYS: &[&str] = &[
    "version",
    "flavor",
    "platform",
    "ref",
    "environment",
    "services",
    "secrets",
    "stages",
    "steps",
    "templates",
];

impl Compiler {
    /// Decodes raw configuration bytes into a pipeline document.
    ///
    /// Pure function of its input: detects the schema version embedded in
    /// the document and enforces the shape invariants (exactly one of
    /// stages/steps populated, template names unique).
    pub fn parse(&self, raw: &[u8]) -> Result<PipelineDocument> {
        let text = std::str::from_utf8(raw)
            .map_err(|e| Error::Parse(format!("configuration is not valid UTF-8: {e}")))?;

        if text.trim().is_empty() {
            return Err(Error::Parse("configuration is empty".to_string()));
        }

        let value: serde_yaml::Value =
            serde_yaml::from_str(text).map_err(|e| Error::Parse(e.to_string()))?;

        let mapping = value
            .as_mapping()
            .ok_or_else(|| Error::Parse("configuration must be a mapping".to_string()))?;

        for key in mapping.keys() {
            let key = key
                .as_str()
                .ok_or_else(|| Error::Parse("top-level keys must be strings".to_string()))?;
            if !KNOWN_KEYS.contains(&key) && !key.starts_with("x-") {
                return Err(Error::Parse(format!("unknown top-level key {key:?}")));
            }
        }

        let doc: PipelineDocument =
            serde_yaml::from_value(value).map_err(|e| Error::Parse(e.to_string()))?;

        if doc.has_stages() && doc.has_steps() {
            return Err(Error::Parse(
                "pipeline declares both stages and steps; only one shape is allowed".to_string(),
            ));
        }
        if !doc.has_stages() && !doc.has_steps() {
            return Err(Error::Parse(
                "pipeline declares neither stages nor steps".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for template in &doc.templates {
            if !seen.insert(template.name.as_str()) {
                return Err(Error::Parse(format!(
                    "template {:?} is declared more than once",
                    template.name
                )));
            }
        }

        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{MemoryRegistry, Registry};

    fn compiler() -> Compiler {
        Compiler::new(Registry::Memory(MemoryRegistry::default()))
    }

    #[test]
    fn parses_step_pipeline() {
        let raw = b"
version: \"1\"
environment:
  REGION: us-east
steps:
  - name: build
    image: golang:1.22
    commands:
      - go build ./...
";
        let doc = compiler().parse(raw).unwrap();
        assert_eq!(doc.version, "1");
        assert_eq!(doc.steps.len(), 1);
        assert_eq!(doc.steps[0].name, "build");
        assert_eq!(doc.environment.get("REGION").unwrap(), "us-east");
        assert!(!doc.has_stages());
    }

    #[test]
    fn parses_stage_pipeline() {
        let raw = b"
version: \"1\"
stages:
  - name: test
    steps:
      - name: unit
        image: golang:1.22
        commands: [go test ./...]
  - name: release
    depends_on: [test]
    steps:
      - name: publish
        image: alpine
        commands: [./publish.sh]
";
        let doc = compiler().parse(raw).unwrap();
        assert_eq!(doc.stages.len(), 2);
        assert_eq!(doc.stages[1].depends_on, vec!["test"]);
        assert!(doc.steps.is_empty());
    }

    #[test]
    fn rejects_empty_input() {
        let err = compiler().parse(b"  \n ").unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn rejects_unknown_top_level_key() {
        let raw = b"
version: \"1\"
pipeline: oops
steps:
  - name: build
    image: alpine
    commands: [\"true\"]
";
        let err = compiler().parse(raw).unwrap_err();
        let Error::Parse(msg) = err else {
            panic!("expected parse error");
        };
        assert!(msg.contains("pipeline"));
    }

    #[test]
    fn tolerates_extension_keys() {
        let raw = b"
version: \"1\"
x-defaults: &defaults
  image: alpine
steps:
  - name: build
    image: alpine
    commands: [\"true\"]
";
        compiler().parse(raw).unwrap();
    }

    #[test]
    fn rejects_both_shapes() {
        let raw = b"
version: \"1\"
stages:
  - name: a
    steps:
      - name: one
        image: alpine
        commands: [\"true\"]
steps:
  - name: two
    image: alpine
    commands: [\"true\"]
";
        let err = compiler().parse(raw).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn rejects_duplicate_template_names() {
        let raw = b"
version: \"1\"
templates:
  - name: golang
    source: github.com/org/templates/golang.yml@main
  - name: golang
    source: github.com/org/templates/other.yml@main
steps:
  - name: build
    template:
      name: golang
";
        let err = compiler().parse(raw).unwrap_err();
        let Error::Parse(msg) = err else {
            panic!("expected parse error");
        };
        assert!(msg.contains("golang"));
    }

    #[test]
    fn version_defaults_when_absent() {
        let raw = b"
steps:
  - name: build
    image: alpine
    commands: [\"true\"]
";
        let doc = compiler().parse(raw).unwrap();
        assert_eq!(doc.version, "1");
    }
}
