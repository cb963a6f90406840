use std::collections::{HashMap, HashSet};

use super::substitute::substitute_tokens;
use super::{Compiler, MergePolicy};
use crate::error::{Error, Result};
use crate::types::{
    Environment, PipelineDocument, Secret, Service, Stage, Step, Template, TemplateDirective,
};

/// Result of expanding a step-shaped document.
#[derive(Debug, Clone)]
pub struct ExpandedSteps {
    pub steps: Vec<Step>,
    pub secrets: Vec<Secret>,
    pub services: Vec<Service>,
    pub environment: Environment,
}

/// Result of expanding a stage-shaped document.
#[derive(Debug, Clone)]
pub struct ExpandedStages {
    pub stages: Vec<Stage>,
    pub secrets: Vec<Secret>,
    pub services: Vec<Service>,
    pub environment: Environment,
}

/// Collections a template fragment contributes to the parent document.
/// Parent declarations always take precedence for environment keys;
/// the configured [`MergePolicy`] decides secrets and services.
struct MergedCollections {
    secrets: Vec<Secret>,
    services: Vec<Service>,
    environment: Environment,
}

impl MergedCollections {
    fn from_document(doc: &PipelineDocument) -> Self {
        Self {
            secrets: doc.secrets.clone(),
            services: doc.services.clone(),
            environment: doc.environment.clone(),
        }
    }

    fn absorb(&mut self, fragment: &PipelineDocument, policy: MergePolicy) {
        for (key, value) in &fragment.environment {
            self.environment
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }

        for secret in &fragment.secrets {
            let collision = self.secrets.iter().any(|s| s.name == secret.name);
            if policy == MergePolicy::Append || !collision {
                self.secrets.push(secret.clone());
            }
        }

        for service in &fragment.services {
            let collision = self.services.iter().any(|s| s.name == service.name);
            if policy == MergePolicy::Append || !collision {
                self.services.push(service.clone());
            }
        }
    }
}

impl Compiler {
    /// Expands template directives within a step-shaped document.
    ///
    /// Expansion is single-pass: a fetched fragment may not itself carry
    /// a template directive.
    pub async fn expand_steps(
        &self,
        doc: &PipelineDocument,
        templates: &HashMap<String, Template>,
    ) -> Result<ExpandedSteps> {
        let mut merged = MergedCollections::from_document(doc);
        let steps = self
            .expand_step_list(&doc.steps, templates, &mut merged)
            .await?;
        check_unique_names(&steps, "pipeline")?;

        Ok(ExpandedSteps {
            steps,
            secrets: merged.secrets,
            services: merged.services,
            environment: merged.environment,
        })
    }

    /// Expands template directives within every stage of a stage-shaped
    /// document. Step names must be unique within their stage; the same
    /// name may appear in different stages.
    pub async fn expand_stages(
        &self,
        doc: &PipelineDocument,
        templates: &HashMap<String, Template>,
    ) -> Result<ExpandedStages> {
        let mut merged = MergedCollections::from_document(doc);
        let mut stages = Vec::with_capacity(doc.stages.len());

        for stage in &doc.stages {
            let steps = self
                .expand_step_list(&stage.steps, templates, &mut merged)
                .await?;
            check_unique_names(&steps, &stage.name)?;

            stages.push(Stage {
                name: stage.name.clone(),
                depends_on: stage.depends_on.clone(),
                steps,
            });
        }

        Ok(ExpandedStages {
            stages,
            secrets: merged.secrets,
            services: merged.services,
            environment: merged.environment,
        })
    }

    /// Replaces each template directive in `steps` with the referenced
    /// template's rendered steps, preserving surrounding order.
    async fn expand_step_list(
        &self,
        steps: &[Step],
        templates: &HashMap<String, Template>,
        merged: &mut MergedCollections,
    ) -> Result<Vec<Step>> {
        let mut out = Vec::with_capacity(steps.len());

        for step in steps {
            let Some(directive) = &step.template else {
                out.push(step.clone());
                continue;
            };

            let fragment = self.resolve_fragment(directive, templates).await?;
            out.extend(rendered_fragment_steps(&fragment, directive)?);
            merged.absorb(&fragment, self.merge_policy());
        }

        Ok(out)
    }

    /// Fetches and parses the document fragment a directive refers to.
    async fn resolve_fragment(
        &self,
        directive: &TemplateDirective,
        templates: &HashMap<String, Template>,
    ) -> Result<PipelineDocument> {
        let template = templates
            .get(&directive.name)
            .ok_or_else(|| Error::TemplateResolution {
                name: directive.name.clone(),
                locator: String::new(),
                reason: "template is not declared by the pipeline".to_string(),
            })?;

        let src = self.registry().parse_source(&template.name, &template.source)?;
        let raw = self.registry().fetch(&template.name, &src).await?;

        let fragment = self.parse(&raw).map_err(|e| Error::TemplateResolution {
            name: directive.name.clone(),
            locator: template.source.clone(),
            reason: e.to_string(),
        })?;

        let nested = fragment
            .steps
            .iter()
            .chain(fragment.stages.iter().flat_map(|s| s.steps.iter()))
            .any(|s| s.template.is_some());
        if nested {
            return Err(Error::NestedTemplate(directive.name.clone()));
        }

        Ok(fragment)
    }
}

/// Flattens a fragment to a step list and renders the directive's
/// variables into each step's string fields. Rendering happens at
/// expansion time with the directive's variable map, separate from the
/// later environment substitution pass.
fn rendered_fragment_steps(
    fragment: &PipelineDocument,
    directive: &TemplateDirective,
) -> Result<Vec<Step>> {
    let mut steps: Vec<Step> = if fragment.has_stages() {
        fragment
            .stages
            .iter()
            .flat_map(|stage| stage.steps.iter().cloned())
            .collect()
    } else {
        fragment.steps.clone()
    };

    for step in &mut steps {
        step.name = substitute_tokens(&step.name, &directive.vars)?;
        step.image = substitute_tokens(&step.image, &directive.vars)?;
        for command in &mut step.commands {
            *command = substitute_tokens(command, &directive.vars)?;
        }
        for value in step.environment.values_mut() {
            *value = substitute_tokens(value, &directive.vars)?;
        }
    }

    Ok(steps)
}

fn check_unique_names(steps: &[Step], scope: &str) -> Result<()> {
    let mut seen = HashSet::new();
    for step in steps {
        if !seen.insert(step.name.as_str()) {
            return Err(Error::DuplicateStepName {
                step: step.name.clone(),
                stage: scope.to_string(),
            });
        }
    }
    Ok(())
}
