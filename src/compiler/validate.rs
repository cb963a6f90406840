use std::collections::{HashMap, HashSet};

use super::Compiler;
use crate::error::{Error, Result};
use crate::types::{PipelineDocument, Stage, Step};

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Visiting,
    Visited,
}

impl Compiler {
    /// Checks structural and semantic correctness of a fully expanded
    /// document.
    ///
    /// Dependency errors (undeclared stages, cycles) halt validation
    /// immediately since later checks assume a well-formed DAG. All
    /// remaining violations are collected and returned as one aggregate.
    pub fn validate(&self, doc: &PipelineDocument) -> Result<()> {
        if doc.has_stages() && doc.has_steps() {
            return Err(Error::Validation(vec![
                "pipeline declares both stages and steps".to_string(),
            ]));
        }
        if !doc.has_stages() && !doc.has_steps() {
            return Err(Error::Validation(vec![
                "pipeline declares neither stages nor steps".to_string(),
            ]));
        }

        if doc.has_stages() {
            self.check_dependencies(&doc.stages)?;
        }

        let mut violations = Vec::new();

        let secret_names: HashSet<&str> = doc.secrets.iter().map(|s| s.name.as_str()).collect();

        if doc.has_stages() {
            let mut stage_names = HashSet::new();
            for stage in &doc.stages {
                if stage.name.is_empty() {
                    violations.push("stage with empty name".to_string());
                } else if !stage_names.insert(stage.name.as_str()) {
                    violations.push(format!("duplicate stage name {:?}", stage.name));
                }

                check_steps(&stage.steps, &stage.name, &secret_names, &mut violations);
            }
        } else {
            check_steps(&doc.steps, "pipeline", &secret_names, &mut violations);
        }

        self.check_limits(doc, &mut violations);

        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(violations))
        }
    }

    /// Every `depends_on` entry must name a declared stage, and the
    /// dependency relation must be acyclic.
    fn check_dependencies(&self, stages: &[Stage]) -> Result<()> {
        let names: HashSet<&str> = stages.iter().map(|s| s.name.as_str()).collect();
        let mut violations = Vec::new();

        for stage in stages {
            for dep in &stage.depends_on {
                if dep == &stage.name {
                    violations.push(format!("stage {:?} depends on itself", stage.name));
                } else if !names.contains(dep.as_str()) {
                    violations.push(format!(
                        "stage {:?} depends on undeclared stage {dep:?}",
                        stage.name
                    ));
                }
            }
        }

        if !violations.is_empty() {
            return Err(Error::Validation(violations));
        }

        if let Some(cycle) = find_cycle(stages) {
            return Err(Error::Validation(vec![format!(
                "cycle in stage dependencies: {}",
                cycle.join(" -> ")
            )]));
        }

        Ok(())
    }

    fn check_limits(&self, doc: &PipelineDocument, violations: &mut Vec<String>) {
        let limits = self.limits();

        if doc.stages.len() > limits.max_stages {
            violations.push(format!(
                "pipeline has {} stages, exceeding the limit of {}",
                doc.stages.len(),
                limits.max_stages
            ));
        }

        let step_count: usize = if doc.has_stages() {
            doc.stages.iter().map(|s| s.steps.len()).sum()
        } else {
            doc.steps.len()
        };
        if step_count > limits.max_steps {
            violations.push(format!(
                "pipeline has {step_count} steps, exceeding the limit of {}",
                limits.max_steps
            ));
        }

        if doc.services.len() > limits.max_services {
            violations.push(format!(
                "pipeline has {} services, exceeding the limit of {}",
                doc.services.len(),
                limits.max_services
            ));
        }
    }
}

fn check_steps(
    steps: &[Step],
    scope: &str,
    secret_names: &HashSet<&str>,
    violations: &mut Vec<String>,
) {
    let mut seen = HashSet::new();

    for step in steps {
        let label = if step.name.is_empty() {
            format!("unnamed step in {scope}")
        } else {
            format!("step {:?} in {scope}", step.name)
        };

        if step.name.is_empty() {
            violations.push(format!("{label} has no name"));
        } else if !seen.insert(step.name.as_str()) {
            violations.push(format!("duplicate step name {:?} in {scope}", step.name));
        }

        if step.image.is_empty() && step.template.is_none() {
            violations.push(format!("{label} has no image"));
        }
        if step.commands.is_empty() && step.template.is_none() {
            violations.push(format!("{label} has no commands"));
        }

        for secret in &step.secrets {
            if !secret_names.contains(secret.as_str()) {
                violations.push(format!("{label} references undeclared secret {secret:?}"));
            }
        }
    }
}

/// DFS over the dependency relation with a visiting/visited color set.
/// A back-edge to a stage on the current path is a cycle; the returned
/// path lists the stages along it.
fn find_cycle(stages: &[Stage]) -> Option<Vec<String>> {
    let graph: HashMap<&str, &Stage> = stages.iter().map(|s| (s.name.as_str(), s)).collect();
    let mut marks: HashMap<&str, Mark> = HashMap::new();

    for stage in stages {
        if marks.contains_key(stage.name.as_str()) {
            continue;
        }
        let mut path = Vec::new();
        if let Some(cycle) = visit(stage, &graph, &mut marks, &mut path) {
            return Some(cycle);
        }
    }

    None
}

fn visit<'a>(
    stage: &'a Stage,
    graph: &HashMap<&str, &'a Stage>,
    marks: &mut HashMap<&'a str, Mark>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    marks.insert(&stage.name, Mark::Visiting);
    path.push(&stage.name);

    for dep in &stage.depends_on {
        match marks.get(dep.as_str()) {
            Some(Mark::Visiting) => {
                let start = path.iter().position(|n| n == dep).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|s| s.to_string()).collect();
                cycle.push(dep.clone());
                return Some(cycle);
            }
            Some(Mark::Visited) => {}
            None => {
                if let Some(next) = graph.get(dep.as_str()) {
                    if let Some(cycle) = visit(next, graph, marks, path) {
                        return Some(cycle);
                    }
                }
            }
        }
    }

    path.pop();
    marks.insert(&stage.name, Mark::Visited);
    None
}
