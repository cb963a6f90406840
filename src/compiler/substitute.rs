use super::Compiler;
use crate::error::{Error, Result};
use crate::types::{Environment, Stage, Step};

/// Rewrites `${NAME}` tokens in `input` using `env`.
///
/// Tokens whose name is unknown are left verbatim so execution-time
/// values (secrets, build numbers) survive compilation untouched.
/// Token names follow shell identifier rules; anything else (for
/// example `${FOO:-bar}`) is not a recognized token and passes through.
/// An unterminated `${` is malformed input.
pub(crate) fn substitute_tokens(input: &str, env: &Environment) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let Some(end) = after.find('}') else {
            return Err(Error::Substitution(format!(
                "unterminated variable reference in {input:?}"
            )));
        };

        let name = &after[..end];
        let token = &rest[start..start + end + 3];

        if is_identifier(name) {
            match env.get(name) {
                Some(value) => out.push_str(value),
                None => out.push_str(token),
            }
        } else {
            out.push_str(token);
        }

        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Resolves every value in `env` until it contains no token that names
/// another entry, so a later rewrite of step fields cannot produce text
/// that would change again under a second pass. A reference cycle among
/// entries has no fixed point and is malformed input.
pub(crate) fn resolve_environment(env: &Environment) -> Result<Environment> {
    let mut resolved = Environment::new();
    for name in env.keys() {
        resolve_entry(name, env, &mut resolved, &mut Vec::new())?;
    }
    Ok(resolved)
}

fn resolve_entry(
    name: &str,
    env: &Environment,
    resolved: &mut Environment,
    visiting: &mut Vec<String>,
) -> Result<String> {
    if let Some(value) = resolved.get(name) {
        return Ok(value.clone());
    }
    if visiting.iter().any(|n| n == name) {
        return Err(Error::Substitution(format!(
            "environment variable reference cycle involving {name:?}"
        )));
    }
    visiting.push(name.to_string());

    let raw = env.get(name).cloned().unwrap_or_default();
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw.as_str();

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let Some(end) = after.find('}') else {
            return Err(Error::Substitution(format!(
                "unterminated variable reference in {raw:?}"
            )));
        };

        let inner = &after[..end];
        let token = &rest[start..start + end + 3];

        if is_identifier(inner) && env.contains_key(inner) {
            let value = resolve_entry(inner, env, resolved, visiting)?;
            out.push_str(&value);
        } else {
            out.push_str(token);
        }

        rest = &after[end + 1..];
    }
    out.push_str(rest);

    visiting.pop();
    resolved.insert(name.to_string(), out.clone());
    Ok(out)
}

/// Rewrites the recognized string fields of a step in place.
pub(crate) fn substitute_step(step: &mut Step, env: &Environment) -> Result<()> {
    step.image = substitute_tokens(&step.image, env)?;
    for command in &mut step.commands {
        *command = substitute_tokens(command, env)?;
    }
    for value in step.environment.values_mut() {
        *value = substitute_tokens(value, env)?;
    }
    Ok(())
}

impl Compiler {
    /// Substitutes compile-time environment values into a flat step list.
    ///
    /// The effective environment for each step is the document-level
    /// environment with the step's own variables layered on top, resolved
    /// so that entries referencing other entries carry their final text.
    /// Idempotent: a second pass with the same environment is a no-op.
    pub fn substitute_steps(&self, steps: Vec<Step>, base_env: &Environment) -> Result<Vec<Step>> {
        steps
            .into_iter()
            .map(|mut step| {
                let mut env = base_env.clone();
                env.extend(step.environment.clone());
                let env = resolve_environment(&env)?;
                substitute_step(&mut step, &env)?;
                Ok(step)
            })
            .collect()
    }

    /// Stage-shaped variant of [`Compiler::substitute_steps`].
    pub fn substitute_stages(
        &self,
        stages: Vec<Stage>,
        base_env: &Environment,
    ) -> Result<Vec<Stage>> {
        stages
            .into_iter()
            .map(|mut stage| {
                stage.steps = self.substitute_steps(stage.steps, base_env)?;
                Ok(stage)
            })
            .collect()
    }
}
