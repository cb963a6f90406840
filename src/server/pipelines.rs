use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    response::Response,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::Error;
use crate::server::AppState;
use crate::server::dto::{PipelineQuery, TemplateMeta, UpdatePipelineRequest};
use crate::server::response::{ApiError, write_output};
use crate::types::{CompiledPipeline, Repo};

/// Wraps a phase failure with the repo/ref entry so the caller can fix
/// the configuration without source access.
fn phase_error(action: &str, entry: &str, err: Error) -> ApiError {
    let mut api = ApiError::from(err);
    api.message = format!("unable to {action} pipeline {entry}: {}", api.message);
    api
}

/// Resolves the repo and stored configuration row for a request. The
/// `ref` query parameter overrides the `{pipeline}` path segment.
fn fetch_pipeline(
    state: &AppState,
    org: &str,
    repo: &str,
    pipeline: &str,
    query_ref: Option<&str>,
) -> Result<(Repo, CompiledPipeline), ApiError> {
    let repo = state
        .store
        .get_repo(org, repo)
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::not_found(format!("repo {org}/{repo} not found")))?;

    let git_ref = query_ref.unwrap_or(pipeline);

    let row = state.store.get_pipeline(repo.id, git_ref).map_err(|e| {
        phase_error("retrieve", &format!("{}/{git_ref}", repo.full_name()), e)
    })?;

    Ok((repo, row))
}

/// POST /pipelines/{org}/{repo}/{pipeline}/compile
///
/// Parses, expands, substitutes and validates the stored configuration,
/// returning the fully compiled document.
pub async fn compile_pipeline(
    State(state): State<Arc<AppState>>,
    Path((org, repo, pipeline)): Path<(String, String, String)>,
    Query(params): Query<PipelineQuery>,
) -> Result<Response, ApiError> {
    let (repo, row) = fetch_pipeline(&state, &org, &repo, &pipeline, params.git_ref.as_deref())?;
    let entry = format!("{}/{}", repo.full_name(), row.git_ref);

    tracing::info!("compiling pipeline {entry}");

    let compiler = state.compiler(&repo, &row.git_ref);

    let mut doc = compiler
        .parse(&row.data)
        .map_err(|e| phase_error("parse", &entry, e))?;

    compiler
        .expand_pipeline(&mut doc, true)
        .await
        .map_err(|e| phase_error("expand", &entry, e))?;

    compiler
        .validate(&doc)
        .map_err(|e| phase_error("validate", &entry, e))?;

    write_output(&doc, params.output.as_deref())
}

/// POST /pipelines/{org}/{repo}/{pipeline}/expand
///
/// Parses and expands the stored configuration without substitution or
/// validation.
pub async fn expand_pipeline(
    State(state): State<Arc<AppState>>,
    Path((org, repo, pipeline)): Path<(String, String, String)>,
    Query(params): Query<PipelineQuery>,
) -> Result<Response, ApiError> {
    let (repo, row) = fetch_pipeline(&state, &org, &repo, &pipeline, params.git_ref.as_deref())?;
    let entry = format!("{}/{}", repo.full_name(), row.git_ref);

    tracing::info!("expanding templates for pipeline {entry}");

    let compiler = state.compiler(&repo, &row.git_ref);

    let mut doc = compiler
        .parse(&row.data)
        .map_err(|e| phase_error("parse", &entry, e))?;

    compiler
        .expand_pipeline(&mut doc, false)
        .await
        .map_err(|e| phase_error("expand", &entry, e))?;

    write_output(&doc, params.output.as_deref())
}

/// POST /pipelines/{org}/{repo}/{pipeline}/validate
///
/// Parses, optionally expands (the `template` parameter, default true)
/// and validates the stored configuration.
pub async fn validate_pipeline(
    State(state): State<Arc<AppState>>,
    Path((org, repo, pipeline)): Path<(String, String, String)>,
    Query(params): Query<PipelineQuery>,
) -> Result<Response, ApiError> {
    let (repo, row) = fetch_pipeline(&state, &org, &repo, &pipeline, params.git_ref.as_deref())?;
    let entry = format!("{}/{}", repo.full_name(), row.git_ref);

    tracing::info!("validating pipeline {entry}");

    let compiler = state.compiler(&repo, &row.git_ref);

    let mut doc = compiler
        .parse(&row.data)
        .map_err(|e| phase_error("parse", &entry, e))?;

    if params.template.unwrap_or(true) {
        compiler
            .expand_pipeline(&mut doc, false)
            .await
            .map_err(|e| phase_error("expand", &entry, e))?;
    }

    compiler
        .validate(&doc)
        .map_err(|e| phase_error("validate", &entry, e))?;

    write_output(&doc, params.output.as_deref())
}

/// GET /pipelines/{org}/{repo}/{pipeline}/templates
///
/// Returns the templates the configuration declares, with their
/// resolved locators and links.
pub async fn get_templates(
    State(state): State<Arc<AppState>>,
    Path((org, repo, pipeline)): Path<(String, String, String)>,
    Query(params): Query<PipelineQuery>,
) -> Result<Response, ApiError> {
    let (repo, row) = fetch_pipeline(&state, &org, &repo, &pipeline, params.git_ref.as_deref())?;
    let entry = format!("{}/{}", repo.full_name(), row.git_ref);

    tracing::info!("reading templates from pipeline {entry}");

    let compiler = state.compiler(&repo, &row.git_ref);

    let doc = compiler
        .parse(&row.data)
        .map_err(|e| phase_error("parse", &entry, e))?;

    let mut templates = BTreeMap::new();
    for template in &doc.templates {
        let src = compiler
            .registry()
            .parse_source(&template.name, &template.source)
            .map_err(|e| phase_error("resolve templates for", &entry, e))?;
        let link = compiler.registry().html_url(&src);

        templates.insert(
            template.name.clone(),
            TemplateMeta {
                name: template.name.clone(),
                source: template.source.clone(),
                format: template.format.clone(),
                resolved: src,
                link,
            },
        );
    }

    write_output(&templates, params.output.as_deref())
}

/// PUT /pipelines/{org}/{repo}/{pipeline}
///
/// Applies the provided fields to the stored record and returns the
/// updated row.
pub async fn update_pipeline(
    State(state): State<Arc<AppState>>,
    Path((org, repo, pipeline)): Path<(String, String, String)>,
    Query(params): Query<PipelineQuery>,
    body: Result<Json<UpdatePipelineRequest>, JsonRejection>,
) -> Result<Json<CompiledPipeline>, ApiError> {
    let Json(input) = body.map_err(|e| {
        ApiError::not_found(format!(
            "unable to decode pipeline for {org}/{repo}/{pipeline}: {e}"
        ))
    })?;

    let (repo, mut row) = fetch_pipeline(&state, &org, &repo, &pipeline, params.git_ref.as_deref())?;
    let entry = format!("{}/{}", repo.full_name(), row.git_ref);

    tracing::info!("updating pipeline {entry}");

    if let Some(flavor) = input.flavor {
        row.flavor = flavor;
    }
    if let Some(platform) = input.platform {
        row.platform = platform;
    }
    if let Some(version) = input.version {
        row.version = version;
    }
    if let Some(services) = input.services {
        row.services = services;
    }
    if let Some(stages) = input.stages {
        row.stages = stages;
    }
    if let Some(steps) = input.steps {
        row.steps = steps;
    }
    if let Some(templates) = input.templates {
        row.templates = templates;
    }
    if let Some(data) = input.data {
        row.data = BASE64.decode(&data).map_err(|e| {
            ApiError::not_found(format!("unable to decode pipeline data for {entry}: {e}"))
        })?;
    }

    let updated = state
        .store
        .update_pipeline(&row)
        .map_err(|e| ApiError::internal(format!("unable to update pipeline {entry}: {e}")))?;

    Ok(Json(updated))
}
