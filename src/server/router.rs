use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{
    Router,
    routing::{get, post, put},
};

use super::pipelines;
use crate::compiler::{Compiler, Limits, MergePolicy, Registry};
use crate::store::PipelineStore;
use crate::types::Repo;

pub struct AppState {
    pub store: Arc<dyn PipelineStore>,
    pub registry: Registry,
    pub limits: Limits,
    pub merge_policy: MergePolicy,
}

impl AppState {
    /// Builds a fresh compiler bound to the request's repo and ref.
    /// Handlers never share a compiler instance.
    pub fn compiler(&self, repo: &Repo, git_ref: &str) -> Compiler {
        Compiler::new(self.registry.clone())
            .with_limits(self.limits)
            .with_merge_policy(self.merge_policy)
            .with_repo(&repo.org, &repo.name)
            .with_ref(git_ref)
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/v1/pipelines/{org}/{repo}/{pipeline}/compile",
            post(pipelines::compile_pipeline),
        )
        .route(
            "/api/v1/pipelines/{org}/{repo}/{pipeline}/expand",
            post(pipelines::expand_pipeline),
        )
        .route(
            "/api/v1/pipelines/{org}/{repo}/{pipeline}/validate",
            post(pipelines::validate_pipeline),
        )
        .route(
            "/api/v1/pipelines/{org}/{repo}/{pipeline}/templates",
            get(pipelines::get_templates),
        )
        .route(
            "/api/v1/pipelines/{org}/{repo}/{pipeline}",
            put(pipelines::update_pipeline),
        )
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
