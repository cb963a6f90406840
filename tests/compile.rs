use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use conveyor::compiler::{Compiler, Limits, MemoryRegistry, MergePolicy, Registry};
use conveyor::server::{AppState, create_router};
use conveyor::store::{PipelineStore, SqliteStore};
use conveyor::types::CompiledPipeline;

const GOLANG_TEMPLATE: &[u8] = b"
steps:
  - name: test
    image: golang:${version}
    commands:
      - go test -tags ${version} ./...
";

const PIPELINE_CONFIG: &[u8] = b"
version: \"1\"
templates:
  - name: golang
    source: octocat/templates/golang.yml@main
steps:
  - name: ci
    template:
      name: golang
      vars:
        version: \"1.20\"
";

fn registry() -> Registry {
    let mut memory = MemoryRegistry::default();
    memory.insert("octocat", "templates", "golang.yml", "main", GOLANG_TEMPLATE);
    Registry::Memory(memory)
}

/// Full pipeline path: parse, expand the golang template with its bound
/// variables, substitute, validate, then persist and re-read the result.
#[tokio::test]
async fn compiles_template_pipeline_end_to_end() {
    let compiler = Compiler::new(registry())
        .with_repo("octocat", "app")
        .with_ref("abc123");

    let mut doc = compiler.parse(PIPELINE_CONFIG).unwrap();
    compiler.expand_pipeline(&mut doc, true).await.unwrap();
    compiler.validate(&doc).unwrap();

    assert_eq!(doc.steps.len(), 1);
    assert_eq!(doc.steps[0].name, "test");
    assert_eq!(doc.steps[0].image, "golang:1.20");
    assert_eq!(doc.steps[0].commands[0], "go test -tags 1.20 ./...");

    // Persist the compiled document and confirm a bit-exact round trip.
    let temp = TempDir::new().unwrap();
    let store = SqliteStore::new(temp.path().join("test.db"), 6).unwrap();
    store.initialize().unwrap();
    let repo = store.ensure_repo("octocat", "app").unwrap();

    let serialized = serde_yaml::to_string(&doc).unwrap();
    let record = CompiledPipeline::from_document(repo.id, "abc123", &doc, serialized.as_bytes());
    store.create_pipeline(&record).unwrap();

    let fetched = store.get_pipeline(repo.id, "abc123").unwrap();
    assert_eq!(fetched.data, serialized.as_bytes());
    assert!(fetched.steps);
    assert!(fetched.templates);
    assert!(!fetched.stages);
}

fn test_state(config: &[u8]) -> (TempDir, Arc<AppState>) {
    let temp = TempDir::new().unwrap();
    let store = SqliteStore::new(temp.path().join("test.db"), 6).unwrap();
    store.initialize().unwrap();

    let repo = store.ensure_repo("octocat", "app").unwrap();
    let mut record = CompiledPipeline {
        repo_id: repo.id,
        git_ref: "abc123".to_string(),
        version: "1".to_string(),
        data: config.to_vec(),
        ..CompiledPipeline::default()
    };
    record.steps = true;
    store.create_pipeline(&record).unwrap();

    let state = Arc::new(AppState {
        store: Arc::new(store),
        registry: registry(),
        limits: Limits::default(),
        merge_policy: MergePolicy::default(),
    });

    (temp, state)
}

#[tokio::test]
async fn compile_endpoint_returns_compiled_document() {
    let (_temp, state) = test_state(PIPELINE_CONFIG);
    let app = create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/pipelines/octocat/app/abc123/compile?output=json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let doc: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(doc["steps"][0]["image"], "golang:1.20");
    assert_eq!(doc["steps"][0]["commands"][0], "go test -tags 1.20 ./...");
}

#[tokio::test]
async fn compile_endpoint_404s_for_unknown_pipeline() {
    let (_temp, state) = test_state(PIPELINE_CONFIG);
    let app = create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/pipelines/octocat/app/unknown/compile")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn validate_endpoint_rejects_cyclic_stages() {
    let config = b"
version: \"1\"
stages:
  - name: a
    depends_on: [b]
    steps:
      - name: s
        image: alpine
        commands: [\"true\"]
  - name: b
    depends_on: [a]
    steps:
      - name: s
        image: alpine
        commands: [\"true\"]
";
    let (_temp, state) = test_state(config);
    let app = create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/pipelines/octocat/app/abc123/validate")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let error: Value = serde_json::from_slice(&body).unwrap();
    assert!(error["error"].as_str().unwrap().contains("cycle"));
}

#[tokio::test]
async fn validate_endpoint_skips_expansion_when_template_is_false() {
    // The declared template is absent from the registry, so any
    // expansion attempt fails. template=false must not reach it.
    let config = b"
version: \"1\"
templates:
  - name: ghost
    source: octocat/templates/ghost.yml@main
steps:
  - name: ci
    template:
      name: ghost
";
    let (_temp, state) = test_state(config);
    let app = create_router(state);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/pipelines/octocat/app/abc123/validate?template=false")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/pipelines/octocat/app/abc123/validate")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn expand_endpoint_skips_substitution() {
    let config = b"
version: \"1\"
environment:
  VERSION: \"1.20\"
steps:
  - name: build
    image: golang
    commands:
      - go build -tags ${VERSION} ./...
";
    let (_temp, state) = test_state(config);
    let app = create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/pipelines/octocat/app/abc123/expand?output=json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let doc: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(doc["steps"][0]["commands"][0], "go build -tags ${VERSION} ./...");
}

#[tokio::test]
async fn templates_endpoint_lists_resolved_sources() {
    let (_temp, state) = test_state(PIPELINE_CONFIG);
    let app = create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/v1/pipelines/octocat/app/abc123/templates?output=json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let templates: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(templates["golang"]["resolved"]["org"], "octocat");
    assert_eq!(templates["golang"]["resolved"]["ref"], "main");
    assert_eq!(
        templates["golang"]["link"],
        "memory://octocat/templates/golang.yml@main"
    );
}

#[tokio::test]
async fn update_endpoint_applies_partial_fields() {
    let (_temp, state) = test_state(PIPELINE_CONFIG);
    let app = create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/api/v1/pipelines/octocat/app/abc123")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"flavor": "large"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let record: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(record["flavor"], "large");
    assert_eq!(record["ref"], "abc123");
}

#[tokio::test]
async fn update_endpoint_404s_on_malformed_body() {
    let (_temp, state) = test_state(PIPELINE_CONFIG);
    let app = create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/api/v1/pipelines/octocat/app/abc123")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
