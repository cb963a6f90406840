use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unable to parse pipeline: {0}")]
    Parse(String),

    #[error("unable to resolve template {name} from {locator}: {reason}")]
    TemplateResolution {
        name: String,
        locator: String,
        reason: String,
    },

    #[error("template {0} contains a nested template directive")]
    NestedTemplate(String),

    #[error("duplicate step name {step} in stage {stage}")]
    DuplicateStepName { step: String, stage: String },

    #[error("invalid pipeline configuration: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("unable to substitute variables: {0}")]
    Substitution(String),

    #[error("not found")]
    NotFound,

    #[error("pipeline already exists for this repo and ref")]
    PipelineExists,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl Error {
    /// True when the error is the caller's configuration rather than a
    /// server-side failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Parse(_)
                | Error::TemplateResolution { .. }
                | Error::NestedTemplate(_)
                | Error::DuplicateStepName { .. }
                | Error::Validation(_)
                | Error::Substitution(_)
                | Error::BadRequest(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
