mod compiled;
mod pipeline;
mod repo;

pub use compiled::CompiledPipeline;
pub use pipeline::{
    Environment, PipelineDocument, Ruleset, Secret, Service, Stage, Step, Template,
    TemplateDirective,
};
pub use repo::Repo;
