mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::{CompiledPipeline, Repo};

/// PipelineStore defines the persistence interface for compiled
/// pipelines. Implementations compress `data` on write and decompress
/// on read, so callers only ever see plain bytes.
pub trait PipelineStore: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // Repo resolution
    fn ensure_repo(&self, org: &str, name: &str) -> Result<Repo>;
    fn get_repo(&self, org: &str, name: &str) -> Result<Option<Repo>>;

    // Pipeline operations
    fn create_pipeline(&self, pipeline: &CompiledPipeline) -> Result<CompiledPipeline>;
    fn get_pipeline(&self, repo_id: i64, git_ref: &str) -> Result<CompiledPipeline>;
    fn update_pipeline(&self, pipeline: &CompiledPipeline) -> Result<CompiledPipeline>;
    fn delete_pipeline(&self, repo_id: i64, git_ref: &str) -> Result<bool>;
    fn list_pipelines(&self, repo_id: i64, cursor: &str, limit: i32)
    -> Result<Vec<CompiledPipeline>>;
    fn count_pipelines(&self, repo_id: i64) -> Result<i64>;

    fn close(&self) -> Result<()>;
}
