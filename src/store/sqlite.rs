use std::io::{Read, Write};
use std::path::Path;
use std::sync::Mutex;

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use rusqlite::{Connection, OptionalExtension, params};

use super::PipelineStore;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::{CompiledPipeline, Repo};

pub struct SqliteStore {
    conn: Mutex<Connection>,
    /// zlib level applied to the data column on write.
    compression_level: u32,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P, compression_level: u32) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
            compression_level,
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = Vec::new();
        let mut writer = ZlibEncoder::new(&mut encoder, Compression::new(self.compression_level));
        writer.write_all(data)?;
        writer.finish()?;
        Ok(encoder)
    }

    fn decompress(data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = ZlibDecoder::new(data);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        Ok(out)
    }
}

fn row_to_pipeline(row: &rusqlite::Row<'_>) -> rusqlite::Result<CompiledPipeline> {
    Ok(CompiledPipeline {
        id: row.get(0)?,
        repo_id: row.get(1)?,
        flavor: row.get(2)?,
        platform: row.get(3)?,
        git_ref: row.get(4)?,
        version: row.get(5)?,
        services: row.get(6)?,
        stages: row.get(7)?,
        steps: row.get(8)?,
        templates: row.get(9)?,
        data: row.get(10)?,
    })
}

const PIPELINE_COLUMNS: &str =
    "id, repo_id, flavor, platform, ref, version, services, stages, steps, templates, data";

impl PipelineStore for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    fn ensure_repo(&self, org: &str, name: &str) -> Result<Repo> {
        if let Some(repo) = self.get_repo(org, name)? {
            return Ok(repo);
        }

        let result = {
            let conn = self.conn();
            conn.execute(
                "INSERT INTO repos (org, name) VALUES (?1, ?2)",
                params![org, name],
            )
            .map(|_| conn.last_insert_rowid())
        };

        match result {
            Ok(id) => Ok(Repo {
                id,
                org: org.to_string(),
                name: name.to_string(),
            }),
            // Lost the insert race to a concurrent caller; the row exists now.
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                self.get_repo(org, name)?.ok_or(Error::NotFound)
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_repo(&self, org: &str, name: &str) -> Result<Option<Repo>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, org, name FROM repos WHERE org = ?1 AND name = ?2",
            params![org, name],
            |row| {
                Ok(Repo {
                    id: row.get(0)?,
                    org: row.get(1)?,
                    name: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    fn create_pipeline(&self, pipeline: &CompiledPipeline) -> Result<CompiledPipeline> {
        pipeline.validate()?;

        let data = self.compress(&pipeline.data)?;

        let result = self.conn().execute(
            "INSERT INTO pipelines (repo_id, flavor, platform, ref, version, services, stages, steps, templates, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                pipeline.repo_id,
                pipeline.flavor,
                pipeline.platform,
                pipeline.git_ref,
                pipeline.version,
                pipeline.services,
                pipeline.stages,
                pipeline.steps,
                pipeline.templates,
                data,
            ],
        );

        match result {
            Ok(_) => self.get_pipeline(pipeline.repo_id, &pipeline.git_ref),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::PipelineExists)
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_pipeline(&self, repo_id: i64, git_ref: &str) -> Result<CompiledPipeline> {
        let row = {
            let conn = self.conn();
            conn.query_row(
                &format!(
                    "SELECT {PIPELINE_COLUMNS} FROM pipelines WHERE repo_id = ?1 AND ref = ?2"
                ),
                params![repo_id, git_ref],
                row_to_pipeline,
            )
            .optional()?
        };

        // A missing row is a distinct condition from corrupt data.
        let mut pipeline = row.ok_or(Error::NotFound)?;
        pipeline.data = Self::decompress(&pipeline.data)?;
        Ok(pipeline)
    }

    fn update_pipeline(&self, pipeline: &CompiledPipeline) -> Result<CompiledPipeline> {
        pipeline.validate()?;

        let data = self.compress(&pipeline.data)?;

        let rows = self.conn().execute(
            "UPDATE pipelines
             SET flavor = ?1, platform = ?2, version = ?3,
                 services = ?4, stages = ?5, steps = ?6, templates = ?7, data = ?8
             WHERE repo_id = ?9 AND ref = ?10",
            params![
                pipeline.flavor,
                pipeline.platform,
                pipeline.version,
                pipeline.services,
                pipeline.stages,
                pipeline.steps,
                pipeline.templates,
                data,
                pipeline.repo_id,
                pipeline.git_ref,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }

        self.get_pipeline(pipeline.repo_id, &pipeline.git_ref)
    }

    fn delete_pipeline(&self, repo_id: i64, git_ref: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM pipelines WHERE repo_id = ?1 AND ref = ?2",
            params![repo_id, git_ref],
        )?;
        Ok(rows > 0)
    }

    fn list_pipelines(
        &self,
        repo_id: i64,
        cursor: &str,
        limit: i32,
    ) -> Result<Vec<CompiledPipeline>> {
        let rows = {
            let conn = self.conn();
            let mut stmt = conn.prepare(&format!(
                "SELECT {PIPELINE_COLUMNS} FROM pipelines
                 WHERE repo_id = ?1 AND ref > ?2 ORDER BY ref LIMIT ?3"
            ))?;

            let rows = stmt.query_map(params![repo_id, cursor, limit], row_to_pipeline)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };

        rows.into_iter()
            .map(|mut pipeline| {
                pipeline.data = Self::decompress(&pipeline.data)?;
                Ok(pipeline)
            })
            .collect()
    }

    fn count_pipelines(&self, repo_id: i64) -> Result<i64> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pipelines WHERE repo_id = ?1",
            params![repo_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
