pub const SCHEMA: &str = r#"
-- Minimal repo identity for resolving {org}/{repo} to a repo_id.
-- Full repo management lives outside this service.
CREATE TABLE IF NOT EXISTS repos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    org TEXT NOT NULL,
    name TEXT NOT NULL,

    UNIQUE(org, name)
);

-- Compiled pipeline configurations, one row per (repo_id, ref).
-- data holds the configuration bytes, zlib-compressed.
CREATE TABLE IF NOT EXISTS pipelines (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_id INTEGER NOT NULL REFERENCES repos(id) ON DELETE CASCADE,
    flavor TEXT,
    platform TEXT,
    ref TEXT NOT NULL,
    version TEXT,

    -- Presence flags recorded before compression
    services BOOLEAN NOT NULL DEFAULT 0,
    stages BOOLEAN NOT NULL DEFAULT 0,
    steps BOOLEAN NOT NULL DEFAULT 0,
    templates BOOLEAN NOT NULL DEFAULT 0,

    data BLOB,

    UNIQUE(repo_id, ref)
);

CREATE INDEX IF NOT EXISTS idx_pipelines_repo ON pipelines(repo_id);
"#;
