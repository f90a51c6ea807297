/// Current schema version.
pub const SCHEMA_VERSION: &str = "1";

/// Full SQL schema for the Strata graph database.
///
/// Edges carry no foreign keys: unresolved edges have no target, and
/// inbound edges are demoted explicitly when their target disappears.
pub const SCHEMA_SQL: &str = r"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS strata_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS projects (
    name TEXT PRIMARY KEY,
    roots TEXT NOT NULL DEFAULT '[]',
    languages TEXT NOT NULL DEFAULT '[]',
    updated_at TEXT NOT NULL
);

-- Last successfully processed version of each file
CREATE TABLE IF NOT EXISTS files (
    path TEXT PRIMARY KEY,
    project TEXT NOT NULL,
    language TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 1,
    status TEXT NOT NULL,
    diagnostic TEXT,
    processed_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_files_hash ON files(content_hash);

-- Every graph node, keyed by its qualified identifier
CREATE TABLE IF NOT EXISTS nodes (
    key TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    name TEXT NOT NULL,
    qualified_name TEXT NOT NULL,
    file_path TEXT,
    parent_key TEXT,
    language TEXT,
    start_line INTEGER,
    end_line INTEGER,
    arity INTEGER,
    enclosing_type TEXT,
    supertypes TEXT NOT NULL DEFAULT '[]',
    anonymous INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_nodes_file ON nodes(file_path);
CREATE INDEX IF NOT EXISTS idx_nodes_kind ON nodes(kind);
CREATE INDEX IF NOT EXISTS idx_nodes_name ON nodes(name);
CREATE INDEX IF NOT EXISTS idx_nodes_qualified ON nodes(qualified_name);

-- Directed edges, merged by identity key
CREATE TABLE IF NOT EXISTS edges (
    identity_key TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    source_key TEXT NOT NULL,
    target_key TEXT,
    state TEXT NOT NULL,
    hint TEXT,
    owner_file TEXT NOT NULL,
    origin TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 1.0,
    line INTEGER NOT NULL DEFAULT 0,
    occurrences INTEGER NOT NULL DEFAULT 1,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_key);
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_key);
CREATE INDEX IF NOT EXISTS idx_edges_owner ON edges(owner_file);
CREATE INDEX IF NOT EXISTS idx_edges_state_kind ON edges(state, kind);
";

/// Projected views for retrieval consumers.
pub const VIEWS_SQL: &str = r"
-- Resolved call graph as (caller, callee) pairs
CREATE VIEW IF NOT EXISTS call_graph AS
SELECT source_key AS caller_key, target_key AS callee_key, confidence, occurrences
FROM edges
WHERE kind = 'CALLS' AND state = 'resolved';

-- Resolved import graph as (importing file, imported entity) pairs
CREATE VIEW IF NOT EXISTS import_graph AS
SELECT source_key AS importer_key, target_key AS imported_key, confidence
FROM edges
WHERE kind = 'IMPORTS' AND state = 'resolved';

-- Edges still waiting for the resolver
CREATE VIEW IF NOT EXISTS pending_references AS
SELECT identity_key, kind, source_key, owner_file, hint
FROM edges
WHERE state = 'unresolved';
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_executes_on_in_memory_sqlite() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();
        conn.execute_batch(VIEWS_SQL).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        for table in ["edges", "files", "nodes", "projects", "strata_meta"] {
            assert!(tables.contains(&table.to_string()), "missing table {table}");
        }
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();
        conn.execute_batch(VIEWS_SQL).unwrap();
        conn.execute_batch(VIEWS_SQL).unwrap();
    }
}
