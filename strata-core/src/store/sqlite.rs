use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use strata_graphs::identity;
use strata_graphs::ir::edge_identity;
use strata_graphs::{EntityDecl, RelationFact, RelationKind, Target};

use crate::error::StoreError;
use crate::types::{
    BatchOutcome, EdgeFilter, EdgeOrigin, EdgeRecord, EdgeState, FileBatch, FileRecord,
    FileStatus, NodeFilter, NodeKind, NodeRecord, OverridePair, Resolution, StoreStats,
};

use super::GraphStore;
use super::schema;

/// Default time a writer waits on a locked database.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed implementation of `GraphStore`.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    pub fn open(path: &Path) -> crate::error::Result<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    pub fn open_with_timeout(path: &Path, busy_timeout: Duration) -> crate::error::Result<Self> {
        let conn = Connection::open(path).map_err(StoreError::Sqlite)?;
        conn.busy_timeout(busy_timeout).map_err(StoreError::Sqlite)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(path.to_path_buf()),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> crate::error::Result<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::Sqlite)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn initialize(&self) -> crate::error::Result<()> {
        let conn = self.conn.lock().expect("strata store mutex poisoned");

        conn.execute_batch(
            "PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(StoreError::Sqlite)?;

        // Ignored for in-memory databases
        let _ = conn.execute_batch("PRAGMA journal_mode = WAL;");

        conn.execute_batch(schema::SCHEMA_SQL)
            .map_err(StoreError::Sqlite)?;
        conn.execute_batch(schema::VIEWS_SQL)
            .map_err(StoreError::Sqlite)?;

        conn.execute(
            "INSERT OR IGNORE INTO strata_meta (key, value) VALUES ('schema_version', ?1)",
            params![schema::SCHEMA_VERSION],
        )
        .map_err(StoreError::Sqlite)?;

        let version: String = conn
            .query_row(
                "SELECT value FROM strata_meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .map_err(StoreError::Sqlite)?;
        if version != schema::SCHEMA_VERSION {
            return Err(StoreError::Migration(format!(
                "database has schema version {version}, expected {}",
                schema::SCHEMA_VERSION
            ))
            .into());
        }

        Ok(())
    }

    // ── Row mapping ────────────────────────────────────────────────

    fn row_to_node(row: &rusqlite::Row<'_>) -> rusqlite::Result<NodeRecord> {
        let kind_str: String = row.get("kind")?;
        let supertypes_str: String = row.get("supertypes")?;
        let anonymous: i64 = row.get("anonymous")?;

        Ok(NodeRecord {
            key: row.get("key")?,
            kind: NodeKind::parse(&kind_str).unwrap_or(NodeKind::Variable),
            name: row.get("name")?,
            qualified_name: row.get("qualified_name")?,
            file_path: row.get("file_path")?,
            parent_key: row.get("parent_key")?,
            language: row.get("language")?,
            start_line: row.get("start_line")?,
            end_line: row.get("end_line")?,
            arity: row.get("arity")?,
            enclosing_type: row.get("enclosing_type")?,
            supertypes: serde_json::from_str(&supertypes_str).unwrap_or_default(),
            anonymous: anonymous != 0,
        })
    }

    fn row_to_edge(row: &rusqlite::Row<'_>) -> rusqlite::Result<EdgeRecord> {
        let kind_str: String = row.get("kind")?;
        let state_str: String = row.get("state")?;
        let origin_str: String = row.get("origin")?;
        let hint_str: Option<String> = row.get("hint")?;

        Ok(EdgeRecord {
            identity_key: row.get("identity_key")?,
            kind: RelationKind::parse(&kind_str).unwrap_or(RelationKind::References),
            source_key: row.get("source_key")?,
            target_key: row.get("target_key")?,
            state: EdgeState::parse(&state_str).unwrap_or(EdgeState::Unresolved),
            hint: hint_str.and_then(|h| serde_json::from_str(&h).ok()),
            owner_file: row.get("owner_file")?,
            origin: EdgeOrigin::parse(&origin_str).unwrap_or(EdgeOrigin::Extractor),
            confidence: row.get("confidence")?,
            line: row.get("line")?,
            occurrences: row.get("occurrences")?,
        })
    }

    fn row_to_file(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
        let status_str: String = row.get("status")?;
        let processed_str: String = row.get("processed_at")?;
        let version: i64 = row.get("version")?;

        Ok(FileRecord {
            path: row.get("path")?,
            project: row.get("project")?,
            language: row.get("language")?,
            content_hash: row.get("content_hash")?,
            version: u64::try_from(version).unwrap_or_default(),
            status: FileStatus::parse(&status_str).unwrap_or(FileStatus::Parsed),
            diagnostic: row.get("diagnostic")?,
            processed_at: DateTime::parse_from_rfc3339(&processed_str)
                .map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc)),
        })
    }
}

// ── Transaction bodies ─────────────────────────────────────────────
//
// Each takes a connection that is already inside a transaction so that
// relocation can compose a batch write with a file removal.

fn line_of(row: usize) -> u32 {
    u32::try_from(row + 1).unwrap_or(u32::MAX)
}

fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

fn upsert_node(conn: &Connection, node: &NodeRecord, now: &str) -> Result<(), StoreError> {
    let supertypes = serde_json::to_string(&node.supertypes)?;
    conn.prepare_cached(
        "INSERT INTO nodes (key, kind, name, qualified_name, file_path, parent_key, language,
                            start_line, end_line, arity, enclosing_type, supertypes, anonymous,
                            updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
         ON CONFLICT(key) DO UPDATE SET
            kind = excluded.kind,
            name = excluded.name,
            qualified_name = excluded.qualified_name,
            file_path = excluded.file_path,
            parent_key = excluded.parent_key,
            language = excluded.language,
            start_line = excluded.start_line,
            end_line = excluded.end_line,
            arity = excluded.arity,
            enclosing_type = excluded.enclosing_type,
            supertypes = excluded.supertypes,
            anonymous = excluded.anonymous,
            updated_at = excluded.updated_at",
    )?
    .execute(params![
        node.key,
        node.kind.as_str(),
        node.name,
        node.qualified_name,
        node.file_path,
        node.parent_key,
        node.language,
        node.start_line,
        node.end_line,
        node.arity,
        node.enclosing_type,
        supertypes,
        i64::from(node.anonymous),
        now,
    ])?;
    Ok(())
}

fn upsert_edge(conn: &Connection, edge: &EdgeRecord, now: &str) -> Result<(), StoreError> {
    let hint = edge.hint.as_ref().map(serde_json::to_string).transpose()?;
    conn.prepare_cached(
        "INSERT INTO edges (identity_key, kind, source_key, target_key, state, hint, owner_file,
                            origin, confidence, line, occurrences, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT(identity_key) DO UPDATE SET
            target_key = excluded.target_key,
            state = excluded.state,
            hint = excluded.hint,
            owner_file = excluded.owner_file,
            origin = excluded.origin,
            confidence = excluded.confidence,
            line = excluded.line,
            occurrences = excluded.occurrences,
            updated_at = excluded.updated_at",
    )?
    .execute(params![
        edge.identity_key,
        edge.kind.as_str(),
        edge.source_key,
        edge.target_key,
        edge.state.as_str(),
        hint,
        edge.owner_file,
        edge.origin.as_str(),
        edge.confidence,
        edge.line,
        edge.occurrences,
        now,
    ])?;
    Ok(())
}

fn entity_node(decl: &EntityDecl, path: &str, language: &str) -> NodeRecord {
    NodeRecord {
        key: decl.key.clone(),
        kind: decl.kind.into(),
        name: decl.name.clone(),
        qualified_name: decl.qualified_name.clone(),
        file_path: Some(path.to_string()),
        parent_key: Some(decl.parent.clone()),
        language: Some(language.to_string()),
        start_line: Some(line_of(decl.span.start_row)),
        end_line: Some(line_of(decl.span.end_row)),
        arity: decl.arity.and_then(|a| u32::try_from(a).ok()),
        enclosing_type: decl.enclosing_type.clone(),
        supertypes: decl.supertypes.clone(),
        anonymous: decl.anonymous,
    }
}

fn fact_edge(fact: &RelationFact, owner: &str) -> EdgeRecord {
    let (target_key, state) = match &fact.target {
        Target::Resolved(key) => (Some(key.clone()), EdgeState::Resolved),
        Target::Unresolved => (None, EdgeState::Unresolved),
    };
    EdgeRecord {
        identity_key: fact.identity_key(),
        kind: fact.kind,
        source_key: fact.source.clone(),
        target_key,
        state,
        hint: fact.hint.clone(),
        owner_file: owner.to_string(),
        origin: EdgeOrigin::Extractor,
        confidence: fact.confidence,
        line: u32::try_from(fact.line).unwrap_or(u32::MAX),
        occurrences: fact.occurrences,
    }
}

fn keys_of_file(conn: &Connection, path: &str) -> Result<HashSet<String>, StoreError> {
    let mut stmt = conn.prepare_cached("SELECT key FROM nodes WHERE file_path = ?1")?;
    let keys = stmt
        .query_map(params![path], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<HashSet<_>>>()?;
    Ok(keys)
}

/// Detach removed nodes from the rest of the graph: derived overrides go,
/// inbound edges owned by other files become unresolved again.
fn detach_nodes(
    conn: &Connection,
    keys: &HashSet<String>,
    owner: &str,
    now: &str,
    outcome: &mut BatchOutcome,
) -> Result<(), StoreError> {
    for key in keys {
        let overrides = conn
            .prepare_cached(
                "DELETE FROM edges WHERE kind = 'OVERRIDES' AND (source_key = ?1 OR target_key = ?1)",
            )?
            .execute(params![key])?;
        let demoted = conn
            .prepare_cached(
                "UPDATE edges SET target_key = NULL, state = 'unresolved', origin = 'store',
                                  confidence = 1.0, updated_at = ?3
                 WHERE target_key = ?1 AND owner_file != ?2",
            )?
            .execute(params![key, owner, now])?;
        outcome.edges_removed += overrides as u64;
        outcome.edges_demoted += demoted as u64;
    }
    Ok(())
}

fn write_batch(conn: &Connection, batch: &FileBatch, now: &str) -> Result<BatchOutcome, StoreError> {
    let path = batch.path();
    let language = batch.language();
    let mut outcome = BatchOutcome::default();

    let previous: Option<(String, i64)> = conn
        .query_row(
            "SELECT content_hash, version FROM files WHERE path = ?1",
            params![path],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let version = match &previous {
        None => 1,
        Some((hash, version)) if *hash == batch.content_hash => *version,
        Some((_, version)) => version + 1,
    };
    outcome.content_changed = previous
        .as_ref()
        .is_none_or(|(hash, _)| *hash != batch.content_hash);
    outcome.version = u64::try_from(version).unwrap_or_default();

    conn.execute(
        "INSERT INTO files (path, project, language, content_hash, version, status, diagnostic,
                            processed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(path) DO UPDATE SET
            project = excluded.project,
            language = excluded.language,
            processed_at = CASE WHEN files.content_hash = excluded.content_hash
                                THEN files.processed_at ELSE excluded.processed_at END,
            content_hash = excluded.content_hash,
            version = excluded.version,
            status = excluded.status,
            diagnostic = excluded.diagnostic",
        params![
            path,
            batch.project,
            language,
            batch.content_hash,
            version,
            batch.status.as_str(),
            batch.diagnostic,
            now,
        ],
    )?;

    // File node and its project containment.
    let project_key = identity::project_key(&batch.project);
    let mut nodes = vec![NodeRecord {
        key: identity::file_key(path),
        kind: NodeKind::File,
        name: file_name(path).to_string(),
        qualified_name: path.to_string(),
        file_path: Some(path.to_string()),
        parent_key: Some(project_key.clone()),
        language: Some(language.to_string()),
        start_line: None,
        end_line: None,
        arity: None,
        enclosing_type: None,
        supertypes: Vec::new(),
        anonymous: false,
    }];
    nodes.extend(
        batch
            .extraction
            .entities
            .iter()
            .map(|e| entity_node(e, path, language)),
    );

    let mut edges = vec![EdgeRecord {
        identity_key: edge_identity(RelationKind::Contains, &project_key, path),
        kind: RelationKind::Contains,
        source_key: project_key,
        target_key: Some(identity::file_key(path)),
        state: EdgeState::Resolved,
        hint: None,
        owner_file: path.to_string(),
        origin: EdgeOrigin::Store,
        confidence: 1.0,
        line: 0,
        occurrences: 1,
    }];
    edges.extend(batch.extraction.relations.iter().map(|f| fact_edge(f, path)));

    // Nodes: merge, then drop what the file no longer declares.
    let existing_nodes = keys_of_file(conn, path)?;
    let new_nodes: HashSet<&str> = nodes.iter().map(|n| n.key.as_str()).collect();
    for node in &nodes {
        upsert_node(conn, node, now)?;
    }
    outcome.nodes_written = nodes.len() as u64;

    let removed: HashSet<String> = existing_nodes
        .into_iter()
        .filter(|k| !new_nodes.contains(k.as_str()))
        .collect();
    detach_nodes(conn, &removed, path, now, &mut outcome)?;
    for key in &removed {
        conn.prepare_cached("DELETE FROM nodes WHERE key = ?1")?
            .execute(params![key])?;
    }
    outcome.nodes_removed = removed.len() as u64;

    // Edges: merge (resetting to the extracted state), then drop stale ones.
    // Derived overrides are left to the resolver.
    let existing_edges: Vec<String> = conn
        .prepare_cached(
            "SELECT identity_key FROM edges WHERE owner_file = ?1 AND kind != 'OVERRIDES'",
        )?
        .query_map(params![path], |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;
    let new_edges: HashSet<&str> = edges.iter().map(|e| e.identity_key.as_str()).collect();
    for edge in &edges {
        upsert_edge(conn, edge, now)?;
    }
    outcome.edges_written = edges.len() as u64;

    for key in existing_edges {
        if !new_edges.contains(key.as_str()) {
            conn.prepare_cached("DELETE FROM edges WHERE identity_key = ?1")?
                .execute(params![key])?;
            outcome.edges_removed += 1;
        }
    }

    Ok(outcome)
}

fn remove_file(conn: &Connection, path: &str, now: &str) -> Result<BatchOutcome, StoreError> {
    let mut outcome = BatchOutcome::default();
    let keys = keys_of_file(conn, path)?;
    detach_nodes(conn, &keys, path, now, &mut outcome)?;

    let owned = conn.execute("DELETE FROM edges WHERE owner_file = ?1", params![path])?;
    outcome.edges_removed += owned as u64;
    let nodes = conn.execute("DELETE FROM nodes WHERE file_path = ?1", params![path])?;
    outcome.nodes_removed = nodes as u64;
    conn.execute("DELETE FROM files WHERE path = ?1", params![path])?;
    Ok(outcome)
}

fn repoint_inbound(
    conn: &Connection,
    old_path: &str,
    new_path: &str,
    now: &str,
) -> Result<u64, StoreError> {
    let mut moved = 0;
    for old_key in keys_of_file(conn, old_path)? {
        let Some(new_key) = identity::relocate_key(&old_key, old_path, new_path) else {
            continue;
        };
        let changed = conn
            .prepare_cached(
                "UPDATE edges SET target_key = ?2, updated_at = ?5
                 WHERE target_key = ?1 AND owner_file NOT IN (?3, ?4) AND kind != 'OVERRIDES'
                   AND EXISTS (SELECT 1 FROM nodes WHERE key = ?2)",
            )?
            .execute(params![old_key, new_key, old_path, new_path, now])?;
        moved += changed as u64;
    }
    Ok(moved)
}

fn append_filter(
    sql: &mut String,
    values: &mut Vec<Box<dyn rusqlite::types::ToSql>>,
    column: &str,
    value: Option<String>,
) {
    if let Some(value) = value {
        let _ = write!(sql, " AND {column} = ?{}", values.len() + 1);
        values.push(Box::new(value));
    }
}

#[async_trait::async_trait]
impl GraphStore for SqliteStore {
    async fn ensure_project(
        &self,
        name: &str,
        roots: &[PathBuf],
        languages: &[String],
    ) -> crate::error::Result<()> {
        let conn = self.conn.lock().expect("strata store mutex poisoned");
        let now = Utc::now().to_rfc3339();
        let roots: Vec<String> = roots.iter().map(|r| r.display().to_string()).collect();
        let roots_json = serde_json::to_string(&roots).map_err(StoreError::Serialization)?;
        let languages_json =
            serde_json::to_string(languages).map_err(StoreError::Serialization)?;

        let tx = conn.unchecked_transaction().map_err(StoreError::Sqlite)?;
        tx.execute(
            "INSERT INTO projects (name, roots, languages, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(name) DO UPDATE SET
                roots = excluded.roots,
                languages = excluded.languages,
                updated_at = excluded.updated_at",
            params![name, roots_json, languages_json, now],
        )
        .map_err(StoreError::Sqlite)?;
        upsert_node(
            &tx,
            &NodeRecord {
                key: identity::project_key(name),
                kind: NodeKind::Project,
                name: name.to_string(),
                qualified_name: name.to_string(),
                file_path: None,
                parent_key: None,
                language: None,
                start_line: None,
                end_line: None,
                arity: None,
                enclosing_type: None,
                supertypes: Vec::new(),
                anonymous: false,
            },
            &now,
        )?;
        tx.commit().map_err(StoreError::Sqlite)?;
        Ok(())
    }

    async fn apply_file_batch(&self, batch: &FileBatch) -> crate::error::Result<BatchOutcome> {
        let conn = self.conn.lock().expect("strata store mutex poisoned");
        let now = Utc::now().to_rfc3339();
        let tx = conn.unchecked_transaction().map_err(StoreError::Sqlite)?;
        let outcome = write_batch(&tx, batch, &now)?;
        tx.commit().map_err(StoreError::Sqlite)?;
        Ok(outcome)
    }

    async fn delete_file(&self, path: &str) -> crate::error::Result<BatchOutcome> {
        let conn = self.conn.lock().expect("strata store mutex poisoned");
        let now = Utc::now().to_rfc3339();
        let tx = conn.unchecked_transaction().map_err(StoreError::Sqlite)?;
        let outcome = remove_file(&tx, path, &now)?;
        tx.commit().map_err(StoreError::Sqlite)?;
        Ok(outcome)
    }

    async fn relocate_file(
        &self,
        old_path: &str,
        batch: &FileBatch,
    ) -> crate::error::Result<BatchOutcome> {
        let conn = self.conn.lock().expect("strata store mutex poisoned");
        let now = Utc::now().to_rfc3339();
        let tx = conn.unchecked_transaction().map_err(StoreError::Sqlite)?;

        let mut outcome = write_batch(&tx, batch, &now)?;
        if old_path != batch.path() {
            outcome.edges_repointed = repoint_inbound(&tx, old_path, batch.path(), &now)?;
            let removed = remove_file(&tx, old_path, &now)?;
            outcome.nodes_removed += removed.nodes_removed;
            outcome.edges_removed += removed.edges_removed;
            outcome.edges_demoted += removed.edges_demoted;
        }

        tx.commit().map_err(StoreError::Sqlite)?;
        Ok(outcome)
    }

    async fn file_record(&self, path: &str) -> crate::error::Result<Option<FileRecord>> {
        let conn = self.conn.lock().expect("strata store mutex poisoned");
        conn.query_row(
            "SELECT * FROM files WHERE path = ?1",
            params![path],
            Self::row_to_file,
        )
        .optional()
        .map_err(|e| StoreError::Sqlite(e).into())
    }

    async fn file_records(&self) -> crate::error::Result<Vec<FileRecord>> {
        let conn = self.conn.lock().expect("strata store mutex poisoned");
        let mut stmt = conn
            .prepare("SELECT * FROM files ORDER BY path")
            .map_err(StoreError::Sqlite)?;
        let files = stmt
            .query_map([], Self::row_to_file)
            .map_err(StoreError::Sqlite)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Sqlite)?;
        Ok(files)
    }

    async fn node(&self, key: &str) -> crate::error::Result<Option<NodeRecord>> {
        let conn = self.conn.lock().expect("strata store mutex poisoned");
        conn.query_row(
            "SELECT * FROM nodes WHERE key = ?1",
            params![key],
            Self::row_to_node,
        )
        .optional()
        .map_err(|e| StoreError::Sqlite(e).into())
    }

    async fn find_nodes(&self, filter: &NodeFilter) -> crate::error::Result<Vec<NodeRecord>> {
        let conn = self.conn.lock().expect("strata store mutex poisoned");
        let mut sql = String::from("SELECT * FROM nodes WHERE 1=1");
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        append_filter(
            &mut sql,
            &mut param_values,
            "kind",
            filter.kind.map(|k| k.as_str().to_string()),
        );
        append_filter(&mut sql, &mut param_values, "file_path", filter.file_path.clone());
        append_filter(&mut sql, &mut param_values, "name", filter.name.clone());
        append_filter(
            &mut sql,
            &mut param_values,
            "qualified_name",
            filter.qualified_name.clone(),
        );
        sql.push_str(" ORDER BY key");
        if let Some(limit) = filter.limit {
            let _ = write!(sql, " LIMIT {limit}");
        }

        let mut stmt = conn.prepare(&sql).map_err(StoreError::Sqlite)?;
        let params_ref: Vec<&dyn rusqlite::types::ToSql> = param_values
            .iter()
            .map(std::convert::AsRef::as_ref)
            .collect();
        let nodes = stmt
            .query_map(params_ref.as_slice(), Self::row_to_node)
            .map_err(StoreError::Sqlite)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Sqlite)?;

        Ok(nodes)
    }

    async fn find_edges(&self, filter: &EdgeFilter) -> crate::error::Result<Vec<EdgeRecord>> {
        let conn = self.conn.lock().expect("strata store mutex poisoned");
        let mut sql = String::from("SELECT * FROM edges WHERE 1=1");
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        append_filter(
            &mut sql,
            &mut param_values,
            "kind",
            filter.kind.map(|k| k.as_str().to_string()),
        );
        append_filter(
            &mut sql,
            &mut param_values,
            "state",
            filter.state.map(|s| s.as_str().to_string()),
        );
        append_filter(&mut sql, &mut param_values, "owner_file", filter.owner_file.clone());
        append_filter(&mut sql, &mut param_values, "source_key", filter.source_key.clone());
        append_filter(&mut sql, &mut param_values, "target_key", filter.target_key.clone());
        sql.push_str(" ORDER BY identity_key");

        let mut stmt = conn.prepare(&sql).map_err(StoreError::Sqlite)?;
        let params_ref: Vec<&dyn rusqlite::types::ToSql> = param_values
            .iter()
            .map(std::convert::AsRef::as_ref)
            .collect();
        let edges = stmt
            .query_map(params_ref.as_slice(), Self::row_to_edge)
            .map_err(StoreError::Sqlite)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Sqlite)?;

        Ok(edges)
    }

    async fn apply_resolutions(&self, resolutions: &[Resolution]) -> crate::error::Result<u64> {
        let conn = self.conn.lock().expect("strata store mutex poisoned");
        let now = Utc::now().to_rfc3339();
        let tx = conn.unchecked_transaction().map_err(StoreError::Sqlite)?;
        let mut applied = 0u64;
        {
            let mut resolve = tx
                .prepare_cached(
                    "UPDATE edges SET target_key = ?2, state = 'resolved', origin = 'resolver',
                                      confidence = ?3, updated_at = ?4
                     WHERE identity_key = ?1 AND state = 'unresolved'
                       AND EXISTS (SELECT 1 FROM nodes WHERE key = ?2)
                       AND EXISTS (SELECT 1 FROM files
                                   WHERE path = edges.owner_file AND content_hash = ?5)",
                )
                .map_err(StoreError::Sqlite)?;
            let mut give_up = tx
                .prepare_cached(
                    "UPDATE edges SET state = 'unresolvable', origin = 'resolver',
                                      confidence = ?2, updated_at = ?3
                     WHERE identity_key = ?1 AND state = 'unresolved'
                       AND EXISTS (SELECT 1 FROM files
                                   WHERE path = edges.owner_file AND content_hash = ?4)",
                )
                .map_err(StoreError::Sqlite)?;
            for r in resolutions {
                let changed = match &r.target_key {
                    Some(target) => resolve.execute(params![
                        r.identity_key,
                        target,
                        r.confidence,
                        now,
                        r.owner_hash
                    ]),
                    None => give_up.execute(params![r.identity_key, r.confidence, now, r.owner_hash]),
                }
                .map_err(StoreError::Sqlite)?;
                applied += changed as u64;
            }
        }
        tx.commit().map_err(StoreError::Sqlite)?;
        Ok(applied)
    }

    async fn replace_overrides(&self, pairs: &[OverridePair]) -> crate::error::Result<u64> {
        let conn = self.conn.lock().expect("strata store mutex poisoned");
        let now = Utc::now().to_rfc3339();
        let tx = conn.unchecked_transaction().map_err(StoreError::Sqlite)?;
        tx.execute("DELETE FROM edges WHERE kind = 'OVERRIDES'", [])
            .map_err(StoreError::Sqlite)?;
        let mut written = 0u64;
        {
            let mut insert = tx
                .prepare_cached(
                    "INSERT INTO edges (identity_key, kind, source_key, target_key, state, hint,
                                        owner_file, origin, confidence, line, occurrences,
                                        updated_at)
                     SELECT ?1, 'OVERRIDES', ?2, ?3, 'resolved', NULL, ?4, 'resolver', 1.0,
                            COALESCE((SELECT start_line FROM nodes WHERE key = ?2), 0), 1, ?5
                     WHERE EXISTS (SELECT 1 FROM nodes WHERE key = ?2)
                       AND EXISTS (SELECT 1 FROM nodes WHERE key = ?3)
                     ON CONFLICT(identity_key) DO NOTHING",
                )
                .map_err(StoreError::Sqlite)?;
            for pair in pairs {
                let identity = edge_identity(RelationKind::Overrides, &pair.method, &pair.overridden);
                written += insert
                    .execute(params![
                        identity,
                        pair.method,
                        pair.overridden,
                        pair.owner_file,
                        now
                    ])
                    .map_err(StoreError::Sqlite)? as u64;
            }
        }
        tx.commit().map_err(StoreError::Sqlite)?;
        Ok(written)
    }

    async fn ping(&self) -> crate::error::Result<()> {
        let conn = self.conn.lock().expect("strata store mutex poisoned");
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(StoreError::Sqlite)?;
        Ok(())
    }

    async fn stats(&self) -> crate::error::Result<StoreStats> {
        let conn = self.conn.lock().expect("strata store mutex poisoned");
        let count = |sql: &str| -> crate::error::Result<u64> {
            let n: i64 = conn
                .query_row(sql, [], |row| row.get(0))
                .map_err(StoreError::Sqlite)?;
            Ok(u64::try_from(n).unwrap_or_default())
        };
        let grouped = |sql: &str| -> crate::error::Result<HashMap<String, u64>> {
            let mut stmt = conn.prepare(sql).map_err(StoreError::Sqlite)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })
                .map_err(StoreError::Sqlite)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(StoreError::Sqlite)?;
            Ok(rows
                .into_iter()
                .map(|(k, n)| (k, u64::try_from(n).unwrap_or_default()))
                .collect())
        };

        Ok(StoreStats {
            projects: count("SELECT COUNT(*) FROM projects")?,
            files: count("SELECT COUNT(*) FROM files")?,
            parse_errors: count("SELECT COUNT(*) FROM files WHERE status = 'parse_error'")?,
            total_nodes: count("SELECT COUNT(*) FROM nodes")?,
            total_edges: count("SELECT COUNT(*) FROM edges")?,
            unresolved_edges: count("SELECT COUNT(*) FROM edges WHERE state = 'unresolved'")?,
            unresolvable_edges: count(
                "SELECT COUNT(*) FROM edges WHERE state = 'unresolvable'",
            )?,
            nodes_by_kind: grouped("SELECT kind, COUNT(*) FROM nodes GROUP BY kind")?,
            edges_by_kind: grouped("SELECT kind, COUNT(*) FROM edges GROUP BY kind")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use strata_graphs::{LanguageRegistry, SourceUnit, extract_source};

    use super::*;

    fn batch(path: &str, source: &str) -> FileBatch {
        let registry = LanguageRegistry::default();
        let support = registry.for_file(Path::new(path)).unwrap();
        let unit = SourceUnit {
            path,
            relative: Path::new(path),
            text: source,
        };
        let outcome = extract_source(support.as_ref(), &unit).unwrap();
        FileBatch {
            project: "demo".into(),
            content_hash: format!("{:x}", source.len()),
            status: FileStatus::Parsed,
            diagnostic: None,
            extraction: outcome.into_extraction(),
        }
    }

    async fn store_with(files: &[(&str, &str)]) -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        store
            .ensure_project("demo", &[PathBuf::from(".")], &["python".into()])
            .await
            .unwrap();
        for (path, source) in files {
            store.apply_file_batch(&batch(path, source)).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn batch_creates_file_entities_and_containment() {
        let store = store_with(&[("a.py", "class A:\n    def m(self):\n        pass\n")]).await;

        let file = store.file_record("a.py").await.unwrap().unwrap();
        assert_eq!(file.version, 1);
        assert_eq!(file.status, FileStatus::Parsed);

        let class = store.node("a.py#A@class").await.unwrap().unwrap();
        assert_eq!(class.qualified_name, "a.A");
        assert_eq!(class.parent_key.as_deref(), Some("a.py#@module"));

        let project_edges = store.edges_from("project:demo").await.unwrap();
        assert_eq!(project_edges.len(), 1);
        assert_eq!(project_edges[0].target_key.as_deref(), Some("a.py"));
        assert_eq!(project_edges[0].origin, EdgeOrigin::Store);
    }

    #[tokio::test]
    async fn reapplying_a_batch_is_idempotent() {
        let store = store_with(&[]).await;
        let b = batch("a.py", "def f():\n    g()\n\ndef g():\n    pass\n");
        let first = store.apply_file_batch(&b).await.unwrap();
        let nodes = store.find_nodes(&NodeFilter::default()).await.unwrap();
        let edges = store.find_edges(&EdgeFilter::default()).await.unwrap();

        let second = store.apply_file_batch(&b).await.unwrap();
        assert!(first.content_changed);
        assert!(!second.content_changed);
        assert_eq!(second.version, first.version);
        assert_eq!(store.find_nodes(&NodeFilter::default()).await.unwrap(), nodes);
        assert_eq!(store.find_edges(&EdgeFilter::default()).await.unwrap(), edges);
    }

    #[tokio::test]
    async fn changed_content_bumps_version_and_drops_stale_entities() {
        let store = store_with(&[("a.py", "def f():\n    pass\n\ndef g():\n    pass\n")]).await;
        let outcome = store
            .apply_file_batch(&batch("a.py", "def f():\n    return 1\n"))
            .await
            .unwrap();
        assert!(outcome.content_changed);
        assert_eq!(outcome.version, 2);
        assert_eq!(outcome.nodes_removed, 1);
        assert!(store.node("a.py#g@function").await.unwrap().is_none());
        assert!(store.node("a.py#f@function").await.unwrap().is_some());
        let stale = store
            .find_edges(&EdgeFilter {
                target_key: Some("a.py#g@function".into()),
                ..EdgeFilter::default()
            })
            .await
            .unwrap();
        assert!(stale.is_empty());
    }

    #[tokio::test]
    async fn deleting_a_file_demotes_inbound_edges() {
        let store = store_with(&[
            ("a.py", "def foo():\n    pass\n"),
            ("b.py", "from a import foo\n\nfoo()\n"),
        ])
        .await;
        let owner = store.file_record("b.py").await.unwrap().unwrap().content_hash;
        let call = store
            .find_edges(&EdgeFilter {
                kind: Some(RelationKind::Calls),
                owner_file: Some("b.py".into()),
                ..EdgeFilter::default()
            })
            .await
            .unwrap()
            .remove(0);
        let applied = store
            .apply_resolutions(&[Resolution {
                identity_key: call.identity_key.clone(),
                target_key: Some("a.py#foo@function".into()),
                confidence: 0.9,
                owner_hash: owner.clone(),
            }])
            .await
            .unwrap();
        assert_eq!(applied, 1);

        let outcome = store.delete_file("a.py").await.unwrap();
        assert_eq!(outcome.edges_demoted, 1);
        assert!(store.file_record("a.py").await.unwrap().is_none());
        assert!(store.node("a.py#foo@function").await.unwrap().is_none());

        let edges = store.edges_from(&call.source_key).await.unwrap();
        let demoted = edges
            .iter()
            .find(|e| e.identity_key == call.identity_key)
            .unwrap();
        assert_eq!(demoted.state, EdgeState::Unresolved);
        assert_eq!(demoted.target_key, None);
        assert_eq!(demoted.hint.as_ref().unwrap().text, "foo");
    }

    #[tokio::test]
    async fn resolutions_are_guarded() {
        let store = store_with(&[("b.py", "foo()\n")]).await;
        let owner = store.file_record("b.py").await.unwrap().unwrap().content_hash;
        let call = store
            .find_edges(&EdgeFilter {
                kind: Some(RelationKind::Calls),
                ..EdgeFilter::default()
            })
            .await
            .unwrap()
            .remove(0);

        // Missing target: not applied.
        let applied = store
            .apply_resolutions(&[Resolution {
                identity_key: call.identity_key.clone(),
                target_key: Some("a.py#foo@function".into()),
                confidence: 1.0,
                owner_hash: owner.clone(),
            }])
            .await
            .unwrap();
        assert_eq!(applied, 0);

        // Unknown identity: not applied.
        let applied = store
            .apply_resolutions(&[Resolution {
                identity_key: "CALLS|x|y".into(),
                target_key: None,
                confidence: 1.0,
                owner_hash: owner.clone(),
            }])
            .await
            .unwrap();
        assert_eq!(applied, 0);

        let applied = store
            .apply_resolutions(&[Resolution {
                identity_key: call.identity_key.clone(),
                target_key: None,
                confidence: 1.0,
                owner_hash: owner.clone(),
            }])
            .await
            .unwrap();
        assert_eq!(applied, 1);
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.unresolvable_edges, 1);
    }

    #[tokio::test]
    async fn resolutions_for_a_changed_file_are_dropped() {
        let store = store_with(&[
            ("a.py", "def foo():\n    pass\n"),
            ("b.py", "foo()\n"),
        ])
        .await;
        let stale = store.file_record("b.py").await.unwrap().unwrap().content_hash;
        store
            .apply_file_batch(&batch("b.py", "foo()\nfoo()\n"))
            .await
            .unwrap();
        let call = store
            .find_edges(&EdgeFilter {
                kind: Some(RelationKind::Calls),
                owner_file: Some("b.py".into()),
                ..EdgeFilter::default()
            })
            .await
            .unwrap()
            .remove(0);

        for target_key in [Some("a.py#foo@function".to_string()), None] {
            let applied = store
                .apply_resolutions(&[Resolution {
                    identity_key: call.identity_key.clone(),
                    target_key,
                    confidence: 1.0,
                    owner_hash: stale.clone(),
                }])
                .await
                .unwrap();
            assert_eq!(applied, 0);
        }
        let edges = store.edges_from(&call.source_key).await.unwrap();
        let kept = edges
            .iter()
            .find(|e| e.identity_key == call.identity_key)
            .unwrap();
        assert_eq!(kept.state, EdgeState::Unresolved);
    }

    #[tokio::test]
    async fn relocation_repoints_inbound_edges() {
        let store = store_with(&[
            ("a.py", "def foo():\n    pass\n"),
            ("b.py", "from a import foo\n\nfoo()\n"),
        ])
        .await;
        let owner = store.file_record("b.py").await.unwrap().unwrap().content_hash;
        let call = store
            .find_edges(&EdgeFilter {
                kind: Some(RelationKind::Calls),
                owner_file: Some("b.py".into()),
                ..EdgeFilter::default()
            })
            .await
            .unwrap()
            .remove(0);
        store
            .apply_resolutions(&[Resolution {
                identity_key: call.identity_key.clone(),
                target_key: Some("a.py#foo@function".into()),
                confidence: 1.0,
                owner_hash: owner.clone(),
            }])
            .await
            .unwrap();

        let moved = batch("a.py", "def foo():\n    pass\n")
            .extraction
            .relocate("lib/a.py", "lib.a");
        let outcome = store
            .relocate_file(
                "a.py",
                &FileBatch {
                    project: "demo".into(),
                    content_hash: "same".into(),
                    status: FileStatus::Parsed,
                    diagnostic: None,
                    extraction: moved,
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.edges_repointed, 1);
        assert_eq!(outcome.edges_demoted, 0);
        assert!(store.file_record("a.py").await.unwrap().is_none());

        let inbound = store.edges_to("lib/a.py#foo@function").await.unwrap();
        let from_b: Vec<_> = inbound.iter().filter(|e| e.owner_file == "b.py").collect();
        assert_eq!(from_b.len(), 1);
        assert_eq!(from_b[0].identity_key, call.identity_key);
        assert_eq!(from_b[0].state, EdgeState::Resolved);
        assert!(store.edges_to("a.py#foo@function").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn overrides_are_replaced_wholesale() {
        let store = store_with(&[(
            "a.py",
            "class A:\n    def m(self):\n        pass\n\nclass B(A):\n    def m(self):\n        pass\n",
        )])
        .await;
        let pair = OverridePair {
            method: "a.py#B.m@function".into(),
            overridden: "a.py#A.m@function".into(),
            owner_file: "a.py".into(),
        };
        let dangling = OverridePair {
            method: "a.py#B.m@function".into(),
            overridden: "z.py#Z.m@function".into(),
            owner_file: "a.py".into(),
        };
        assert_eq!(store.replace_overrides(&[pair.clone(), dangling]).await.unwrap(), 1);
        assert_eq!(store.replace_overrides(&[pair]).await.unwrap(), 1);

        let overrides = store
            .find_edges(&EdgeFilter {
                kind: Some(RelationKind::Overrides),
                ..EdgeFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides[0].line, 6);
    }

    #[tokio::test]
    async fn find_nodes_with_filter() {
        let store = store_with(&[
            ("a.py", "def f():\n    pass\n"),
            ("b.py", "def f():\n    pass\n"),
        ])
        .await;
        let filter = NodeFilter {
            kind: Some(NodeKind::Function),
            name: Some("f".into()),
            ..NodeFilter::default()
        };
        assert_eq!(store.find_nodes(&filter).await.unwrap().len(), 2);

        let filter = NodeFilter {
            qualified_name: Some("b.f".into()),
            ..NodeFilter::default()
        };
        let found = store.find_nodes(&filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].file_path.as_deref(), Some("b.py"));
    }

    #[tokio::test]
    async fn reopening_a_file_store_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .apply_file_batch(&batch("a.py", "x = 1\n"))
                .await
                .unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        store.ping().await.unwrap();
        assert!(store.node("a.py#x@variable").await.unwrap().is_some());
        assert_eq!(store.db_path(), Some(path.as_path()));
    }
}

#[cfg(test)]
mod proptests {
    use strata_graphs::{LanguageRegistry, SourceUnit, extract_source};

    use super::*;
    use proptest::prelude::*;
    use proptest::test_runner::TestCaseError;

    fn python_module(functions: &[String]) -> String {
        functions
            .iter()
            .map(|name| format!("def {name}():\n    {name}()\n\n"))
            .collect()
    }

    fn extracted(path: &str, source: &str) -> FileBatch {
        let registry = LanguageRegistry::default();
        let support = registry.for_file(Path::new(path)).unwrap();
        let unit = SourceUnit {
            path,
            relative: Path::new(path),
            text: source,
        };
        FileBatch {
            project: "p".into(),
            content_hash: source.to_string(),
            status: FileStatus::Parsed,
            diagnostic: None,
            extraction: extract_source(support.as_ref(), &unit)
                .unwrap()
                .into_extraction(),
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// The stored graph only depends on the last batch applied for a file.
        #[test]
        fn last_batch_wins(
            first in proptest::collection::vec("f[a-d]", 0..5),
            second in proptest::collection::vec("f[a-d]", 0..5),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let through_first = SqliteStore::in_memory().unwrap();
                through_first
                    .apply_file_batch(&extracted("m.py", &python_module(&first)))
                    .await
                    .unwrap();
                through_first
                    .apply_file_batch(&extracted("m.py", &python_module(&second)))
                    .await
                    .unwrap();

                let direct = SqliteStore::in_memory().unwrap();
                direct
                    .apply_file_batch(&extracted("m.py", &python_module(&second)))
                    .await
                    .unwrap();

                let all = NodeFilter::default();
                prop_assert_eq!(
                    through_first.find_nodes(&all).await.unwrap(),
                    direct.find_nodes(&all).await.unwrap()
                );
                prop_assert_eq!(
                    through_first.find_edges(&EdgeFilter::default()).await.unwrap(),
                    direct.find_edges(&EdgeFilter::default()).await.unwrap()
                );
                Ok::<(), TestCaseError>(())
            })?;
        }
    }
}
