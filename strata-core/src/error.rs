/// Top-level Strata error type.
///
/// All fallible operations in `strata-core` return [`Result<T, StrataError>`](Result).
/// Each variant wraps a layer-specific error enum so callers can match on
/// the source without losing type information.
#[derive(thiserror::Error, Debug)]
pub enum StrataError {
    /// Error from the graph store layer (`SQLite` operations, migrations).
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Error while turning one file into a graph batch.
    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    /// Error from the grammar adapters (tree-sitter parsing).
    #[error("Graph engine error: {0}")]
    Graph(#[from] strata_graphs::GraphError),

    /// Error in configuration parsing or validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error starting or running the sync engine.
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
}

impl StrataError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_transient())
    }
}

/// Errors from the SQLite-backed graph store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Underlying `SQLite` operation failed.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Schema migration failed (version mismatch or DDL error).
    #[error("Migration failed: {0}")]
    Migration(String),

    /// The backend could not be reached; the operation may be retried.
    #[error("Database unavailable: {0}")]
    Unavailable(String),

    /// JSON serialization/deserialization of hints failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Busy, locked and I/O failures are worth retrying; constraint and
    /// schema failures are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy
                    | rusqlite::ErrorCode::DatabaseLocked
                    | rusqlite::ErrorCode::SystemIoFailure
                    | rusqlite::ErrorCode::CannotOpen
                    | rusqlite::ErrorCode::DiskFull
            ),
            _ => false,
        }
    }
}

/// Errors turning one file into a graph batch.
#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    /// The batch violates a structural rule and was rejected before any write.
    #[error("Inconsistent extraction for {path}: {reason}")]
    Inconsistent {
        /// Store path of the rejected file.
        path: String,
        /// Which rule the batch broke.
        reason: String,
    },

    /// Filesystem I/O error reading a source file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors in Strata configuration parsing and validation.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration file does not exist at the expected path.
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// Configuration values are present but semantically invalid.
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Configuration file syntax could not be parsed (TOML error).
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Fatal start-up and runtime errors of the sync engine.
#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    /// None of the configured roots is an existing directory.
    #[error("No valid root: {0}")]
    NoValidRoot(String),

    /// The store did not answer the start-up probe.
    #[error("Database unreachable: {0}")]
    BackendUnreachable(String),

    /// The filesystem watcher could not be started.
    #[error("Watcher error: {0}")]
    Watcher(String),
}

/// Convenience alias for `Result<T, StrataError>`.
pub type Result<T> = std::result::Result<T, StrataError>;
