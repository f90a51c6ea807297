use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default location of the configuration file, relative to the first root.
pub const CONFIG_FILE: &str = ".strata/config.toml";

/// Top-level Strata configuration, matching `.strata/config.toml`.
///
/// Loaded once at start-up and shared as `Arc<StrataConfig>`; runtime
/// changes require a restart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrataConfig {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub languages: LanguagesSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub sync: SyncSection,
    #[serde(default)]
    pub ignore: IgnoreSection,
}

impl StrataConfig {
    /// Read and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::NotFound(path.display().to_string()))?;
        let config = Self::from_toml_str(&text)?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.message().to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Default configuration for a single root directory.
    pub fn for_root(root: &Path) -> Self {
        let name = root
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| ProjectSection::default().name);
        Self {
            project: ProjectSection {
                name,
                roots: vec![root.to_path_buf()],
            },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project.name.trim().is_empty() {
            return Err(ConfigError::Invalid("project.name must not be empty".into()));
        }
        if self.project.roots.is_empty() {
            return Err(ConfigError::Invalid("project.roots must list at least one directory".into()));
        }
        if self.project.roots.len() > 1 {
            let mut prefixes: Vec<String> =
                self.project.roots.iter().map(|r| root_prefix(r)).collect();
            prefixes.sort();
            if let Some(pair) = prefixes.windows(2).find(|w| w[0] == w[1]) {
                return Err(ConfigError::Invalid(format!(
                    "project.roots share the directory name {:?}",
                    pair[0]
                )));
            }
        }
        if self.sync.workers == 0 {
            return Err(ConfigError::Invalid("sync.workers must be at least 1".into()));
        }
        if self.sync.retry_base_ms == 0 || self.sync.retry_base_ms > self.sync.retry_max_ms {
            return Err(ConfigError::Invalid(
                "sync.retry_base_ms must be positive and not exceed sync.retry_max_ms".into(),
            ));
        }
        for pattern in &self.ignore.patterns {
            glob::Pattern::new(pattern).map_err(|e| {
                ConfigError::Invalid(format!("ignore pattern {pattern:?}: {e}"))
            })?;
        }
        Ok(())
    }

    /// Store-path prefix for files under `root`: empty for a single root,
    /// the root's directory name otherwise.
    pub fn path_prefix(&self, root: &Path) -> Option<String> {
        (self.project.roots.len() > 1).then(|| root_prefix(root))
    }

    /// Database path, resolved against `base` when relative.
    pub fn database_path(&self, base: &Path) -> PathBuf {
        if self.store.path.is_absolute() {
            self.store.path.clone()
        } else {
            base.join(&self.store.path)
        }
    }
}

fn root_prefix(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .or_else(|| {
            root.canonicalize()
                .ok()
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        })
        .unwrap_or_else(|| root.display().to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSection {
    pub name: String,
    pub roots: Vec<PathBuf>,
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            name: "project".to_string(),
            roots: vec![PathBuf::from(".")],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguagesSection {
    /// Language ids to parse; empty means every registered language.
    pub enabled: Vec<String>,
    /// Extra extension → language id mappings (`pyw = "python"`).
    pub extensions: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub path: PathBuf,
    pub busy_timeout_ms: u64,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".strata/graph.db"),
            busy_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    /// Quiet period before a burst of events on one path is processed.
    pub debounce_ms: u64,
    pub workers: usize,
    /// Store write attempts beyond the first before a file is parked.
    pub max_retries: u32,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    /// How often a degraded engine pings the store.
    pub probe_interval_ms: u64,
    /// Larger files are skipped.
    pub max_file_bytes: u64,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            workers: std::thread::available_parallelism().map_or(4, usize::from),
            max_retries: 4,
            retry_base_ms: 50,
            retry_max_ms: 2000,
            probe_interval_ms: 1000,
            max_file_bytes: 2 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreSection {
    /// Directory names skipped anywhere in the tree.
    pub dirs: Vec<String>,
    /// File name suffixes skipped anywhere in the tree.
    pub suffixes: Vec<String>,
    /// Glob patterns matched against the root-relative path.
    pub patterns: Vec<String>,
}

impl Default for IgnoreSection {
    fn default() -> Self {
        Self {
            dirs: [
                ".git",
                "venv",
                ".venv",
                "__pycache__",
                "node_modules",
                "build",
                "dist",
                ".eggs",
                ".pytest_cache",
                ".mypy_cache",
                ".ruff_cache",
                ".claude",
                ".idea",
                ".vscode",
                "target",
                ".strata",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            suffixes: vec![".tmp".into(), "~".into()],
            patterns: Vec::new(),
        }
    }
}
