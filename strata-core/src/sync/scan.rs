//! Source roots, ignore rules, directory walks and content hashing.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::warn;
use walkdir::WalkDir;

use crate::config::{IgnoreSection, StrataConfig};
use crate::error::SyncError;

/// SHA-256 of file content, hex encoded.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Files and directories the engine never looks at.
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    dirs: HashSet<String>,
    suffixes: Vec<String>,
    patterns: Vec<glob::Pattern>,
    max_file_bytes: u64,
}

impl IgnoreRules {
    pub fn new(section: &IgnoreSection, max_file_bytes: u64) -> Self {
        let patterns = section
            .patterns
            .iter()
            .filter_map(|p| match glob::Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!(pattern = %p, error = %e, "Skipping invalid ignore pattern");
                    None
                }
            })
            .collect();
        Self {
            dirs: section.dirs.iter().cloned().collect(),
            suffixes: section.suffixes.clone(),
            patterns,
            max_file_bytes,
        }
    }

    pub fn from_config(config: &StrataConfig) -> Self {
        Self::new(&config.ignore, config.sync.max_file_bytes)
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_bytes
    }

    /// Whether a root-relative path is excluded.
    pub fn is_ignored(&self, relative: &Path) -> bool {
        let mut names = relative.components().filter_map(|c| match c {
            Component::Normal(name) => name.to_str(),
            _ => None,
        });
        if names.any(|n| self.dirs.contains(n)) {
            return true;
        }
        let file_name = relative
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if self.suffixes.iter().any(|s| file_name.ends_with(s.as_str())) {
            return true;
        }
        let text = slash_path(relative);
        self.patterns.iter().any(|p| p.matches(&text))
    }

    pub fn is_ignored_dir_name(&self, name: &str) -> bool {
        self.dirs.contains(name)
    }
}

/// One configured source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRoot {
    /// Canonical directory.
    pub dir: PathBuf,
    /// Leading store-path segment, set when there are several roots.
    pub prefix: Option<String>,
}

/// A file seen through its root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootedPath {
    /// Key of the file in the store.
    pub store_path: String,
    /// Path relative to its root, for module naming.
    pub relative: PathBuf,
    pub absolute: PathBuf,
}

/// The configured roots and the mapping between filesystem paths and
/// store paths.
#[derive(Debug, Clone)]
pub struct SourceRoots {
    roots: Vec<SourceRoot>,
}

impl SourceRoots {
    /// Resolve the configured roots against `base`. Missing roots are
    /// skipped with a warning; none remaining is an error.
    pub fn resolve(config: &StrataConfig, base: &Path) -> Result<Self, SyncError> {
        let mut roots = Vec::new();
        for root in &config.project.roots {
            let joined = if root.is_absolute() {
                root.clone()
            } else {
                base.join(root)
            };
            match joined.canonicalize() {
                Ok(dir) if dir.is_dir() => roots.push(SourceRoot {
                    prefix: config.path_prefix(&dir),
                    dir,
                }),
                _ => warn!(root = %joined.display(), "Skipping missing source root"),
            }
        }
        if roots.is_empty() {
            return Err(SyncError::NoValidRoot(
                config
                    .project
                    .roots
                    .iter()
                    .map(|r| r.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            ));
        }
        Ok(Self { roots })
    }

    pub fn dirs(&self) -> Vec<PathBuf> {
        self.roots.iter().map(|r| r.dir.clone()).collect()
    }

    /// Map an absolute path under one of the roots.
    pub fn locate(&self, absolute: &Path) -> Option<RootedPath> {
        self.roots.iter().find_map(|root| {
            let relative = absolute.strip_prefix(&root.dir).ok()?;
            if relative.as_os_str().is_empty() {
                return None;
            }
            let rel = slash_path(relative);
            let store_path = match &root.prefix {
                Some(prefix) => format!("{prefix}/{rel}"),
                None => rel,
            };
            Some(RootedPath {
                store_path,
                relative: relative.to_path_buf(),
                absolute: absolute.to_path_buf(),
            })
        })
    }

    /// Inverse of [`locate`](Self::locate).
    pub fn from_store_path(&self, store_path: &str) -> Option<RootedPath> {
        let (root, rel) = if self.roots.iter().any(|r| r.prefix.is_some()) {
            let (prefix, rel) = store_path.split_once('/')?;
            let root = self
                .roots
                .iter()
                .find(|r| r.prefix.as_deref() == Some(prefix))?;
            (root, rel)
        } else {
            (self.roots.first()?, store_path)
        };
        let relative: PathBuf = rel.split('/').collect();
        Some(RootedPath {
            store_path: store_path.to_string(),
            absolute: root.dir.join(&relative),
            relative,
        })
    }

    /// Every non-ignored file under `dir` (a root or a directory inside one).
    pub fn walk(&self, dir: &Path, rules: &IgnoreRules) -> Vec<RootedPath> {
        let mut found = Vec::new();
        let walker = WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !e.file_type().is_dir()
                    || !e.file_name().to_str().is_some_and(|n| rules.is_ignored_dir_name(n))
            });
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(rooted) = self.locate(entry.path()) {
                if !rules.is_ignored(&rooted.relative) {
                    found.push(rooted);
                }
            }
        }
        found.sort_by(|a, b| a.store_path.cmp(&b.store_path));
        found
    }

    /// Every non-ignored file under every root.
    pub fn walk_all(&self, rules: &IgnoreRules) -> Vec<RootedPath> {
        let mut found: Vec<RootedPath> = self
            .roots
            .iter()
            .flat_map(|root| self.walk(&root.dir, rules))
            .collect();
        found.sort_by(|a, b| a.store_path.cmp(&b.store_path));
        found
    }
}

/// `/`-separated form of a relative path.
pub fn slash_path(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::config::ProjectSection;

    fn rules() -> IgnoreRules {
        IgnoreRules::new(
            &IgnoreSection {
                patterns: vec!["**/*_generated.py".into()],
                ..IgnoreSection::default()
            },
            1024,
        )
    }

    #[test]
    fn hash_is_hex_sha256() {
        assert_eq!(
            content_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_ne!(content_hash(b"a"), content_hash(b"b"));
    }

    #[test]
    fn ignore_rules_cover_dirs_suffixes_and_patterns() {
        let rules = rules();
        assert!(rules.is_ignored(Path::new("node_modules/x/index.js")));
        assert!(rules.is_ignored(Path::new("pkg/__pycache__/a.py")));
        assert!(rules.is_ignored(Path::new("a.py~")));
        assert!(rules.is_ignored(Path::new("notes.tmp")));
        assert!(rules.is_ignored(Path::new("pkg/models_generated.py")));
        assert!(!rules.is_ignored(Path::new("pkg/models.py")));
        assert_eq!(rules.max_file_bytes(), 1024);
    }

    #[test]
    fn single_root_paths_have_no_prefix() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("pkg")).unwrap();
        fs::write(tmp.path().join("pkg/a.py"), "x = 1\n").unwrap();
        fs::create_dir_all(tmp.path().join(".git")).unwrap();
        fs::write(tmp.path().join(".git/HEAD"), "ref").unwrap();

        let config = StrataConfig::for_root(tmp.path());
        let roots = SourceRoots::resolve(&config, tmp.path()).unwrap();
        let files = roots.walk_all(&rules());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].store_path, "pkg/a.py");
        assert_eq!(files[0].relative, PathBuf::from("pkg/a.py"));

        let back = roots.from_store_path("pkg/a.py").unwrap();
        assert_eq!(back.absolute, files[0].absolute);
    }

    #[test]
    fn multiple_roots_prefix_store_paths() {
        let tmp = tempfile::tempdir().unwrap();
        for dir in ["api", "web"] {
            fs::create_dir_all(tmp.path().join(dir)).unwrap();
            fs::write(tmp.path().join(dir).join("main.py"), "pass\n").unwrap();
        }
        let config = StrataConfig {
            project: ProjectSection {
                name: "multi".into(),
                roots: vec!["api".into(), "web".into()],
            },
            ..StrataConfig::default()
        };
        let roots = SourceRoots::resolve(&config, tmp.path()).unwrap();
        let paths: Vec<String> = roots
            .walk_all(&rules())
            .into_iter()
            .map(|f| f.store_path)
            .collect();
        assert_eq!(paths, vec!["api/main.py", "web/main.py"]);

        let web = roots.from_store_path("web/main.py").unwrap();
        assert_eq!(web.relative, PathBuf::from("main.py"));
        assert!(web.absolute.ends_with("web/main.py"));
        assert!(roots.from_store_path("other/main.py").is_none());
    }

    #[test]
    fn no_existing_root_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let config = StrataConfig::for_root(&tmp.path().join("missing"));
        let err = SourceRoots::resolve(&config, tmp.path()).unwrap_err();
        assert!(matches!(err, SyncError::NoValidRoot(_)));
    }
}
