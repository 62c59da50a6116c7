//! skillstack-store — persistence for the rule list.
//!
//! Rules live in a single JSON file (historically `rules.json`), an
//! ordered array of rule records. The store validates rules before they
//! are persisted and commits every write through a tempfile-and-rename so
//! readers never observe a half-written file. The store is the system's
//! only shared mutable resource; callers load once per simulation run and
//! serialize writes among themselves (single-writer discipline).

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

use skillstack_core::model::{Rule, ValidationError};

/// Rule store failures. Read and write problems carry the offending path;
/// a corrupt store is an error, never silently treated as empty, since
/// that would silently change scoring results.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read rule store at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("rule store at {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("rule store not found at {path}")]
    NotFound { path: PathBuf },

    #[error("failed to write rule store at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no rule at index {index}, store holds {len} rules")]
    OutOfRange { index: usize, len: usize },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// File-backed store for the ordered rule list.
#[derive(Debug, Clone)]
pub struct RuleStore {
    path: PathBuf,
}

impl RuleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted rule list in stored order. A missing file is an
    /// empty store (first run); an unreadable or malformed file is an
    /// error.
    pub fn load(&self) -> Result<Vec<Rule>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path).map_err(|source| StoreError::Read {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| StoreError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    /// Like [`RuleStore::load`], but a missing file is an error. For rule
    /// files the user named explicitly, where an empty result for a
    /// mistyped path would silently change scoring results.
    pub fn load_required(&self) -> Result<Vec<Rule>, StoreError> {
        if !self.path.exists() {
            return Err(StoreError::NotFound {
                path: self.path.clone(),
            });
        }
        self.load()
    }

    /// Validate and append one rule, preserving all previously stored
    /// rules and their order. On a validation failure the store is left
    /// unchanged.
    pub fn append(&self, rule: Rule) -> Result<(), StoreError> {
        rule.validate()?;
        let mut rules = self.load()?;
        rules.push(rule);
        self.commit(&rules)
    }

    /// Atomically overwrite the stored list. Used by rule-editing
    /// collaborators; every rule is validated first.
    pub fn replace_all(&self, rules: &[Rule]) -> Result<(), StoreError> {
        for rule in rules {
            rule.validate()?;
        }
        self.commit(rules)
    }

    /// Remove the rule at `index` (stored order), committing the rest.
    pub fn delete(&self, index: usize) -> Result<(), StoreError> {
        let mut rules = self.load()?;
        if index >= rules.len() {
            return Err(StoreError::OutOfRange {
                index,
                len: rules.len(),
            });
        }
        rules.remove(index);
        self.commit(&rules)
    }

    /// Write the full list to a tempfile next to the store and rename it
    /// into place.
    fn commit(&self, rules: &[Rule]) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(rules).map_err(|source| StoreError::Malformed {
            path: self.path.clone(),
            source,
        })?;

        let dir = self.path.parent().filter(|p| !p.as_os_str().is_empty());
        let mut tmp = NamedTempFile::new_in(dir.unwrap_or_else(|| Path::new("."))).map_err(
            |source| StoreError::Write {
                path: self.path.clone(),
                source,
            },
        )?;
        tmp.write_all(json.as_bytes())
            .map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })?;
        tmp.persist(&self.path).map_err(|e| StoreError::Write {
            path: self.path.clone(),
            source: e.error,
        })?;

        tracing::debug!(path = %self.path.display(), rules = rules.len(), "rule store committed");
        Ok(())
    }
}
