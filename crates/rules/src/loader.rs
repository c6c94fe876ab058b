//! Filesystem rule loader.
//!
//! Reads rule drafts from `*.yml` / `*.yaml` / `*.json` files for the
//! `validate` command.

use std::fs;
use std::path::{Path, PathBuf};

use carewatch_core::{AlertError, Result};
use tracing::{info, warn};

use crate::schema::RuleDraft;

/// Outcome of loading a single rule file.
#[derive(Debug)]
pub struct LoadResult {
    pub path: PathBuf,
    pub status: LoadStatus,
}

#[derive(Debug)]
pub enum LoadStatus {
    Loaded(Box<RuleDraft>),
    /// Dotfile or unsupported extension.
    Skipped { reason: String },
    /// Parse or validation error.
    Failed { error: String },
}

impl LoadResult {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, LoadStatus::Failed { .. })
    }

    pub fn draft(&self) -> Option<&RuleDraft> {
        match &self.status {
            LoadStatus::Loaded(draft) => Some(draft),
            _ => None,
        }
    }
}

fn is_rule_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "yml" | "yaml" | "json"))
        .unwrap_or(false)
}

/// Parse and validate one rule file.
pub fn load_file(path: &Path) -> Result<RuleDraft> {
    let draft = RuleDraft::from_file(path)?;
    draft
        .validate()
        .map_err(|e| AlertError::Validation(format!("{}: {}", path.display(), e)))?;
    Ok(draft)
}

/// Load every rule file in `dir` (non-recursive), sorted by path.
///
/// A bad file is reported in its `LoadResult` and does not stop the scan.
pub fn load_dir(dir: &Path) -> Result<Vec<LoadResult>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        AlertError::Validation(format!("cannot read rules directory {}: {}", dir.display(), e))
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| !p.is_dir())
        .collect();
    paths.sort();

    let results: Vec<LoadResult> = paths.into_iter().map(load_one).collect();
    let loaded = results.iter().filter(|r| r.draft().is_some()).count();
    info!(path = %dir.display(), loaded, total = results.len(), "scanned rules directory");
    Ok(results)
}

/// Load a mix of files and directories.
pub fn load_paths(paths: &[PathBuf]) -> Result<Vec<LoadResult>> {
    let mut results = Vec::new();
    for path in paths {
        if path.is_dir() {
            results.extend(load_dir(path)?);
        } else {
            results.push(load_one(path.clone()));
        }
    }
    Ok(results)
}

fn load_one(path: PathBuf) -> LoadResult {
    let dotfile = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'));
    if dotfile {
        return LoadResult {
            path,
            status: LoadStatus::Skipped {
                reason: "dotfile".to_string(),
            },
        };
    }
    if !is_rule_file(&path) {
        return LoadResult {
            path,
            status: LoadStatus::Skipped {
                reason: "not a YAML or JSON file".to_string(),
            },
        };
    }

    let status = match load_file(&path) {
        Ok(draft) => LoadStatus::Loaded(Box::new(draft)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load rule file");
            LoadStatus::Failed {
                error: e.to_string(),
            }
        }
    };
    LoadResult { path, status }
}
