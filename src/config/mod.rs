//! Configuration management.
//!
//! Resolves where docembed keeps its data and on whose behalf a command
//! runs.
//!
//! # Layout
//!
//! - **Config**: `~/.docembed/config.json` (see [`crate::embeddings::config`])
//! - **Database**: `~/.docembed/data/docembed.db`
//! - **Stored files**: `~/.docembed/files/<owner>/`

use crate::error::{Error, Result};

use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Get the global docembed directory location (`~/.docembed/`).
#[must_use]
pub fn global_docembed_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".docembed"))
}

/// Default database location.
#[must_use]
pub fn default_db_path() -> Option<PathBuf> {
    global_docembed_dir().map(|dir| dir.join("data").join("docembed.db"))
}

/// Resolve the database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `DOCEMBED_DB` environment variable
/// 3. Global location: `~/.docembed/data/docembed.db`
///
/// # Returns
///
/// Returns the path to the database file, or `None` if no location found.
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Ok(db_path) = std::env::var("DOCEMBED_DB") {
        if !db_path.trim().is_empty() {
            return Some(PathBuf::from(db_path));
        }
    }

    default_db_path()
}

/// Resolve where uploaded source files are copied.
///
/// `DOCEMBED_FILES_DIR` wins. The default database keeps its files in
/// `~/.docembed/files`; any other database keeps them in a `files/`
/// directory next to it.
#[must_use]
pub fn resolve_files_dir(db_path: &Path) -> PathBuf {
    if let Ok(dir) = std::env::var("DOCEMBED_FILES_DIR") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }

    if default_db_path().is_some_and(|default| default == db_path) {
        if let Some(global) = global_docembed_dir() {
            return global.join("files");
        }
    }

    db_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("files")
}

/// Resolve the owner every scoped command runs as.
///
/// Priority:
/// 1. Explicit `--owner` flag
/// 2. `DOCEMBED_OWNER` environment variable
/// 3. **Error**: ownership is never guessed
///
/// # Errors
///
/// `InvalidParameter` when no owner is given or it is not a UUID.
pub fn resolve_owner(explicit: Option<&str>) -> Result<Uuid> {
    let raw = explicit
        .map(str::to_string)
        .or_else(|| std::env::var("DOCEMBED_OWNER").ok())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            Error::InvalidParameter("owner required: pass --owner or set DOCEMBED_OWNER".into())
        })?;

    Uuid::parse_str(raw.trim())
        .map_err(|_| Error::InvalidParameter(format!("owner must be a UUID, got '{raw}'")))
}
