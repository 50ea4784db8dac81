#![allow(clippy::module_name_repetitions)]
//! Canonical file paths under the data directory.
//!
//! By default everything lives in the project root's `data/` directory;
//! [`StorePaths::new`] relocates the whole tree.

use std::path::{Path, PathBuf};

/// Returns the workspace root directory.
///
/// Resolved at compile time from `CARGO_MANIFEST_DIR`. Falls back to the
/// current directory if the manifest is not nested two levels deep.
#[must_use]
pub fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Returns the default `data/` directory path.
#[must_use]
pub fn data_dir() -> PathBuf {
    project_root().join("data")
}

/// Layout of the engine's durable files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    root: PathBuf,
}

impl StorePaths {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `store/` holds the engine state files.
    #[must_use]
    pub fn store_dir(&self) -> PathBuf {
        self.root.join("store")
    }

    #[must_use]
    pub fn grid_store(&self) -> PathBuf {
        self.store_dir().join("grid_samples.msgpack")
    }

    #[must_use]
    pub fn estimate_store(&self) -> PathBuf {
        self.store_dir().join("district_estimates.msgpack")
    }

    #[must_use]
    pub fn cumulative_state(&self) -> PathBuf {
        self.store_dir().join("cumulative_state.msgpack")
    }

    /// `generated/` holds artifacts for downstream consumers.
    #[must_use]
    pub fn generated_dir(&self) -> PathBuf {
        self.root.join("generated")
    }

    #[must_use]
    pub fn maps_dir(&self) -> PathBuf {
        self.generated_dir().join("maps")
    }

    #[must_use]
    pub fn alerts_report(&self) -> PathBuf {
        self.generated_dir().join("district_alerts.json")
    }
}

impl Default for StorePaths {
    fn default() -> Self {
        Self::new(data_dir())
    }
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
