#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! File-backed persistence for the dustwatch engine.
//!
//! State files are `MessagePack` (via `rmp-serde`); consumer-facing
//! artifacts are JSON. Every write goes through [`write_atomic`], which
//! writes a sibling `.tmp` file and renames it over the target so a crash
//! never leaves a half-written file behind.

pub mod estimates;
pub mod grid;
pub mod paths;

pub use estimates::EstimateStore;
pub use grid::{GridStore, InsertSummary};
pub use paths::StorePaths;

use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::{Serialize, de::DeserializeOwned};

/// Errors that can occur while reading or writing engine files.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error (file read/write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `MessagePack` encoding failed.
    #[error("Encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// A state file could not be decoded.
    #[error("Corrupt file {}: {source}", path.display())]
    Corrupt {
        /// File that failed to decode.
        path: PathBuf,
        /// Underlying decode error.
        source: rmp_serde::decode::Error,
    },

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Writes `bytes` to `path` atomically.
///
/// The bytes are flushed to disk before the rename, so `path` holds either
/// the old or the new contents after a crash. The parent directory is
/// created if missing.
///
/// # Errors
///
/// Returns an I/O error if the temporary file cannot be written or renamed.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        paths::ensure_dir(parent)?;
    }
    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let mut file = File::create(&tmp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(&tmp_path, path)?;
    log::debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

/// Serializes `value` as `MessagePack` (named fields) and writes it
/// atomically.
///
/// # Errors
///
/// Returns [`StoreError::Encode`] or [`StoreError::Io`].
pub fn save_msgpack<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = rmp_serde::to_vec_named(value)?;
    write_atomic(path, &bytes)?;
    Ok(())
}

/// Reads a `MessagePack` file written by [`save_msgpack`].
///
/// A missing file is `Ok(None)`.
///
/// # Errors
///
/// Returns [`StoreError::Corrupt`] if the file exists but cannot be
/// decoded, or [`StoreError::Io`] if it cannot be read.
pub fn load_msgpack<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    rmp_serde::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

/// Serializes `value` as JSON and writes it atomically.
///
/// # Errors
///
/// Returns [`StoreError::Json`] or [`StoreError::Io`].
pub fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T, pretty: bool) -> Result<(), StoreError> {
    let contents = if pretty {
        serde_json::to_vec_pretty(value)?
    } else {
        serde_json::to_vec(value)?
    };
    write_atomic(path, &contents)?;
    Ok(())
}

/// Reads a JSON file written by [`save_json`]. A missing file is
/// `Ok(None)`.
///
/// # Errors
///
/// Returns [`StoreError::Json`] if the file cannot be parsed or
/// [`StoreError::Io`] if it cannot be read.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_slice(&bytes)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn atomic_write_replaces_and_leaves_no_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.bin");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        assert!(!dir.path().join("nested").join("state.bin.tmp").exists());
    }

    #[test]
    fn atomic_write_replaces_stale_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.bin");
        write_atomic(&path, b"committed").unwrap();
        std::fs::write(dir.path().join("state.bin.tmp"), b"half-writ").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"committed");
        write_atomic(&path, b"next").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"next");
        assert!(!dir.path().join("state.bin.tmp").exists());
    }

    #[test]
    fn msgpack_missing_is_none_and_corrupt_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.msgpack");

        let missing: Option<BTreeMap<String, u32>> = load_msgpack(&path).unwrap();
        assert!(missing.is_none());

        let mut value = BTreeMap::new();
        value.insert("a".to_string(), 1_u32);
        save_msgpack(&path, &value).unwrap();
        let loaded: BTreeMap<String, u32> = load_msgpack(&path).unwrap().unwrap();
        assert_eq!(loaded, value);

        std::fs::write(&path, [0xc1, 0x00, 0xff]).unwrap();
        let err = load_msgpack::<BTreeMap<String, u32>>(&path).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
        assert!(err.to_string().starts_with(&format!("Corrupt file {}:", path.display())));
    }

    #[test]
    fn json_pretty_and_compact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        assert!(load_json::<Vec<u32>>(&path).unwrap().is_none());

        save_json(&path, &vec![1_u32, 2], false).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[1,2]");
        save_json(&path, &vec![1_u32, 2], true).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains('\n'));
        assert_eq!(load_json::<Vec<u32>>(&path).unwrap(), Some(vec![1, 2]));
    }
}
