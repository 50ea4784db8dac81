//! State persistence and content hashing.

use std::io::Read;
use std::path::Path;

use dustwatch_cumulative_models::{CumulativeState, STATE_VERSION};
use dustwatch_store::StoreError;

use crate::CumulativeError;

/// Hex MD5 digest of an in-memory buffer.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

/// Hex MD5 digest of a file, read in 256 KB chunks.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be opened or read.
pub fn hash_file(path: &Path) -> Result<String, std::io::Error> {
    let mut file = std::fs::File::open(path)?;
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; 256 * 1024];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        context.consume(&buffer[..n]);
    }
    Ok(format!("{:x}", context.finalize()))
}

/// Loads saved state. A missing file is `Ok(None)`.
///
/// # Errors
///
/// Returns [`CumulativeError::CorruptState`] if the file cannot be decoded
/// and [`CumulativeError::VersionMismatch`] if it was written by another
/// layout version. Either is fatal for this state file; recover with a
/// replay rebuild.
pub fn load_state(path: &Path) -> Result<Option<CumulativeState>, CumulativeError> {
    let state: Option<CumulativeState> = match dustwatch_store::load_msgpack(path) {
        Ok(state) => state,
        Err(StoreError::Corrupt { path, source }) => {
            return Err(CumulativeError::CorruptState {
                path,
                message: source.to_string(),
            });
        }
        Err(e) => return Err(e.into()),
    };

    match state {
        Some(state) if state.version != STATE_VERSION => Err(CumulativeError::VersionMismatch {
            found: state.version,
            expected: STATE_VERSION,
        }),
        Some(state) => {
            log::info!(
                "Loaded cumulative state: {} sources, {} measurements",
                state.sources.len(),
                state.total_measurements()
            );
            Ok(Some(state))
        }
        None => Ok(None),
    }
}

/// Saves state atomically.
///
/// # Errors
///
/// Returns [`CumulativeError::Store`] if encoding or writing fails.
pub fn save_state(path: &Path, state: &CumulativeState) -> Result<(), CumulativeError> {
    dustwatch_store::save_msgpack(path, state)?;
    log::info!("Saved cumulative state to {}", path.display());
    Ok(())
}
