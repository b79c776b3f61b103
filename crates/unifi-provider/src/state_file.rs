//! State file persistence: pretty JSON, replaced atomically.

use std::path::Path;

use tracing::debug;
use unifi_provider_core::{STATE_VERSION, StateStore};

use crate::error::CliError;

/// Load the store at `path`; a missing file is an empty store.
pub fn load(path: &Path) -> Result<StateStore, CliError> {
    let invalid = |reason: String| CliError::StateFile {
        path: path.display().to_string(),
        reason,
    };

    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no state file, starting empty");
            return Ok(StateStore::new());
        }
        Err(e) => return Err(e.into()),
    };

    let store: StateStore = serde_json::from_str(&text).map_err(|e| invalid(e.to_string()))?;
    if store.version > STATE_VERSION {
        return Err(invalid(format!(
            "written by a newer version (format {}, this build reads {STATE_VERSION})",
            store.version
        )));
    }
    Ok(store)
}

/// Write `store` next to `path` and rename it into place.
pub fn save(path: &Path, store: &StateStore) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(store)
        .map_err(|e| CliError::Internal(format!("state serialization failed: {e}")))?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    std::fs::write(&tmp, json + "\n")?;
    std::fs::rename(&tmp, path)?;
    debug!(path = %path.display(), serial = store.serial, "state saved");
    Ok(())
}
