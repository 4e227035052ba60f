//! HS-006: Record persistence. JSON encode/decode, atomic save, load.
//!
//! Hosts persist compiled bundles and sealed connection profiles as JSON
//! records. Writes go to a temp file first and are renamed into place.

use super::types::Bundle;
use crate::error::RecordError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Encode a bundle as a JSON record.
pub fn bundle_to_json(bundle: &Bundle) -> Result<String, RecordError> {
    to_json("<bundle>", bundle)
}

/// Decode a bundle from a JSON record.
pub fn bundle_from_json(json: &str) -> Result<Bundle, RecordError> {
    serde_json::from_str(json).map_err(|e| RecordError::Format {
        path: "<bundle>".to_string(),
        message: e.to_string(),
    })
}

/// Load a record. Returns None if the file doesn't exist.
pub fn load_record<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, RecordError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    let record = serde_json::from_str(&content).map_err(|e| RecordError::Format {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(Some(record))
}

/// Save a record atomically (write to temp, then rename).
pub fn save_record<T: Serialize>(path: &Path, record: &T) -> Result<(), RecordError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }

    let json = to_json(&path.display().to_string(), record)?;

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &json).map_err(|e| io_error(&tmp_path, e))?;
    std::fs::rename(&tmp_path, path).map_err(|e| io_error(path, e))?;

    Ok(())
}

fn to_json<T: Serialize>(label: &str, record: &T) -> Result<String, RecordError> {
    serde_json::to_string_pretty(record).map_err(|e| RecordError::Format {
        path: label.to_string(),
        message: e.to_string(),
    })
}

fn io_error(path: &Path, e: std::io::Error) -> RecordError {
    RecordError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}
