//! Atomic file writing utilities.
//!
//! Every durable JSON file in this system (skill-rl.json,
//! plugin-runtime-state.json, model-router-state.json,
//! rate-limits.json, the strategy health file) goes through this one
//! temp-file + rename discipline instead of bespoke per-module I/O.

use std::io;
use std::path::Path;

use ocp_schemas::SchemaVersion;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Envelope carrying a `schema_version` alongside the document it
/// wraps, so every durable JSON document can migrate forward the same
/// way regardless of its own shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Versioned<T> {
    #[serde(default)]
    schema_version: SchemaVersion,
    #[serde(flatten)]
    data: T,
}

/// Writes `bytes` to `path` by creating a temp file in the same
/// directory, syncing it to disk, then atomically renaming it over the
/// target. Restores the original file's permissions if it existed.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let original_perms = std::fs::metadata(path).ok().map(|m| m.permissions());
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    io::Write::write_all(&mut tmp, bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    if let Some(perms) = original_perms {
        std::fs::set_permissions(path, perms)?;
    }

    #[cfg(unix)]
    {
        if let Ok(dir) = std::fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }

    Ok(())
}

/// Serializes `value` as pretty JSON, newline-terminated, and writes it
/// atomically to `path`.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let mut bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    bytes.push(b'\n');
    write_atomic(path, &bytes)
}

/// Reads and deserializes JSON from `path`. Returns `Ok(None)` if the
/// file does not exist (a fresh store has no prior state to migrate).
pub fn read_json<T: DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    match std::fs::read(path) {
        Ok(bytes) => {
            let value = serde_json::from_slice(&bytes)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Reads a versioned JSON document, migrating it forward to
/// [`SchemaVersion::CURRENT`] if it was written under an older (or
/// missing, hence [`SchemaVersion::legacy_default`]) version. The
/// migrated version is not written back; the next write does that.
pub fn read_json_versioned<T: DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    let Some(versioned) = read_json::<Versioned<T>>(path)? else {
        return Ok(None);
    };
    let _ = versioned.schema_version.migrate();
    Ok(Some(versioned.data))
}

/// Serializes `value` stamped with [`SchemaVersion::current`] and
/// writes it atomically to `path`.
pub fn write_json_versioned<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    write_json_atomic(
        path,
        &Versioned {
            schema_version: SchemaVersion::current(),
            data: value,
        },
    )
}
