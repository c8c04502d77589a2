//! Snapshot file of the in-memory engine: one JSON object mapping each
//! stringified id to its link, read wholesale on open and written wholesale
//! on close.

use crate::error::SnapshotError;
use crate::memory::table::LinkTable;
use shurl_core::Link;
use std::collections::BTreeMap;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Loads the table stored at `path`. A missing file yields an empty table.
pub(crate) async fn load(path: &Path) -> Result<LinkTable, SnapshotError> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LinkTable::default()),
        Err(e) => return Err(e.into()),
    };

    let snapshot: BTreeMap<u64, Link> = serde_json::from_slice(&raw)?;
    LinkTable::from_snapshot(snapshot)
}

/// Replaces the file at `path` with `snapshot`.
///
/// The data goes to a temporary file next to the target which is then renamed
/// over it, so the previous snapshot stays intact if encoding fails.
pub(crate) async fn save(path: PathBuf, snapshot: BTreeMap<u64, Link>) -> Result<(), SnapshotError> {
    tokio::task::spawn_blocking(move || write_atomically(&path, &snapshot))
        .await
        .map_err(|e| SnapshotError::Join(e.to_string()))?
}

fn write_atomically(path: &Path, snapshot: &BTreeMap<u64, Link>) -> Result<(), SnapshotError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(file.as_file_mut());
        serde_json::to_writer(&mut writer, snapshot)?;
        writer.flush()?;
    }
    file.as_file().sync_all()?;
    file.persist(path)?;
    Ok(())
}
