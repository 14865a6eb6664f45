//! Snapshot discovery: saved thread pages on disk, addressed by file name
//!
//! A snapshot is named `<anything>-<thread id>.<ext>`, e.g. `thread-1234.html`.
//! The id is the text between the first `-` and the first `.` after it.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{ImportError, Result};

/// One saved thread page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub path: PathBuf,
    pub thread_id: i64,
}

impl Snapshot {
    /// Address a snapshot by its file name
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let thread_id = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(thread_id_from_file_name)
            .ok_or_else(|| ImportError::UnaddressableSnapshot(path.to_path_buf()))?;

        Ok(Self {
            path: path.to_path_buf(),
            thread_id,
        })
    }

    /// Read the page. Invalid UTF-8 is replaced rather than rejected.
    pub async fn read(&self) -> Result<String> {
        let bytes = tokio::fs::read(&self.path).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Thread id embedded in a snapshot file name
pub fn thread_id_from_file_name(name: &str) -> Option<i64> {
    let (_, rest) = name.split_once('-')?;
    let id = match rest.split_once('.') {
        Some((id, _)) => id,
        None => rest,
    };
    id.trim().parse().ok()
}

/// All addressable snapshots under a directory, sorted by path.
///
/// Hidden files and names without a thread id are skipped with a warning.
pub fn discover<P: AsRef<Path>>(dir: P) -> Result<Vec<Snapshot>> {
    let mut snapshots = Vec::new();

    for entry in WalkDir::new(dir.as_ref()).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            ImportError::Io(
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop while walking snapshots")),
            )
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }

        match Snapshot::from_path(entry.path()) {
            Ok(snapshot) => snapshots.push(snapshot),
            Err(e) => warn!("Skipping snapshot: {}", e),
        }
    }

    debug!("Discovered {} snapshots in {:?}", snapshots.len(), dir.as_ref());
    Ok(snapshots)
}
