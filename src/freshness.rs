//! Freshness gate - the single fetch-or-skip primitive
//!
//! The local file's modification time is the whole synchronization ledger:
//! after a fetch the artifact is stamped with the remote record's
//! modification time, and a later run skips the fetch when the stamp still
//! matches exactly. There is no manifest and no tolerance window.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use filetime::{set_file_times, FileTime};
use std::future::Future;
use std::path::Path;
use tracing::debug;

/// What the gate did for one destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// Content was produced and stamped
    Fetched,
    /// Local artifact already carries the desired modification time
    UpToDate,
}

/// Convert a remote timestamp into the filesystem representation
pub fn to_file_time(timestamp: DateTime<Utc>) -> FileTime {
    FileTime::from_unix_time(timestamp.timestamp(), timestamp.timestamp_subsec_nanos())
}

/// True when `path` exists and its modification time equals `desired` exactly
pub async fn is_fresh(path: &Path, desired: DateTime<Utc>) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => FileTime::from_last_modification_time(&metadata) == to_file_time(desired),
        Err(_) => false,
    }
}

/// Make sure `path` holds content as of `desired`
///
/// Skips when the artifact is fresh. Otherwise creates the parent directory,
/// runs `produce` exactly once (its error is returned unchanged and nothing
/// is stamped) and then sets the access time to now and the modification
/// time to `desired`. A stamp the filesystem cannot store exactly is an
/// error, never a silent `Fetched`.
pub async fn ensure<F, Fut>(path: &Path, desired: DateTime<Utc>, produce: F) -> Result<GateOutcome>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    if is_fresh(path, desired).await {
        debug!("Up to date: {}", path.display());
        return Ok(GateOutcome::UpToDate);
    }

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    produce().await?;

    set_file_times(path, FileTime::now(), to_file_time(desired))
        .with_context(|| format!("Failed to set timestamps on {}", path.display()))?;
    verify_stamp(path, desired).await?;

    debug!("Fetched: {} (modified {})", path.display(), desired);
    Ok(GateOutcome::Fetched)
}

/// Read the stamp back; filesystems clamp times they cannot represent
async fn verify_stamp(path: &Path, desired: DateTime<Utc>) -> Result<()> {
    let metadata = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("Failed to read timestamps of {}", path.display()))?;

    let stored = FileTime::from_last_modification_time(&metadata);
    let wanted = to_file_time(desired);
    if stored != wanted {
        return Err(anyhow!(
            "Filesystem did not keep the modification time of {}: wanted {} ({:?}), stored {:?}",
            path.display(),
            desired,
            wanted,
            stored
        ));
    }

    Ok(())
}

/// Producer for textual categories: write `body` to `path`
pub async fn write_body(path: &Path, body: &str) -> Result<()> {
    tokio::fs::write(path, body.as_bytes())
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}
