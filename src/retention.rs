// posbackup/src/retention.rs
use std::fs;
use std::path::Path;

use crate::activity_log::ActivityLog;
use crate::backup::artifact::{list_artifacts, ArtifactKind};
use crate::errors::Result;

/// Deletes the oldest manual and scheduled backups until at most
/// `keep_count` remain, and returns the names removed. A `keep_count` of 0
/// disables retention. Files that cannot be removed are logged and skipped.
pub fn apply_retention(
    backup_dir: &Path,
    product: &str,
    keep_count: usize,
    log: &ActivityLog,
) -> Result<Vec<String>> {
    prune_oldest(backup_dir, product, keep_count, log, |kind| {
        kind.counts_toward_retention()
    })
}

/// Same policy for the safety copies taken before a restore, which have
/// their own cap and never displace regular backups.
pub fn apply_safety_copy_retention(
    backup_dir: &Path,
    product: &str,
    keep_count: usize,
    log: &ActivityLog,
) -> Result<Vec<String>> {
    prune_oldest(backup_dir, product, keep_count, log, |kind| {
        kind == ArtifactKind::PreRestore
    })
}

fn prune_oldest(
    backup_dir: &Path,
    product: &str,
    keep_count: usize,
    log: &ActivityLog,
    selects: impl Fn(ArtifactKind) -> bool,
) -> Result<Vec<String>> {
    if keep_count == 0 {
        tracing::debug!("Retention disabled (keep_count = 0)");
        return Ok(Vec::new());
    }

    let candidates: Vec<_> = list_artifacts(backup_dir, product)?
        .into_iter()
        .filter(|a| selects(a.kind))
        .collect();

    let to_remove = candidates.len().saturating_sub(keep_count);
    let mut deleted = Vec::with_capacity(to_remove);

    for artifact in candidates.iter().take(to_remove) {
        match fs::remove_file(&artifact.path) {
            Ok(()) => {
                log.info(&format!("Deleted old backup: {}", artifact.file_name));
                deleted.push(artifact.file_name.clone());
            }
            Err(e) => {
                log.error(&format!(
                    "Failed to delete old backup {}: {}",
                    artifact.file_name, e
                ));
            }
        }
    }

    if !deleted.is_empty() {
        tracing::info!(
            "Retention removed {} backup(s), keeping {} most recent",
            deleted.len(),
            candidates.len() - deleted.len()
        );
    }
    Ok(deleted)
}
