// posbackup/src/restore/verification.rs
use std::path::Path;

use crate::backup::artifact::{parse_artifact_name, Artifact};
use crate::errors::{BackupError, Result};

/// Resolves a user-supplied backup name to an artifact in `backup_dir`.
///
/// Only a bare file name following the artifact naming pattern is accepted,
/// so a reference can never point outside the backup directory. The file
/// must exist and be non-empty. Nothing destructive may happen before this
/// check passes.
pub fn validate_artifact_reference(backup_dir: &Path, product: &str, file_name: &str) -> Result<Artifact> {
    if file_name.is_empty()
        || file_name.contains(['/', '\\'])
        || file_name.contains("..")
        || file_name.contains('\0')
    {
        return Err(BackupError::InvalidArtifact(format!(
            "'{}' is not a plain backup file name",
            file_name
        )));
    }

    if parse_artifact_name(product, file_name).is_none() {
        return Err(BackupError::InvalidArtifact(format!(
            "'{}' is not a {} backup file",
            file_name, product
        )));
    }

    let path = backup_dir.join(file_name);
    if !path.is_file() {
        return Err(BackupError::InvalidArtifact(format!(
            "{} does not exist in {}",
            file_name,
            backup_dir.display()
        )));
    }

    let artifact = Artifact::from_path(product, &path)?;
    if artifact.size == 0 {
        return Err(BackupError::InvalidArtifact(format!("{} is empty", file_name)));
    }
    Ok(artifact)
}
