// posbackup/src/backup/artifact.rs
use chrono::NaiveDateTime;
use regex::Regex;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::errors::{BackupError, Result};

pub const FILE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Manual,
    Scheduled,
    PreRestore,
}

impl ArtifactKind {
    pub fn tag(&self) -> &'static str {
        match self {
            ArtifactKind::Manual => "backup",
            ArtifactKind::Scheduled => "scheduled_backup",
            ArtifactKind::PreRestore => "pre_restore_backup",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "backup" => Some(ArtifactKind::Manual),
            "scheduled_backup" => Some(ArtifactKind::Scheduled),
            "pre_restore_backup" => Some(ArtifactKind::PreRestore),
            _ => None,
        }
    }

    /// Safety copies taken before a restore are not subject to retention.
    pub fn counts_toward_retention(&self) -> bool {
        matches!(self, ArtifactKind::Manual | ArtifactKind::Scheduled)
    }
}

/// A backup file in the backup directory. The directory listing is the only
/// record of which artifacts exist.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub path: PathBuf,
    pub file_name: String,
    pub kind: ArtifactKind,
    pub created_at: NaiveDateTime,
    pub size: u64,
    pub modified: SystemTime,
}

impl Artifact {
    pub fn from_path(product: &str, path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| BackupError::InvalidArtifact(path.display().to_string()))?
            .to_string();
        let (kind, created_at) = parse_artifact_name(product, &file_name)
            .ok_or_else(|| BackupError::InvalidArtifact(file_name.clone()))?;
        let metadata = fs::metadata(path).map_err(|e| BackupError::read_failed(path, e))?;

        Ok(Artifact {
            path: path.to_path_buf(),
            file_name,
            kind,
            created_at,
            size: metadata.len(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        })
    }
}

pub fn artifact_file_name(
    product: &str,
    kind: ArtifactKind,
    created_at: NaiveDateTime,
    counter: u32,
) -> String {
    let stamp = created_at.format(FILE_TIMESTAMP_FORMAT);
    if counter == 0 {
        format!("{}_{}_{}.sql", product, kind.tag(), stamp)
    } else {
        format!("{}_{}_{}-{}.sql", product, kind.tag(), stamp, counter)
    }
}

fn artifact_pattern(product: &str) -> Result<Regex> {
    let pattern = format!(
        r"^{}_(backup|scheduled_backup|pre_restore_backup)_(\d{{4}}-\d{{2}}-\d{{2}}_\d{{2}}-\d{{2}}-\d{{2}})(?:-\d+)?\.sql$",
        regex::escape(product)
    );
    Regex::new(&pattern)
        .map_err(|e| BackupError::Config(format!("Invalid artifact name pattern: {}", e)))
}

pub fn parse_artifact_name(product: &str, file_name: &str) -> Option<(ArtifactKind, NaiveDateTime)> {
    let captures = artifact_pattern(product).ok()?.captures(file_name)?;
    let kind = ArtifactKind::from_tag(captures.get(1)?.as_str())?;
    let created_at =
        NaiveDateTime::parse_from_str(captures.get(2)?.as_str(), FILE_TIMESTAMP_FORMAT).ok()?;
    Some((kind, created_at))
}

/// Claims a fresh artifact name by creating the (empty) file exclusively.
/// A name taken by a concurrent writer gets a `-N` counter instead.
pub fn reserve_artifact_path(
    dir: &Path,
    product: &str,
    kind: ArtifactKind,
    created_at: NaiveDateTime,
) -> Result<PathBuf> {
    fs::create_dir_all(dir).map_err(|e| BackupError::write_failed(dir, e))?;

    for counter in 0..1000 {
        let path = dir.join(artifact_file_name(product, kind, created_at, counter));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => return Ok(path),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(BackupError::write_failed(&path, e)),
        }
    }

    Err(BackupError::write_failed(
        dir,
        std::io::Error::new(ErrorKind::AlreadyExists, "no free backup file name"),
    ))
}

/// Every artifact of `product` in `dir`, oldest modification time first.
pub fn list_artifacts(dir: &Path, product: &str) -> Result<Vec<Artifact>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let pattern = artifact_pattern(product)?;
    let mut artifacts = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| BackupError::read_failed(dir, e))? {
        let entry = entry.map_err(|e| BackupError::read_failed(dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| pattern.is_match(name));
        if !matches {
            continue;
        }
        match Artifact::from_path(product, &path) {
            Ok(artifact) => artifacts.push(artifact),
            // Deleted between read_dir and stat by another process.
            Err(e) => tracing::debug!("Skipping {}: {}", path.display(), e),
        }
    }

    artifacts.sort_by(|a, b| {
        a.modified
            .cmp(&b.modified)
            .then_with(|| a.file_name.cmp(&b.file_name))
    });
    Ok(artifacts)
}
