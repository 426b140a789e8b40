// posbackup/src/utils/locator.rs
use std::path::{Path, PathBuf};
use std::process::Command;
use walkdir::WalkDir;
use which::which;

use crate::config::ToolOverrides;
use crate::errors::{BackupError, Result};

/// The two native MySQL client programs the pipeline shells out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbTool {
    Dump,
    Client,
}

impl DbTool {
    /// Program name, also the substring expected in `--version` output.
    pub fn program(&self) -> &'static str {
        match self {
            DbTool::Dump => "mysqldump",
            DbTool::Client => "mysql",
        }
    }

    pub fn executable_name(&self) -> String {
        if cfg!(windows) {
            format!("{}.exe", self.program())
        } else {
            self.program().to_string()
        }
    }
}

pub trait ToolLocator: Send + Sync {
    fn locate(&self, tool: DbTool) -> Result<PathBuf>;
}

/// Finds a tool by running every candidate with `--version` until one
/// answers with the program's name.
#[derive(Debug, Clone)]
pub struct SystemLocator {
    dump_candidates: Vec<PathBuf>,
    client_candidates: Vec<PathBuf>,
}

impl SystemLocator {
    /// Candidate order: config override, well-known install locations,
    /// version-suffixed installs, then whatever `PATH` resolves.
    pub fn for_platform(overrides: &ToolOverrides) -> Self {
        SystemLocator {
            dump_candidates: candidate_paths(DbTool::Dump, overrides.dump.as_deref()),
            client_candidates: candidate_paths(DbTool::Client, overrides.client.as_deref()),
        }
    }

    pub fn with_candidates(dump_candidates: Vec<PathBuf>, client_candidates: Vec<PathBuf>) -> Self {
        SystemLocator {
            dump_candidates,
            client_candidates,
        }
    }

    pub fn candidates(&self, tool: DbTool) -> &[PathBuf] {
        match tool {
            DbTool::Dump => &self.dump_candidates,
            DbTool::Client => &self.client_candidates,
        }
    }
}

impl ToolLocator for SystemLocator {
    fn locate(&self, tool: DbTool) -> Result<PathBuf> {
        verify_candidates(self.candidates(tool), tool.program())
    }
}

/// Returns the first candidate whose `--version` output mentions `expected`.
pub fn verify_candidates(candidates: &[PathBuf], expected: &str) -> Result<PathBuf> {
    for candidate in candidates {
        // Absolute paths that are not on disk are not worth a spawn.
        if candidate.is_absolute() && !candidate.is_file() {
            continue;
        }

        match Command::new(candidate).arg("--version").output() {
            Ok(output) => {
                let text = format!(
                    "{}{}",
                    String::from_utf8_lossy(&output.stdout),
                    String::from_utf8_lossy(&output.stderr)
                );
                if text.to_lowercase().contains(&expected.to_lowercase()) {
                    tracing::debug!("Found {} at {}", expected, candidate.display());
                    return Ok(candidate.clone());
                }
                tracing::debug!(
                    "Candidate {} did not identify as {}",
                    candidate.display(),
                    expected
                );
            }
            Err(e) => {
                tracing::debug!("Candidate {} could not run: {}", candidate.display(), e);
            }
        }
    }

    Err(BackupError::ToolNotFound {
        tool: expected.to_string(),
        tried: candidates
            .iter()
            .map(|c| c.display().to_string())
            .collect(),
    })
}

pub fn candidate_paths(tool: DbTool, override_path: Option<&Path>) -> Vec<PathBuf> {
    let executable = tool.executable_name();
    let mut candidates = Vec::new();

    if let Some(path) = override_path {
        candidates.push(path.to_path_buf());
    }

    for dir in well_known_dirs() {
        candidates.push(PathBuf::from(dir).join(&executable));
    }

    for root in discovery_roots() {
        candidates.extend(discover_versioned_installs(Path::new(root), &executable));
    }

    if let Ok(resolved) = which(tool.program()) {
        candidates.push(resolved);
    }
    candidates.push(PathBuf::from(tool.program()));

    dedup_preserving_order(candidates)
}

/// Lists `<root>/<mysql*|mariadb*>/bin/<executable>` for every version-suffixed
/// install directory under `root`, newest version name first.
pub fn discover_versioned_installs(root: &Path, executable: &str) -> Vec<PathBuf> {
    if !root.is_dir() {
        return Vec::new();
    }

    let mut install_dirs: Vec<PathBuf> = WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy().to_lowercase();
            name.starts_with("mysql") || name.starts_with("mariadb")
        })
        .map(|entry| entry.into_path())
        .collect();
    install_dirs.sort();
    install_dirs.reverse();

    install_dirs
        .into_iter()
        .map(|dir| dir.join("bin").join(executable))
        .collect()
}

fn dedup_preserving_order(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = std::collections::HashSet::new();
    paths
        .into_iter()
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

#[cfg(windows)]
fn well_known_dirs() -> &'static [&'static str] {
    &[
        r"C:\xampp\mysql\bin",
        r"C:\Program Files\MySQL\MySQL Server 8.0\bin",
        r"C:\Program Files\MySQL\MySQL Server 5.7\bin",
        r"C:\Program Files (x86)\MySQL\MySQL Server 5.7\bin",
        r"C:\laragon\bin\mysql\bin",
    ]
}

#[cfg(not(windows))]
fn well_known_dirs() -> &'static [&'static str] {
    &[
        "/usr/bin",
        "/usr/local/bin",
        "/usr/local/mysql/bin",
        "/opt/homebrew/bin",
        "/opt/local/bin",
        "/opt/lampp/bin",
        "/Applications/XAMPP/xamppfiles/bin",
        "/Applications/MAMP/Library/bin",
    ]
}

#[cfg(windows)]
fn discovery_roots() -> &'static [&'static str] {
    &[
        r"C:\Program Files\MySQL",
        r"C:\Program Files",
        r"C:\wamp64\bin\mysql",
        r"C:\wamp\bin\mysql",
        r"C:\laragon\bin\mysql",
    ]
}

#[cfg(not(windows))]
fn discovery_roots() -> &'static [&'static str] {
    &["/usr/local", "/opt", "/opt/homebrew/opt", "/usr/local/opt"]
}
