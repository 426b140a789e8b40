pub(crate) mod db_restore;
pub(crate) mod executor;
mod logic;
pub mod statements;
pub(crate) mod verification;

pub use logic::perform_restore_orchestration;
pub use verification::validate_artifact_reference;

use crate::backup::Strategy;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatementCounts {
    pub executed: usize,
    pub failed: usize,
}

/// What a restore did. Statement counts are only known when the script was
/// replayed in-process.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreReport {
    pub file_name: String,
    pub strategy: Strategy,
    /// Safety copy taken before the restore, if enabled.
    pub safety_backup: Option<String>,
    pub statements: Option<StatementCounts>,
    pub trailing_fragment: Option<String>,
}
