//! Backup and restore pipeline for a retail point-of-sale database.
//!
//! Dumps are produced with `mysqldump` when it can be found and with an
//! in-process serializer otherwise; restores mirror that with the `mysql`
//! client and an in-process statement replay.

pub mod activity_log;
pub mod backup;
pub mod config;
pub mod db;
pub mod errors;
pub mod lock;
pub mod restore;
pub mod retention;
pub mod scheduler;
pub mod service;
pub mod settings;
pub mod utils;
pub mod verification;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{BackupError, Result};
pub use service::BackupService;
