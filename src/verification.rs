//! Administrator re-verification guarding destructive operator commands.

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::activity_log::ActivityLog;
use crate::errors::{BackupError, Result};

/// Proof that the administrator password was re-entered recently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationSession {
    pub verified: bool,
    pub verified_at: Option<NaiveDateTime>,
}

impl VerificationSession {
    pub fn established(now: NaiveDateTime) -> Self {
        VerificationSession {
            verified: true,
            verified_at: Some(now),
        }
    }

    /// Valid for `ttl` after the last confirmation or refresh.
    pub fn is_valid(&self, now: NaiveDateTime, ttl: chrono::Duration) -> bool {
        match (self.verified, self.verified_at) {
            (true, Some(at)) => at <= now && now.signed_duration_since(at) < ttl,
            _ => false,
        }
    }

    /// Slides the window forward. An expired session stays expired.
    pub fn refresh(&mut self, now: NaiveDateTime, ttl: chrono::Duration) -> bool {
        if self.is_valid(now, ttl) {
            self.verified_at = Some(now);
            true
        } else {
            false
        }
    }
}

pub fn hash_password(password: &str) -> Result<String> {
    if password.is_empty() {
        return Err(BackupError::Config("Password cannot be empty".to_string()));
    }
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| BackupError::Config(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| BackupError::Config(format!("Invalid admin_password_hash: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// The session persisted between CLI invocations as a small JSON file.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SessionStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or unreadable file is an unverified session.
    pub fn load(&self) -> VerificationSession {
        let Ok(content) = fs::read_to_string(&self.path) else {
            return VerificationSession::default();
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Ignoring corrupt session file {}: {}", self.path.display(), e);
            VerificationSession::default()
        })
    }

    pub fn save(&self, session: &VerificationSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| BackupError::write_failed(parent, e))?;
            }
        }
        let body = serde_json::to_string(session)
            .map_err(|e| BackupError::Config(format!("Failed to serialize session: {}", e)))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(|e| BackupError::write_failed(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| BackupError::write_failed(&self.path, e))
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BackupError::write_failed(&self.path, e)),
        }
    }
}

/// Confirms the administrator password and gates actions on a live session.
/// Every decision is written to the security log.
pub struct Verifier {
    store: SessionStore,
    security_log: ActivityLog,
    admin_password_hash: Option<String>,
    ttl: chrono::Duration,
}

impl Verifier {
    pub fn new(
        store: SessionStore,
        security_log: ActivityLog,
        admin_password_hash: Option<String>,
        ttl: chrono::Duration,
    ) -> Self {
        Verifier {
            store,
            security_log,
            admin_password_hash,
            ttl,
        }
    }

    pub fn confirm(&self, password: &str, now: NaiveDateTime) -> Result<VerificationSession> {
        let hash = self.admin_password_hash.as_deref().ok_or_else(|| {
            BackupError::Config(
                "admin_password_hash is not set in config.json; run `posbackup hash-password` first"
                    .to_string(),
            )
        })?;

        if !verify_password(password, hash)? {
            self.security_log.error("Verification failed: incorrect password");
            return Err(BackupError::VerificationRequired(
                "incorrect password".to_string(),
            ));
        }

        let session = VerificationSession::established(now);
        self.store.save(&session)?;
        self.security_log.success("Verification succeeded");
        Ok(session)
    }

    /// Passes when a session is live, and extends it; otherwise records the
    /// blocked attempt and fails.
    pub fn require_verified(&self, action: &str, now: NaiveDateTime) -> Result<()> {
        let mut session = self.store.load();
        if session.refresh(now, self.ttl) {
            self.store.save(&session)?;
            self.security_log
                .info(&format!("Verified session authorised {}", action));
            return Ok(());
        }

        self.security_log
            .error(&format!("Blocked {}: verification required", action));
        Err(BackupError::VerificationRequired(format!(
            "run `posbackup verify` before {}",
            action
        )))
    }

    pub fn revoke(&self) -> Result<()> {
        self.store.clear()?;
        self.security_log.info("Verification session ended");
        Ok(())
    }
}
