//! Advisory single-instance lock.
//!
//! Two bot processes holding the same gateway session fight each other into
//! a replace loop, so startup refuses to proceed while another instance's
//! lock stamp is fresh. The lock is timestamp-based and advisory: the
//! holder refreshes it periodically and removes it on clean exit, and a
//! stale or corrupt stamp is simply overwritten.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use courier_types::CourierError;

pub const LOCK_FILE: &str = "instance.lock";

#[derive(Debug, Serialize, Deserialize)]
struct LockStamp {
    timestamp: DateTime<Utc>,
    pid: u32,
}

/// A held instance lock. Removed on [`release`](Self::release) or drop.
pub struct InstanceLock {
    path: PathBuf,
    held: bool,
}

impl InstanceLock {
    /// Acquire the lock under `auth_dir`.
    ///
    /// Fails with [`CourierError::DuplicateInstance`] when an existing stamp
    /// is younger than `stale_after`.
    pub fn acquire(auth_dir: &Path, stale_after: Duration) -> Result<Self, CourierError> {
        let path = auth_dir.join(LOCK_FILE);

        if let Ok(content) = std::fs::read_to_string(&path) {
            match serde_json::from_str::<LockStamp>(&content) {
                Ok(stamp) => {
                    let age = Utc::now().signed_duration_since(stamp.timestamp);
                    if age.to_std().map_or(true, |age| age < stale_after) {
                        return Err(CourierError::DuplicateInstance { pid: stamp.pid });
                    }
                    info!(pid = stamp.pid, "overwriting stale instance lock");
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt instance lock, overwriting");
                }
            }
        }

        let lock = Self { path, held: true };
        lock.write_stamp()?;
        debug!(path = %lock.path.display(), "instance lock acquired");
        Ok(lock)
    }

    fn write_stamp(&self) -> Result<(), CourierError> {
        let stamp = LockStamp {
            timestamp: Utc::now(),
            pid: std::process::id(),
        };
        let json =
            serde_json::to_string(&stamp).map_err(|e| CourierError::Config(e.to_string()))?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    /// Refresh the stamp. Logs and degrades on failure.
    pub fn refresh(&self) {
        if let Err(e) = self.write_stamp() {
            warn!(path = %self.path.display(), error = %e, "failed to refresh instance lock");
        }
    }

    /// Remove the lock file.
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if !self.held {
            return;
        }
        self.held = false;
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!(path = %self.path.display(), error = %e, "failed to remove instance lock");
        }
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        self.remove();
    }
}
