// Locking used to be implemented as rows in a `locks` table in the cache database, with lock
// holders polling a `valid_until` timestamp. That meant the read cache doubled as a distributed
// lock manager, which made it impossible to clear/rebuild the cache without losing in-flight
// locks. We use real OS advisory file locks instead: one lock file per named resource under
// `<cache_dir>/locks/`, held via `flock(2)` (through the `fs2` crate) for the lifetime of a guard
// value. Dropping the guard releases the lock, even on panic/early-return.

use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::debug;

use crate::config::Config;
use crate::error::{Result, RoseError, RoseExpectedError};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Holds an exclusive advisory lock on `<cache_dir>/locks/<name>.lock` until dropped.
pub struct LockGuard {
    name: String,
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            debug!("Failed to release lock {}: {}", self.name, e);
        }
    }
}

fn lock_path(config: &Config, name: &str) -> Result<PathBuf> {
    let dir = config.locks_dir();
    fs::create_dir_all(&dir)?;
    // Lock names can contain characters that aren't filesystem-safe (release/collage/playlist
    // names are taken from user-controlled paths), so percent-escape anything that isn't a plain
    // ASCII identifier character.
    let safe: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c.to_string() } else { format!("_{:x}_", c as u32) })
        .collect();
    Ok(dir.join(format!("{safe}.lock")))
}

/// Acquires the named lock, blocking (with a short poll interval) until it is available or
/// `timeout_secs` elapses.
pub fn lock(config: &Config, name: &str, timeout_secs: f64) -> Result<LockGuard> {
    let path = lock_path(config, name)?;
    let file = OpenOptions::new().create(true).write(true).open(&path)?;

    let deadline = Instant::now() + Duration::from_secs_f64(timeout_secs);
    debug!("Attempting to acquire lock for {} with timeout {}", name, timeout_secs);
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!("Successfully acquired lock for {}", name);
                return Ok(LockGuard { name: name.to_string(), file });
            }
            Err(_) => {
                if Instant::now() >= deadline {
                    return Err(RoseError::Expected(RoseExpectedError::Generic(format!("Failed to acquire lock for {name}: timed out"))));
                }
                debug!("Failed to acquire lock for {}, retrying", name);
                std::thread::sleep(POLL_INTERVAL);
            }
        }
    }
}
