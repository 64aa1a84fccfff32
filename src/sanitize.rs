//! Bidirectional mapping between the names the virtual filesystem displays and the names cached
//! in the database: directory-safe display strings in, arbitrary metadata strings out.
//!
//! The cache stores artist/genre/label/descriptor names verbatim, but a FUSE directory entry
//! cannot contain `/` or other filesystem-illegal characters. [`Sanitizer`] resolves a sanitized
//! name back to the original by remembering every name it has sanitized so far. If a name shows up
//! that hasn't been seen yet (e.g. the kernel cached a stale dentry), the caller is expected to
//! repopulate the mapping with `on_miss` — typically a `readdir` of the name's parent directory —
//! and retry once before giving up.

use crate::config::Config;
use crate::error::{Result, RoseError, RoseExpectedError};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

#[derive(Default)]
pub struct Sanitizer {
    to_sanitized: Mutex<HashMap<String, String>>,
    to_unsanitized: Mutex<HashMap<String, String>>,
}

impl Sanitizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sanitize `unsanitized` for display as a directory/file name, remembering the mapping so
    /// that a later `unsanitize` call can recover the original.
    pub fn sanitize(&self, config: &Config, unsanitized: &str) -> String {
        if let Some(s) = self.to_sanitized.lock().unwrap().get(unsanitized) {
            return s.clone();
        }
        let sanitized = crate::common::sanitize_dirname(config, unsanitized, true);
        self.to_sanitized.lock().unwrap().insert(unsanitized.to_string(), sanitized.clone());
        self.to_unsanitized.lock().unwrap().insert(sanitized.clone(), unsanitized.to_string());
        sanitized
    }

    /// Recover the original string behind a sanitized name. `on_miss` is invoked at most once, on
    /// a cache miss, to give the caller a chance to repopulate the mapping (by re-walking the
    /// directory that produced `sanitized`) before a second, final lookup.
    pub fn unsanitize(&self, sanitized: &str, on_miss: impl FnOnce() -> Result<()>) -> Result<String> {
        if let Some(u) = self.to_unsanitized.lock().unwrap().get(sanitized) {
            return Ok(u.clone());
        }
        debug!("SANITIZER: Failed to find corresponding unsanitized string for {:?}.", sanitized);
        debug!("SANITIZER: Invoking readdir before retrying unsanitized resolution on {:?}", sanitized);
        on_miss()?;
        debug!("SANITIZER: Finished readdir call: retrying file virtual name resolution on {:?}", sanitized);
        self.to_unsanitized.lock().unwrap().get(sanitized).cloned().ok_or_else(|| {
            RoseError::Expected(RoseExpectedError::FileNotFound { path: sanitized.into() })
        })
    }
}
