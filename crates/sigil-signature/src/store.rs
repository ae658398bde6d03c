//! # Signature Store
//!
//! Loads and persists one [`SignatureDocument`] per user.
//!
//! ## Threat Model
//!
//! The store defends against:
//!
//! - **Lost updates**: Mutations for one user run inside a per-user
//!   transaction. Two concurrent writers never both read the same version.
//! - **Torn writes**: Documents are written to a temp file in the target
//!   directory, fsynced, then renamed over the old file. Readers see either
//!   the old document or the new one.
//! - **Path traversal**: User ids are restricted to `[A-Za-z0-9_.-]+` and may
//!   not start with a dot.
//! - **Silent corruption**: A present but malformed document is an
//!   `Integrity` error, never an empty signature.
//!
//! ## Layout
//!
//! ```text
//! <root>/
//! ├── alice/
//! │   └── signature.toml
//! └── bob/
//!     └── signature.toml
//! ```

use crate::document::SignatureDocument;
use crate::error::{Result, SignatureError};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// File name of a user's document inside their directory.
pub const DOCUMENT_FILE: &str = "signature.toml";

/// Default bounded wait for the per-user lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(2000);

/// What a transaction body decided to do with the document.
#[derive(Debug)]
pub enum Commit<T> {
    /// Persist the new document, then return the value.
    Write(SignatureDocument, T),
    /// Leave the file untouched.
    Skip(T),
}

/// File-backed store of signature documents.
///
/// # Example
///
/// ```rust,no_run
/// use sigil_signature::store::{Commit, SignatureStore};
/// use std::time::Duration;
///
/// let store = SignatureStore::open("./signatures", Duration::from_secs(2)).unwrap();
/// let doc = store.get("alice").unwrap();
/// println!("{} nodes", doc.entries.len());
///
/// store
///     .transaction("alice", |doc| {
///         let mut next = doc.clone();
///         next.updated_at = chrono::Utc::now();
///         Ok(Commit::Write(next, ()))
///     })
///     .unwrap();
/// ```
#[derive(Debug)]
pub struct SignatureStore {
    root: PathBuf,
    lock_timeout: Duration,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SignatureStore {
    /// Opens (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>, lock_timeout: Duration) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| SignatureError::io(&root, e))?;
        debug!("Signature store opened at {}", root.display());
        Ok(Self {
            root,
            lock_timeout,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of `user_id`'s document. Rejects ids that could escape the root.
    pub fn document_path(&self, user_id: &str) -> Result<PathBuf> {
        validate_user_id(user_id)?;
        Ok(self.root.join(user_id).join(DOCUMENT_FILE))
    }

    /// Loads a user's document.
    ///
    /// An absent document is an empty signature. A present one that fails
    /// structural validation is an `Integrity` error.
    pub fn get(&self, user_id: &str) -> Result<SignatureDocument> {
        let path = self.document_path(user_id)?;
        load(&path)
    }

    /// Raw bytes of a user's document, or `None` if it was never written.
    pub fn read_raw(&self, user_id: &str) -> Result<Option<Vec<u8>>> {
        let path = self.document_path(user_id)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SignatureError::io(path, e)),
        }
    }

    /// Runs a read-modify-write cycle under the user's lock.
    ///
    /// `body` sees the current document and decides whether to write.
    /// Any error from `body` leaves the file untouched.
    ///
    /// # Errors
    ///
    /// - `Concurrency` if the lock is not acquired within the configured wait
    /// - `Integrity` if the current document is malformed
    /// - whatever `body` returns
    pub fn transaction<T, F>(&self, user_id: &str, body: F) -> Result<T>
    where
        F: FnOnce(&SignatureDocument) -> Result<Commit<T>>,
    {
        let path = self.document_path(user_id)?;
        let lock = self.user_lock(user_id);
        let _guard = lock.try_lock_for(self.lock_timeout).ok_or_else(|| {
            warn!("Lock contention on signature for '{}'", user_id);
            SignatureError::Concurrency {
                user_id: user_id.to_string(),
                waited_ms: self.lock_timeout.as_millis() as u64,
            }
        })?;

        let current = load(&path)?;
        match body(&current)? {
            Commit::Write(next, value) => {
                write_atomic(&path, &next)?;
                debug!(
                    "Persisted signature for '{}' ({} nodes)",
                    user_id,
                    next.entries.len()
                );
                Ok(value)
            }
            Commit::Skip(value) => Ok(value),
        }
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Runs `f` while holding a user's lock.
    #[cfg(test)]
    pub(crate) fn hold_lock<R>(&self, user_id: &str, f: impl FnOnce() -> R) -> R {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock();
        f()
    }
}

/// Checks that a user id is a single safe path component.
pub fn validate_user_id(user_id: &str) -> Result<()> {
    let ok = !user_id.is_empty()
        && !user_id.starts_with('.')
        && user_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if ok {
        Ok(())
    } else {
        Err(SignatureError::validation(
            format!("invalid user id '{}'", user_id),
            vec!["user_id".to_string()],
        ))
    }
}

fn load(path: &Path) -> Result<SignatureDocument> {
    match fs::read_to_string(path) {
        Ok(text) => SignatureDocument::from_toml(&text, path),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(SignatureDocument::empty(Utc::now())),
        Err(e) if e.kind() == ErrorKind::InvalidData => {
            Err(SignatureError::integrity(path, "document is not valid UTF-8"))
        }
        Err(e) => Err(SignatureError::io(path, e)),
    }
}

fn write_atomic(path: &Path, doc: &SignatureDocument) -> Result<()> {
    let text = doc.to_toml()?;
    let dir = path
        .parent()
        .ok_or_else(|| SignatureError::integrity(path, "document path has no parent"))?;
    fs::create_dir_all(dir).map_err(|e| SignatureError::io(dir, e))?;

    // NamedTempFile is created 0600 on unix.
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| SignatureError::io(dir, e))?;
    tmp.write_all(text.as_bytes())
        .map_err(|e| SignatureError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| SignatureError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| SignatureError::io(path, e.error))?;
    Ok(())
}
