//! # Definition Scanner
//!
//! Reads raw node definition files from the definitions directory.
//!
//! ## Behavior
//!
//! - Only the top level of the directory is scanned; hidden files are skipped.
//! - Files are visited in lexical file-name order so every scan of the same
//!   directory produces the same batch.
//! - The candidate id is the lower-cased file stem (`ActionNetwork.py` →
//!   `actionnetwork`).
//! - A file that cannot be read (I/O failure, invalid UTF-8) becomes a
//!   [`ScanError`] and is excluded. The scan itself still completes.
//! - When two files map to the same id, the lexically first one wins and the
//!   rest are reported as [`ScanErrorKind::DuplicateId`].
//!
//! The only whole-scan failure is a definitions directory that cannot be
//! listed at all.

use crate::error::{CatalogError, Result, ScanError, ScanErrorKind};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A definition file chosen for reading, before its content is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: String,
    pub path: PathBuf,
}

/// The raw content of one readable definition file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDefinition {
    pub id: String,
    pub path: PathBuf,
    pub content: String,
}

/// Result of a full sequential scan.
#[derive(Debug, Default)]
pub struct ScanBatch {
    /// Readable definitions in lexical order.
    pub definitions: Vec<RawDefinition>,
    /// Per-file failures; none of these have a definition in the batch.
    pub errors: Vec<ScanError>,
}

/// Derives the canonical node id from a definition path.
///
/// Returns `None` for paths without a usable UTF-8 stem.
pub fn candidate_id(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?.trim();
    if stem.is_empty() {
        return None;
    }
    Some(stem.to_lowercase())
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// Lists definition candidates in lexical order.
///
/// Entries the directory walker cannot stat and duplicate ids are returned
/// as scan errors alongside the candidates.
pub fn list_candidates(dir: &Path) -> Result<(Vec<Candidate>, Vec<ScanError>)> {
    if let Err(source) = fs::read_dir(dir) {
        return Err(CatalogError::DefinitionsDir {
            path: dir.to_path_buf(),
            source,
        });
    }

    let mut candidates = Vec::new();
    let mut errors = Vec::new();
    let mut seen = BTreeSet::new();

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                let id = candidate_id(&path).unwrap_or_default();
                warn!("Skipping unreadable entry {}: {}", path.display(), err);
                errors.push(ScanError::new(id, path, ScanErrorKind::Unreadable, err.to_string()));
                continue;
            }
        };

        let path = entry.path();
        if !entry.file_type().is_file() || is_hidden(path) {
            continue;
        }

        let Some(id) = candidate_id(path) else {
            debug!("Ignoring definition without usable stem: {}", path.display());
            continue;
        };

        if !seen.insert(id.clone()) {
            warn!("Duplicate node id '{}' from {}", id, path.display());
            errors.push(ScanError::new(
                id,
                path,
                ScanErrorKind::DuplicateId,
                "an earlier definition file already uses this id",
            ));
            continue;
        }

        candidates.push(Candidate {
            id,
            path: path.to_path_buf(),
        });
    }

    Ok((candidates, errors))
}

/// Reads one candidate. Failures are isolated to this file.
pub fn read_candidate(candidate: &Candidate) -> std::result::Result<RawDefinition, ScanError> {
    let unreadable =
        |message: String| ScanError::new(&candidate.id, &candidate.path, ScanErrorKind::Unreadable, message);

    let bytes = fs::read(&candidate.path).map_err(|e| unreadable(e.to_string()))?;
    let content = String::from_utf8(bytes).map_err(|e| unreadable(format!("not valid UTF-8: {}", e)))?;

    Ok(RawDefinition {
        id: candidate.id.clone(),
        path: candidate.path.clone(),
        content,
    })
}

/// Scans the whole directory sequentially.
pub fn scan_dir(dir: &Path) -> Result<ScanBatch> {
    let (candidates, mut errors) = list_candidates(dir)?;
    let mut definitions = Vec::with_capacity(candidates.len());

    for candidate in &candidates {
        match read_candidate(candidate) {
            Ok(raw) => definitions.push(raw),
            Err(err) => {
                warn!("{}", err);
                errors.push(err);
            }
        }
    }

    debug!(
        "Scanned {}: {} readable, {} errors",
        dir.display(),
        definitions.len(),
        errors.len()
    );

    Ok(ScanBatch { definitions, errors })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &[u8]) {
        fs::write(dir.path().join(name), content).unwrap();
    }

    #[test]
    fn test_candidate_id_lowercases_stem() {
        assert_eq!(candidate_id(Path::new("/x/ActionNetwork.py")).as_deref(), Some("actionnetwork"));
        assert_eq!(candidate_id(Path::new("slack")).as_deref(), Some("slack"));
    }

    #[test]
    fn test_scan_is_lexical() {
        let dir = TempDir::new().unwrap();
        write(&dir, "zeta.py", b"Z");
        write(&dir, "alpha.py", b"A");
        write(&dir, "mid.py", b"M");

        let batch = scan_dir(dir.path()).unwrap();
        let ids: Vec<_> = batch.definitions.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "mid", "zeta"]);
        assert!(batch.errors.is_empty());
    }

    #[test]
    fn test_invalid_utf8_is_isolated() {
        let dir = TempDir::new().unwrap();
        write(&dir, "good.py", b"fine");
        write(&dir, "bad.py", &[0xff, 0xfe, 0x00, 0x80]);

        let batch = scan_dir(dir.path()).unwrap();
        assert_eq!(batch.definitions.len(), 1);
        assert_eq!(batch.definitions[0].id, "good");
        assert_eq!(batch.errors.len(), 1);
        assert_eq!(batch.errors[0].id, "bad");
        assert_eq!(batch.errors[0].kind, ScanErrorKind::Unreadable);
    }

    #[test]
    fn test_hidden_and_subdirs_skipped() {
        let dir = TempDir::new().unwrap();
        write(&dir, ".hidden.py", b"x");
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("inner.py"), b"x").unwrap();
        write(&dir, "visible.py", b"x");

        let batch = scan_dir(dir.path()).unwrap();
        assert_eq!(batch.definitions.len(), 1);
        assert_eq!(batch.definitions[0].id, "visible");
    }

    #[test]
    fn test_duplicate_ids_first_wins() {
        let dir = TempDir::new().unwrap();
        write(&dir, "Slack.py", b"first");
        write(&dir, "slack.txt", b"second");

        let batch = scan_dir(dir.path()).unwrap();
        assert_eq!(batch.definitions.len(), 1);
        assert_eq!(batch.definitions[0].content, "first");
        assert_eq!(batch.errors.len(), 1);
        assert_eq!(batch.errors[0].kind, ScanErrorKind::DuplicateId);
    }

    #[test]
    fn test_missing_directory_fails_whole_scan() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            scan_dir(&missing),
            Err(CatalogError::DefinitionsDir { .. })
        ));
    }
}
