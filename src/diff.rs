//! Change detection between a discovery pass and the committed fingerprint
//! table.
//!
//! A pure filter: no side effects, no I/O. The indexing pipeline invokes it
//! between discovery and parsing to decide what needs re-embedding.

use std::collections::HashMap;

use anyhow::{bail, Result};

use crate::models::FileRecord;

/// Indexing mode. `Full` historically means "touch everything", so it marks
/// every discovered file as changed even when fingerprints match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    Full,
    Incremental,
}

impl IndexMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexMode::Full => "full",
            IndexMode::Incremental => "incremental",
        }
    }
}

impl std::str::FromStr for IndexMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "full" => Ok(IndexMode::Full),
            "incremental" => Ok(IndexMode::Incremental),
            other => bail!("Unknown index mode: {}. Use full or incremental.", other),
        }
    }
}

/// Return the subset of `files` requiring re-embedding.
///
/// `force` overrides everything; `Full` mode marks all files changed; in
/// `Incremental` mode a file is changed iff its path is unknown or its
/// fingerprint differs from the committed value.
pub fn detect_changes(
    files: &[FileRecord],
    known: &HashMap<String, String>,
    mode: IndexMode,
    force: bool,
) -> Vec<FileRecord> {
    if force {
        return files.to_vec();
    }

    files
        .iter()
        .filter(|f| match mode {
            IndexMode::Full => true,
            IndexMode::Incremental => known.get(&f.path) != Some(&f.sha256),
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, sha: &str) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            bytes: 1,
            mtime_ns: 0,
            sha256: sha.to_string(),
            mime: "text/plain".to_string(),
            ext: ".txt".to_string(),
        }
    }

    #[test]
    fn force_marks_everything_changed() {
        let files = vec![record("/a", "h1"), record("/b", "h2")];
        let known: HashMap<_, _> = files
            .iter()
            .map(|f| (f.path.clone(), f.sha256.clone()))
            .collect();
        let changed = detect_changes(&files, &known, IndexMode::Incremental, true);
        assert_eq!(changed.len(), 2);
    }

    #[test]
    fn full_mode_ignores_matching_fingerprints() {
        let files = vec![record("/a", "h1")];
        let known: HashMap<_, _> = [("/a".to_string(), "h1".to_string())].into();
        let changed = detect_changes(&files, &known, IndexMode::Full, false);
        assert_eq!(changed.len(), 1);
    }

    #[test]
    fn incremental_skips_unchanged_files() {
        let files = vec![record("/a", "h1"), record("/b", "h2"), record("/c", "h3")];
        let known: HashMap<_, _> = [
            ("/a".to_string(), "h1".to_string()),
            ("/b".to_string(), "stale".to_string()),
        ]
        .into();
        let changed = detect_changes(&files, &known, IndexMode::Incremental, false);
        let paths: Vec<&str> = changed.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["/b", "/c"]);
    }

    #[test]
    fn incremental_twice_on_unchanged_set_is_empty() {
        let files = vec![record("/a", "h1"), record("/b", "h2")];
        let committed: HashMap<_, _> = files
            .iter()
            .map(|f| (f.path.clone(), f.sha256.clone()))
            .collect();
        let changed = detect_changes(&files, &committed, IndexMode::Incremental, false);
        assert!(changed.is_empty());
    }

    #[test]
    fn mode_parses_from_str() {
        assert_eq!("full".parse::<IndexMode>().unwrap(), IndexMode::Full);
        assert!("partial".parse::<IndexMode>().is_err());
    }
}
