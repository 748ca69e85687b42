//! File discovery.
//!
//! Walks the configured roots, keeps files on the extension allow-list,
//! and fingerprints each one. Reading a file's bytes yields a strong
//! SHA-256 fingerprint; when the read fails the file is still discovered
//! with a weak `sig:<size>:<mtime_ns>` signature, so discovery never
//! hard-fails on an unreadable file.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::extract;
use crate::models::FileRecord;

/// Always excluded, on top of any configured patterns.
const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

/// Enumerate every supported file under `roots`. A root that is itself a
/// file is taken directly; a missing root is skipped with a warning.
/// Results are sorted by path for deterministic runs.
pub fn discover_files(roots: &[PathBuf], exclude_globs: &[String]) -> Result<Vec<FileRecord>> {
    let excludes = build_exclude_set(exclude_globs)?;

    let mut files = Vec::new();
    for root in roots {
        if !root.exists() {
            warn!(root = %root.display(), "index root does not exist, skipping");
            continue;
        }

        if root.is_file() {
            if extract::is_supported(root) {
                files.push(file_record(root));
            }
            continue;
        }

        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();

            let relative = path.strip_prefix(root).unwrap_or(path);
            if excludes.is_match(relative) {
                continue;
            }
            if !extract::is_supported(path) {
                continue;
            }

            files.push(file_record(path));
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(count = files.len(), "discovery pass complete");
    Ok(files)
}

fn build_exclude_set(extra: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).chain(extra.iter().cloned()) {
        builder.add(Glob::new(&pattern)?);
    }
    Ok(builder.build()?)
}

fn file_record(path: &Path) -> FileRecord {
    let (bytes, mtime_ns) = match std::fs::metadata(path) {
        Ok(meta) => (meta.len(), mtime_nanos(&meta)),
        Err(_) => (0, 0),
    };

    // Strong fingerprint when the bytes are readable, weak signature
    // otherwise. Weak signatures collide with touch-only changes.
    let sha256 = match std::fs::read(path) {
        Ok(data) => {
            let mut hasher = Sha256::new();
            hasher.update(&data);
            hex::encode(hasher.finalize())
        }
        Err(_) => format!("sig:{}:{}", bytes, mtime_ns),
    };

    FileRecord {
        path: path.to_string_lossy().into_owned(),
        bytes,
        mtime_ns,
        sha256,
        mime: mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
        ext: extract::extension_of(path),
    }
}

fn mtime_nanos(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|m| m.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}
