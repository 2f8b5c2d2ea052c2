//! Migration discovery on disk.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Default migration file extension.
pub const DEFAULT_EXTENSION: &str = "sql";

/// A migration file found on disk, not yet reconciled against the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationCandidate {
    pub name: String,
    pub source_path: PathBuf,
}

impl MigrationCandidate {
    pub fn new(name: impl Into<String>, source_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source_path: source_path.into(),
        }
    }
}

/// A candidate hidden by a later file with the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shadowed {
    pub name: String,
    pub hidden: PathBuf,
    pub winner: PathBuf,
}

/// Result of a scan: candidates in discovery order, duplicates resolved.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub candidates: Vec<MigrationCandidate>,
    pub shadowed: Vec<Shadowed>,
}

impl ScanReport {
    /// Fail on the first shadowed name.
    pub fn deny_shadowing(&self) -> Result<()> {
        match self.shadowed.first() {
            Some(s) => Err(Error::NameConflict {
                name: s.name.clone(),
                first: s.hidden.clone(),
                second: s.winner.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// Enumerates migration files from the primary path and vendor paths.
#[derive(Debug, Clone)]
pub struct Scanner {
    extension: String,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSION)
    }
}

impl Scanner {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }

    /// Scan `primary` first, then each vendor path in registration order.
    ///
    /// The primary directory must exist; missing vendor directories are
    /// skipped. When a name appears twice the later file wins and keeps the
    /// position of the first occurrence.
    pub fn scan(&self, primary: &Path, vendor_paths: &[PathBuf]) -> Result<ScanReport> {
        if !primary.is_dir() {
            return Err(Error::MissingDirectory(primary.to_path_buf()));
        }

        let mut report = ScanReport::default();
        let mut positions: HashMap<String, usize> = HashMap::new();

        let dirs = std::iter::once(primary).chain(vendor_paths.iter().map(PathBuf::as_path));
        for dir in dirs {
            if !dir.is_dir() {
                warn!(path = %dir.display(), "vendor migration path not found, skipping");
                continue;
            }

            for candidate in self.list_dir(dir)? {
                match positions.get(&candidate.name) {
                    Some(&idx) => {
                        let previous = std::mem::replace(&mut report.candidates[idx], candidate);
                        let winner = report.candidates[idx].source_path.clone();
                        warn!(
                            migration = %previous.name,
                            hidden = %previous.source_path.display(),
                            winner = %winner.display(),
                            "migration name shadowed"
                        );
                        report.shadowed.push(Shadowed {
                            name: previous.name,
                            hidden: previous.source_path,
                            winner,
                        });
                    }
                    None => {
                        positions.insert(candidate.name.clone(), report.candidates.len());
                        report.candidates.push(candidate);
                    }
                }
            }
        }

        debug!(count = report.candidates.len(), "scanned migrations");
        Ok(report)
    }

    /// Regular files of one directory with the configured extension, by file name.
    fn list_dir(&self, dir: &Path) -> Result<Vec<MigrationCandidate>> {
        let mut entries: Vec<_> = fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .collect();

        entries.sort_by_key(|e| e.file_name());

        let candidates = entries
            .into_iter()
            .filter_map(|entry| {
                let path = entry.path();
                let ext = path.extension()?.to_str()?;
                if ext != self.extension {
                    return None;
                }
                let name = path.file_stem()?.to_str()?.to_string();
                Some(MigrationCandidate::new(name, path))
            })
            .collect();

        Ok(candidates)
    }
}
