//! Trusted platform assembly discovery
//!
//! The runtime only loads assemblies listed in its trusted assembly list.
//! The list is rebuilt from the runtime directory (and the application
//! directory, when different) on every initialization.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Absolute paths of loadable assemblies, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustedAssemblyList {
    entries: Vec<PathBuf>,
}

impl TrustedAssemblyList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan the runtime directory, then the application directory if it is
    /// a different directory.
    pub fn discover(runtime_dir: &Path, app_dir: &Path, extensions: &[String]) -> Self {
        let mut list = Self::new();
        list.scan_directory(runtime_dir, extensions);
        if !same_directory(runtime_dir, app_dir) {
            list.scan_directory(app_dir, extensions);
        }
        list
    }

    /// Append every regular file in `dir` whose extension is recognized.
    ///
    /// Missing directories and enumeration errors add nothing; the runtime's
    /// own initialization reports what it cannot find. Entries from one
    /// directory are appended in lexicographic order.
    pub fn scan_directory(&mut self, dir: &Path, extensions: &[String]) -> usize {
        let dir = match fs::canonicalize(dir) {
            Ok(dir) if dir.is_dir() => dir,
            _ => {
                tracing::debug!("Skipping assembly directory {}: not a directory", dir.display());
                return 0;
            }
        };

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::debug!("Cannot enumerate {}: {}", dir.display(), err);
                return 0;
            }
        };

        let mut found: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| dir.join(entry.file_name()))
            .filter(|path| path.is_file() && has_extension(path, extensions))
            .collect();
        found.sort();

        let count = found.len();
        self.entries.extend(found);
        tracing::debug!("Found {} assemblies in {}", count, dir.display());
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(PathBuf::as_path)
    }

    /// Join all paths with `separator`.
    pub fn join(&self, separator: char) -> String {
        let mut joined = String::new();
        for (i, path) in self.entries.iter().enumerate() {
            if i > 0 {
                joined.push(separator);
            }
            joined.push_str(&path.to_string_lossy());
        }
        joined
    }
}

impl fmt::Display for TrustedAssemblyList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.join(';'))
    }
}

/// Directory an entry assembly lives in. A directory path is its own app
/// directory.
pub fn app_directory(entry_assembly: &Path) -> PathBuf {
    if entry_assembly.is_dir() {
        return entry_assembly.to_path_buf();
    }
    match entry_assembly.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|known| known.eq_ignore_ascii_case(ext)))
}

fn same_directory(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
