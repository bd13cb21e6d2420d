//! In-memory build output
//!
//! A build assembles every artifact here first. Nothing reaches the output
//! directory until the whole build succeeded, and the dev server serves the
//! snapshot directly.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{BuildError, BuildResult};

/// Output artifacts keyed by their `/`-separated path relative to the output root
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputSnapshot {
    files: BTreeMap<String, Vec<u8>>,
}

impl OutputSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an artifact, returning the content it replaced
    pub fn insert(&mut self, path: impl AsRef<str>, content: impl Into<Vec<u8>>) -> Option<Vec<u8>> {
        let key = normalize(path.as_ref());
        self.files.insert(key, content.into())
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(&normalize(path)).map(Vec::as_slice)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(&normalize(path))
    }

    /// Artifacts in path order
    pub fn files(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(path, content)| (path.as_str(), content.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Total size in bytes
    pub fn size(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    /// Write every artifact below `dir`, each file atomically
    pub fn write_to(&self, dir: &Path) -> BuildResult<Vec<PathBuf>> {
        fs::create_dir_all(dir).map_err(|e| BuildError::io(dir, e))?;

        let mut written = Vec::with_capacity(self.files.len());
        for (relative, content) in &self.files {
            let target = dir.join(relative);
            atomic_write(&target, content)?;
            written.push(target);
        }

        debug!("Wrote {} files to {}", written.len(), dir.display());
        Ok(written)
    }
}

/// Write through a temporary file in the target's directory, then rename over it
pub fn atomic_write(path: &Path, content: &[u8]) -> BuildResult<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;

    let mut file = NamedTempFile::new_in(parent).map_err(|e| BuildError::io(parent, e))?;
    file.write_all(content).map_err(|e| BuildError::io(path, e))?;
    file.persist(path).map_err(|e| BuildError::io(path, e.error))?;
    Ok(())
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/").trim_start_matches("./").trim_start_matches('/').to_string()
}
