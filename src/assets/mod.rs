//! Static asset copier
//!
//! Copies files from the configured static directories into the output
//! without any transformation, preserving their relative layout.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::bundler::OutputSnapshot;
use crate::error::{BuildError, BuildResult};

/// A file copied verbatim into the output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopiedAsset {
    /// Output-relative path, `/`-separated
    pub path: String,
    pub content: Vec<u8>,
}

/// Copies static directories into the output
#[derive(Debug, Clone, Default)]
pub struct AssetCopier {
    /// (absolute source directory, output-relative destination)
    sources: Vec<(PathBuf, PathBuf)>,
}

impl AssetCopier {
    pub fn new(sources: Vec<(PathBuf, PathBuf)>) -> Self {
        Self { sources }
    }

    /// Read every file under the source directories
    ///
    /// Later directories win when two of them provide the same path.
    pub fn collect(&self) -> BuildResult<Vec<CopiedAsset>> {
        let mut assets: Vec<CopiedAsset> = Vec::new();

        for (source, destination) in &self.sources {
            if !source.is_dir() {
                return Err(BuildError::config(format!(
                    "static directory does not exist: {}",
                    source.display()
                )));
            }

            let mut count = 0;
            for entry in WalkDir::new(source).follow_links(true).sort_by_file_name() {
                let entry = entry.map_err(|e| {
                    let path = e.path().unwrap_or(source.as_path()).to_path_buf();
                    BuildError::io(path, e.into())
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }

                let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
                let path = output_path(destination, relative);
                let content = fs::read(entry.path()).map_err(|e| BuildError::io(entry.path(), e))?;

                assets.retain(|asset| asset.path != path);
                assets.push(CopiedAsset { path, content });
                count += 1;
            }

            debug!("Collected {} files from {}", count, source.display());
        }

        Ok(assets)
    }
}

/// Add copied files to a snapshot without replacing emitted artifacts
pub fn merge(assets: Vec<CopiedAsset>, snapshot: &mut OutputSnapshot) -> usize {
    let mut copied = 0;

    for asset in assets {
        if snapshot.contains(&asset.path) {
            warn!("Static file {} is shadowed by a bundler artifact", asset.path);
            continue;
        }
        snapshot.insert(&asset.path, asset.content);
        copied += 1;
    }

    info!("Copied {} static files", copied);
    copied
}

fn output_path(destination: &Path, relative: &Path) -> String {
    destination
        .join(relative)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
