pub mod dimensions;
pub mod discovery;

use anyhow::Result;
use chrono::{Local, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::ScannerConfig;
use crate::error::RelinkError;

pub use dimensions::read_dimensions;
pub use discovery::discover_images;

/// One successfully read image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoRecord {
    /// Parent directory relative to the scan root, `/`-separated; empty for
    /// files directly in the root.
    pub directory: String,
    pub filename: String,
    pub width: u32,
    pub height: u32,
    pub scanned_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct ScanReport {
    pub root: PathBuf,
    pub scanned_at: NaiveDateTime,
    pub records: Vec<PhotoRecord>,
    /// Files with an image extension whose dimensions could not be read.
    pub failed: Vec<PathBuf>,
}

impl ScanReport {
    pub fn total_found(&self) -> usize {
        self.records.len() + self.failed.len()
    }
}

pub struct Scanner {
    config: ScannerConfig,
}

impl Scanner {
    pub fn new(config: ScannerConfig) -> Self {
        Self { config }
    }

    pub fn scan(&self, root: &Path) -> Result<ScanReport> {
        if !root.exists() {
            return Err(RelinkError::ScanRootNotFound(root.to_path_buf()).into());
        }
        if !root.is_dir() {
            return Err(RelinkError::ScanRootNotDirectory(root.to_path_buf()).into());
        }

        let scanned_at = Local::now().naive_local().trunc_subsecs(0);
        let paths = discover_images(root, &self.config.image_extensions)?;
        tracing::info!(root = %root.display(), found = paths.len(), "Scanning images");

        let mut records = Vec::with_capacity(paths.len());
        let mut failed = Vec::new();

        for path in paths {
            match read_dimensions(&path) {
                Some((width, height)) => records.push(PhotoRecord {
                    directory: relative_directory(root, &path),
                    filename: file_name(&path),
                    width,
                    height,
                    scanned_at,
                }),
                None => {
                    tracing::warn!(path = %path.display(), "Could not read image dimensions");
                    failed.push(path);
                }
            }
        }

        tracing::info!(
            scanned = records.len(),
            failed = failed.len(),
            "Scan complete"
        );

        Ok(ScanReport {
            root: root.to_path_buf(),
            scanned_at,
            records,
            failed,
        })
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn relative_directory(root: &Path, path: &Path) -> String {
    let parent = path.parent().unwrap_or(root);
    let relative = parent.strip_prefix(root).unwrap_or(parent);

    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
