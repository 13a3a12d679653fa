use std::path::PathBuf;

/// Failures a caller may want to tell apart from plain I/O or SQL errors.
#[derive(Debug, thiserror::Error)]
pub enum RelinkError {
    #[error("scan root does not exist: {}", .0.display())]
    ScanRootNotFound(PathBuf),

    #[error("scan root is not a directory: {}", .0.display())]
    ScanRootNotDirectory(PathBuf),

    #[error("catalog does not exist: {}", .0.display())]
    CatalogNotFound(PathBuf),

    #[error("not a Lightroom catalog (missing table {table}): {}", .path.display())]
    NotACatalog { path: PathBuf, table: &'static str },

    #[error("scan database does not exist: {}", .0.display())]
    ScanDatabaseNotFound(PathBuf),

    #[error("no scan database found in {} - run `photo-relink scan` first", .0.display())]
    NoScanDatabase(PathBuf),
}
