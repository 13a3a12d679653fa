//! Read/write access to a Lightroom catalog (`.lrcat`, SQLite).
//!
//! Lightroom stores a file's location in three hops: the file row points at
//! a folder, the folder holds a path relative to its root folder, and the
//! root folder holds the absolute path. Rewriting one `absolutePath` moves
//! every file under that root at once.

pub mod schema;

use anyhow::{Context, Result};
use chrono::Local;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::{Path, PathBuf};

use crate::error::RelinkError;
use crate::paths::{is_under, join_dir, normalize_path};

pub use schema::{MINIMAL_SCHEMA, REQUIRED_TABLES};

const FILE_SELECT: &str = r#"
    SELECT
        fl.id_local,
        fl.baseName,
        fl.extension,
        fl.folder,
        f.rootFolder,
        rf.absolutePath,
        f.pathFromRoot
    FROM AgLibraryFile fl
    JOIN AgLibraryFolder f ON fl.folder = f.id_local
    JOIN AgLibraryRootFolder rf ON f.rootFolder = rf.id_local
"#;

/// A managed file with its resolved location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogFile {
    pub id: i64,
    pub base_name: String,
    pub extension: String,
    pub folder_id: i64,
    pub root_id: i64,
    pub root_path: String,
    pub path_from_root: String,
}

impl CatalogFile {
    pub fn filename(&self) -> String {
        if self.extension.is_empty() {
            self.base_name.clone()
        } else {
            format!("{}.{}", self.base_name, self.extension)
        }
    }

    /// Absolute folder path (`root_path` + `path_from_root`), `/`-separated.
    pub fn folder_path(&self) -> String {
        join_dir(&self.root_path, &self.path_from_root)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootFolder {
    pub id: i64,
    pub absolute_path: String,
}

/// A file as needed to move it between root folders.
#[derive(Debug, Clone)]
pub struct MergeCandidate {
    pub file_id: i64,
    pub path_from_root: String,
    pub lc_idx_filename: String,
}

pub struct Catalog {
    path: PathBuf,
    conn: Connection,
}

impl Catalog {
    /// Open an existing catalog. Never creates one.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(RelinkError::CatalogNotFound(path.to_path_buf()).into());
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open catalog {}", path.display()))?;

        for table in REQUIRED_TABLES {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
                [table],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(RelinkError::NotACatalog {
                    path: path.to_path_buf(),
                    table,
                }
                .into());
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            conn,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start a transaction on the shared connection. Reads through `self`
    /// keep working while it is open; dropping it uncommitted rolls back.
    pub fn begin(&self) -> Result<Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn load_files(&self) -> Result<Vec<CatalogFile>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{FILE_SELECT} ORDER BY fl.id_local"))?;
        let files = stmt
            .query_map([], file_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(files)
    }

    pub fn files_in_root(&self, root_id: i64) -> Result<Vec<CatalogFile>> {
        let mut stmt = self.conn.prepare(&format!(
            "{FILE_SELECT} WHERE rf.id_local = ?1 ORDER BY fl.id_local"
        ))?;
        let files = stmt
            .query_map([root_id], file_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(files)
    }

    pub fn count_files_in_root(&self, root_id: i64) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            r#"
            SELECT COUNT(fl.id_local)
            FROM AgLibraryFile fl
            JOIN AgLibraryFolder f ON fl.folder = f.id_local
            WHERE f.rootFolder = ?1
            "#,
            [root_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn root_folders(&self) -> Result<Vec<RootFolder>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id_local, absolutePath FROM AgLibraryRootFolder ORDER BY id_local")?;
        let roots = stmt
            .query_map([], |row| {
                Ok(RootFolder {
                    id: row.get(0)?,
                    absolute_path: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(roots)
    }

    pub fn root_path(&self, root_id: i64) -> Result<Option<String>> {
        let path = self
            .conn
            .query_row(
                "SELECT absolutePath FROM AgLibraryRootFolder WHERE id_local = ?1",
                [root_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(path.map(Option::unwrap_or_default))
    }

    /// Another root whose path equals `path` once normalized.
    pub fn other_root_with_path(&self, path: &str, exclude: i64) -> Result<Option<i64>> {
        let wanted = normalize_path(path);
        Ok(self
            .root_folders()?
            .into_iter()
            .find(|r| r.id != exclude && normalize_path(&r.absolute_path) == wanted)
            .map(|r| r.id))
    }

    /// Roots that own at least one file and sit outside `base`.
    pub fn roots_outside_base(&self, base: &str) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT DISTINCT rf.id_local, rf.absolutePath
            FROM AgLibraryRootFolder rf
            JOIN AgLibraryFolder f ON rf.id_local = f.rootFolder
            JOIN AgLibraryFile fl ON f.id_local = fl.folder
            ORDER BY rf.id_local
            "#,
        )?;
        let roots = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(roots
            .into_iter()
            .filter(|(_, path)| !is_under(path, base))
            .map(|(id, _)| id)
            .collect())
    }

    pub fn merge_candidates(&self, root_id: i64) -> Result<Vec<MergeCandidate>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT fl.id_local, f.pathFromRoot, fl.lc_idx_filename
            FROM AgLibraryFile fl
            JOIN AgLibraryFolder f ON fl.folder = f.id_local
            WHERE f.rootFolder = ?1
            ORDER BY fl.id_local
            "#,
        )?;
        let files = stmt
            .query_map([root_id], |row| {
                Ok(MergeCandidate {
                    file_id: row.get(0)?,
                    path_from_root: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    lc_idx_filename: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(files)
    }

    pub fn folder_in_root(&self, root_id: i64, path_from_root: &str) -> Result<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id_local FROM AgLibraryFolder WHERE rootFolder = ?1 AND pathFromRoot = ?2",
                params![root_id, path_from_root],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn file_in_folder(&self, folder_id: i64, lc_idx_filename: &str) -> Result<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id_local FROM AgLibraryFile WHERE folder = ?1 AND lc_idx_filename = ?2",
                params![folder_id, lc_idx_filename],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Raw rows for the audits: root id, root path, path from root, base
    /// name, extension, lowercase file name.
    pub(crate) fn audit_rows(&self) -> Result<Vec<AuditRow>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT
                fl.id_local,
                f.rootFolder,
                rf.absolutePath,
                f.pathFromRoot,
                fl.baseName,
                fl.extension,
                fl.lc_idx_filename
            FROM AgLibraryFile fl
            JOIN AgLibraryFolder f ON fl.folder = f.id_local
            JOIN AgLibraryRootFolder rf ON f.rootFolder = rf.id_local
            ORDER BY rf.absolutePath, f.pathFromRoot, fl.baseName, fl.extension
            "#,
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(AuditRow {
                    file_id: row.get(0)?,
                    root_id: row.get(1)?,
                    root_path: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    path_from_root: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    base_name: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                    extension: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                    lc_idx_filename: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Writes (call inside `begin()`) ───────────────────────────────

    pub fn set_root_path(&self, root_id: i64, path: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE AgLibraryRootFolder SET absolutePath = ?1 WHERE id_local = ?2",
            params![path, root_id],
        )?;
        Ok(())
    }

    pub fn reassign_file(&self, file_id: i64, folder_id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE AgLibraryFile SET folder = ?1 WHERE id_local = ?2",
            params![folder_id, file_id],
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct AuditRow {
    pub file_id: i64,
    pub root_id: i64,
    pub root_path: String,
    pub path_from_root: String,
    pub base_name: String,
    pub extension: String,
    pub lc_idx_filename: String,
}

fn file_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CatalogFile> {
    Ok(CatalogFile {
        id: row.get(0)?,
        base_name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        extension: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        folder_id: row.get(3)?,
        root_id: row.get(4)?,
        root_path: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        path_from_root: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
    })
}

/// Copy the catalog to `<name>.bak-YYYYmmdd_HHMMSS` next to it.
pub fn backup(path: &Path) -> Result<PathBuf> {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "catalog.lrcat".to_string());
    let backup_path = path.with_file_name(format!("{file_name}.bak-{stamp}"));

    std::fs::copy(path, &backup_path).with_context(|| {
        format!(
            "Failed to back up catalog {} to {}",
            path.display(),
            backup_path.display()
        )
    })?;
    tracing::info!(backup = %backup_path.display(), "Catalog backed up");
    Ok(backup_path)
}

#[cfg(test)]
pub(crate) mod fixture {
    use super::*;

    /// Build a catalog file from `(root_id, absolutePath)`,
    /// `(folder_id, root_id, pathFromRoot)` and
    /// `(file_id, folder_id, baseName, extension)` rows.
    pub fn build(
        path: &Path,
        roots: &[(i64, &str)],
        folders: &[(i64, i64, &str)],
        files: &[(i64, i64, &str, &str)],
    ) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(MINIMAL_SCHEMA).unwrap();
        for (id, abs) in roots {
            conn.execute(
                "INSERT INTO AgLibraryRootFolder (id_local, absolutePath) VALUES (?1, ?2)",
                params![id, abs],
            )
            .unwrap();
        }
        for (id, root, rel) in folders {
            conn.execute(
                "INSERT INTO AgLibraryFolder (id_local, rootFolder, pathFromRoot) VALUES (?1, ?2, ?3)",
                params![id, root, rel],
            )
            .unwrap();
        }
        for (id, folder, base, ext) in files {
            conn.execute(
                r#"INSERT INTO AgLibraryFile (id_local, folder, baseName, extension, lc_idx_filename)
                   VALUES (?1, ?2, ?3, ?4, ?5)"#,
                params![id, folder, base, ext, format!("{base}.{ext}").to_lowercase()],
            )
            .unwrap();
        }
    }
}
