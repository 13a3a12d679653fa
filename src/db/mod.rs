//! SQLite store for scan results.

mod schema;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OpenFlags};
use std::path::{Path, PathBuf};

use crate::error::RelinkError;
use crate::scanner::ScanReport;

pub use schema::{SCHEMA, TIMESTAMP_FORMAT};

/// File name prefix shared by every scan output.
pub const SCAN_FILE_PREFIX: &str = "photos_scan_";

/// A scanned photo as read back from the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPhoto {
    pub id: i64,
    pub directory: String,
    pub filename: String,
    pub width: u32,
    pub height: u32,
}

pub struct ScanDb {
    conn: Connection,
}

impl ScanDb {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open scan database {}", path.display()))?;
        Ok(Self { conn })
    }

    /// Open a scan database for reading. Never creates anything.
    pub fn open_existing(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(RelinkError::ScanDatabaseNotFound(path.to_path_buf()).into());
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open scan database {}", path.display()))?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
        };
        db.initialize()?;
        Ok(db)
    }

    pub fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Store every record of the report plus a `scans` history row, in one
    /// transaction. Returns the number of photos written.
    pub fn insert_report(&mut self, report: &ScanReport) -> Result<usize> {
        let scanned_at = report.scanned_at.format(TIMESTAMP_FORMAT).to_string();
        let tx = self.conn.transaction()?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO photos (directory, filename, width, height, scanned_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )?;
            for record in &report.records {
                stmt.execute(params![
                    record.directory,
                    record.filename,
                    record.width,
                    record.height,
                    record.scanned_at.format(TIMESTAMP_FORMAT).to_string(),
                ])?;
            }
        }

        tx.execute(
            r#"
            INSERT INTO scans (root, scanned_at, photos_found, photos_failed)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                report.root.to_string_lossy(),
                scanned_at,
                report.total_found() as i64,
                report.failed.len() as i64,
            ],
        )?;

        tx.commit()?;
        Ok(report.records.len())
    }

    pub fn load_photos(&self) -> Result<Vec<StoredPhoto>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, directory, filename, width, height FROM photos ORDER BY id",
        )?;
        let photos = stmt
            .query_map([], |row| {
                Ok(StoredPhoto {
                    id: row.get(0)?,
                    directory: row.get(1)?,
                    filename: row.get(2)?,
                    width: row.get(3)?,
                    height: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(photos)
    }

    pub fn photo_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM photos", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// Newest `photos_scan_*.db` in `directory`. Names embed a sortable
/// timestamp, so the lexicographic maximum is the latest scan.
pub fn latest_scan_db(directory: &Path) -> Result<PathBuf> {
    let entries = match std::fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(_) => return Err(RelinkError::NoScanDatabase(directory.to_path_buf()).into()),
    };

    entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            let name = p
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            name.starts_with(SCAN_FILE_PREFIX) && name.ends_with(".db")
        })
        .max()
        .ok_or_else(|| RelinkError::NoScanDatabase(directory.to_path_buf()).into())
}
