use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::db::{ScanDb, SCAN_FILE_PREFIX};
use crate::scanner::{PhotoRecord, ScanReport};

/// Byte order mark so spreadsheet tools pick UTF-8 for accented names.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
    Sqlite,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 3] = [ExportFormat::Json, ExportFormat::Csv, ExportFormat::Sqlite];

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Sqlite => "db",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExportFormat::Json => "JSON",
            ExportFormat::Csv => "CSV",
            ExportFormat::Sqlite => "SQLite",
        }
    }
}

#[derive(Serialize)]
struct JsonDocument<'a> {
    timestamp: NaiveDateTime,
    root: String,
    total_photos: usize,
    photos: &'a [PhotoRecord],
}

/// `photos_scan_YYYYmmdd_HHMMSS`
pub fn output_stem(scanned_at: &NaiveDateTime) -> String {
    format!("{}{}", SCAN_FILE_PREFIX, scanned_at.format("%Y%m%d_%H%M%S"))
}

/// Write the report in one format under `output_dir`, returning the file path.
pub fn export_report(report: &ScanReport, output_dir: &Path, format: ExportFormat) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let path = output_dir.join(format!(
        "{}.{}",
        output_stem(&report.scanned_at),
        format.extension()
    ));

    match format {
        ExportFormat::Json => export_json(report, &path)?,
        ExportFormat::Csv => export_csv(&report.records, &path)?,
        ExportFormat::Sqlite => export_sqlite(report, &path)?,
    }

    tracing::info!(format = format.name(), path = %path.display(), "Exported scan results");
    Ok(path)
}

pub fn export_all(report: &ScanReport, output_dir: &Path) -> Result<Vec<(ExportFormat, PathBuf)>> {
    ExportFormat::ALL
        .iter()
        .map(|&format| Ok((format, export_report(report, output_dir, format)?)))
        .collect()
}

fn export_json(report: &ScanReport, output_path: &Path) -> Result<()> {
    let document = JsonDocument {
        timestamp: report.scanned_at,
        root: report.root.to_string_lossy().to_string(),
        total_photos: report.records.len(),
        photos: &report.records,
    };
    let json = serde_json::to_string_pretty(&document)?;
    let mut file = File::create(output_path)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

fn export_csv(records: &[PhotoRecord], output_path: &Path) -> Result<()> {
    let mut file = BufWriter::new(File::create(output_path)?);
    file.write_all(UTF8_BOM)?;

    let mut wtr = csv::Writer::from_writer(file);
    wtr.write_record(["directory", "filename", "width", "height", "scanned_at"])?;

    for record in records {
        wtr.write_record([
            record.directory.as_str(),
            record.filename.as_str(),
            &record.width.to_string(),
            &record.height.to_string(),
            &record.scanned_at.format(crate::db::TIMESTAMP_FORMAT).to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

fn export_sqlite(report: &ScanReport, output_path: &Path) -> Result<()> {
    let mut db = ScanDb::open(output_path)?;
    db.initialize()?;
    db.insert_report(report)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn report() -> ScanReport {
        let scanned_at = NaiveDate::from_ymd_opt(2025, 11, 7)
            .unwrap()
            .and_hms_opt(19, 20, 45)
            .unwrap();
        ScanReport {
            root: PathBuf::from("/photos"),
            scanned_at,
            records: vec![
                PhotoRecord {
                    directory: "2019/été".to_string(),
                    filename: "plage, soir.jpg".to_string(),
                    width: 4000,
                    height: 3000,
                    scanned_at,
                },
                PhotoRecord {
                    directory: String::new(),
                    filename: "root.png".to_string(),
                    width: 1,
                    height: 2,
                    scanned_at,
                },
            ],
            failed: Vec::new(),
        }
    }

    #[test]
    fn test_output_stem() {
        assert_eq!(output_stem(&report().scanned_at), "photos_scan_20251107_192045");
    }

    #[test]
    fn test_export_json() {
        let dir = tempdir().unwrap();
        let path = export_report(&report(), dir.path(), ExportFormat::Json).unwrap();
        assert!(path.ends_with("photos_scan_20251107_192045.json"));

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["total_photos"], 2);
        assert_eq!(value["timestamp"], "2025-11-07T19:20:45");
        assert_eq!(value["photos"][0]["directory"], "2019/été");
        assert_eq!(value["photos"][0]["width"], 4000);
    }

    #[test]
    fn test_export_csv_has_bom_and_quotes() {
        let dir = tempdir().unwrap();
        let path = export_report(&report(), dir.path(), ExportFormat::Csv).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));

        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("directory,filename,width,height,scanned_at"));
        assert_eq!(
            lines.next(),
            Some("2019/été,\"plage, soir.jpg\",4000,3000,2025-11-07T19:20:45")
        );
    }

    #[test]
    fn test_export_all_into_new_directory() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("nested/results");
        let written = export_all(&report(), &out).unwrap();

        assert_eq!(written.len(), 3);
        for (_, path) in &written {
            assert!(path.exists());
        }

        let db = ScanDb::open(&written[2].1).unwrap();
        assert_eq!(db.photo_count().unwrap(), 2);
    }
}
