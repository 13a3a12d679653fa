pub const SCHEMA: &str = r#"
-- One row per scanned image
CREATE TABLE IF NOT EXISTS photos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    directory TEXT NOT NULL,     -- relative to the scan root, '/'-separated
    filename TEXT NOT NULL,
    width INTEGER NOT NULL,
    height INTEGER NOT NULL,
    scanned_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_photos_filename ON photos(filename);

-- Scan history
CREATE TABLE IF NOT EXISTS scans (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    root TEXT NOT NULL,
    scanned_at TEXT NOT NULL,
    photos_found INTEGER NOT NULL DEFAULT 0,
    photos_failed INTEGER NOT NULL DEFAULT 0
);
"#;

/// Timestamp layout stored in `scanned_at` columns.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
