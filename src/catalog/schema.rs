//! The slice of the Lightroom catalog schema this tool reads and writes.

/// Tables that must exist for a file to be treated as a catalog.
pub const REQUIRED_TABLES: [&str; 3] = ["AgLibraryRootFolder", "AgLibraryFolder", "AgLibraryFile"];

/// Columns touched here, with the types Lightroom uses. Real catalogs carry
/// many more columns and tables; this is enough to build test catalogs.
pub const MINIMAL_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS AgLibraryRootFolder (
    id_local INTEGER PRIMARY KEY,
    absolutePath TEXT NOT NULL DEFAULT '',
    name TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS AgLibraryFolder (
    id_local INTEGER PRIMARY KEY,
    pathFromRoot TEXT NOT NULL DEFAULT '',
    rootFolder INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS AgLibraryFile (
    id_local INTEGER PRIMARY KEY,
    baseName TEXT NOT NULL DEFAULT '',
    extension TEXT NOT NULL DEFAULT '',
    folder INTEGER NOT NULL DEFAULT 0,
    lc_idx_filename TEXT NOT NULL DEFAULT ''
);
"#;
