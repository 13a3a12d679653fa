use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::catalog::{AuditRow, Catalog};

/// One catalog entry taking part in a duplicate group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateFile {
    pub file_id: i64,
    pub base_name: String,
    pub extension: String,
    pub root_id: i64,
    pub root_path: String,
    pub folder_path: String,
    pub full_path: String,
}

impl DuplicateFile {
    fn from_row(row: &AuditRow) -> Self {
        Self {
            file_id: row.file_id,
            base_name: row.base_name.clone(),
            extension: row.extension.clone(),
            root_id: row.root_id,
            root_path: row.root_path.clone(),
            folder_path: row.path_from_root.clone(),
            full_path: format!(
                "{}{}{}.{}",
                row.root_path, row.path_from_root, row.base_name, row.extension
            ),
        }
    }

    pub fn filename(&self) -> String {
        format!("{}.{}", self.base_name, self.extension)
    }
}

#[derive(Debug, Default)]
pub struct Duplicates {
    /// Keyed by lowercase file name.
    pub by_filename: BTreeMap<String, Vec<DuplicateFile>>,
    /// Keyed by the exact full path.
    pub by_path: BTreeMap<String, Vec<DuplicateFile>>,
}

impl Duplicates {
    pub fn is_empty(&self) -> bool {
        self.by_filename.is_empty() && self.by_path.is_empty()
    }
}

/// Entries recorded more than once under different root folders.
///
/// By file name: same lowercase name in the same folder string (root path +
/// path from root). By path: same full path, compared byte for byte.
pub fn find_duplicates(catalog: &Catalog) -> Result<Duplicates> {
    let rows = catalog.audit_rows()?;

    let mut by_name_and_folder: BTreeMap<(String, String), Vec<DuplicateFile>> = BTreeMap::new();
    let mut by_path: BTreeMap<String, Vec<DuplicateFile>> = BTreeMap::new();

    for row in &rows {
        let file = DuplicateFile::from_row(row);
        let folder = format!("{}{}", row.root_path, row.path_from_root);
        by_name_and_folder
            .entry((row.lc_idx_filename.clone(), folder))
            .or_default()
            .push(file.clone());
        by_path.entry(file.full_path.clone()).or_default().push(file);
    }

    let mut duplicates = Duplicates::default();
    for ((name, _), files) in by_name_and_folder {
        if spans_roots(&files) {
            duplicates.by_filename.entry(name).or_default().extend(files);
        }
    }
    duplicates.by_path = by_path
        .into_iter()
        .filter(|(_, files)| spans_roots(files))
        .collect();

    Ok(duplicates)
}

fn spans_roots(files: &[DuplicateFile]) -> bool {
    files.len() > 1 && files.iter().map(|f| f.root_id).collect::<BTreeSet<_>>().len() > 1
}

pub fn write_duplicates_csv(groups: &BTreeMap<String, Vec<DuplicateFile>>, output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;

    wtr.write_record([
        "filename",
        "file_id",
        "base_name",
        "extension",
        "root_folder_id",
        "root_folder_path",
        "folder_path",
        "full_path",
        "group_size",
    ])?;

    for files in groups.values() {
        for file in files {
            wtr.write_record([
                file.filename(),
                file.file_id.to_string(),
                file.base_name.clone(),
                file.extension.clone(),
                file.root_id.to_string(),
                file.root_path.clone(),
                file.folder_path.clone(),
                file.full_path.clone(),
                files.len().to_string(),
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}
