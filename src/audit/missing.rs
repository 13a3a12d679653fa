use anyhow::Result;
use std::path::Path;

use crate::catalog::Catalog;
use crate::paths::{is_under, join_dir};

/// A catalog image whose recorded location is outside the photo base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingImage {
    pub directory: String,
    pub filename: String,
}

pub fn missing_images(catalog: &Catalog, photos_base: &str) -> Result<Vec<MissingImage>> {
    let missing = catalog
        .audit_rows()?
        .into_iter()
        .filter_map(|row| {
            let folder = join_dir(&row.root_path, &row.path_from_root);
            let filename = format!("{}.{}", row.base_name, row.extension);
            if is_under(&format!("{folder}{filename}"), photos_base) {
                return None;
            }
            Some(MissingImage {
                directory: folder.trim_end_matches('/').to_string(),
                filename,
            })
        })
        .collect();
    Ok(missing)
}

/// Semicolon separated, header `directory;filename`.
pub fn write_missing_csv(items: &[MissingImage], output_path: &Path) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_path(output_path)?;

    wtr.write_record(["directory", "filename"])?;
    for item in items {
        wtr.write_record([item.directory.as_str(), item.filename.as_str()])?;
    }

    wtr.flush()?;
    Ok(())
}
