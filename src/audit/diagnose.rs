//! Why a directory of missing images was not relinked.

use anyhow::Result;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use super::MissingImage;
use crate::catalog::{Catalog, CatalogFile};
use crate::paths::normalize_path;
use crate::reconcile::{
    accept_proposal, compare_paths, filenames_match, find_matches, group_by_root, ScanIndex,
    MIN_CONFIDENCE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Diagnosis {
    /// No catalog file sits in the directory.
    NoCatalogFiles,
    /// None of the directory's files appear in the scan.
    NotInScan,
    /// The proposed root already belongs to another root folder.
    Conflict,
    /// Names were found, but never in a folder that lines up.
    LowScore,
    /// Some files line up, too few to pass the acceptance rule.
    InsufficientMatches,
    /// Enough evidence; a relink run should fix it.
    ShouldUpdate,
}

impl Diagnosis {
    pub fn label(&self) -> &'static str {
        match self {
            Diagnosis::NoCatalogFiles => "no_catalog_files",
            Diagnosis::NotInScan => "not_in_scan",
            Diagnosis::Conflict => "conflict",
            Diagnosis::LowScore => "low_score",
            Diagnosis::InsufficientMatches => "insufficient_matches",
            Diagnosis::ShouldUpdate => "should_update",
        }
    }
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Diagnosis::NoCatalogFiles => "no catalog files in this directory",
            Diagnosis::NotInScan => "files absent from the scan",
            Diagnosis::Conflict => "new path already used by another root folder",
            Diagnosis::LowScore => "folder score too low",
            Diagnosis::InsufficientMatches => "not enough matching files",
            Diagnosis::ShouldUpdate => "should be updated",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryDiagnosis {
    pub directory: String,
    /// Entries of the missing-images list in this directory.
    pub missing_files: usize,
    pub catalog_files: usize,
    pub in_scan: usize,
    pub not_in_scan: usize,
    /// Files whose best scanned candidate scores at least [`MIN_CONFIDENCE`].
    pub matched: usize,
    pub low_score: usize,
    pub root_id: Option<i64>,
    pub new_path: Option<String>,
    pub conflict_with: Option<i64>,
    pub status: Diagnosis,
}

/// Diagnose every directory of `missing`, in directory order.
pub fn diagnose_missing(
    catalog: &Catalog,
    index: &ScanIndex,
    missing: &[MissingImage],
    photos_base: &str,
    min_matches: usize,
) -> Result<Vec<DirectoryDiagnosis>> {
    let mut by_directory: BTreeMap<&str, usize> = BTreeMap::new();
    for item in missing {
        *by_directory.entry(item.directory.as_str()).or_default() += 1;
    }

    let files = catalog.load_files()?;
    by_directory
        .into_iter()
        .map(|(directory, count)| {
            let wanted = normalize_path(directory);
            let in_dir: Vec<CatalogFile> = files
                .iter()
                .filter(|f| normalize_path(&f.folder_path()) == wanted)
                .cloned()
                .collect();
            diagnose_directory(catalog, index, directory, count, &in_dir, photos_base, min_matches)
        })
        .collect()
}

fn diagnose_directory(
    catalog: &Catalog,
    index: &ScanIndex,
    directory: &str,
    missing_files: usize,
    files: &[CatalogFile],
    photos_base: &str,
    min_matches: usize,
) -> Result<DirectoryDiagnosis> {
    let mut diagnosis = DirectoryDiagnosis {
        directory: directory.to_string(),
        missing_files,
        catalog_files: files.len(),
        in_scan: 0,
        not_in_scan: 0,
        matched: 0,
        low_score: 0,
        root_id: None,
        new_path: None,
        conflict_with: None,
        status: Diagnosis::NoCatalogFiles,
    };
    if files.is_empty() {
        return Ok(diagnosis);
    }

    for file in files {
        let old_folder = file.folder_path();
        let scores: Vec<f64> = index
            .candidates(&file.filename())
            .iter()
            .filter(|p| filenames_match(&file.base_name, &file.extension, &p.filename))
            .map(|p| compare_paths(&old_folder, &p.directory))
            .collect();

        if scores.is_empty() {
            diagnosis.not_in_scan += 1;
            continue;
        }
        diagnosis.in_scan += 1;
        if scores.iter().any(|&s| s >= MIN_CONFIDENCE) {
            diagnosis.matched += 1;
        } else {
            diagnosis.low_score += 1;
        }
    }

    let matches = find_matches(files, index, photos_base);
    let mut accepted = false;
    if let Some(proposal) = group_by_root(&matches)
        .into_values()
        .max_by_key(|p| p.match_count)
    {
        let total = catalog.count_files_in_root(proposal.root_id)?;
        accepted = accept_proposal(total, proposal.match_count, min_matches);
        diagnosis.conflict_with = catalog.other_root_with_path(&proposal.new_root, proposal.root_id)?;
        diagnosis.root_id = Some(proposal.root_id);
        diagnosis.new_path = Some(proposal.new_root);
    }

    diagnosis.status = if diagnosis.in_scan == 0 {
        Diagnosis::NotInScan
    } else if diagnosis.conflict_with.is_some() {
        Diagnosis::Conflict
    } else if accepted {
        Diagnosis::ShouldUpdate
    } else if diagnosis.matched == 0 {
        Diagnosis::LowScore
    } else {
        Diagnosis::InsufficientMatches
    };

    tracing::debug!(
        directory,
        status = diagnosis.status.label(),
        matched = diagnosis.matched,
        "Diagnosed directory"
    );
    Ok(diagnosis)
}

/// Count of directories per status.
pub fn summarize(diagnoses: &[DirectoryDiagnosis]) -> BTreeMap<Diagnosis, usize> {
    let mut counts = BTreeMap::new();
    for d in diagnoses {
        *counts.entry(d.status).or_default() += 1;
    }
    counts
}

pub fn write_diagnosis_csv(diagnoses: &[DirectoryDiagnosis], output_path: &Path) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_path(output_path)?;

    wtr.write_record([
        "directory",
        "missing_files",
        "catalog_files",
        "status",
        "matched",
        "in_scan",
        "not_in_scan",
        "low_score",
        "root_folder_id",
        "new_path",
        "conflict_with",
        "reason",
    ])?;

    let opt = |v: Option<i64>| v.map(|id| id.to_string()).unwrap_or_default();
    for d in diagnoses {
        wtr.write_record([
            d.directory.clone(),
            d.missing_files.to_string(),
            d.catalog_files.to_string(),
            d.status.label().to_string(),
            d.matched.to_string(),
            d.in_scan.to_string(),
            d.not_in_scan.to_string(),
            d.low_score.to_string(),
            opt(d.root_id),
            d.new_path.clone().unwrap_or_default(),
            opt(d.conflict_with),
            d.status.to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
