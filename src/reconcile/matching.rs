//! Joining catalog files to scanned files by name, and scoring how well
//! their folders line up.

use std::collections::{BTreeMap, HashMap};

use crate::catalog::CatalogFile;
use crate::db::StoredPhoto;
use crate::paths::{join_dir, path_components};

/// Lowest folder score accepted for a name match.
pub const MIN_CONFIDENCE: f64 = 0.6;

/// Score given to matches made on file name alone.
pub const FILENAME_ONLY_CONFIDENCE: f64 = 0.5;

/// Scanned photos grouped by case-folded file name.
#[derive(Debug, Default)]
pub struct ScanIndex {
    by_name: HashMap<String, Vec<StoredPhoto>>,
}

impl ScanIndex {
    pub fn new(photos: Vec<StoredPhoto>) -> Self {
        let mut by_name: HashMap<String, Vec<StoredPhoto>> = HashMap::new();
        for photo in photos {
            by_name
                .entry(photo.filename.to_lowercase())
                .or_default()
                .push(photo);
        }
        Self { by_name }
    }

    pub fn candidates(&self, filename: &str) -> &[StoredPhoto] {
        self.by_name
            .get(&filename.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of distinct file names.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Match {
    pub file: CatalogFile,
    pub photo: StoredPhoto,
    /// Proposed `absolutePath` for the file's root folder.
    pub new_root: String,
    pub confidence: f64,
}

/// Aggregated proposal for one root folder.
#[derive(Debug, Clone, PartialEq)]
pub struct RootProposal {
    pub root_id: i64,
    pub new_root: String,
    pub match_count: usize,
}

/// Score how likely `new_directory` is the same folder as `old_path`, on
/// their last two components, ignoring case.
pub fn compare_paths(old_path: &str, new_directory: &str) -> f64 {
    let old: Vec<String> = path_components(old_path)
        .iter()
        .map(|c| c.to_lowercase())
        .collect();
    let new: Vec<String> = path_components(new_directory)
        .iter()
        .map(|c| c.to_lowercase())
        .collect();

    let (Some(old_last), Some(new_last)) = (old.last(), new.last()) else {
        return 0.0;
    };
    let old_second = old.len().checked_sub(2).map(|i| &old[i]);
    let new_second = new.len().checked_sub(2).map(|i| &new[i]);

    if old_last == new_last {
        if let (Some(a), Some(b)) = (old_second, new_second) {
            if a == b {
                return 1.0;
            }
        }
        return 0.8;
    }

    if let (Some(a), Some(b)) = (old_second, new_second) {
        if a == new_last || old_last == b {
            return 0.6;
        }
    }

    0.0
}

/// `base.ext` equals `scanned`, ignoring case.
pub fn filenames_match(base_name: &str, extension: &str, scanned: &str) -> bool {
    format!("{base_name}.{extension}").to_lowercase() == scanned.to_lowercase()
}

/// Root path implied by a scanned directory. When the directory ends with
/// the file's `pathFromRoot`, that tail belongs to the folder, not the root,
/// and is dropped.
pub fn build_new_root(base: &str, directory: &str, path_from_root: &str) -> String {
    let dir = path_components(directory);
    let tail = path_components(path_from_root);

    let keep = if !tail.is_empty()
        && tail.len() <= dir.len()
        && dir[dir.len() - tail.len()..]
            .iter()
            .zip(&tail)
            .all(|(a, b)| a.to_lowercase() == b.to_lowercase())
    {
        dir.len() - tail.len()
    } else {
        dir.len()
    };

    join_dir(base, &dir[..keep].join("/"))
}

/// Best-scoring scanned candidate per catalog file, when it clears
/// [`MIN_CONFIDENCE`].
pub fn find_matches(files: &[CatalogFile], index: &ScanIndex, base: &str) -> Vec<Match> {
    files
        .iter()
        .filter_map(|file| best_match(file, index.candidates(&file.filename()), base))
        .collect()
}

fn best_match(file: &CatalogFile, candidates: &[StoredPhoto], base: &str) -> Option<Match> {
    let old_folder = file.folder_path();
    let mut best: Option<Match> = None;

    for photo in candidates {
        if !filenames_match(&file.base_name, &file.extension, &photo.filename) {
            continue;
        }
        let score = compare_paths(&old_folder, &photo.directory);
        if score > best.as_ref().map_or(0.0, |m| m.confidence) {
            best = Some(Match {
                file: file.clone(),
                photo: photo.clone(),
                new_root: build_new_root(base, &photo.directory, &file.path_from_root),
                confidence: score,
            });
        }
    }

    best.filter(|m| m.confidence >= MIN_CONFIDENCE)
}

/// First scanned file with the same name, folder ignored.
pub fn filename_only_matches(files: &[CatalogFile], index: &ScanIndex, base: &str) -> Vec<Match> {
    files
        .iter()
        .filter_map(|file| {
            let photo = index
                .candidates(&file.filename())
                .iter()
                .find(|p| filenames_match(&file.base_name, &file.extension, &p.filename))?;
            Some(Match {
                file: file.clone(),
                photo: photo.clone(),
                new_root: build_new_root(base, &photo.directory, &file.path_from_root),
                confidence: FILENAME_ONLY_CONFIDENCE,
            })
        })
        .collect()
}

/// One proposal per root: the most frequent new path (first seen wins
/// ties). `match_count` is the number of matches behind that path only;
/// matches pointing elsewhere do not vouch for it.
pub fn group_by_root(matches: &[Match]) -> BTreeMap<i64, RootProposal> {
    // root -> (path -> (count, first index))
    let mut tallies: BTreeMap<i64, HashMap<&str, (usize, usize)>> = BTreeMap::new();

    for (i, m) in matches.iter().enumerate() {
        let entry = tallies
            .entry(m.file.root_id)
            .or_default()
            .entry(m.new_root.as_str())
            .or_insert((0, i));
        entry.0 += 1;
    }

    tallies
        .into_iter()
        .filter_map(|(root_id, paths)| {
            let (path, (count, _)) = paths
                .into_iter()
                .max_by(|(_, (ca, ia)), (_, (cb, ib))| ca.cmp(cb).then(ib.cmp(ia)))?;
            Some((
                root_id,
                RootProposal {
                    root_id,
                    new_root: path.to_string(),
                    match_count: count,
                },
            ))
        })
        .collect()
}
