//! Rewriting stale root folders of a catalog to where the scan found the
//! files.
//!
//! A root is only touched when enough of its files were found under one new
//! location (see [`accept_proposal`]). Roots nobody matched by folder get a
//! second chance on file names alone. Both modes perform every write inside
//! one transaction; [`Mode::Simulate`] rolls it back at the end, so each root
//! is judged against the same catalog state in either mode.

pub mod matching;

use anyhow::Result;
use std::collections::BTreeSet;
use std::fmt;

use crate::catalog::Catalog;
use crate::paths::normalize_path;

pub use matching::{
    build_new_root, compare_paths, filename_only_matches, filenames_match, find_matches,
    group_by_root, Match, RootProposal, ScanIndex, MIN_CONFIDENCE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Report what would change; never write.
    Simulate,
    Apply,
}

impl Mode {
    pub fn from_simulate(simulate: bool) -> Self {
        if simulate {
            Mode::Simulate
        } else {
            Mode::Apply
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Simulate => write!(f, "simulate"),
            Mode::Apply => write!(f, "apply"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub mode: Mode,
    pub min_matches: usize,
    pub photos_base: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// `absolutePath` rewritten (or would be, when simulating).
    Updated,
    /// Files moved under another root that already had the new path.
    Merged(usize),
    /// Already pointing at the new path.
    Skipped,
    /// New path owned by another root and nothing could be merged.
    Conflict,
    /// Not enough matches to trust the proposal.
    Rejected,
}

#[derive(Debug, Clone)]
pub struct RootChange {
    pub root_id: i64,
    pub old_path: String,
    pub new_path: String,
    pub match_count: usize,
    pub total_files: usize,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub updated: usize,
    pub skipped: usize,
    pub conflicts: usize,
    pub rejected: usize,
    /// Roots outside the photo base that no pass could resolve.
    pub no_matches: usize,
    pub merged_files: usize,
}

impl ReconcileStats {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Updated => self.updated += 1,
            Outcome::Merged(n) => {
                self.updated += 1;
                self.merged_files += n;
            }
            Outcome::Skipped => self.skipped += 1,
            Outcome::Conflict => self.conflicts += 1,
            Outcome::Rejected => self.rejected += 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub mode: Mode,
    pub changes: Vec<RootChange>,
    pub stats: ReconcileStats,
}

/// Small roots must match completely; larger ones need `min_matches`.
pub fn accept_proposal(total_files: usize, match_count: usize, min_matches: usize) -> bool {
    if total_files < min_matches {
        match_count == total_files
    } else {
        match_count >= min_matches
    }
}

pub struct Reconciler<'a> {
    catalog: &'a Catalog,
    options: ReconcileOptions,
}

impl<'a> Reconciler<'a> {
    pub fn new(catalog: &'a Catalog, options: ReconcileOptions) -> Self {
        Self { catalog, options }
    }

    pub fn run(&self, matches: &[Match], index: &ScanIndex) -> Result<ReconcileReport> {
        let proposals = group_by_root(matches);
        let matched_roots: BTreeSet<i64> = proposals.keys().copied().collect();

        let fallback_roots: Vec<i64> = self
            .catalog
            .roots_outside_base(&self.options.photos_base)?
            .into_iter()
            .filter(|id| !matched_roots.contains(id))
            .collect();

        let tx = self.catalog.begin()?;
        let mut changes = Vec::new();
        let mut stats = ReconcileStats::default();

        for root_id in fallback_roots {
            match self.fallback_proposal(root_id, index)? {
                Some(proposal) => {
                    let change = self.resolve(&proposal)?;
                    // A fallback proposal that fails the threshold counts as
                    // unresolved rather than rejected.
                    if change.outcome == Outcome::Rejected {
                        stats.no_matches += 1;
                    } else {
                        stats.record(change.outcome);
                    }
                    changes.push(change);
                }
                None => {
                    tracing::debug!(root_id, "No file-name matches for root");
                    stats.no_matches += 1;
                }
            }
        }

        for proposal in proposals.values() {
            let change = self.resolve(proposal)?;
            stats.record(change.outcome);
            changes.push(change);
        }

        match self.options.mode {
            Mode::Apply => tx.commit()?,
            Mode::Simulate => tx.rollback()?,
        }

        tracing::info!(
            mode = %self.options.mode,
            updated = stats.updated,
            skipped = stats.skipped,
            conflicts = stats.conflicts,
            rejected = stats.rejected,
            no_matches = stats.no_matches,
            merged_files = stats.merged_files,
            "Reconcile finished"
        );

        Ok(ReconcileReport {
            mode: self.options.mode,
            changes,
            stats,
        })
    }

    fn fallback_proposal(&self, root_id: i64, index: &ScanIndex) -> Result<Option<RootProposal>> {
        let files = self.catalog.files_in_root(root_id)?;
        let matches = filename_only_matches(&files, index, &self.options.photos_base);
        Ok(group_by_root(&matches).remove(&root_id))
    }

    /// Check one proposal against the threshold and apply it.
    fn resolve(&self, proposal: &RootProposal) -> Result<RootChange> {
        let total_files = self.catalog.count_files_in_root(proposal.root_id)?;
        let old_path = self
            .catalog
            .root_path(proposal.root_id)?
            .unwrap_or_default();

        // A root already in place is never a candidate for rejection.
        let outcome = if normalize_path(&old_path) == normalize_path(&proposal.new_root) {
            Outcome::Skipped
        } else if accept_proposal(total_files, proposal.match_count, self.options.min_matches) {
            self.apply_root(proposal.root_id, &proposal.new_root)?
        } else {
            Outcome::Rejected
        };

        tracing::info!(
            root_id = proposal.root_id,
            old = %old_path,
            new = %proposal.new_root,
            matches = proposal.match_count,
            total = total_files,
            outcome = ?outcome,
            "Root folder"
        );

        Ok(RootChange {
            root_id: proposal.root_id,
            old_path,
            new_path: proposal.new_root.clone(),
            match_count: proposal.match_count,
            total_files,
            outcome,
        })
    }

    fn apply_root(&self, root_id: i64, new_path: &str) -> Result<Outcome> {
        if let Some(target) = self.catalog.other_root_with_path(new_path, root_id)? {
            let merged = self.merge_roots(root_id, target)?;
            return Ok(if merged > 0 {
                Outcome::Merged(merged)
            } else {
                Outcome::Conflict
            });
        }

        self.catalog.set_root_path(root_id, new_path)?;
        Ok(Outcome::Updated)
    }

    /// Move files of `source` into the folders of `target` with the same
    /// `pathFromRoot`, unless the target folder already has that file.
    fn merge_roots(&self, source: i64, target: i64) -> Result<usize> {
        let mut merged = 0;

        for file in self.catalog.merge_candidates(source)? {
            let Some(folder) = self.catalog.folder_in_root(target, &file.path_from_root)? else {
                continue;
            };
            if self
                .catalog
                .file_in_folder(folder, &file.lc_idx_filename)?
                .is_some()
            {
                continue;
            }
            self.catalog.reassign_file(file.file_id, folder)?;
            merged += 1;
        }

        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixture;
    use crate::db::StoredPhoto;
    use std::path::{Path, PathBuf};
    use tempfile::tempdir;

    const BASE: &str = r"\\hal9001\Volume_1\photos";

    fn photo(id: i64, directory: &str, filename: &str) -> StoredPhoto {
        StoredPhoto {
            id,
            directory: directory.to_string(),
            filename: filename.to_string(),
            width: 10,
            height: 10,
        }
    }

    fn options(mode: Mode, min_matches: usize) -> ReconcileOptions {
        ReconcileOptions {
            mode,
            min_matches,
            photos_base: BASE.to_string(),
        }
    }

    fn run(path: &Path, index: &ScanIndex, opts: ReconcileOptions) -> ReconcileReport {
        let catalog = Catalog::open(path).unwrap();
        let files = catalog.load_files().unwrap();
        let matches = find_matches(&files, index, &opts.photos_base);
        Reconciler::new(&catalog, opts).run(&matches, index).unwrap()
    }

    fn root_path(path: &Path, id: i64) -> String {
        Catalog::open(path).unwrap().root_path(id).unwrap().unwrap()
    }

    /// Root 1 holds `n` files in folder1; the scan found all of them in
    /// test/folder1.
    fn moved_root(dir: &Path, n: i64) -> (PathBuf, ScanIndex) {
        let path = dir.join("cat.lrcat");
        let files: Vec<(i64, i64, String, &str)> =
            (0..n).map(|i| (100 + i, 10, format!("photo{i}"), "jpg")).collect();
        let file_refs: Vec<(i64, i64, &str, &str)> =
            files.iter().map(|(a, b, c, d)| (*a, *b, c.as_str(), *d)).collect();
        fixture::build(&path, &[(1, "G:/old/path/folder1/")], &[(10, 1, "")], &file_refs);

        let index = ScanIndex::new(
            (0..n)
                .map(|i| photo(i, "test/folder1", &format!("photo{i}.jpg")))
                .collect(),
        );
        (path, index)
    }

    fn names(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{prefix}{i}")).collect()
    }

    /// `(file_id, folder_id, baseName, "jpg")` rows, ids counting from `first_id`.
    fn jpg_rows(first_id: i64, folder: i64, names: &[String]) -> Vec<(i64, i64, &str, &str)> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| (first_id + i as i64, folder, n.as_str(), "jpg"))
            .collect()
    }

    #[test]
    fn test_accept_proposal() {
        assert!(accept_proposal(3, 3, 5));
        assert!(!accept_proposal(3, 2, 5));
        assert!(accept_proposal(10, 5, 5));
        assert!(!accept_proposal(10, 4, 5));
        assert!(accept_proposal(0, 0, 5));
    }

    #[test]
    fn test_simulate_reports_without_writing() {
        let dir = tempdir().unwrap();
        let (path, index) = moved_root(dir.path(), 2);

        let report = run(&path, &index, options(Mode::Simulate, 5));
        assert_eq!(report.stats.updated, 1);
        assert_eq!(report.stats.conflicts, 0);
        assert_eq!(report.changes[0].new_path, "//hal9001/Volume_1/photos/test/folder1/");
        assert_eq!(root_path(&path, 1), "G:/old/path/folder1/");
    }

    #[test]
    fn test_apply_writes() {
        let dir = tempdir().unwrap();
        let (path, index) = moved_root(dir.path(), 2);

        let report = run(&path, &index, options(Mode::Apply, 5));
        assert_eq!(report.stats.updated, 1);
        assert!(root_path(&path, 1).contains("hal9001"));

        // Second pass finds nothing left to do.
        let again = run(&path, &index, options(Mode::Apply, 5));
        assert_eq!(again.stats.skipped, 1);
        assert_eq!(again.stats.updated, 0);
    }

    #[test]
    fn test_min_matches_rejection() {
        let dir = tempdir().unwrap();
        let (path, _) = moved_root(dir.path(), 6);
        // Only four of six files were found.
        let index = ScanIndex::new(
            (0..4)
                .map(|i| photo(i, "test/folder1", &format!("photo{i}.jpg")))
                .collect(),
        );

        let report = run(&path, &index, options(Mode::Apply, 5));
        assert_eq!(report.stats.rejected, 1);
        assert_eq!(report.stats.updated, 0);
        assert_eq!(root_path(&path, 1), "G:/old/path/folder1/");

        let report = run(&path, &index, options(Mode::Apply, 4));
        assert_eq!(report.stats.rejected, 0);
        assert_eq!(report.stats.updated, 1);
    }

    #[test]
    fn test_conflict_when_nothing_to_merge() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cat.lrcat");
        fixture::build(
            &path,
            &[
                (1, "G:/old/path/folder1/"),
                (2, "//hal9001/Volume_1/photos/test/folder1/"),
            ],
            &[(10, 1, ""), (20, 2, "")],
            &[(100, 10, "photo1", "jpg"), (200, 20, "photo1", "jpg")],
        );
        let index = ScanIndex::new(vec![photo(1, "test/folder1", "photo1.jpg")]);

        let report = run(&path, &index, options(Mode::Apply, 5));
        assert_eq!(report.stats.conflicts, 1);
        assert_eq!(report.stats.updated, 0);
        assert_eq!(root_path(&path, 1), "G:/old/path/folder1/");
    }

    #[test]
    fn test_merge_into_existing_root() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cat.lrcat");
        fixture::build(
            &path,
            &[
                (1, "G:/old/path/folder1/"),
                (2, "//hal9001/Volume_1/photos/test/folder1/"),
            ],
            &[(10, 1, ""), (20, 2, "")],
            &[
                (100, 10, "photo1", "jpg"),
                (101, 10, "photo2", "jpg"),
                (200, 20, "photo1", "jpg"),
            ],
        );
        let index = ScanIndex::new(vec![
            photo(1, "test/folder1", "photo1.jpg"),
            photo(2, "test/folder1", "photo2.jpg"),
        ]);

        let simulated = run(&path, &index, options(Mode::Simulate, 5));
        assert_eq!(simulated.stats.merged_files, 1);
        assert_eq!(Catalog::open(&path).unwrap().count_files_in_root(2).unwrap(), 1);

        let report = run(&path, &index, options(Mode::Apply, 5));
        assert_eq!(report.stats.updated, 1);
        assert_eq!(report.stats.merged_files, 1);
        // Root 2 already points at the target.
        assert_eq!(report.stats.skipped, 1);
        assert_eq!(report.stats.rejected, 0);

        let catalog = Catalog::open(&path).unwrap();
        assert_eq!(catalog.count_files_in_root(2).unwrap(), 2);
        assert_eq!(catalog.count_files_in_root(1).unwrap(), 1);
    }

    #[test]
    fn test_fallback_by_filename() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cat.lrcat");
        // Folder names changed completely, so folder scoring finds nothing.
        fixture::build(
            &path,
            &[(1, "C:/Users/me/Old Import/")],
            &[(10, 1, "")],
            &[(100, 10, "a", "jpg"), (101, 10, "b", "jpg")],
        );
        let index = ScanIndex::new(vec![
            photo(1, "2018/sorted", "a.jpg"),
            photo(2, "2018/sorted", "b.jpg"),
        ]);

        let report = run(&path, &index, options(Mode::Apply, 5));
        assert_eq!(report.stats.updated, 1);
        assert_eq!(report.stats.no_matches, 0);
        assert_eq!(root_path(&path, 1), "//hal9001/Volume_1/photos/2018/sorted/");
    }

    #[test]
    fn test_unresolved_roots_are_counted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cat.lrcat");
        fixture::build(
            &path,
            &[(1, "C:/gone/"), (2, "//hal9001/Volume_1/photos/ok/")],
            &[(10, 1, ""), (20, 2, "")],
            &[(100, 10, "lost", "jpg"), (200, 20, "fine", "jpg")],
        );

        let report = run(&path, &ScanIndex::default(), options(Mode::Apply, 5));
        assert_eq!(report.stats, ReconcileStats {
            no_matches: 1,
            ..Default::default()
        });
    }

    #[test]
    fn test_simulate_matches_apply_when_roots_collide() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cat.lrcat");
        // Both roots resolve to test/folder1: the first is rewritten, the
        // second then collides with it.
        let files = names("p", 5);
        let mut rows = jpg_rows(100, 10, &files);
        rows.extend(jpg_rows(200, 20, &files));
        fixture::build(
            &path,
            &[(1, "G:/a/folder1/"), (2, "H:/b/folder1/")],
            &[(10, 1, ""), (20, 2, "")],
            &rows,
        );
        let index = ScanIndex::new(
            files
                .iter()
                .enumerate()
                .map(|(i, n)| photo(i as i64, "test/folder1", &format!("{n}.jpg")))
                .collect(),
        );

        let simulated = run(&path, &index, options(Mode::Simulate, 5));
        assert_eq!(root_path(&path, 1), "G:/a/folder1/");
        assert_eq!(root_path(&path, 2), "H:/b/folder1/");

        let applied = run(&path, &index, options(Mode::Apply, 5));
        assert_eq!(simulated.stats, applied.stats);
        assert_eq!(applied.stats.updated, 1);
        assert_eq!(applied.stats.conflicts, 1);
        assert_eq!(
            simulated.changes.iter().map(|c| c.outcome).collect::<Vec<_>>(),
            applied.changes.iter().map(|c| c.outcome).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_fallback_counts_only_the_chosen_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cat.lrcat");
        let files = names("f", 6);
        fixture::build(&path, &[(1, "C:/lost/")], &[(10, 1, "")], &jpg_rows(100, 10, &files));
        // Two files each in three unrelated folders.
        let dirs = ["x/one", "x/one", "y/two", "y/two", "z/three", "z/three"];
        let index = ScanIndex::new(
            files
                .iter()
                .zip(dirs)
                .enumerate()
                .map(|(i, (n, d))| photo(i as i64, d, &format!("{n}.jpg")))
                .collect(),
        );

        let report = run(&path, &index, options(Mode::Apply, 5));
        assert_eq!(report.changes.len(), 1);
        assert_eq!(report.changes[0].match_count, 2);
        assert_eq!(report.stats.updated, 0);
        assert_eq!(report.stats.no_matches, 1);
        assert_eq!(root_path(&path, 1), "C:/lost/");
    }

    #[test]
    fn test_fallback_below_threshold_is_unresolved() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cat.lrcat");
        let files = names("img", 6);
        fixture::build(&path, &[(1, "C:/gone/")], &[(10, 1, "")], &jpg_rows(100, 10, &files));
        // Three of six found, all in one folder.
        let index = ScanIndex::new(
            files[..3]
                .iter()
                .enumerate()
                .map(|(i, n)| photo(i as i64, "2018/sorted", &format!("{n}.jpg")))
                .collect(),
        );

        let report = run(&path, &index, options(Mode::Apply, 5));
        assert_eq!(report.stats, ReconcileStats {
            no_matches: 1,
            ..Default::default()
        });
        assert_eq!(report.changes[0].outcome, Outcome::Rejected);
        assert_eq!(root_path(&path, 1), "C:/gone/");
    }
}
