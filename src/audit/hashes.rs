//! Content hashes of matched files at the location a relink would point
//! them to. A hash proves the file is really there; equal hashes expose the
//! same picture stored twice under different names or folders.

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use crate::catalog::Catalog;
use crate::paths::join_dir;
use crate::reconcile::{accept_proposal, group_by_root, Match};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHash {
    pub file_id: i64,
    pub root_id: i64,
    pub old_root: String,
    pub new_root: String,
    pub disk_path: PathBuf,
    /// Hex SHA-256 of the content; `None` when the file is missing or
    /// unreadable.
    pub sha256: Option<String>,
    pub match_count: usize,
}

impl FileHash {
    pub fn exists(&self) -> bool {
        self.sha256.is_some()
    }
}

pub fn hash_file(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();

    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Where a catalog file lives once its root points at `new_root`.
pub fn disk_path(new_root: &str, path_from_root: &str, filename: &str) -> PathBuf {
    PathBuf::from(format!("{}{}", join_dir(new_root, path_from_root), filename))
}

/// Hash the matches that back an accepted root proposal. Matches pointing
/// at a path other than the root's chosen one are left out.
pub fn hash_matches(catalog: &Catalog, matches: &[Match], min_matches: usize) -> Result<Vec<FileHash>> {
    let proposals = group_by_root(matches);
    let mut accepted = BTreeMap::new();
    for (root_id, proposal) in &proposals {
        let total = catalog.count_files_in_root(*root_id)?;
        if accept_proposal(total, proposal.match_count, min_matches) {
            accepted.insert(*root_id, proposal);
        }
    }

    let mut hashes = Vec::new();
    for m in matches {
        let Some(proposal) = accepted.get(&m.file.root_id) else {
            continue;
        };
        if m.new_root != proposal.new_root {
            continue;
        }

        let path = disk_path(&m.new_root, &m.file.path_from_root, &m.file.filename());
        let sha256 = match hash_file(&path) {
            Ok(hash) => Some(hash),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cannot hash file");
                None
            }
        };

        hashes.push(FileHash {
            file_id: m.file.id,
            root_id: m.file.root_id,
            old_root: m.file.root_path.clone(),
            new_root: m.new_root.clone(),
            disk_path: path,
            sha256,
            match_count: proposal.match_count,
        });
    }

    Ok(hashes)
}

/// Hashes shared by more than one file.
pub fn content_duplicates(hashes: &[FileHash]) -> BTreeMap<String, Vec<&FileHash>> {
    let mut groups: BTreeMap<String, Vec<&FileHash>> = BTreeMap::new();
    for hash in hashes {
        if let Some(sha) = &hash.sha256 {
            groups.entry(sha.clone()).or_default().push(hash);
        }
    }
    groups.retain(|_, files| files.len() > 1);
    groups
}

pub fn write_hashes_csv(hashes: &[FileHash], output_path: &Path) -> Result<()> {
    let duplicates = content_duplicates(hashes);
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_path(output_path)?;

    wtr.write_record([
        "file_id",
        "root_folder_id",
        "old_root",
        "new_root",
        "disk_path",
        "sha256",
        "exists",
        "match_count",
        "duplicate_count",
    ])?;

    for hash in hashes {
        let sha = hash.sha256.clone().unwrap_or_default();
        let duplicate_count = duplicates.get(&sha).map_or(0, Vec::len);
        wtr.write_record([
            hash.file_id.to_string(),
            hash.root_id.to_string(),
            hash.old_root.clone(),
            hash.new_root.clone(),
            hash.disk_path.display().to_string(),
            sha,
            hash.exists().to_string(),
            hash.match_count.to_string(),
            duplicate_count.to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixture;
    use crate::db::StoredPhoto;
    use crate::reconcile::{find_matches, ScanIndex};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_hash_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("abc.bin");
        fs::write(&path, b"abc").unwrap();

        assert_eq!(
            hash_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(hash_file(&dir.path().join("none.bin")).is_err());
    }

    #[test]
    fn test_disk_path() {
        assert_eq!(
            disk_path("/mnt/photos/2019/", "trip/", "a.jpg"),
            PathBuf::from("/mnt/photos/2019/trip/a.jpg")
        );
        assert_eq!(
            disk_path("/mnt/photos/2019/", "", "a.jpg"),
            PathBuf::from("/mnt/photos/2019/a.jpg")
        );
    }

    #[test]
    fn test_hash_matches() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("photos");
        let trip = base.join("2019").join("trip");
        fs::create_dir_all(&trip).unwrap();
        fs::write(trip.join("a.jpg"), b"same bytes").unwrap();
        fs::write(trip.join("b.jpg"), b"same bytes").unwrap();
        fs::write(trip.join("c.jpg"), b"other bytes").unwrap();
        // d.jpg was scanned but has since gone.

        let path = dir.path().join("cat.lrcat");
        fixture::build(
            &path,
            &[(1, "G:/old/2019/")],
            &[(10, 1, "trip/")],
            &[
                (100, 10, "a", "jpg"),
                (101, 10, "b", "jpg"),
                (102, 10, "c", "jpg"),
                (103, 10, "d", "jpg"),
            ],
        );
        let index = ScanIndex::new(
            ["a.jpg", "b.jpg", "c.jpg", "d.jpg"]
                .iter()
                .enumerate()
                .map(|(i, name)| StoredPhoto {
                    id: i as i64,
                    directory: "2019/trip".to_string(),
                    filename: name.to_string(),
                    width: 1,
                    height: 1,
                })
                .collect(),
        );
        let catalog = Catalog::open(&path).unwrap();
        let base_str = base.to_string_lossy().to_string();
        let matches = find_matches(&catalog.load_files().unwrap(), &index, &base_str);

        let hashes = hash_matches(&catalog, &matches, 5).unwrap();
        assert_eq!(hashes.len(), 4);
        assert!(hashes.iter().all(|h| h.match_count == 4));
        assert!(hashes[0].disk_path.ends_with("2019/trip/a.jpg"));
        assert_eq!(hashes[0].sha256, hashes[1].sha256);
        assert_ne!(hashes[0].sha256, hashes[2].sha256);
        assert!(!hashes[3].exists());

        let dups = content_duplicates(&hashes);
        assert_eq!(dups.len(), 1);
        assert_eq!(dups.values().next().unwrap().len(), 2);

        let csv_path = dir.path().join("hashes.csv");
        write_hashes_csv(&hashes, &csv_path).unwrap();
        let text = fs::read_to_string(&csv_path).unwrap();
        assert_eq!(text.lines().count(), 5);
        assert!(text.lines().nth(1).unwrap().ends_with(";true;4;2"));
        assert!(text.lines().nth(4).unwrap().ends_with(";;false;4;0"));
    }

    #[test]
    fn test_rejected_root_is_not_hashed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cat.lrcat");
        fixture::build(
            &path,
            &[(1, "G:/old/2019/")],
            &[(10, 1, "trip/")],
            &[(100, 10, "a", "jpg"), (101, 10, "b", "jpg")],
        );
        // Only one of two files found.
        let index = ScanIndex::new(vec![StoredPhoto {
            id: 1,
            directory: "2019/trip".to_string(),
            filename: "a.jpg".to_string(),
            width: 1,
            height: 1,
        }]);
        let catalog = Catalog::open(&path).unwrap();
        let matches = find_matches(&catalog.load_files().unwrap(), &index, "/mnt/photos");
        assert_eq!(matches.len(), 1);

        assert!(hash_matches(&catalog, &matches, 5).unwrap().is_empty());
    }
}
