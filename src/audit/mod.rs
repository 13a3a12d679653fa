//! Read-only reports over a catalog.

pub mod diagnose;
pub mod duplicates;
pub mod hashes;
pub mod missing;

pub use diagnose::{diagnose_missing, summarize, write_diagnosis_csv, Diagnosis, DirectoryDiagnosis};
pub use duplicates::{find_duplicates, write_duplicates_csv, DuplicateFile, Duplicates};
pub use hashes::{content_duplicates, hash_file, hash_matches, write_hashes_csv, FileHash};
pub use missing::{missing_images, write_missing_csv, MissingImage};
