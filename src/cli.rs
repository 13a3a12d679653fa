//! Command-line interface.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};

use crate::audit::{
    content_duplicates, diagnose_missing, find_duplicates, hash_matches, missing_images, summarize,
    write_diagnosis_csv, write_duplicates_csv, write_hashes_csv, write_missing_csv,
};
use crate::catalog::{self, Catalog};
use crate::config::{Config, CONFIG_ENV};
use crate::db::{latest_scan_db, ScanDb};
use crate::export::export_all;
use crate::reconcile::{find_matches, Mode, Outcome, ReconcileOptions, Reconciler, ScanIndex};
use crate::scanner::Scanner;

/// photo-relink - scan a photo library and fix stale Lightroom root folders
#[derive(Parser, Debug)]
#[command(name = "photo-relink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan a directory and save image dimensions as JSON, CSV and SQLite
    Scan {
        /// Directory to scan
        directory: PathBuf,

        /// Output directory (defaults to `output.directory`)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Match catalog files to the latest scan and fix root folder paths
    Relink {
        /// Lightroom catalog (.lrcat)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Scan database (defaults to the newest one in the output directory)
        #[arg(long)]
        scan_db: Option<PathBuf>,

        /// Base directory of the photos as the catalog should see it
        #[arg(long)]
        photos_base: Option<String>,

        /// Minimum matched files before a root folder is rewritten
        #[arg(long)]
        min_matches: Option<usize>,

        /// Write the changes (default is to simulate)
        #[arg(long)]
        apply: bool,
    },

    /// List catalog images located outside the photo base directory
    Missing {
        #[arg(long)]
        catalog: Option<PathBuf>,

        #[arg(long)]
        photos_base: Option<String>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List catalog entries duplicated across root folders
    Duplicates {
        #[arg(long)]
        catalog: Option<PathBuf>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Explain, per directory of missing images, why it was not relinked
    Diagnose {
        #[arg(long)]
        catalog: Option<PathBuf>,

        #[arg(long)]
        scan_db: Option<PathBuf>,

        #[arg(long)]
        photos_base: Option<String>,

        #[arg(long)]
        min_matches: Option<usize>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Hash matched files at their new location and report content duplicates
    Verify {
        #[arg(long)]
        catalog: Option<PathBuf>,

        #[arg(long)]
        scan_db: Option<PathBuf>,

        #[arg(long)]
        photos_base: Option<String>,

        #[arg(long)]
        min_matches: Option<usize>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Cli {
    pub fn load_config(&self) -> Result<Config> {
        match &self.config {
            Some(path) => Config::load_from(path),
            None => Config::load(),
        }
    }

    pub fn execute(self, config: Config) -> Result<()> {
        match self.command {
            Commands::Scan { directory, output } => {
                let output = output.unwrap_or_else(|| config.output.directory.clone());
                run_scan(&config, &directory, &output)
            }
            Commands::Relink {
                catalog,
                scan_db,
                photos_base,
                min_matches,
                apply,
            } => {
                let catalog = catalog_path(catalog, &config)?;
                let scan_db = scan_db_path(scan_db, &config)?;
                let options = ReconcileOptions {
                    mode: if apply {
                        Mode::Apply
                    } else {
                        Mode::from_simulate(config.catalog.simulate)
                    },
                    min_matches: min_matches.unwrap_or(config.catalog.min_matches),
                    photos_base: photos_base_of(photos_base, &config)?,
                };
                run_relink(&catalog, &scan_db, options, config.catalog.backup)
            }
            Commands::Missing {
                catalog,
                photos_base,
                output,
            } => {
                let catalog = catalog_path(catalog, &config)?;
                let base = photos_base_of(photos_base, &config)?;
                let output = output.unwrap_or_else(|| config.output.directory.clone());
                run_missing(&catalog, &base, &output)
            }
            Commands::Duplicates { catalog, output } => {
                let catalog = catalog_path(catalog, &config)?;
                let output = output.unwrap_or_else(|| config.output.directory.clone());
                run_duplicates(&catalog, &output)
            }
            Commands::Diagnose {
                catalog,
                scan_db,
                photos_base,
                min_matches,
                output,
            } => {
                let inputs = AuditInputs {
                    catalog: catalog_path(catalog, &config)?,
                    scan_db: scan_db_path(scan_db, &config)?,
                    photos_base: photos_base_of(photos_base, &config)?,
                    min_matches: min_matches.unwrap_or(config.catalog.min_matches),
                };
                let output = output.unwrap_or_else(|| config.output.directory.clone());
                run_diagnose(&inputs, &output)
            }
            Commands::Verify {
                catalog,
                scan_db,
                photos_base,
                min_matches,
                output,
            } => {
                let inputs = AuditInputs {
                    catalog: catalog_path(catalog, &config)?,
                    scan_db: scan_db_path(scan_db, &config)?,
                    photos_base: photos_base_of(photos_base, &config)?,
                    min_matches: min_matches.unwrap_or(config.catalog.min_matches),
                };
                let output = output.unwrap_or_else(|| config.output.directory.clone());
                run_verify(&inputs, &output)
            }
        }
    }
}

/// Everything the scan-aware audits need.
struct AuditInputs {
    catalog: PathBuf,
    scan_db: PathBuf,
    photos_base: String,
    min_matches: usize,
}

fn scan_db_path(arg: Option<PathBuf>, config: &Config) -> Result<PathBuf> {
    match arg {
        Some(path) => Ok(path),
        None => latest_scan_db(&config.output.directory),
    }
}

fn load_index(scan_db: &Path) -> Result<ScanIndex> {
    println!("Loading scan {}", scan_db.display());
    let photos = ScanDb::open_existing(scan_db)?
        .load_photos()
        .with_context(|| format!("Failed to read scan database {}", scan_db.display()))?;
    let index = ScanIndex::new(photos);
    println!("  {} distinct file names", index.len());
    Ok(index)
}

fn catalog_path(arg: Option<PathBuf>, config: &Config) -> Result<PathBuf> {
    match arg.or_else(|| config.catalog.path.clone()) {
        Some(path) => Ok(path),
        None => bail!("No catalog given: pass --catalog, set CATALOG_PATH or catalog.path"),
    }
}

fn photos_base_of(arg: Option<String>, config: &Config) -> Result<String> {
    let base = arg.unwrap_or_else(|| config.catalog.photos_base.clone());
    if base.trim().is_empty() {
        bail!("No photo base directory: pass --photos-base, set PHOTOS_DIRECTORY or catalog.photos_base");
    }
    Ok(base)
}

fn timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

fn run_scan(config: &Config, directory: &Path, output: &Path) -> Result<()> {
    println!("Scanning {}", directory.display());
    let report = Scanner::new(config.scanner.clone()).scan(directory)?;
    println!("  {} image files found", report.total_found());
    println!("  {} processed", report.records.len());

    if !report.failed.is_empty() {
        println!("\n{} files could not be read:", report.failed.len());
        for path in report.failed.iter().take(10) {
            println!("  - {}", path.display());
        }
        if report.failed.len() > 10 {
            println!("  ... and {} more", report.failed.len() - 10);
        }
    }

    if report.records.is_empty() {
        println!("\nNothing to save.");
        return Ok(());
    }

    println!("\nResults saved to:");
    for (format, path) in export_all(&report, output)? {
        println!("  - {}: {}", format.name(), path.display());
    }

    println!("\nFirst records:");
    for (i, record) in report.records.iter().take(5).enumerate() {
        println!(
            "{}. {}/{} {}x{}",
            i + 1,
            record.directory,
            record.filename,
            record.width,
            record.height
        );
    }
    Ok(())
}

fn run_relink(catalog_path: &Path, scan_db: &Path, options: ReconcileOptions, backup: bool) -> Result<()> {
    let index = load_index(scan_db)?;

    let catalog = Catalog::open(catalog_path)?;
    let files = catalog.load_files()?;
    println!("Loaded {} catalog files", files.len());

    let matches = find_matches(&files, &index, &options.photos_base);
    println!("  {} matches", matches.len());

    if options.mode == Mode::Apply && backup {
        let copy = catalog::backup(catalog.path())?;
        println!("Catalog backed up to {}", copy.display());
    }

    let mode = options.mode;
    let min_matches = options.min_matches;
    println!("\nUpdating root folders ({mode})...");
    let report = Reconciler::new(&catalog, options).run(&matches, &index)?;

    for change in &report.changes {
        let label = match change.outcome {
            Outcome::Updated => "update".to_string(),
            Outcome::Merged(n) => format!("merge {n} files"),
            Outcome::Skipped => continue,
            Outcome::Conflict => "conflict".to_string(),
            Outcome::Rejected => "rejected".to_string(),
        };
        println!(
            "  [{label}] #{} {} -> {} ({}/{} files)",
            change.root_id, change.old_path, change.new_path, change.match_count, change.total_files
        );
    }

    let stats = &report.stats;
    println!("\n  {} root folders updated", stats.updated);
    println!("  {} already up to date", stats.skipped);
    if stats.conflicts > 0 {
        println!("  {} conflicts (path already used by another root folder)", stats.conflicts);
    }
    if stats.rejected > 0 {
        println!("  {} rejected (fewer than {min_matches} matching files)", stats.rejected);
    }
    if stats.no_matches > 0 {
        println!("  {} root folders without matches", stats.no_matches);
    }
    if stats.merged_files > 0 {
        println!("  {} files merged into other root folders", stats.merged_files);
    }

    match mode {
        Mode::Simulate => {
            println!("\nSimulation only: nothing was written. Re-run with --apply to commit.")
        }
        Mode::Apply => println!("\nChanges applied."),
    }
    Ok(())
}

fn run_missing(catalog_path: &Path, photos_base: &str, output: &Path) -> Result<()> {
    let catalog = Catalog::open(catalog_path)?;
    let missing = missing_images(&catalog, photos_base)?;
    println!("{} images outside {}", missing.len(), photos_base);

    if missing.is_empty() {
        return Ok(());
    }

    std::fs::create_dir_all(output)?;
    let path = output.join(format!("missing_images_{}.csv", timestamp()));
    write_missing_csv(&missing, &path)?;
    println!("Saved to {}", path.display());
    Ok(())
}

fn run_duplicates(catalog_path: &Path, output: &Path) -> Result<()> {
    let catalog = Catalog::open(catalog_path)?;
    let duplicates = find_duplicates(&catalog)?;

    let count = |groups: &std::collections::BTreeMap<_, Vec<_>>| -> usize {
        groups.values().map(Vec::len).sum()
    };
    println!(
        "By file name: {} names, {} files",
        duplicates.by_filename.len(),
        count(&duplicates.by_filename)
    );
    println!(
        "By full path: {} paths, {} files",
        duplicates.by_path.len(),
        count(&duplicates.by_path)
    );

    if duplicates.is_empty() {
        return Ok(());
    }

    std::fs::create_dir_all(output)?;
    let stamp = timestamp();
    if !duplicates.by_filename.is_empty() {
        let path = output.join(format!("duplicates_by_name_{stamp}.csv"));
        write_duplicates_csv(&duplicates.by_filename, &path)?;
        println!("Saved to {}", path.display());
    }
    if !duplicates.by_path.is_empty() {
        let path = output.join(format!("duplicates_by_path_{stamp}.csv"));
        write_duplicates_csv(&duplicates.by_path, &path)?;
        println!("Saved to {}", path.display());
    }
    Ok(())
}

fn run_diagnose(inputs: &AuditInputs, output: &Path) -> Result<()> {
    let index = load_index(&inputs.scan_db)?;
    let catalog = Catalog::open(&inputs.catalog)?;
    let missing = missing_images(&catalog, &inputs.photos_base)?;
    println!("{} images outside {}", missing.len(), inputs.photos_base);

    let diagnoses = diagnose_missing(
        &catalog,
        &index,
        &missing,
        &inputs.photos_base,
        inputs.min_matches,
    )?;
    if diagnoses.is_empty() {
        return Ok(());
    }

    println!("\n{} directories:", diagnoses.len());
    let mut counts: Vec<_> = summarize(&diagnoses).into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    for (status, count) in counts {
        let percent = count as f64 * 100.0 / diagnoses.len() as f64;
        println!("  {:<45} {count:>5} ({percent:5.1}%)", status.to_string());
    }

    println!("\nLargest directories:");
    let mut largest: Vec<_> = diagnoses.iter().collect();
    largest.sort_by(|a, b| b.missing_files.cmp(&a.missing_files));
    for (i, d) in largest.iter().take(10).enumerate() {
        println!(
            "  {:2}. {} ({} files, {})",
            i + 1,
            d.directory,
            d.missing_files,
            d.status.label()
        );
    }

    std::fs::create_dir_all(output)?;
    let path = output.join(format!("diagnosis_{}.csv", timestamp()));
    write_diagnosis_csv(&diagnoses, &path)?;
    println!("\nSaved to {}", path.display());
    Ok(())
}

fn run_verify(inputs: &AuditInputs, output: &Path) -> Result<()> {
    let index = load_index(&inputs.scan_db)?;
    let catalog = Catalog::open(&inputs.catalog)?;
    let files = catalog.load_files()?;
    let matches = find_matches(&files, &index, &inputs.photos_base);
    println!("{} matches", matches.len());

    let hashes = hash_matches(&catalog, &matches, inputs.min_matches)?;
    let absent = hashes.iter().filter(|h| !h.exists()).count();
    println!("  {} files hashed", hashes.len() - absent);
    if absent > 0 {
        println!("  {absent} not found at their new location");
    }

    let duplicates = content_duplicates(&hashes);
    if !duplicates.is_empty() {
        let files: usize = duplicates.values().map(Vec::len).sum();
        println!("\n{} contents stored more than once ({files} files):", duplicates.len());
        for (sha, group) in duplicates.iter().take(5) {
            println!("  {}...", &sha[..16]);
            for hash in group.iter().take(3) {
                println!("    - #{} {}", hash.file_id, hash.disk_path.display());
            }
            if group.len() > 3 {
                println!("    ... and {} more", group.len() - 3);
            }
        }
    }

    if hashes.is_empty() {
        return Ok(());
    }

    std::fs::create_dir_all(output)?;
    let path = output.join(format!("file_hashes_{}.csv", timestamp()));
    write_hashes_csv(&hashes, &path)?;
    println!("\nSaved to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_relink() {
        let cli = Cli::try_parse_from([
            "photo-relink",
            "relink",
            "--catalog",
            "cat.lrcat",
            "--min-matches",
            "3",
            "--apply",
        ])
        .unwrap();

        match cli.command {
            Commands::Relink {
                catalog,
                min_matches,
                apply,
                scan_db,
                ..
            } => {
                assert_eq!(catalog, Some(PathBuf::from("cat.lrcat")));
                assert_eq!(min_matches, Some(3));
                assert!(apply);
                assert!(scan_db.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_diagnose_and_verify() {
        let cli = Cli::try_parse_from([
            "photo-relink",
            "diagnose",
            "--scan-db",
            "scan.db",
            "-o",
            "reports",
        ])
        .unwrap();
        match cli.command {
            Commands::Diagnose { scan_db, output, .. } => {
                assert_eq!(scan_db, Some(PathBuf::from("scan.db")));
                assert_eq!(output, Some(PathBuf::from("reports")));
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::try_parse_from(["photo-relink", "verify", "--min-matches", "2"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Verify {
                min_matches: Some(2),
                ..
            }
        ));
    }

    #[test]
    fn test_parse_scan_requires_directory() {
        assert!(Cli::try_parse_from(["photo-relink", "scan"]).is_err());
    }

    #[test]
    fn test_missing_catalog_and_base_are_errors() {
        let config = Config::default();
        assert!(catalog_path(None, &config).is_err());
        assert!(photos_base_of(None, &config).is_err());
        assert_eq!(
            photos_base_of(Some("/mnt/photos".to_string()), &config).unwrap(),
            "/mnt/photos"
        );
    }
}
