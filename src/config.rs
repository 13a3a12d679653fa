use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable pointing at an alternate config file.
pub const CONFIG_ENV: &str = "PHOTO_RELINK_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scanner: ScannerConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            image_extensions: default_image_extensions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Where scan results (JSON, CSV, SQLite) and audit reports are written.
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Path to the `.lrcat` file.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Current base directory of the photo library, as the catalog should
    /// record it (may be a UNC path such as `\\nas\photos`).
    #[serde(default)]
    pub photos_base: String,

    /// Minimum number of matched files before a root folder is rewritten.
    #[serde(default = "default_min_matches")]
    pub min_matches: usize,

    /// Report intended changes without writing them.
    #[serde(default = "default_simulate")]
    pub simulate: bool,

    /// Copy the catalog aside before writing to it.
    #[serde(default = "default_backup")]
    pub backup: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: None,
            photos_base: String::new(),
            min_matches: default_min_matches(),
            simulate: default_simulate(),
            backup: default_backup(),
        }
    }
}

fn default_image_extensions() -> Vec<String> {
    [
        "jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp", "raw", "cr2", "nef", "orf",
        "sr2", "arw", "dng",
    ]
    .iter()
    .map(|e| e.to_string())
    .collect()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("scan_results")
}

fn default_min_matches() -> usize {
    5
}

fn default_simulate() -> bool {
    true
}

fn default_backup() -> bool {
    true
}

impl Config {
    /// Load from `PHOTO_RELINK_CONFIG` or the default location, writing the
    /// defaults out on first run.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(Self::config_path);

        let mut config = if config_path.exists() {
            Self::read(&config_path)?
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            config
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from an explicit path. The file must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::read(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// `PHOTOS_DIRECTORY`, `CATALOG_PATH` and `DRY_RUN_MODE` take precedence
    /// over the file.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(base) = lookup("PHOTOS_DIRECTORY") {
            self.catalog.photos_base = base;
        }
        if let Some(path) = lookup("CATALOG_PATH") {
            self.catalog.path = Some(PathBuf::from(path));
        }
        if let Some(flag) = lookup("DRY_RUN_MODE") {
            self.catalog.simulate = is_truthy(&flag);
        }
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("photo-relink")
    }

    fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}
