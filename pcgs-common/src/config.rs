//! Configuration loading and root folder resolution
//!
//! Bootstrap settings come from a TOML file. A missing file is not an error:
//! the compiled defaults are used and a warning is logged. A file that exists
//! but fails to parse or validate is an error.
//!
//! Root folder priority:
//! 1. Command-line argument
//! 2. `PCGS_ROOT_FOLDER` environment variable
//! 3. `PCGS_ROOT` environment variable
//! 4. `root_folder` in the TOML file
//! 5. OS-dependent compiled default

use crate::lexicon::{Lexicon, LexiconBuilder};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Primary root folder environment variable
pub const ROOT_FOLDER_ENV: &str = "PCGS_ROOT_FOLDER";

/// Alternate root folder environment variable
pub const ROOT_ENV: &str = "PCGS_ROOT";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "pcgs.db";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub import: ImportConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub blooms: BloomsConfig,

    #[serde(default)]
    pub lexicon: LexiconConfig,

    /// Extra template profiles: profile name → (raw term → placeholder)
    #[serde(default)]
    pub profiles: BTreeMap<String, BTreeMap<String, String>>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Spreadsheet import settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportConfig {
    /// 1-based sheet row holding the column headers
    #[serde(default = "default_header_row")]
    pub header_row: usize,

    /// 1-based sheet row of the first data row
    #[serde(default = "default_data_start_row")]
    pub data_start_row: usize,

    /// Fail the whole import on an unrecognized header
    #[serde(default)]
    pub strict_headers: bool,

    /// Upper bound on data rows per import
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rows: Option<usize>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            header_row: default_header_row(),
            data_start_row: default_data_start_row(),
            strict_headers: false,
            max_rows: None,
        }
    }
}

/// Course service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long a mutation waits for the course write lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

/// Bloom's-verb pass settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BloomsConfig {
    /// Rewrite a recognized lowercase verb to title case
    #[serde(default = "default_true")]
    pub auto_capitalize: bool,
}

impl Default for BloomsConfig {
    fn default() -> Self {
        Self {
            auto_capitalize: true,
        }
    }
}

/// Lexicon extensions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LexiconConfig {
    /// alias → Lex ID token
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_header_row() -> usize {
    5
}

fn default_data_start_row() -> usize {
    6
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

impl TomlConfig {
    /// Reject settings that parse but cannot work
    pub fn validate(&self) -> Result<()> {
        if self.import.header_row == 0 {
            return Err(Error::Config("import.header_row is 1-based and must be >= 1".to_string()));
        }
        if self.import.data_start_row <= self.import.header_row {
            return Err(Error::Config(format!(
                "import.data_start_row ({}) must be after import.header_row ({})",
                self.import.data_start_row, self.import.header_row
            )));
        }
        if self.engine.lock_timeout_ms == 0 {
            return Err(Error::Config("engine.lock_timeout_ms must be > 0".to_string()));
        }
        if self.import.max_rows == Some(0) {
            return Err(Error::Config("import.max_rows must be > 0 when set".to_string()));
        }
        Ok(())
    }

    /// Build the lexicon: built-in terms plus `[lexicon.aliases]`
    pub fn build_lexicon(&self) -> Result<Lexicon> {
        LexiconBuilder::new()
            .with_alias_table(&self.lexicon.aliases)?
            .build()
    }
}

/// Compiled-in defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/pcgs
        dirs::data_local_dir()
            .map(|d| d.join("pcgs"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/pcgs"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/pcgs
        dirs::data_dir()
            .map(|d| d.join("pcgs"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/pcgs"))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\pcgs
        dirs::data_local_dir()
            .map(|d| d.join("pcgs"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\pcgs"))
    } else {
        PathBuf::from("./pcgs_data")
    }
}

/// Resolves the root folder following the priority order above
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    config_file: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            cli_arg: None,
            config_file: None,
        }
    }

    /// Root folder given on the command line (highest priority)
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// Use an explicit config file instead of the per-module default
    pub fn with_config_file(mut self, path: Option<PathBuf>) -> Self {
        self.config_file = path;
        self
    }

    /// Config file location: explicit path, else `<config dir>/pcgs/<module>.toml`
    pub fn config_file_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_file {
            return Some(path.clone());
        }
        let file_name = format!("{}.toml", self.module_name);
        let user_config = dirs::config_dir().map(|d| d.join("pcgs").join(&file_name));
        if cfg!(target_os = "linux") {
            let system_config = PathBuf::from("/etc/pcgs").join(&file_name);
            match user_config {
                Some(path) if path.exists() => Some(path),
                _ if system_config.exists() => Some(system_config),
                other => other,
            }
        } else {
            user_config
        }
    }

    /// Never fails; falls back to the compiled default
    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            debug!(path = %path.display(), "Root folder from command line");
            return path.clone();
        }

        for var in [ROOT_FOLDER_ENV, ROOT_ENV] {
            if let Ok(path) = std::env::var(var) {
                if !path.trim().is_empty() {
                    debug!(path = %path, env = var, "Root folder from environment");
                    return PathBuf::from(path);
                }
            }
        }

        if let Some(config_path) = self.config_file_path() {
            if config_path.exists() {
                match load_toml_config(&config_path) {
                    Ok(config) => {
                        if let Some(root) = config.root_folder {
                            debug!(path = %root.display(), "Root folder from config file");
                            return root;
                        }
                    }
                    Err(e) => {
                        warn!("Ignoring unreadable config file {}: {}", config_path.display(), e);
                    }
                }
            }
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder and names the files inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }

    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }

    /// Create the root folder (and parents); safe to call repeatedly
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!("Created root folder: {}", self.root_folder.display());
        }
        Ok(())
    }
}

/// Load and validate a TOML config file
///
/// A missing file yields the defaults with a warning.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!("Config file {} not found, using defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)?;
    config.validate()?;
    debug!(path = %path.display(), profiles = config.profiles.len(), "Loaded config file");
    Ok(config)
}

/// Write a config file, creating parent directories
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::LexId;

    #[test]
    fn test_defaults_when_sections_missing() {
        let config: TomlConfig = toml::from_str("root_folder = \"/srv/pcgs\"").unwrap();
        assert_eq!(config.root_folder, Some(PathBuf::from("/srv/pcgs")));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.import.header_row, 5);
        assert_eq!(config.import.data_start_row, 6);
        assert!(!config.import.strict_headers);
        assert_eq!(config.engine.lock_timeout_ms, 5000);
        assert!(config.blooms.auto_capitalize);
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn test_validate_rejects_data_row_before_header() {
        let mut config = TomlConfig::default();
        config.import.header_row = 3;
        config.import.data_start_row = 3;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.import.data_start_row = 4;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_lock_timeout() {
        let mut config = TomlConfig::default();
        config.engine.lock_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_build_lexicon_with_aliases() {
        let config: TomlConfig = toml::from_str(
            r#"
            [lexicon.aliases]
            "Unit" = "SC_LESSON"
            "#,
        )
        .unwrap();
        let lexicon = config.build_lexicon().unwrap();
        assert_eq!(lexicon.normalize("unit").unwrap(), LexId::ScLesson);
    }

    #[test]
    fn test_build_lexicon_rejects_conflicting_alias() {
        let config: TomlConfig = toml::from_str(
            r#"
            [lexicon.aliases]
            "Topic" = "SC_PC"
            "#,
        )
        .unwrap();
        assert!(matches!(config.build_lexicon(), Err(Error::Config(_))));
    }
}
