use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use defkit_core::package::parse_list;
use defkit_core::Version;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::Level;

pub const DEFAULT_FOLDER: &str = "defs";
pub const DEFAULT_HOST_VERSION: &str = "1.0.0";
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "defkit")]
#[command(about = "Load and inspect defkit content packages")]
#[command(long_about = "Loads definition packages from a mods directory, or the built-in sample
packages, and reports what was committed.

Options left unset fall back to the TOML file given with --config, then to
built-in defaults.")]
pub struct Config {
    /// Directory holding one folder per package
    #[arg(long, env = "DEFKIT_MODS_DIR")]
    pub mods_dir: Option<PathBuf>,

    /// Package ids to enable, comma separated (all available when empty)
    #[arg(long, env = "DEFKIT_ENABLE", value_delimiter = ',')]
    pub enable: Vec<String>,

    /// Mod list file with one package id per line
    #[arg(long, env = "DEFKIT_MOD_LIST")]
    pub mod_list: Option<PathBuf>,

    /// Folder inside each package holding definition documents [default: defs]
    #[arg(long, env = "DEFKIT_FOLDER")]
    pub folder: Option<String>,

    /// Host version packages are checked against [default: 1.0.0]
    #[arg(long, env = "DEFKIT_HOST_VERSION")]
    pub host_version: Option<String>,

    /// Log level (trace, debug, info, warn, error) [default: info]
    #[arg(long, env = "DEFKIT_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// TOML file supplying defaults for unset options
    #[arg(long, env = "DEFKIT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Use the built-in sample packages instead of a mods directory
    #[arg(long, env = "DEFKIT_DEMO")]
    pub demo: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Load packages and list committed definitions by kind
    Load,
    /// Print the compatibility report for active and available packages
    Check,
    /// Instantiate a definition and print the object as JSON
    Create { name: String },
    /// Spawn the sample scene
    Scene {
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Write the active packages to a mod list file
    ExportList { path: PathBuf },
}

/// Option defaults read from `--config`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    pub mods_dir: Option<PathBuf>,
    pub enable: Option<Vec<String>>,
    pub mod_list: Option<PathBuf>,
    pub folder: Option<String>,
    pub host_version: Option<String>,
    pub log_level: Option<String>,
    pub demo: Option<bool>,
}

impl FileConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid config file {}", path.display()))
    }
}

impl Config {
    /// Fill options the command line left unset from the `--config` file
    pub fn load_file(&mut self) -> Result<()> {
        if let Some(path) = self.config.clone() {
            let file = FileConfig::from_path(&path)?;
            self.merge(file);
        }
        Ok(())
    }

    pub fn merge(&mut self, file: FileConfig) {
        self.mods_dir = self.mods_dir.take().or(file.mods_dir);
        if self.enable.is_empty() {
            self.enable = file.enable.unwrap_or_default();
        }
        self.mod_list = self.mod_list.take().or(file.mod_list);
        self.folder = self.folder.take().or(file.folder);
        self.host_version = self.host_version.take().or(file.host_version);
        self.log_level = self.log_level.take().or(file.log_level);
        self.demo = self.demo || file.demo.unwrap_or(false);
    }

    pub fn validate(&self) -> Result<()> {
        if !self.demo {
            match &self.mods_dir {
                None => return Err(anyhow!("mods_dir is required unless --demo is set")),
                Some(dir) if !dir.is_dir() => {
                    return Err(anyhow!("mods_dir {} is not a directory", dir.display()))
                }
                Some(_) => {}
            }
        }

        if self.folder().is_empty() {
            return Err(anyhow!("folder cannot be empty"));
        }

        self.host_version()?;
        self.log_level()?;

        Ok(())
    }

    pub fn folder(&self) -> &str {
        self.folder.as_deref().unwrap_or(DEFAULT_FOLDER)
    }

    pub fn host_version(&self) -> Result<Version> {
        let text = self.host_version.as_deref().unwrap_or(DEFAULT_HOST_VERSION);
        text.parse()
            .with_context(|| format!("invalid host_version \"{text}\""))
    }

    pub fn log_level(&self) -> Result<Level> {
        let text = self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL);
        text.parse()
            .map_err(|_| anyhow!("invalid log_level \"{text}\", expected trace, debug, info, warn or error"))
    }

    /// Package ids to load: `--enable` entries followed by the mod list
    ///
    /// Empty means every package the store offers.
    pub fn package_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .enable
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        if let Some(path) = &self.mod_list {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read mod list {}", path.display()))?;
            for id in parse_list(&text) {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }

    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Load)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn demo() -> Config {
        Config {
            demo: true,
            ..Config::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = demo();
        assert!(config.validate().is_ok());
        assert_eq!(config.folder(), "defs");
        assert_eq!(config.host_version().unwrap(), Version::new(1, 0, 0));
        assert_eq!(config.log_level().unwrap(), Level::INFO);
        assert_eq!(config.command(), Command::Load);
    }

    #[test]
    fn test_mods_dir_required_without_demo() {
        let config = Config::default();
        assert!(config.validate().is_err());

        let dir = TempDir::new().unwrap();
        let config = Config {
            mods_dir: Some(dir.path().to_path_buf()),
            ..Config::default()
        };
        assert!(config.validate().is_ok());

        let config = Config {
            mods_dir: Some(dir.path().join("missing")),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let config = Config {
            host_version: Some("one.two".into()),
            ..demo()
        };
        assert!(config.validate().is_err());

        let config = Config {
            log_level: Some("loud".into()),
            ..demo()
        };
        assert!(config.validate().is_err());

        let config = Config {
            folder: Some(String::new()),
            ..demo()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_command_line_parsing() {
        let config = Config::parse_from([
            "defkit",
            "--demo",
            "--enable",
            "base,addon",
            "--host-version",
            "1.2",
            "scene",
            "--seed",
            "9",
        ]);
        assert_eq!(config.enable, vec!["base", "addon"]);
        assert_eq!(config.host_version().unwrap(), Version::new(1, 2, 0));
        assert_eq!(config.command(), Command::Scene { seed: 9 });

        let config = Config::parse_from(["defkit", "--demo", "create", "Hero"]);
        assert_eq!(config.command(), Command::Create { name: "Hero".into() });
    }

    #[test]
    fn test_file_fills_unset_options_only() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "folder = \"content\"\nlog-level = \"debug\"\nenable = [\"base\"]\ndemo = true"
        )
        .unwrap();

        let mut config = Config {
            config: Some(file.path().to_path_buf()),
            log_level: Some("warn".into()),
            ..Config::default()
        };
        config.load_file().unwrap();

        assert_eq!(config.folder(), "content");
        assert_eq!(config.log_level().unwrap(), Level::WARN);
        assert_eq!(config.enable, vec!["base"]);
        assert!(config.demo);
    }

    #[test]
    fn test_unknown_file_keys_fail() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "colour = \"blue\"").unwrap();
        assert!(FileConfig::from_path(file.path()).is_err());
    }

    #[test]
    fn test_mod_list_appends_to_enabled_ids() {
        let mut list = NamedTempFile::new().unwrap();
        writeln!(list, "base\n\naddon\nextra").unwrap();

        let config = Config {
            enable: vec!["addon".into(), " ".into()],
            mod_list: Some(list.path().to_path_buf()),
            ..demo()
        };
        assert_eq!(config.package_ids().unwrap(), vec!["addon", "base", "extra"]);
    }
}
