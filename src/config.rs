//! Configuration for tucs paths and logging.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (TUCS_HOME, TUCS_WORKDIR, TUCS_LOG)
//! 2. Config file (.tucs/config.yaml)
//! 3. Defaults (~/.tucs)
//!
//! Config file discovery:
//! - Searches current directory and parents for .tucs/config.yaml
//! - Paths in config file are relative to the project root (the parent of .tucs/)

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Default log filter when nothing else is configured
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub log: Option<LogConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory
    pub home: Option<String>,
    /// Directory holding calibration artifacts
    pub workdir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// tracing filter directive, e.g. "info,tucs::core=debug"
    pub filter: Option<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    /// tucs home (state, default catalogs)
    pub home: PathBuf,
    /// Default artifact directory for calibration workers
    pub workdir: PathBuf,
    /// Log filter directive
    pub log_filter: String,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

/// Environment overrides, read once per load
#[derive(Debug, Clone, Default)]
struct EnvOverrides {
    home: Option<String>,
    workdir: Option<String>,
    log: Option<String>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        Self {
            home: std::env::var("TUCS_HOME").ok(),
            workdir: std::env::var("TUCS_WORKDIR").ok(),
            log: std::env::var("TUCS_LOG").ok(),
        }
    }
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".tucs").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

fn resolve(default_home: PathBuf, config_file: Option<PathBuf>, env: EnvOverrides) -> Result<ResolvedConfig> {
    let file = match &config_file {
        Some(path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    // Project root is the parent of .tucs/
    let base_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .and_then(Path::parent)
        .unwrap_or(Path::new("."));

    let home = match (env.home, &file.paths.home) {
        (Some(home), _) => PathBuf::from(home),
        (None, Some(home)) => resolve_path(base_dir, home),
        (None, None) => default_home,
    };

    let workdir = match (env.workdir, &file.paths.workdir) {
        (Some(dir), _) => PathBuf::from(dir),
        (None, Some(dir)) => resolve_path(base_dir, dir),
        (None, None) => home.join("work"),
    };

    let log_filter = env
        .log
        .or_else(|| file.log.and_then(|l| l.filter))
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    Ok(ResolvedConfig {
        home,
        workdir,
        log_filter,
        config_file,
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".tucs");

    let config_file = std::env::current_dir()
        .ok()
        .and_then(|cwd| find_config_file(&cwd));

    resolve(default_home, config_file, EnvOverrides::from_env())
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Get the tucs home directory
pub fn tucs_home() -> Result<PathBuf> {
    Ok(config()?.home.clone())
}

/// Get the default artifact directory
pub fn workdir() -> Result<PathBuf> {
    Ok(config()?.workdir.clone())
}

/// Log filter directive, falling back to the default if config fails to load
pub fn log_filter() -> String {
    config()
        .map(|c| c.log_filter.clone())
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(root: &Path, content: &str) -> PathBuf {
        let dir = root.join(".tucs");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{}", content).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_file() {
        let config = resolve(PathBuf::from("/home/u/.tucs"), None, EnvOverrides::default()).unwrap();

        assert_eq!(config.home, PathBuf::from("/home/u/.tucs"));
        assert_eq!(config.workdir, PathBuf::from("/home/u/.tucs/work"));
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
        assert!(config.config_file.is_none());
    }

    #[test]
    fn test_config_file_paths_are_relative_to_project() {
        let temp = TempDir::new().unwrap();
        let path = write_config(
            temp.path(),
            r#"
version: "1"
paths:
  workdir: data/laser
log:
  filter: debug
"#,
        );

        let config = resolve(PathBuf::from("/home/u/.tucs"), Some(path.clone()), EnvOverrides::default()).unwrap();
        assert_eq!(config.workdir, temp.path().join("data/laser"));
        assert_eq!(config.home, PathBuf::from("/home/u/.tucs"));
        assert_eq!(config.log_filter, "debug");
        assert_eq!(config.config_file, Some(path));
    }

    #[test]
    fn test_env_overrides_file() {
        let temp = TempDir::new().unwrap();
        let path = write_config(temp.path(), "paths:\n  workdir: data\n  home: state\n");
        let env = EnvOverrides {
            home: Some("/opt/tucs".to_string()),
            workdir: Some("/scratch".to_string()),
            log: Some("warn".to_string()),
        };

        let config = resolve(PathBuf::from("/home/u/.tucs"), Some(path), env).unwrap();
        assert_eq!(config.home, PathBuf::from("/opt/tucs"));
        assert_eq!(config.workdir, PathBuf::from("/scratch"));
        assert_eq!(config.log_filter, "warn");
    }

    #[test]
    fn test_find_config_walks_up() {
        let temp = TempDir::new().unwrap();
        let path = write_config(temp.path(), "version: \"1\"");
        let nested = temp.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_config_file(&nested), Some(path));
    }

    #[test]
    fn test_bad_config_file() {
        let temp = TempDir::new().unwrap();
        let path = write_config(temp.path(), "paths: [");
        assert!(resolve(PathBuf::from("/x"), Some(path), EnvOverrides::default()).is_err());
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/./subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
