use crate::error::{LayersError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Config {
    #[serde(default)]
    pub generate: GenerateConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub loadouts: LoadoutConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct GenerateConfig {
    #[serde(default = "default_model_directory")]
    pub model_directory: String,
    #[serde(default = "default_layers")]
    pub layers: u32,
    #[serde(default = "default_context")]
    pub context: u32,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_suffix")]
    pub suffix: String,
    pub llama_executable: Option<String>,
    #[serde(default = "default_additional_arguments")]
    pub additional_arguments: String,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct RegistryConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_trusted_curator")]
    pub trusted_curator: String,
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct LoadoutConfig {
    /// Directory holding loadout definitions. Built-in loadouts are used when unset or missing.
    pub directory: Option<PathBuf>,
}

// Default value functions
fn default_model_directory() -> String {
    "~/.cache/huggingface".to_string()
}
const fn default_layers() -> u32 {
    1
}
const fn default_context() -> u32 {
    2048
}
fn default_prefix() -> String {
    "run.".to_string()
}
fn default_suffix() -> String {
    ".sh".to_string()
}
fn default_additional_arguments() -> String {
    "--parallel 1 --mlock --no-mmap >/dev/null 2>/dev/null &".to_string()
}
fn default_endpoint() -> String {
    "https://huggingface.co".to_string()
}
fn default_trusted_curator() -> String {
    "TheBloke".to_string()
}
const fn default_search_limit() -> usize {
    1000
}
const fn default_max_candidates() -> usize {
    64
}
const fn default_timeout_secs() -> u64 {
    30
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            model_directory: default_model_directory(),
            layers: default_layers(),
            context: default_context(),
            prefix: default_prefix(),
            suffix: default_suffix(),
            llama_executable: None,
            additional_arguments: default_additional_arguments(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            trusted_curator: default_trusted_curator(),
            search_limit: default_search_limit(),
            max_candidates: default_max_candidates(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Config {
    /// Load config from the user config directory, or defaults if absent
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Load config from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            LayersError::Config(format!("Failed to parse {}: {e}", path.display()))
        })?;
        config.validate().map_err(|reason| {
            LayersError::Config(format!("Invalid {}: {reason}", path.display()))
        })?;
        Ok(config)
    }

    /// Check values serde can't rule out on its own
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.generate.context == 0 {
            return Err("generate.context must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Get config file path
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("llm-layers").join("config.toml"))
}

/// Directory where the default ledger and config live
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(xdg_config));
    }
    dirs::config_dir().ok_or_else(|| LayersError::Config("HOME env var not set".to_string()))
}

/// Default location of the ledger file
pub fn default_ledger_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("llm_layers"))
}

/// Default location of user supplied loadout definitions
pub fn default_loadouts_dir() -> Option<PathBuf> {
    let data_dir = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .ok()
        .or_else(dirs::data_dir)?;
    Some(data_dir.join("llm-layers").join("loadouts"))
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.generate.layers, 1);
        assert_eq!(config.generate.context, 2048);
        assert_eq!(config.generate.prefix, "run.");
        assert_eq!(config.generate.suffix, ".sh");
        assert_eq!(config.registry.trusted_curator, "TheBloke");
        assert!(config.loadouts.directory.is_none());
    }

    #[test]
    fn test_partial_config_merges_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[generate]\nlayers = 24\n\n[registry]\nmax_candidates = 8\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.generate.layers, 24);
        assert_eq!(config.generate.context, 2048);
        assert_eq!(config.registry.max_candidates, 8);
        assert_eq!(config.registry.endpoint, "https://huggingface.co");
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.generate.layers, 1);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[generate\nlayers = ").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(LayersError::Config(_))
        ));
    }

    #[test]
    fn test_zero_context_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[generate]\ncontext = 0\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, LayersError::Config(_)));
        assert!(err.to_string().contains("generate.context"));
    }

    #[test]
    #[serial]
    fn test_config_path_respects_xdg() {
        let original = std::env::var("XDG_CONFIG_HOME").ok();
        std::env::set_var("XDG_CONFIG_HOME", "/tmp/llm-layers-xdg");

        assert_eq!(
            config_path().unwrap(),
            PathBuf::from("/tmp/llm-layers-xdg/llm-layers/config.toml")
        );
        assert_eq!(
            default_ledger_path().unwrap(),
            PathBuf::from("/tmp/llm-layers-xdg/llm_layers")
        );

        match original {
            Some(val) => std::env::set_var("XDG_CONFIG_HOME", val),
            None => std::env::remove_var("XDG_CONFIG_HOME"),
        }
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/models"), home.join("models"));
        }
    }
}
