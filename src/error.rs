use thiserror::Error;

/// Main error type for llm-layers
#[derive(Error, Debug)]
pub enum LayersError {
    #[error("Config error: {0}\n\nTroubleshooting:\n- Check config file: ~/.config/llm-layers/config.toml\n- Check that --model-directory and the output directory exist\n- Run with RUST_LOG=debug for more details")]
    Config(String),

    #[error("Parse error in {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Download error: {0}\n\nTroubleshooting:\n- Ensure sufficient disk space in ~/.cache/huggingface/\n- Check internet connection\n- Some repositories require accepting a license on huggingface.co first")]
    Download(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Failures reported by a remote model registry.
///
/// `Restricted` and `Network` are soft failures: the resolver skips the
/// affected candidate and carries on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("access to {0} is restricted")]
    Restricted(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("{0} not found on registry")]
    NotFound(String),

    #[error("invalid registry response: {0}")]
    Invalid(String),
}

impl RegistryError {
    /// Whether this failure should be skipped rather than reported.
    #[must_use]
    pub const fn is_soft(&self) -> bool {
        matches!(self, Self::Restricted(_) | Self::Network(_))
    }
}

impl LayersError {
    /// Process exit code for an error that ends the run.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => exit_code::CONFIG,
            _ => exit_code::PARTIAL,
        }
    }
}

pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const CONFIG: i32 = 1;
    pub const PARTIAL: i32 = 2;
}

pub type Result<T> = std::result::Result<T, LayersError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soft_failures() {
        assert!(RegistryError::Restricted("a/b".into()).is_soft());
        assert!(RegistryError::Network("timeout".into()).is_soft());
        assert!(!RegistryError::NotFound("a/b".into()).is_soft());
        assert!(!RegistryError::Invalid("bad json".into()).is_soft());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(LayersError::Config("x".into()).exit_code(), exit_code::CONFIG);
        assert_eq!(
            LayersError::Download("x".into()).exit_code(),
            exit_code::PARTIAL
        );
    }
}
