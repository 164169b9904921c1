use std::path::{Path, PathBuf};

/// Type tag given to records that don't specify one
pub const DEFAULT_MODEL_TYPE: &str = "default";

/// Where a record came from. Ledger-derived records are authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Filesystem,
    Ledger,
}

/// One located or configured model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRecord {
    /// File basename, unique within a ledger
    pub name: String,
    /// Absolute path to the weights; `None` for ledger-only entries
    pub file: Option<PathBuf>,
    /// Auxiliary projector file for multimodal models
    pub mmproj: Option<PathBuf>,
    pub prompt_format: String,
    pub model_type: String,
    pub gpu_layers: u32,
    pub context: u32,
    pub origin: Origin,
}

impl ModelRecord {
    /// Record for a weights file found on disk
    #[must_use]
    pub fn from_file(file: PathBuf, gpu_layers: u32, context: u32) -> Self {
        let name = basename(&file);
        Self {
            name,
            file: Some(file),
            mmproj: None,
            prompt_format: String::new(),
            model_type: DEFAULT_MODEL_TYPE.to_string(),
            gpu_layers,
            context,
            origin: Origin::Filesystem,
        }
    }

    /// Record that only exists as a ledger row
    #[must_use]
    pub fn ledger_entry(name: impl Into<String>, gpu_layers: u32, context: u32) -> Self {
        Self {
            name: name.into(),
            file: None,
            mmproj: None,
            prompt_format: String::new(),
            model_type: DEFAULT_MODEL_TYPE.to_string(),
            gpu_layers,
            context,
            origin: Origin::Ledger,
        }
    }

    /// Whether the weights are present locally
    #[must_use]
    pub const fn is_local(&self) -> bool {
        self.file.is_some()
    }
}

/// File name component of a path, lossily converted
#[must_use]
pub fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
