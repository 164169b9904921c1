use crate::error::{LayersError, Result};
use crate::inventory::prompt_format::guess_prompt_format;
use crate::models::ModelRecord;
use std::fs;
use std::path::{Path, PathBuf};

/// Extension of model weight files
pub const MODEL_EXTENSION: &str = "gguf";

/// Substring marking a multimodal projector file
pub const MMPROJ_MARKER: &str = "mmproj";

/// Values assigned to every scanned record
#[derive(Debug, Clone, Copy)]
pub struct ScanDefaults {
    pub gpu_layers: u32,
    pub context: u32,
}

/// Recursively collect model files under `root`.
///
/// A missing or non-directory root is a configuration error. Anything that
/// can't be read below the root is skipped with a warning.
pub fn scan_models(root: &Path, defaults: ScanDefaults) -> Result<Vec<ModelRecord>> {
    if !root.is_dir() {
        return Err(LayersError::Config(format!(
            "Not a directory: {}",
            root.display()
        )));
    }
    let root = fs::canonicalize(root)?;

    let mut models = Vec::new();
    scan_dir(&root, defaults, &mut models);
    tracing::debug!("Found {} model files under {}", models.len(), root.display());
    Ok(models)
}

fn scan_dir(dir: &Path, defaults: ScanDefaults, models: &mut Vec<ModelRecord>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Skipping {}: {e}", dir.display());
            return;
        }
    };

    let mut files = Vec::new();
    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        // Don't follow directory symlinks, they can loop
        match entry.file_type() {
            Ok(ft) if ft.is_dir() => subdirs.push(path),
            Ok(_) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => tracing::warn!("Skipping {}: {e}", path.display()),
        }
    }
    files.sort();
    subdirs.sort();

    let (projectors, weights): (Vec<PathBuf>, Vec<PathBuf>) = files
        .iter()
        .filter(|p| has_model_extension(p))
        .cloned()
        .partition(|p| is_projector(p));
    let mmproj = projectors.into_iter().next();

    let prompt_format = files
        .iter()
        .find(|p| file_name_lower(p) == "readme.md")
        .map_or_else(String::new, |readme| match fs::read_to_string(readme) {
            Ok(text) => guess_prompt_format(&text),
            Err(e) => {
                tracing::warn!("Could not read {}: {e}", readme.display());
                String::new()
            }
        });

    for file in weights {
        let mut record = ModelRecord::from_file(file, defaults.gpu_layers, defaults.context);
        record.mmproj.clone_from(&mmproj);
        record.prompt_format.clone_from(&prompt_format);
        models.push(record);
    }

    for subdir in subdirs {
        scan_dir(&subdir, defaults, models);
    }
}

fn file_name_lower(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn has_model_extension(path: &Path) -> bool {
    file_name_lower(path).ends_with(&format!(".{MODEL_EXTENSION}"))
}

fn is_projector(path: &Path) -> bool {
    file_name_lower(path).contains(MMPROJ_MARKER)
}
