//! Launch script generation
//!
//! Every model gets a bash script that starts the server with the layer count
//! and context length found in the ledger, falling back to the `LLM_LAYERS` and
//! `LLM_MAX_CONTEXT_LENGTH` environment variables and then to the defaults the
//! script was generated with. `LLM_SERVER` overrides the server executable.

use crate::error::{LayersError, Result};
use crate::models::ModelRecord;
use std::fs;
use std::path::{Path, PathBuf};

/// Settings shared by every generated script
#[derive(Debug, Clone)]
pub struct ScriptOptions {
    pub ledger_path: PathBuf,
    pub default_layers: u32,
    pub default_context: u32,
    pub server: String,
    pub additional_arguments: String,
    pub prefix: String,
    pub suffix: String,
}

/// What happened to a script file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStatus {
    Created(PathBuf),
    Overwritten(PathBuf),
    /// Target path is a directory
    Skipped(PathBuf),
}

/// Script file name for a model
#[must_use]
pub fn script_name(record: &ModelRecord, options: &ScriptOptions) -> String {
    format!("{}{}{}", options.prefix, record.name, options.suffix)
}

/// Quote a string for safe use as a single bash word
#[must_use]
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Render the launch script for a locally available model
pub fn render_script(record: &ModelRecord, options: &ScriptOptions) -> Result<String> {
    let model = record.file.as_ref().ok_or_else(|| {
        LayersError::NotFound(format!("{} has no local weights file", record.name))
    })?;
    let mmproj = record
        .mmproj
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let pattern = shell_quote(&format!("^{}\\t", regex::escape(&record.name)));

    Ok(format!(
        r#"#!/bin/bash
MODEL={model}
LAYERS_FILE={ledger}
MMPROJ_FILE={mmproj}
CONFIGLAYERS=$(grep -P {pattern} "$LAYERS_FILE" 2>/dev/null | head -n 1 | awk -F'\t' '{{print $2}}')
CONFIGCONTEXT=$(grep -P {pattern} "$LAYERS_FILE" 2>/dev/null | head -n 1 | awk -F'\t' '{{print $3}}')

if [ -n "$CONFIGLAYERS" ]
then
    echo "Found layers in layers file $LAYERS_FILE"
    LAYERS=$CONFIGLAYERS
elif [ -n "$LLM_LAYERS" ]
then
    echo "Found LLM_LAYERS environment variable."
    LAYERS=$LLM_LAYERS
else
    echo "Could not find LLM_LAYERS environment variable."
    LAYERS={layers}
fi
echo "Setting layers to $LAYERS"

if [ -n "$CONFIGCONTEXT" ]
then
    echo "Found context length in layers file $LAYERS_FILE"
    MAX_CONTEXT_LENGTH=$CONFIGCONTEXT
elif [ -n "$LLM_MAX_CONTEXT_LENGTH" ]
then
    echo "Found LLM_MAX_CONTEXT_LENGTH in environment"
    MAX_CONTEXT_LENGTH=$LLM_MAX_CONTEXT_LENGTH
else
    echo "Could not find LLM_MAX_CONTEXT_LENGTH in environment. Defaulting."
    MAX_CONTEXT_LENGTH={context}
fi
echo "Setting context to $MAX_CONTEXT_LENGTH"

MMPROJ_ARGS=()
if [ -n "$MMPROJ_FILE" ]
then
    MMPROJ_ARGS=(--mmproj "$MMPROJ_FILE")
    echo "Passing --mmproj $MMPROJ_FILE to server."
fi

if [ -n "$LLM_SERVER" ]
then
    echo "Found LLM_SERVER in environment."
    SERVER=$LLM_SERVER
else
    echo "Could not find LLM_SERVER in environment. Defaulting."
    SERVER={server}
fi
echo "Setting server to $SERVER"
echo "End of run script. Starting server."
PATH=./:$PATH
"$SERVER" -c "$MAX_CONTEXT_LENGTH" -m "$MODEL" -ngl "$LAYERS" "${{MMPROJ_ARGS[@]}}" "$@" {additional}
"#,
        model = shell_quote(&model.display().to_string()),
        ledger = shell_quote(&options.ledger_path.display().to_string()),
        mmproj = shell_quote(&mmproj),
        pattern = pattern,
        layers = options.default_layers,
        context = options.default_context,
        server = shell_quote(&options.server),
        additional = options.additional_arguments,
    ))
}

/// Write the launch script for `record` into `dir` and make it executable
pub fn write_script(dir: &Path, record: &ModelRecord, options: &ScriptOptions) -> Result<ScriptStatus> {
    let path = dir.join(script_name(record, options));
    if path.is_dir() {
        tracing::warn!("Skipping {}: Is a directory.", path.display());
        return Ok(ScriptStatus::Skipped(path));
    }

    let existed = path.exists();
    fs::write(&path, render_script(record, options)?)?;
    make_executable(&path)?;

    Ok(if existed {
        ScriptStatus::Overwritten(path)
    } else {
        ScriptStatus::Created(path)
    })
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o111);
    fs::set_permissions(path, permissions)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
