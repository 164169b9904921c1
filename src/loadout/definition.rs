use crate::error::{LayersError, Result};
use crate::ledger::parse_ledger;
use crate::loadout::size::megabyte_int_from_size_string;
use crate::models::ModelRecord;
use std::fs;
use std::path::Path;

/// Loadouts compiled into the binary, used when no loadout directory exists
const BUILTIN: &[(&str, &str)] = &[
    ("minimal.tsv", include_str!("../../data/loadouts/minimal.tsv")),
    ("8gb.tsv", include_str!("../../data/loadouts/8gb.tsv")),
    ("12gb.tsv", include_str!("../../data/loadouts/12gb.tsv")),
    ("24gb.tsv", include_str!("../../data/loadouts/24gb.tsv")),
];

/// A curated list of models with a declared VRAM requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loadout {
    pub id: String,
    pub vram_mb: u64,
    pub description: String,
    pub models: Vec<ModelRecord>,
}

/// Parse a loadout definition: `# id:`, `# vram:` and `# description:`
/// comment lines followed by ledger rows.
pub fn parse_loadout(source: &str, text: &str) -> Result<Loadout> {
    let mut id = None;
    let mut vram = None;
    let mut description = String::new();

    for line in text.lines() {
        let Some(comment) = line.strip_prefix('#') else {
            continue;
        };
        let Some((key, value)) = comment.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        match key.trim().to_lowercase().as_str() {
            "id" => id = Some(value),
            "vram" => vram = Some(value),
            "description" => description = value,
            _ => {}
        }
    }

    let parse_error = |reason: String| LayersError::Parse {
        path: source.to_string(),
        reason,
    };

    let id = id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| parse_error("missing '# id:' line".to_string()))?;
    let vram = vram.ok_or_else(|| parse_error("missing '# vram:' line".to_string()))?;
    let vram_mb = megabyte_int_from_size_string(&vram)
        .ok_or_else(|| parse_error(format!("unrecognized vram size '{vram}'")))?;
    let parsed = parse_ledger(text).map_err(|e| parse_error(e.to_string()))?;
    if !parsed.rejected.is_empty() {
        return Err(parse_error(parsed.rejected.join("; ")));
    }
    let models = parsed.records;

    Ok(Loadout {
        id,
        vram_mb,
        description,
        models,
    })
}

/// Read every loadout definition in `dir`, in file name order.
///
/// Files that fail to parse are logged and skipped.
pub fn load_loadouts(dir: &Path) -> Result<Vec<Loadout>> {
    let mut paths: Vec<_> = fs::read_dir(dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    let mut loadouts = Vec::new();
    for path in paths {
        let source = path.display().to_string();
        let parsed = fs::read_to_string(&path)
            .map_err(LayersError::from)
            .and_then(|text| parse_loadout(&source, &text));
        match parsed {
            Ok(loadout) => loadouts.push(loadout),
            Err(e) => tracing::warn!("Skipping loadout {source}: {e}"),
        }
    }
    Ok(loadouts)
}

/// The loadouts shipped with llm-layers
#[must_use]
pub fn builtin_loadouts() -> Vec<Loadout> {
    BUILTIN
        .iter()
        .filter_map(|(name, text)| match parse_loadout(name, text) {
            Ok(loadout) => Some(loadout),
            Err(e) => {
                tracing::warn!("Skipping built-in loadout: {e}");
                None
            }
        })
        .collect()
}

/// Loadouts from `dir` if it exists, otherwise the built-in set
#[must_use]
pub fn available_loadouts(dir: Option<&Path>) -> Vec<Loadout> {
    match dir {
        Some(dir) if dir.is_dir() => load_loadouts(dir).unwrap_or_else(|e| {
            tracing::warn!("Could not read loadouts from {}: {e}", dir.display());
            Vec::new()
        }),
        _ => builtin_loadouts(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_loadout() {
        let text = "# id: tiny\n# vram: 500MB\n# description: For small cards\n\
name\tgpu_layers\tcontext\tprompt_format\ttype\n\
a.gguf\t10\t2048\t\tdefault\n";
        let loadout = parse_loadout("tiny.tsv", text).unwrap();
        assert_eq!(loadout.id, "tiny");
        assert_eq!(loadout.vram_mb, 500);
        assert_eq!(loadout.description, "For small cards");
        assert_eq!(loadout.models.len(), 1);
        assert_eq!(loadout.models[0].gpu_layers, 10);
    }

    #[test]
    fn test_parse_loadout_errors() {
        assert!(parse_loadout("x", "# vram: 8GB\n").is_err());
        assert!(parse_loadout("x", "# id: x\n").is_err());
        assert!(parse_loadout("x", "# id: x\n# vram: 8XB\n").is_err());
        assert!(parse_loadout(
            "x",
            "# id: x\n# vram: 8GB\nname\tgpu_layers\tcontext\tprompt_format\ttype\na.gguf\t10\t0\t\tdefault\n",
        )
        .is_err());
    }

    #[test]
    fn test_builtin_loadouts_parse() {
        let loadouts = builtin_loadouts();
        assert_eq!(loadouts.len(), BUILTIN.len());
        assert!(loadouts.iter().any(|l| l.vram_mb == 0));
        assert!(loadouts.iter().all(|l| !l.models.is_empty()));
    }

    #[test]
    fn test_available_falls_back_to_builtin() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");
        assert_eq!(available_loadouts(Some(&missing)).len(), BUILTIN.len());
        assert_eq!(available_loadouts(None).len(), BUILTIN.len());
        assert!(available_loadouts(Some(dir.path())).is_empty());
    }

    #[test]
    fn test_load_skips_broken_files() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("a.tsv"),
            "# id: a\n# vram: 4GB\n# description: ok\nname\tgpu_layers\tcontext\tprompt_format\ttype\n",
        )
        .unwrap();
        fs::write(dir.path().join("b.tsv"), "# id: b\n# vram: lots\n").unwrap();

        let loadouts = load_loadouts(dir.path()).unwrap();
        assert_eq!(loadouts.len(), 1);
        assert_eq!(loadouts[0].id, "a");
        assert_eq!(loadouts[0].vram_mb, 4000);
    }
}
