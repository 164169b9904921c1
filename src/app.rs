//! Ties the components together for each CLI command.
//!
//! Normal output goes to the `out` writer passed in by the caller, diagnostics
//! go through `tracing`. Nothing here holds global state.

use crate::error::{exit_code, LayersError, Result};
use crate::hardware;
use crate::inventory::{scan_models, ScanDefaults};
use crate::ledger::{dedup_sources, load_ledger, merge_ledger, read_ledger, write_ledger, LedgerSink};
use crate::loadout::{select_loadout, Loadout};
use crate::models::ModelRecord;
use crate::registry::{download_missing, DownloadReport, Registry, Resolver};
use crate::script::{script_name, write_script, ScriptOptions, ScriptStatus};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything a generate/preview run needs, after CLI and config are merged
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub model_directory: PathBuf,
    pub output_directory: PathBuf,
    pub includes: Vec<PathBuf>,
    pub autoselect: bool,
    /// Overrides VRAM detection when set
    pub vram_mb: Option<u64>,
    /// Write scripts and the ledger instead of previewing
    pub generate: bool,
    pub download: bool,
    pub trusted_curator: String,
    pub max_candidates: usize,
    pub command_line: String,
    pub script: ScriptOptions,
}

/// What a run did, used to pick the exit code
#[derive(Debug, Default)]
pub struct RunSummary {
    pub models_found: usize,
    pub loadout: Option<String>,
    pub scripts_written: usize,
    pub script_failures: usize,
    pub ledger_error: Option<LayersError>,
    pub downloads: Option<DownloadReport>,
}

impl RunSummary {
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        let downloads_failed = self
            .downloads
            .as_ref()
            .is_some_and(|report| !report.is_complete());
        if self.script_failures > 0 || self.ledger_error.is_some() || downloads_failed {
            exit_code::PARTIAL
        } else {
            exit_code::SUCCESS
        }
    }
}

/// Scan, merge the ledger, optionally download, and emit scripts.
///
/// Bad directories fail the whole run. Failures after that are recorded in
/// the summary and the run carries on.
pub fn run(
    options: &RunOptions,
    loadouts: &[Loadout],
    registry: Option<&dyn Registry>,
    out: &mut dyn Write,
) -> Result<RunSummary> {
    if options.script.default_context == 0 {
        return Err(LayersError::Config(
            "Context size must be greater than 0".to_string(),
        ));
    }
    if !options.output_directory.is_dir() {
        return Err(LayersError::Config(format!(
            "Not a directory: {}",
            options.output_directory.display()
        )));
    }

    let defaults = ScanDefaults {
        gpu_layers: options.script.default_layers,
        context: options.script.default_context,
    };
    let scanned = scan_models(&options.model_directory, defaults)?;
    let mut summary = RunSummary {
        models_found: scanned.len(),
        ..RunSummary::default()
    };

    let mut extra: Vec<ModelRecord> = Vec::new();
    for include in &options.includes {
        if !include.is_file() {
            tracing::warn!("Include file {} does not exist", include.display());
            continue;
        }
        extra.extend(read_ledger(include));
    }

    if options.autoselect {
        let vram_mb = options.vram_mb.unwrap_or_else(hardware::total_vram_mb);
        match select_loadout(loadouts, vram_mb) {
            Some(loadout) => {
                writeln!(
                    out,
                    "Selected loadout '{}' for {vram_mb} MB of VRAM: {}",
                    loadout.id, loadout.description
                )?;
                summary.loadout = Some(loadout.id.clone());
                extra.extend(loadout.models.iter().cloned());
            }
            None => tracing::error!("No loadout fits {vram_mb} MB of VRAM, continuing without one"),
        }
    }

    let mut records = dedup_sources(scanned.into_iter().chain(extra));
    let (existing, damage) = existing_ledger(&options.script.ledger_path);
    let outcome = merge_ledger(existing, &records);

    if options.download {
        let local: HashSet<String> = records
            .iter()
            .filter(|r| r.is_local())
            .map(|r| r.name.clone())
            .collect();

        match (options.generate, registry) {
            (false, _) => {
                for row in outcome.rows.iter().filter(|r| !local.contains(&r.name)) {
                    writeln!(out, "Would download {}", row.name)?;
                }
            }
            (true, None) => tracing::error!("Downloads requested but no registry is available"),
            (true, Some(registry)) => {
                let report = download(registry, options, &outcome.rows, &local);
                attach_downloads(&mut records, &outcome.rows, &report);
                summary.downloads = Some(report);
            }
        }
    }

    for record in records.iter().filter(|r| r.is_local()) {
        if !options.generate {
            writeln!(
                out,
                "Would write {}",
                options
                    .output_directory
                    .join(script_name(record, &options.script))
                    .display()
            )?;
            continue;
        }
        match write_script(&options.output_directory, record, &options.script) {
            Ok(ScriptStatus::Created(path)) => {
                tracing::info!("Generating {}", path.display());
                summary.scripts_written += 1;
            }
            Ok(ScriptStatus::Overwritten(path)) => {
                tracing::info!("Overwriting {}", path.display());
                summary.scripts_written += 1;
            }
            Ok(ScriptStatus::Skipped(_)) => {}
            Err(e) => {
                tracing::error!("Failed to write script for {}: {e}", record.name);
                summary.script_failures += 1;
            }
        }
    }
    if options.generate {
        writeln!(
            out,
            "Script files have been written to {}",
            options.output_directory.display()
        )?;
    }

    let sink = if options.generate {
        LedgerSink::Persist(options.script.ledger_path.clone())
    } else {
        LedgerSink::preview()?
    };
    let result = match damage {
        Some(e) if !sink.is_preview() => Err(e),
        _ => write_ledger(&sink, &outcome.rows, &options.command_line),
    };
    match result {
        Ok(()) if sink.is_preview() => {
            writeln!(out, "Preview of layers file {}:\n", options.script.ledger_path.display())?;
            out.write_all(std::fs::read_to_string(sink.path())?.as_bytes())?;
            writeln!(out, "\nNothing was written. Run again with --generate to write scripts and the layers file.")?;
        }
        Ok(()) => {
            writeln!(out, "Wrote layers to {}", sink.path().display())?;
            writeln!(out, "You can edit the layers file to adjust the context size and number of layers offloaded to the GPU on an individual, per-model basis.")?;
        }
        Err(e @ LayersError::Parse { .. }) => {
            tracing::error!("Not overwriting layers file: {e}");
            writeln!(out, "The layers file {} was left untouched. Fix the problems listed above and run again.", sink.path().display())?;
            summary.ledger_error = Some(e);
        }
        Err(e) => {
            tracing::error!("Could not write layers file {}: {e}", sink.path().display());
            summary.ledger_error = Some(e);
        }
    }

    if options.generate {
        print_environment_hint(out)?;
    }
    Ok(summary)
}

/// Rows of the current ledger, and why it must not be rewritten if any of it
/// couldn't be read
fn existing_ledger(path: &Path) -> (Vec<ModelRecord>, Option<LayersError>) {
    match load_ledger(path) {
        Ok(parsed) if parsed.rejected.is_empty() => (parsed.records, None),
        Ok(parsed) => {
            for reason in &parsed.rejected {
                tracing::warn!("Skipping row in {}: {reason}", path.display());
            }
            let damage = LayersError::Parse {
                path: path.display().to_string(),
                reason: format!("{} unreadable row(s)", parsed.rejected.len()),
            };
            (parsed.records, Some(damage))
        }
        Err(e) => {
            tracing::warn!("{e}");
            (Vec::new(), Some(e))
        }
    }
}

fn print_environment_hint(out: &mut dyn Write) -> Result<()> {
    writeln!(
        out,
        r#"
If you want, add the following lines to your ~/.bashrc to set the values for all scripts.

export LLM_SERVER="/PATH/TO/SERVER" # llama.cpp server executable
export LLM_MAX_CONTEXT_LENGTH=2048 # default max context
export LLM_LAYERS=12 # default number of layers offloaded to GPU, if no entry in the layers file is present

You can still provide command line parameters to the script to override environment variables or entries in the layers file like this
  ./run.xxx.sh -c 4092 -ngl 24"#
    )?;
    Ok(())
}

fn download(
    registry: &dyn Registry,
    options: &RunOptions,
    rows: &[ModelRecord],
    local: &HashSet<String>,
) -> DownloadReport {
    let resolver =
        Resolver::new(registry, options.trusted_curator.clone()).with_max_candidates(options.max_candidates);

    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(120));

    let report = download_missing(registry, &resolver, rows, local, |name| {
        spinner.set_message(format!("Resolving {name}"));
    });
    spinner.finish_and_clear();

    for name in &report.unresolved {
        tracing::error!("Could not find a repository for {name}");
    }
    for (name, e) in &report.failed {
        tracing::error!("Failed to download {name}: {e}");
    }
    report
}

/// Give downloaded models a local path so they get a launch script
fn attach_downloads(records: &mut Vec<ModelRecord>, rows: &[ModelRecord], report: &DownloadReport) {
    for downloaded in &report.downloaded {
        let index = match records.iter().position(|r| r.name == downloaded.name) {
            Some(index) => index,
            None => {
                let Some(row) = rows.iter().find(|r| r.name == downloaded.name) else {
                    continue;
                };
                records.push(row.clone());
                records.len() - 1
            }
        };
        let record = &mut records[index];
        record.file = Some(downloaded.path.clone());
        if record.mmproj.is_none() {
            record.mmproj.clone_from(&downloaded.mmproj);
        }
    }
}

/// Print the ledger as a table
pub fn show_ledger(path: &Path, out: &mut dyn Write) -> Result<()> {
    use tabled::settings::Style;
    use tabled::{Table, Tabled};

    #[derive(Tabled)]
    struct Row<'a> {
        name: &'a str,
        gpu_layers: u32,
        context: u32,
        prompt_format: &'a str,
        #[tabled(rename = "type")]
        model_type: &'a str,
    }

    if !path.is_file() {
        return Err(LayersError::Config(format!(
            "Couldn't load the layers file '{}'",
            path.display()
        )));
    }

    let records = read_ledger(path);
    let mut table = Table::new(records.iter().map(|r| Row {
        name: &r.name,
        gpu_layers: r.gpu_layers,
        context: r.context,
        prompt_format: &r.prompt_format,
        model_type: &r.model_type,
    }));
    table.with(Style::rounded());
    writeln!(out, "{table}")?;
    Ok(())
}

/// Print the repository hosting `filename`. Returns whether one was found.
pub fn resolve_file(
    registry: &dyn Registry,
    trusted_curator: &str,
    max_candidates: usize,
    filename: &str,
    out: &mut dyn Write,
) -> Result<bool> {
    let resolver = Resolver::new(registry, trusted_curator).with_max_candidates(max_candidates);
    match resolver.resolve(filename) {
        Some(repo_id) => {
            writeln!(out, "{repo_id}")?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Print available VRAM and the loadout that fits it
pub fn report_vram(vram_mb: u64, loadouts: &[Loadout], out: &mut dyn Write) -> Result<()> {
    writeln!(out, "Available VRAM: {vram_mb} MB")?;
    match select_loadout(loadouts, vram_mb) {
        Some(loadout) => {
            writeln!(out, "Loadout: {} ({})", loadout.id, loadout.description)?;
            for model in &loadout.models {
                writeln!(out, "  {}", model.name)?;
            }
        }
        None => writeln!(out, "No loadout fits this amount of VRAM.")?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_exit_codes() {
        assert_eq!(RunSummary::default().exit_code(), exit_code::SUCCESS);

        let summary = RunSummary {
            script_failures: 1,
            ..RunSummary::default()
        };
        assert_eq!(summary.exit_code(), exit_code::PARTIAL);

        let summary = RunSummary {
            downloads: Some(DownloadReport {
                unresolved: vec!["x.gguf".to_string()],
                ..DownloadReport::default()
            }),
            ..RunSummary::default()
        };
        assert_eq!(summary.exit_code(), exit_code::PARTIAL);
    }

    #[test]
    fn test_attach_downloads() {
        use crate::registry::download::Downloaded;

        let rows = vec![ModelRecord::ledger_entry("remote.gguf", 20, 4096)];
        let mut records = Vec::new();
        let report = DownloadReport {
            downloaded: vec![Downloaded {
                name: "remote.gguf".to_string(),
                repo_id: "a/b".to_string(),
                path: PathBuf::from("/cache/remote.gguf"),
                mmproj: None,
            }],
            ..DownloadReport::default()
        };

        attach_downloads(&mut records, &rows, &report);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].gpu_layers, 20);
        assert_eq!(records[0].file, Some(PathBuf::from("/cache/remote.gguf")));
    }

    #[test]
    fn test_report_vram() {
        let loadouts = crate::loadout::builtin_loadouts();
        let mut out = Vec::new();
        report_vram(0, &loadouts, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Available VRAM: 0 MB"));
        assert!(text.contains("Loadout: minimal"));
    }
}
