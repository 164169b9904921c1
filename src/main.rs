use clap::{Args, Parser, Subcommand};
use llm_layers::app::{self, RunOptions};
use llm_layers::config::schema::{config_path, default_ledger_path, default_loadouts_dir, expand_home};
use llm_layers::config::Config;
use llm_layers::error::{exit_code, LayersError, Result};
use llm_layers::hardware;
use llm_layers::loadout::available_loadouts;
use llm_layers::registry::HubRegistry;
use llm_layers::script::ScriptOptions;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "llm-layers", version)]
#[command(
    about = "Find LLMs that fit your hardware, download them, and generate server startup scripts",
    long_about = None
)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    generate: GenerateArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the layers file as a table
    Show {
        /// Layers file to show
        #[arg(long)]
        layers_file: Option<PathBuf>,
    },
    /// Find the Hugging Face repository hosting a GGUF file
    Resolve {
        /// Exact file name, e.g. mistral-7b-instruct-v0.2.Q4_K_M.gguf
        filename: String,
    },
    /// Show detected VRAM and the loadout that fits it
    Vram {
        /// Use this amount of VRAM in MB instead of detecting it
        #[arg(long)]
        vram: Option<u64>,
    },
}

#[derive(Args)]
struct GenerateArgs {
    /// Directory to put generated scripts into. Existing scripts will be overwritten.
    output_directory: Option<PathBuf>,

    /// Directory searched recursively for GGUF files
    #[arg(long)]
    model_directory: Option<String>,

    /// Default number of layers to offload to the GPU
    #[arg(short, long)]
    layers: Option<u32>,

    /// Default context size for loaded models
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    context: Option<u32>,

    /// Layers file holding per-model layers and context
    #[arg(long)]
    layers_file: Option<PathBuf>,

    /// Additional layers files whose models are included. May be repeated.
    #[arg(short, long = "include")]
    includes: Vec<PathBuf>,

    /// String to prepend to each script's filename
    #[arg(short, long)]
    prefix: Option<String>,

    /// String to append to each script's filename
    #[arg(short, long)]
    suffix: Option<String>,

    /// Path to a llama.cpp server executable
    #[arg(short = 'x', long)]
    llama_executable: Option<String>,

    /// Arguments passed on to the server executable
    #[arg(long, allow_hyphen_values = true)]
    additional_arguments: Option<String>,

    /// Add the loadout that best fits the available VRAM
    #[arg(short, long)]
    autoselect: bool,

    /// Use this amount of VRAM in MB instead of detecting it
    #[arg(long)]
    vram: Option<u64>,

    /// Write scripts and the layers file instead of previewing them
    #[arg(short, long)]
    generate: bool,

    /// Download models listed in the layers file that aren't on disk
    #[arg(short, long)]
    download: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e}");
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let config = Config::load().map_err(|e| match e {
        LayersError::Config(_) => e,
        other => LayersError::Config(format!(
            "Failed to read {}: {other}",
            config_path().map(|p| p.display().to_string()).unwrap_or_default()
        )),
    })?;
    let mut stdout = std::io::stdout().lock();

    match cli.command {
        Some(Commands::Show { layers_file }) => {
            let path = layers_file.map_or_else(default_ledger_path, Ok)?;
            app::show_ledger(&path, &mut stdout)?;
            Ok(exit_code::SUCCESS)
        }
        Some(Commands::Resolve { filename }) => {
            let registry = HubRegistry::new(&config.registry)?;
            let found = app::resolve_file(
                &registry,
                &config.registry.trusted_curator,
                config.registry.max_candidates,
                &filename,
                &mut stdout,
            )?;
            Ok(if found { exit_code::SUCCESS } else { exit_code::PARTIAL })
        }
        Some(Commands::Vram { vram }) => {
            let vram_mb = vram.unwrap_or_else(hardware::total_vram_mb);
            app::report_vram(vram_mb, &loadouts(&config), &mut stdout)?;
            Ok(exit_code::SUCCESS)
        }
        None => {
            let options = run_options(cli.generate, &config)?;
            let registry = if options.download && options.generate {
                Some(HubRegistry::new(&config.registry)?)
            } else {
                None
            };
            let registry = registry.as_ref().map(|r| r as &dyn llm_layers::registry::Registry);

            let summary = app::run(&options, &loadouts(&config), registry, &mut stdout)?;
            tracing::debug!("Run finished: {summary:?}");
            Ok(summary.exit_code())
        }
    }
}

fn loadouts(config: &Config) -> Vec<llm_layers::loadout::Loadout> {
    let dir = config.loadouts.directory.clone().or_else(default_loadouts_dir);
    available_loadouts(dir.as_deref())
}

fn run_options(args: GenerateArgs, config: &Config) -> Result<RunOptions> {
    let defaults = &config.generate;
    let output_directory = args.output_directory.ok_or_else(|| {
        LayersError::Config("Missing output directory. Usage: llm-layers <OUTPUT_DIRECTORY>".to_string())
    })?;
    let ledger_path = match args.layers_file {
        Some(path) => expand_home(&path.to_string_lossy()),
        None => default_ledger_path()?,
    };

    let server = args
        .llama_executable
        .or_else(|| defaults.llama_executable.clone())
        .or_else(find_server)
        .unwrap_or_default();
    if server.is_empty() {
        tracing::warn!("No executable provided. You will either have to set LLM_SERVER in the environment or regenerate the scripts with --llama-executable set. Otherwise the scripts won't work.");
    }

    Ok(RunOptions {
        model_directory: expand_home(args.model_directory.as_deref().unwrap_or(&defaults.model_directory)),
        output_directory: expand_home(&output_directory.to_string_lossy()),
        includes: args
            .includes
            .iter()
            .map(|p| expand_home(&p.to_string_lossy()))
            .collect(),
        autoselect: args.autoselect,
        vram_mb: args.vram,
        generate: args.generate,
        download: args.download,
        trusted_curator: config.registry.trusted_curator.clone(),
        max_candidates: config.registry.max_candidates,
        command_line: std::env::args().collect::<Vec<_>>().join(" "),
        script: ScriptOptions {
            ledger_path,
            default_layers: args.layers.unwrap_or(defaults.layers),
            default_context: args.context.unwrap_or(defaults.context),
            server: expand_home(&server).display().to_string(),
            additional_arguments: args
                .additional_arguments
                .unwrap_or_else(|| defaults.additional_arguments.clone()),
            prefix: args.prefix.unwrap_or_else(|| defaults.prefix.clone()),
            suffix: args.suffix.unwrap_or_else(|| defaults.suffix.clone()),
        },
    })
}

/// Look for a llama.cpp server on PATH
fn find_server() -> Option<String> {
    ["llama-server", "server"]
        .iter()
        .find_map(|name| which::which(name).ok())
        .map(|path| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_must_be_positive() {
        assert!(Cli::try_parse_from(["llm-layers", "--context", "0", "scripts"]).is_err());

        let cli = Cli::try_parse_from(["llm-layers", "--context", "4096", "scripts"]).unwrap();
        assert_eq!(cli.generate.context, Some(4096));
    }

    #[test]
    fn test_subcommands_parse() {
        let cli = Cli::try_parse_from(["llm-layers", "vram", "--vram", "8000"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Vram { vram: Some(8000) })));
    }
}
