//! wpxr-hugo CLI - convert WordPress exports into Hugo records
//!
//! Runs the conversion pipeline and prints the result; writing a Hugo site
//! tree from the records is left to other tools.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use wpxr_hugo::runtime::{ConverterConfig, DataModels};
use wpxr_hugo::serialization::{ConversionSummary, JsonArrayWriter, NdjsonWriter};
use wpxr_hugo::{HugoConverter, SourceDocument};

#[derive(Parser)]
#[command(name = "wpxr-hugo")]
#[command(version, about = "Schema-driven conversion of WordPress exports into Hugo records", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert an export and print the records
    Convert {
        /// Converter configuration (YAML)
        #[arg(short, long, default_value = "wpxr-to-static.yaml")]
        config: PathBuf,

        /// WordPress export file (overrides `wpxr_file` from the config)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Ndjson)]
        format: OutputFormat,
    },

    /// Load and compile the data models without converting anything
    Check {
        /// Converter configuration (YAML)
        #[arg(short, long, default_value = "wpxr-to-static.yaml")]
        config: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// One record per line
    Ndjson,
    /// All records in one JSON array
    Json,
    /// Counts, page paths and image references
    Summary,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Convert {
            config,
            input,
            format,
        } => convert(&config, input, format),
        Commands::Check { config } => check(&config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// `RUST_LOG` wins over the configured `loglevel`.
fn init_tracing(loglevel: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(loglevel.to_ascii_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load(config_path: &Path) -> Result<(ConverterConfig, DataModels), String> {
    let config = ConverterConfig::load_from_file(config_path)
        .map_err(|e| format!("Failed to load config: {}", e))?;
    init_tracing(&config.loglevel);

    let models_path = config.data_models_path(config_path).to_path_buf();
    let models = DataModels::load_from_file(&models_path)
        .map_err(|e| format!("Failed to load data models from {}: {}", models_path.display(), e))?;
    eprintln!("  ✓ Loaded data models from {}", models_path.display());

    Ok((config, models))
}

fn convert(config_path: &Path, input: Option<PathBuf>, format: OutputFormat) -> Result<(), String> {
    let (config, models) = load(config_path)?;
    let input = input.unwrap_or_else(|| config.wpxr_file.clone());

    let xml = fs::read_to_string(&input)
        .map_err(|e| format!("Failed to read {}: {}", input.display(), e))?;
    let document = SourceDocument::parse(&xml)
        .map_err(|e| format!("Failed to parse {}: {}", input.display(), e))?;
    eprintln!("  ✓ Parsed {}", input.display());

    let converter = HugoConverter::new(config, models).map_err(|e| e.to_string())?;
    let conversion = converter.convert(&document).map_err(|e| e.to_string())?;
    eprintln!("  ✓ Converted {} items", conversion.items.len());

    let stdout = io::stdout().lock();
    match format {
        OutputFormat::Ndjson => {
            let mut writer = NdjsonWriter::new(stdout);
            writer.write_all(&conversion.items).map_err(|e| e.to_string())?;
            writer.flush().map_err(|e| e.to_string())?;
        }
        OutputFormat::Json => {
            let mut writer = JsonArrayWriter::new(stdout).map_err(|e| e.to_string())?;
            for item in &conversion.items {
                writer.write(item).map_err(|e| e.to_string())?;
            }
            writer.finish().map_err(|e| e.to_string())?;
        }
        OutputFormat::Summary => {
            let summary = ConversionSummary::from(&conversion);
            serde_json::to_writer_pretty(stdout, &summary).map_err(|e| e.to_string())?;
            println!();
        }
    }
    Ok(())
}

fn check(config_path: &Path) -> Result<(), String> {
    let (config, models) = load(config_path)?;
    let converter = HugoConverter::new(config, models).map_err(|e| e.to_string())?;

    println!("Data models OK");
    println!("  ℹ Modifiers:");
    for name in converter.modifier_names() {
        println!("    - {}", name);
    }
    Ok(())
}
