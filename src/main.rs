//! cardiolabel
//!
//! Batch inference for 12-lead ECG records.
//!
//! # Usage
//!
//! ```bash
//! # Label every record in a directory with the best pooled_linear checkpoint
//! cardiolabel predict --input records/ --models models/ --arch pooled_linear --output out/
//!
//! # Show which checkpoint would be picked
//! cardiolabel checkpoints --models models/ --arch pooled_linear
//!
//! # Print the class order of every label vector
//! cardiolabel classes
//! ```

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use cardiolabel::commands::{self, CommandError, PredictOptions};
use cardiolabel::config::load_config;
use cardiolabel::model::Device;
use cardiolabel::pipeline::OutputFormat;
use cardiolabel::signal::ResampleMethod;

#[derive(Parser, Debug)]
#[command(name = "cardiolabel")]
#[command(author, version, about = "Multi-label ECG classification with windowed model ensembles", long_about = None)]
struct Cli {
    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Pipeline config file (JSON); defaults to the per-user config if present
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Label records and write one output file per record
    Predict {
        /// A .mat record or a directory of them
        #[arg(short, long)]
        input: PathBuf,

        /// Directory holding the checkpoints
        #[arg(short, long)]
        models: PathBuf,

        /// Model architecture
        #[arg(short, long, default_value = "pooled_linear")]
        arch: String,

        /// Use only this checkpoint file instead of the most accurate one
        #[arg(long)]
        test_model: Option<String>,

        /// Threshold artifact (defaults to <models>/thresholds.json)
        #[arg(long)]
        thresholds: Option<PathBuf>,

        /// Class mapping table (defaults to the built-in table)
        #[arg(long)]
        taxonomy: Option<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Output format: csv, json or both
        #[arg(short, long, default_value = "csv")]
        format: OutputFormat,

        /// Append a JSONL progress trace to this file
        #[arg(long)]
        trace: Option<PathBuf>,

        /// Compute device: cpu, cuda or cuda:N
        #[arg(long)]
        device: Option<Device>,

        /// Resampling method: linear or fourier
        #[arg(long)]
        resample: Option<ResampleMethod>,
    },

    /// List checkpoints and mark the one that would be selected
    Checkpoints {
        #[arg(short, long)]
        models: PathBuf,

        #[arg(short, long, default_value = "pooled_linear")]
        arch: String,
    },

    /// Print the canonical class order
    Classes {
        #[arg(long)]
        taxonomy: Option<PathBuf>,
    },
}

fn command_error(error: CommandError) -> anyhow::Error {
    anyhow!(error.message().to_string())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .parse_filters(&cli.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("cardiolabel v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Predict {
            input,
            models,
            arch,
            test_model,
            thresholds,
            taxonomy,
            output,
            format,
            trace,
            device,
            resample,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(device) = device {
                config.compute.device = device;
            }
            if let Some(resample) = resample {
                config.resample_method = resample;
            }

            let options = PredictOptions {
                input,
                models,
                architecture: arch,
                test_model,
                thresholds,
                taxonomy,
                output,
                format,
                trace,
                config,
            };

            let summary = commands::predict(&options).map_err(command_error)?;
            log::info!(
                "Run {}: {} records labelled, outputs in {:?}",
                summary.run_id,
                summary.processed,
                options.output
            );
        }
        Commands::Checkpoints { models, arch } => {
            let listing = commands::list_checkpoints(&models, &arch).map_err(command_error)?;
            if listing.is_empty() {
                log::warn!("No checkpoints found in {:?}", models);
            }
            for checkpoint in listing {
                let marker = if checkpoint.selected { "*" } else { " " };
                let accuracy = checkpoint
                    .accuracy
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{} {:>8}  {}", marker, accuracy, checkpoint.file_name);
            }
        }
        Commands::Classes { taxonomy } => {
            for class in commands::list_classes(taxonomy.as_deref()).map_err(command_error)? {
                println!(
                    "{:>2}  {:<10} {}",
                    class.index,
                    class.code,
                    class.abbreviation.unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}
