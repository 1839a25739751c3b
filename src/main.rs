use std::path::PathBuf;

use anyhow::{Result as R, anyhow};
use clap::Parser;
use irpack_lib::*;

/// Extract impulse responses from an IRLB library, resample, and repack them.
#[derive(Parser)]
#[command(name = "irpack")]
#[command(about = "Extract, resample and repack impulse responses from an IRLB library")]
struct Args {
    /// Source IR library
    input: Option<PathBuf>,

    /// Destination IR library
    output: Option<PathBuf>,

    /// Target sample rate in Hz
    #[arg(short, long)]
    rate: Option<f64>,

    /// IR to keep; repeatable. Keeps every IR when omitted
    #[arg(short = 'n', long = "name")]
    names: Vec<String>,

    /// JSON extract config; command line flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the input's records as JSON and exit
    #[arg(long)]
    list: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn to_config(&self) -> R<ExtractConfig> {
        let mut config = match &self.config {
            Some(path) => ExtractConfig::from_json_file(path)?,
            None => {
                let input = self
                    .input
                    .clone()
                    .ok_or_else(|| anyhow!("No input library given"))?;
                let output = self
                    .output
                    .clone()
                    .ok_or_else(|| anyhow!("No output library given"))?;
                ExtractConfig::new(input, output)
            }
        };

        if let Some(input) = &self.input {
            config.source = input.clone();
        }
        if let Some(output) = &self.output {
            config.destination = output.clone();
        }
        if let Some(rate) = self.rate {
            config.target_rate = rate;
        }
        if !self.names.is_empty() {
            config.selection = self.names.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> R<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if args.list {
        let input = args
            .input
            .as_ref()
            .ok_or_else(|| anyhow!("--list needs an input library"))?;
        let library = Library::new(input)?.decode()?;
        println!("{}", serde_json::to_string_pretty(&library.summary())?);
        return Ok(());
    }

    let start_time = std::time::Instant::now();
    let config = args.to_config()?;
    let report = extract(&config)?;

    println!(
        "Wrote {} IRs to {} ({} bytes) in {:.2} seconds",
        report.written.len(),
        config.destination.display(),
        report.bytes_written,
        start_time.elapsed().as_secs_f32()
    );
    if !report.skipped.is_empty() {
        println!("Skipped {} damaged records", report.skipped.len());
    }
    if !report.missing.is_empty() {
        println!("{} requested IRs were not found", report.missing.len());
    }
    Ok(())
}
