//! `dxnn` — command-line interface for the DXNN runtime.
//!
//! ```text
//! USAGE:
//!   dxnn devices                       List NPU devices and telemetry
//!   dxnn parse-model <model.dxnn>      Inspect a compiled model container
//!   dxnn run -m <model> -i <input>     Run one synchronous inference
//!   dxnn bench -m <model> [-n N]       Measure async dispatch throughput
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dxnn_engine::{BackendSelection, EngineOptions, InferenceEngine};
use dxnn_model::Model;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dxnn", about = "DXNN NPU runtime CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List NPU devices and their telemetry.
    Devices,
    /// Print the contents of a compiled model container.
    ParseModel {
        /// Path to the .dxnn file.
        model: PathBuf,
    },
    /// Run one synchronous inference.
    Run {
        /// Path to the .dxnn file.
        #[arg(short, long)]
        model: PathBuf,
        /// Raw input file; must match the model's input size.
        #[arg(short, long)]
        input: PathBuf,
        /// Write raw output bytes here instead of printing a summary.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Force the software backend.
        #[arg(long)]
        software: bool,
    },
    /// Measure asynchronous dispatch throughput.
    Bench {
        /// Path to the .dxnn file.
        #[arg(short, long)]
        model: PathBuf,
        /// Number of inferences to dispatch.
        #[arg(short = 'n', long, default_value_t = 100)]
        count: usize,
        /// Force the software backend.
        #[arg(long)]
        software: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Cmd::Devices => cmd_devices()?,
        Cmd::ParseModel { model } => cmd_parse_model(&model)?,
        Cmd::Run {
            model,
            input,
            output,
            software,
        } => cmd_run(&model, &input, output.as_deref(), software)?,
        Cmd::Bench {
            model,
            count,
            software,
        } => cmd_bench(&model, count, software)?,
    }

    Ok(())
}

fn cmd_devices() -> Result<()> {
    let manager = match dxnn_device::DeviceManager::discover() {
        Ok(manager) => manager,
        Err(dxnn_device::DeviceError::NoDevicesFound) => {
            println!("No NPU devices found.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    println!("NPU devices: {}", manager.device_count());
    println!();

    for info in manager.devices() {
        let s = info.status();
        println!("[{}] {}", info.index(), info.path().display());
        println!("     Cores  {}", s.npu_cores);
        println!("     {}", s.summary(info.index()));
        println!(
            "     DVFS   {}",
            if s.dvfs_enabled { "enabled" } else { "disabled" }
        );
        println!();
    }

    Ok(())
}

fn cmd_parse_model(path: &std::path::Path) -> Result<()> {
    let model = Model::from_file(path)
        .with_context(|| format!("failed to load {}", path.display()))?;

    println!("Model            : {}", model.name());
    println!(".dxnn version    : v{}", model.version());
    println!("Compiler version : {}", model.compiler_version());
    println!();

    println!("Inputs  ({} bytes total):", model.input_size());
    for t in model.inputs() {
        println!(
            "  {:<24} {:?} {:?}  {} bytes",
            t.name(),
            t.shape(),
            t.dtype(),
            t.size_bytes()
        );
    }
    println!("Outputs ({} bytes total):", model.output_size());
    for t in model.outputs() {
        println!(
            "  {:<24} {:?} {:?}  {} bytes",
            t.name(),
            t.shape(),
            t.dtype(),
            t.size_bytes()
        );
    }

    Ok(())
}

fn engine_options(software: bool) -> EngineOptions {
    let mut options = EngineOptions::default();
    if software {
        options = options.with_backend(BackendSelection::Software);
    }
    options
}

fn cmd_run(
    model: &std::path::Path,
    input: &std::path::Path,
    output: Option<&std::path::Path>,
    software: bool,
) -> Result<()> {
    let engine = InferenceEngine::open(model, engine_options(software))
        .with_context(|| format!("failed to open {}", model.display()))?;

    let data = std::fs::read(input)
        .with_context(|| format!("failed to read {}", input.display()))?;

    let result = engine.run(&data)?;

    println!(
        "{} -> {} bytes on {} backend in {:?}",
        engine.name(),
        result.len(),
        engine.backend_type(),
        result.latency()
    );

    if let Some(path) = output {
        std::fs::write(path, result.as_ref())
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Output written to {}", path.display());
    }

    Ok(())
}

fn cmd_bench(model: &std::path::Path, count: usize, software: bool) -> Result<()> {
    let engine = InferenceEngine::open(model, engine_options(software))
        .with_context(|| format!("failed to open {}", model.display()))?;

    println!(
        "Benchmarking '{}': {} inference(s), {} worker slot(s), {} buffer(s)",
        engine.name(),
        count,
        engine.core_count(),
        engine.buffer_count()
    );

    let input = vec![0u8; engine.input_size()];
    let fps = engine.run_benchmark(count, &input)?;

    println!();
    println!("Throughput     : {fps:.1} inference/s");
    println!("Mean latency   : {:.1} us", engine.latency_mean_us());
    println!("Mean exec time : {:.1} us", engine.inference_time_mean_us());

    Ok(())
}
