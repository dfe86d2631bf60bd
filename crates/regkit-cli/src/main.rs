//! `regkit`: run one or more registrations from parameter files.
//!
//! Each `-p` file is one registration level. Every level registers the
//! original moving image; the final transform of a level becomes the initial
//! transform of the next, so the last transform maps through all of them.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use regkit_core::ParameterMap;
use regkit_io::NiftiImageIo;
use regkit_registration::record::transform_parameter_file_name;
use regkit_registration::registry::global;
use regkit_registration::{Configuration, Orchestrator, RunResult};
use tracing::{error, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "regkit")]
#[command(about = "Component-based multi-resolution image registration")]
struct Cli {
    /// Fixed image; repeat for metrics that use several fixed images
    #[arg(short, long = "fixed", value_name = "PATH", required_unless_present = "list_components")]
    fixed: Vec<PathBuf>,

    /// Moving image; repeat for metrics that use several moving images
    #[arg(short, long = "moving", value_name = "PATH", required_unless_present = "list_components")]
    moving: Vec<PathBuf>,

    /// Parameter file; repeat to chain registrations
    #[arg(short, long = "parameters", value_name = "FILE", required_unless_present = "list_components")]
    parameters: Vec<PathBuf>,

    /// Output directory for transform parameters, iteration logs and results
    #[arg(short, long, value_name = "DIR")]
    out: Option<PathBuf>,

    /// Number of worker threads for multithreaded components
    #[arg(long)]
    threads: Option<usize>,

    /// Mask restricting the fixed-image samples
    #[arg(long, value_name = "PATH")]
    fixed_mask: Option<PathBuf>,

    /// Mask restricting the moving-image region
    #[arg(long, value_name = "PATH")]
    moving_mask: Option<PathBuf>,

    /// Transform-parameter file composed in front of the first level
    #[arg(short = 't', long = "initial-transform", value_name = "FILE")]
    initial_transform: Option<PathBuf>,

    /// List the registered components per type signature and exit
    #[arg(long)]
    list_components: bool,

    /// Print results as JSON on stdout
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();
    let code = match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            eprintln!("regkit: {err:#}");
            1
        }
    };
    std::process::exit(code);
}

fn run(cli: &Cli) -> Result<i32> {
    if let Some(out) = &cli.out {
        fs::create_dir_all(out)
            .with_context(|| format!("Failed to create output directory {}", out.display()))?;
    }
    init_logging(cli.out.as_deref())?;

    if cli.list_components {
        list_components(cli.json)?;
        return Ok(0);
    }

    let (code, results) = run_levels(cli)?;
    if cli.json {
        for result in &results {
            println!("{}", serde_json::to_string_pretty(result)?);
        }
    }
    Ok(code)
}

/// Run every `-p` level in order, stopping at the first failure. Returns the
/// exit code and the results of the levels that completed.
fn run_levels(cli: &Cli) -> Result<(i32, Vec<RunResult>)> {
    let levels = cli.parameters.len();
    let mut results: Vec<RunResult> = Vec::with_capacity(levels);
    for (level, path) in cli.parameters.iter().enumerate() {
        let parameters = ParameterMap::from_file(path)
            .with_context(|| format!("Failed to read parameter file {}", path.display()))?;
        let initial_file = match level {
            0 => cli.initial_transform.clone(),
            _ => cli
                .out
                .as_ref()
                .map(|out| out.join(transform_parameter_file_name(level - 1, None, None))),
        };
        let configuration = configuration(cli, parameters, initial_file.as_deref(), level, levels);

        let io = Arc::new(NiftiImageIo);
        let mut orchestrator = Orchestrator::new(configuration)
            .with_loader(io.clone())
            .with_writer(io);
        if let Some(previous) = results.last() {
            orchestrator = orchestrator.with_initial_transform(previous.final_transform.clone());
        }
        info!(level, parameters = %path.display(), "starting registration");
        let code = orchestrator.run();
        if code != 0 {
            error!(
                level,
                code,
                "registration failed: {}",
                orchestrator.last_error().unwrap_or("unknown error")
            );
            return Ok((code, results));
        }
        if let Some(result) = orchestrator.result() {
            results.push(result.clone());
        }
    }
    Ok((0, results))
}

/// Console logging on stderr, plus `regkit.log` in the output directory.
fn init_logging(out: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = match out {
        Some(dir) => {
            let path = dir.join("regkit.log");
            let file = File::create(&path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("Failed to install the log subscriber")?;
    Ok(())
}

fn configuration(
    cli: &Cli,
    parameters: ParameterMap,
    initial_transform: Option<&Path>,
    level: usize,
    levels: usize,
) -> Configuration {
    let mut configuration = Configuration::new(parameters).with_elastix_level(level, levels);
    for (index, path) in cli.fixed.iter().enumerate() {
        configuration.set_argument(format!("-f{index}"), path.to_string_lossy());
    }
    for (index, path) in cli.moving.iter().enumerate() {
        configuration.set_argument(format!("-m{index}"), path.to_string_lossy());
    }
    if let Some(out) = &cli.out {
        configuration.set_argument("-out", out.to_string_lossy());
    }
    if let Some(mask) = &cli.fixed_mask {
        configuration.set_argument("-fMask", mask.to_string_lossy());
    }
    if let Some(mask) = &cli.moving_mask {
        configuration.set_argument("-mMask", mask.to_string_lossy());
    }
    if let Some(path) = initial_transform {
        configuration.set_argument("-t0", path.to_string_lossy());
    }
    // the rayon pool can only be configured once per process
    if let (Some(threads), 0) = (cli.threads, level) {
        configuration.set_argument("-threads", threads.to_string());
    }
    configuration
}

fn list_components(json: bool) -> Result<()> {
    let registry = global();
    if json {
        let listing: Vec<_> = registry
            .signatures()
            .map(|(index, signature)| {
                serde_json::json!({
                    "index": index.get(),
                    "signature": signature,
                    "components": registry.families(index),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }
    for (index, signature) in registry.signatures() {
        println!("[{index}] {signature}");
        for family in registry.families(index) {
            println!("    {family}");
        }
    }
    Ok(())
}
