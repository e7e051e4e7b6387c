/*
 * Copyright (c) 2026 Mohamad Al-Zawahreh (dba Sovereign Systems).
 *
 * This file is part of the Ark Sovereign Compiler.
 *
 * LICENSE: DUAL-LICENSED (AGPLv3 or COMMERCIAL).
 *
 * 1. OPEN SOURCE: You may use this file under the terms of the GNU Affero
 * General Public License v3.0. If you link to this code, your ENTIRE
 * application must be open-sourced under AGPLv3.
 *
 * 2. COMMERCIAL: For proprietary use, you must obtain a Commercial License
 * from Sovereign Systems.
 *
 * PATENT NOTICE: Protected by US Patent App #63/935,467.
 * NO IMPLIED LICENSE to rights of Mohamad Al-Zawahreh or Sovereign Systems.
 */

use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use wasm_clip::codec::{self, CodecError, ComponentUnbundler, ModuleCodec, WasmTools};
use wasm_clip::pipeline::{self, ClipConfig, ClipError};

#[derive(Error, Debug)]
enum CliError {
    #[error("bad configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[error(transparent)]
    Clip(#[from] ClipError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stub or bridge the WASI 0.2 imports of a component's core module.
#[derive(Parser, Debug)]
#[command(name = "wasm_clip")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Component or core module to clip
    input: PathBuf,

    /// Where to write the result
    output: PathBuf,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long)]
    verbose: bool,

    /// Write text instead of binary
    #[arg(short = 't', long)]
    wat: bool,

    /// Write the unbundled module without clipping
    #[arg(long)]
    pre: bool,

    /// Only transform the first N*100 bytes (0 = all)
    #[arg(long, value_name = "N")]
    view: Option<usize>,

    /// Keep intermediate files in DIR
    #[arg(long, value_name = "DIR")]
    tmp_dir: Option<PathBuf>,

    /// Import namespaces to convert to snake_case
    #[arg(long, value_name = "A,B", value_delimiter = ',')]
    namespaces: Option<Vec<String>>,

    /// Leave wasi:* imports in place
    #[arg(long)]
    keep_wasi_imports: bool,

    /// Bridge to wasi_snapshot_preview1
    #[arg(long = "wasi-p1-bridge")]
    p1_bridge: bool,

    /// Leave env imports in place
    #[arg(long)]
    no_env_stubs: bool,

    /// JSON configuration; flags apply on top
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write the event log as JSON
    #[arg(long, value_name = "FILE")]
    events: Option<PathBuf>,

    /// Validate the output module
    #[arg(long)]
    validate: bool,

    /// wasm-tools executable
    #[arg(long, value_name = "PATH")]
    wasm_tools: Option<PathBuf>,
}

fn build_config(cli: &Cli) -> Result<ClipConfig, CliError> {
    let mut config = match &cli.config {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => ClipConfig::default(),
    };
    if let Some(view) = cli.view {
        config.processing_window = view * 100;
    }
    if let Some(namespaces) = &cli.namespaces {
        config.namespaces = namespaces
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }
    config.keep_wasi_imports |= cli.keep_wasi_imports;
    config.use_p1_bridge |= cli.p1_bridge;
    if cli.no_env_stubs {
        config.stub_env = false;
    }
    Ok(config)
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// The core module to work on: the input itself, or the one unbundled from
/// a component.
fn core_module(tools: &WasmTools, input: &Path, workdir: &Path) -> Result<PathBuf, CliError> {
    if codec::is_core_module(&fs::read(input)?) {
        return Ok(input.to_path_buf());
    }
    info!(input = %input.display(), "unbundling component");
    Ok(tools.extract_core_module(input, workdir)?)
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let config = build_config(cli)?;
    let tools = cli
        .wasm_tools
        .as_ref()
        .map(WasmTools::new)
        .unwrap_or_default();

    // A temporary directory is removed when `_scratch` drops.
    let _scratch;
    let workdir = match &cli.tmp_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            dir.clone()
        }
        None => {
            let dir = tempfile::tempdir()?;
            let path = dir.path().to_path_buf();
            _scratch = dir;
            path
        }
    };

    let module = core_module(&tools, &cli.input, &workdir)?;
    info!(module = %module.display(), "core module selected");

    if cli.pre {
        if cli.wat {
            fs::write(&cli.output, tools.decode(&module)?)?;
        } else {
            fs::copy(&module, &cli.output)?;
        }
        info!(output = %cli.output.display(), "wrote unclipped module");
        return Ok(());
    }

    let text = tools.decode(&module)?;
    info!(bytes = text.len(), "module printed");
    let report = pipeline::clip(&text, &config)?;

    if let Some(path) = &cli.events {
        fs::write(path, serde_json::to_string_pretty(&report.events)?)?;
        info!(events = report.events.len(), path = %path.display(), "event log written");
    }

    if cli.wat && !cli.validate {
        fs::write(&cli.output, &report.text)?;
    } else {
        let bytes = tools.encode(&report.text)?;
        if cli.validate {
            codec::validate(&bytes)?;
            info!("output validated");
        }
        if cli.wat {
            fs::write(&cli.output, &report.text)?;
        } else {
            fs::write(&cli.output, bytes)?;
        }
    }
    info!(output = %cli.output.display(), "done");
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
