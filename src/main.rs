//! gputemps - core, junction and VRAM temperatures of NVIDIA GPUs.
//!
//! Core temperature comes from NVML. Junction and VRAM temperatures are read
//! straight from the card's register space through `/dev/mem`, which needs root.

mod app;
mod cancel;
mod cli;
mod config;
mod data;
mod error;
mod monitor;
mod pci;
mod registers;
mod render;
mod terminal;
#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use app::{CancelPause, KeypressPause, Pause, SampleLoop, TerminalKeys};
use cancel::CancellationToken;
use clap::Parser;
use cli::Cli;
use config::{Config, OutputFormat};
use monitor::{NvmlSource, TelemetrySampler};
use pci::BusSnapshot;
use registers::DevMemReader;
use render::Renderer;
use std::io::{self, IsTerminal};
use std::process::ExitCode;
use terminal::TerminalGuard;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let filter = EnvFilter::try_from_env("GPUTEMPS_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(config: &Config) -> Result<()> {
    let token = CancellationToken::new();
    cancel::install_signal_bridge(token.clone()).context("failed to install signal handlers")?;

    let _terminal = match config.format {
        OutputFormat::Table => Some(TerminalGuard::acquire().context("failed to set up terminal")?),
        OutputFormat::Json => None,
    };

    registers::ensure_privileged()?;
    let snapshot = BusSnapshot::scan(&config.pci_root)?;
    let source = NvmlSource::init()?;
    let sampler = TelemetrySampler::new(source, snapshot, DevMemReader::new(&config.mem_path))?;
    info!(
        "sampling {} GPU(s) every {:?}",
        sampler.device_count(),
        config.refresh_interval
    );

    let pause: Box<dyn Pause> = if io::stdin().is_terminal() {
        Box::new(KeypressPause::new(TerminalKeys))
    } else {
        Box::new(CancelPause)
    };

    let mut sample_loop = SampleLoop::new(
        sampler,
        Renderer::new(config.format),
        io::stdout().lock(),
        pause,
        token,
        config,
    );
    sample_loop.run()?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let (text, status) = cli::rejection(&err);
            eprint!("{text}");
            return ExitCode::from(status);
        }
    };

    init_logging();
    let config = Config::from(&cli);

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("gputemps: {err:#}");
            ExitCode::FAILURE
        }
    }
}
