use anyhow::Context;
use clap::Parser;
use console::TerminalConsole;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vm::{devices::disk::Disk, host::Host, MachineConfig, Scheduler};

mod console;
mod rom;

#[derive(Debug, Parser)]
#[command(version, about)]
struct App {
    /// ROM image, either a raw binary or a RISC-V ELF file.
    pub rom: PathBuf,
    /// Disk image opened for reading and writing.
    #[arg(long)]
    pub disk: Option<PathBuf>,
    /// Emulated instructions per second.
    #[arg(long, default_value_t = 50_000_000)]
    pub cpu_freq: u32,
    #[arg(long, default_value_t = 60)]
    pub framerate: u32,
    /// Guest memory in MiB, a power of two.
    #[arg(long, default_value_t = 64)]
    pub memory_mib: u32,
    /// Log filter, overrides `RUST_LOG`.
    #[arg(long)]
    pub log_level: Option<String>,
}

fn init_logging(level: Option<&str>) -> anyhow::Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).context("invalid log level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let app = App::parse();

    init_logging(app.log_level.as_deref())?;

    let memory_size = app
        .memory_mib
        .checked_mul(1024 * 1024)
        .context("memory size does not fit the 32-bit address space")?;

    let disk = match &app.disk {
        Some(path) => Disk::open(path).unwrap_or_else(|error| {
            tracing::warn!(%error, path = %path.display(), "disk disabled");
            Disk::absent()
        }),
        None => Disk::absent(),
    };

    let config = MachineConfig {
        memory_size,
        cpu_freq: app.cpu_freq,
        framerate: app.framerate,
        ..Default::default()
    };
    let reset_vector = config.reset_vector;
    let host = Host {
        console: Box::new(TerminalConsole::new()),
        ..Host::headless()
    };

    let mut scheduler = Scheduler::new(config, host, disk)?;

    if let Some(image) = rom::load(&app.rom, reset_vector)? {
        image.install(&mut scheduler);
    }

    let code = scheduler.run();

    // Joins the console reader and restores the terminal.
    drop(scheduler);

    std::process::exit(code as i32);
}
