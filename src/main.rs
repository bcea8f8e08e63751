//! rpifan: host entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 Adapters (outer ring)                    │
//! │                                                          │
//! │  FanCharDev (stdin/stdout)      LogEventSink             │
//! │  SysfsGpio · SysfsPwmBus        SimGpio · SimPwmBus      │
//! │                                                          │
//! │  ──────────────── Port Trait Boundary ─────────────      │
//! │                                                          │
//! │  ┌────────────────────────────────────────────────┐      │
//! │  │            FanManager (fan logic)              │      │
//! │  │   PinAllocator · ModulationController          │      │
//! │  └────────────────────────────────────────────────┘      │
//! └──────────────────────────────────────────────────────────┘
//! ```

#![deny(unused_must_use)]

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use rpifan::adapters::chardev::FanCharDev;
use rpifan::adapters::log_sink::LogEventSink;
use rpifan::adapters::sim::{SimGpio, SimPwmBus, SimPwmChip};
use rpifan::app::ports::{GpioPort, PwmBus, PwmDevice};
use rpifan::{BoardConfig, FanManager, logging};

#[derive(Parser, Debug)]
#[command(name = "rpifan")]
#[command(version, about = "Single-fan GPIO/PWM controller", long_about = None)]
struct Cli {
    /// Board description (JSON); defaults to the Raspberry Pi 4 layout
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run against the in-memory backend instead of sysfs
    #[arg(long)]
    simulate: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

// ── Session ───────────────────────────────────────────────────

fn run<G, B, D>(board: &BoardConfig, gpio: G, bus: B, mut device: D) -> Result<()>
where
    G: GpioPort,
    B: PwmBus,
    D: PwmDevice<Channel = B::Channel>,
{
    let mut fan = FanManager::new(board, gpio, bus, LogEventSink::new());
    fan.initialize().context("no free GPIO for the fan")?;

    match fan.probe(&mut device) {
        Ok(n) => info!("{} PWM channel(s) attached", n),
        Err(e) => warn!("PWM probe failed ({}), fan is on/off only until 'probe'", e),
    }

    let mut dev = FanCharDev::new(fan);
    dev.serve(io::stdin().lock(), io::stdout().lock(), Some(&mut device))
        .context("session I/O failed")?;

    dev.fan_mut().teardown();
    Ok(())
}

#[cfg(all(target_os = "linux", feature = "sysfs"))]
fn run_sysfs(board: &BoardConfig) -> Result<()> {
    use rpifan::adapters::sysfs::{SysfsGpio, SysfsPwmBus, SysfsPwmChip};

    let gpio = SysfsGpio::new(&board.sysfs);
    let bus = SysfsPwmBus::new(&board.sysfs);
    let chip = SysfsPwmChip::open(board);
    run(board, gpio, bus, chip)
}

#[cfg(not(all(target_os = "linux", feature = "sysfs")))]
fn run_sysfs(board: &BoardConfig) -> Result<()> {
    warn!("sysfs backend not built in, falling back to simulation");
    run_sim(board)
}

fn run_sim(board: &BoardConfig) -> Result<()> {
    let labels: Vec<&str> = board.pwm_channels.iter().map(|ch| ch.label.as_str()).collect();
    let chip = SimPwmChip::new(&board.device_label, &labels);
    run(board, SimGpio::new(), SimPwmBus::new(), chip)
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::setup(cli.verbose).context("failed to install logger")?;

    let board = match &cli.config {
        Some(path) => BoardConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => BoardConfig::default(),
    };
    info!("rpifan v{} starting", env!("CARGO_PKG_VERSION"));

    if cli.simulate { run_sim(&board) } else { run_sysfs(&board) }
}
