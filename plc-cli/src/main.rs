//! Reference front-end (spec.md §6: "out of core scope but shown here for
//! completeness"): parses args, wires a driver, loads a program, and
//! drives the scan loop until interrupted.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use plc_core::hardware::{make_driver, DriverKind};
use plc_core::scan::{Config, Plc};

/// Run a compiled ladder/IL program against a dry or simulated driver.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Program source file (`.il` or `.ld`).
    #[arg(short, long)]
    program: PathBuf,

    /// Driver backend: dry, sim, uspace, gpiod, comedi.
    #[arg(long, default_value = "dry")]
    driver: String,

    /// Scan cycle period in milliseconds.
    #[arg(long, default_value_t = 10)]
    step_ms: u32,

    /// Digital input count.
    #[arg(long, default_value_t = 64)]
    digital_inputs: usize,
    /// Digital output count.
    #[arg(long, default_value_t = 64)]
    digital_outputs: usize,
    /// Analog input channel count.
    #[arg(long, default_value_t = 8)]
    analog_inputs: usize,
    /// Analog output channel count.
    #[arg(long, default_value_t = 8)]
    analog_outputs: usize,
    /// Timer count.
    #[arg(long, default_value_t = 16)]
    timers: usize,
    /// Blinker count.
    #[arg(long, default_value_t = 4)]
    blinkers: usize,
    /// Integer memory register count.
    #[arg(long, default_value_t = 64)]
    memory: usize,
    /// Real memory register count.
    #[arg(long, default_value_t = 16)]
    real_memory: usize,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => std::process::exit(0),
        Err(ExitError::Usage(msg)) => {
            eprintln!("plc: {msg}");
            std::process::exit(1);
        }
        Err(ExitError::Internal(msg)) => {
            eprintln!("plc: {msg}");
            std::process::exit(-1);
        }
    }
}

enum ExitError {
    Usage(String),
    Internal(String),
}

fn run(cli: Cli) -> Result<(), ExitError> {
    let source = fs::read_to_string(&cli.program)
        .map_err(|e| ExitError::Usage(format!("cannot read {}: {e}", cli.program.display())))?;

    let config = Config {
        digital_inputs: cli.digital_inputs,
        digital_outputs: cli.digital_outputs,
        analog_inputs: cli.analog_inputs,
        analog_outputs: cli.analog_outputs,
        timers: cli.timers,
        blinkers: cli.blinkers,
        memory: cli.memory,
        real_memory: cli.real_memory,
        step_ms: cli.step_ms,
    };

    let driver = make_driver(DriverKind::parse(&cli.driver));
    let mut plc = Plc::new(config, driver);

    plc.load_program_file(&cli.program, &source)
        .map_err(|e| ExitError::Usage(format!("{e}")))?;

    plc.start().map_err(|e| ExitError::Internal(format!("start failed: {e}")))?;
    log::info!("plc started, driver={}, step_ms={}", cli.driver, cli.step_ms);

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .map_err(|e| ExitError::Internal(format!("signal handler install failed: {e}")))?;

    while running.load(Ordering::SeqCst) {
        if let Err(e) = plc.step() {
            log::error!("scan cycle error: {e}");
        }
    }

    log::info!("shutting down, cycle_jitter={:?}", plc.cycle_jitter());
    plc.stop().map_err(|e| ExitError::Internal(format!("stop failed: {e}")))?;
    Ok(())
}
