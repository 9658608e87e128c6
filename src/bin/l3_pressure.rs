//! L3 pressure generator
//!
//! Occupies `intensity`% of the last-level cache with a working set and streams
//! strided copies over it, printing one JSON result line to stdout. Diagnostics go
//! to stderr through `env_logger` (`RUST_LOG` overrides the default `info`).
//!
//! Placement is left to the operator, e.g. `taskset -c 3 l3_pressure 10 50 -2`.

use l3_pressure_rs::config::{Clock, Config};
use l3_pressure_rs::counters::{self, CounterEvent};
use l3_pressure_rs::error::Result;
use l3_pressure_rs::privilege::CounterAccess;
use l3_pressure_rs::workload::StrideRequest;
use l3_pressure_rs::{RunRequest, run_pressure};
use clap::{CommandFactory, Parser};
use log::{error, info, warn};
use std::num::ParseIntError;
use std::path::PathBuf;
use std::process;

// use faster/smaller `mimalloc` allocator
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(
    name = "l3_pressure",
    version,
    about = "Generate a tunable amount of last-level cache pressure",
    long_about = "Allocates intensity% of the detected L3 and performs strided self-copies over it.\n\nStride sentinels: -1 copies half the block per step, -2 copies one byte less than a page."
)]
struct Cli {
    /// Requested duration in seconds (reported only, the pass count is fixed)
    #[arg(allow_negative_numbers = true)]
    duration: Option<f64>,

    /// Share of the L3 to occupy, in percent (0-100)
    #[arg(allow_negative_numbers = true)]
    intensity: Option<f64>,

    /// Copy chunk in bytes, or -1 (half block) / -2 (page size - 1)
    #[arg(allow_negative_numbers = true)]
    stride: Option<i64>,

    /// Cache size descriptor to read instead of cpu0's L3
    #[arg(long, value_name = "PATH")]
    descriptor: Option<PathBuf>,

    /// Strided-copy passes after priming
    #[arg(long, default_value_t = 3)]
    iterations: u64,

    /// Byte written over the arena while priming (decimal or 0x-prefixed hex)
    #[arg(long, value_parser = parse_byte, default_value = "0x42")]
    fill: u8,

    /// Accrue wall-clock time instead of process CPU time
    #[arg(long)]
    wall_clock: bool,

    /// Skip the local NUMA allocation policy request
    #[arg(long)]
    no_numa_local: bool,

    /// Hardware event to count around each pass (cycles, instructions,
    /// cache-references, cache-misses, branch-misses)
    #[arg(long, value_name = "EVENT")]
    counter: Option<CounterEvent>,

    /// Abort instead of running uncounted when the event cannot be opened
    #[arg(long, requires = "counter")]
    require_counters: bool,

    /// Hex dump this many bytes of the arena after priming (TRACE level)
    #[arg(long, value_name = "BYTES", default_value_t = 0)]
    dump: usize,
}

fn parse_byte(s: &str) -> std::result::Result<u8, ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let (Some(duration), Some(intensity), Some(stride)) = (cli.duration, cli.intensity, cli.stride)
    else {
        eprintln!("{}", Cli::command().render_usage());
        process::exit(0);
    };

    let request = RunRequest {
        duration_seconds: duration,
        intensity_percent: intensity,
        stride: StrideRequest::from(stride),
        dump_bytes: cli.dump,
    };

    if let Err(e) = run(&cli, &request) {
        error!("{e}");
        process::exit(1);
    }
}

fn run(cli: &Cli, request: &RunRequest) -> Result<()> {
    let mut config = Config {
        iterations: cli.iterations,
        fill_pattern: cli.fill,
        clock: if cli.wall_clock {
            Clock::Wall
        } else {
            Clock::ProcessCpu
        },
        numa_local: !cli.no_numa_local,
        ..Config::default()
    };
    if let Some(path) = &cli.descriptor {
        config.descriptor_path = path.clone();
    }

    check_affinity();

    if cli.counter.is_some() {
        CounterAccess::inspect(&config).log();
    }
    let mut counters = counters::open(cli.counter, cli.require_counters)?;

    let record = run_pressure(&config, request, counters.as_mut())?;

    // Output in machine parseable format
    println!("{}", record.render()?);
    Ok(())
}

/// A single pinned execution context is assumed; say so if the mask is wider.
fn check_affinity() {
    match core_affinity::get_core_ids() {
        Some(cores) if cores.len() == 1 => info!("Running pinned to CPU core {}", cores[0].id),
        Some(cores) => warn!(
            "Affinity spans {} cores; pin the process (e.g. with taskset) for stable results",
            cores.len()
        ),
        None => warn!("Couldn't query CPU affinity (NOTE: this is expected on macOS)"),
    }
}
