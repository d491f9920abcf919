// SPDX-License-Identifier: Apache-2.0

//! Runs the report pipeline on the host against the simulated UART and
//! prints the serial stream to stdout. With `--echo`, feeds stdin lines to
//! the UART receiver instead and prints what comes back.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use uartjson::sim::SimUart;
use uartjson::{Clock, Echo, Mode, Phase, Pipeline, PipelineConfig, Tick, TickSource, Transport};

const DEFAULT_PAYLOAD: &str = r#"{"user": "johndoe", "admin": false, "uid": 1000,
  "groups": ["users", "wheel", "audio", "video"]}"#;

#[derive(Parser, Debug)]
#[command(about = "Replay a JSON report over a simulated UART")]
struct Args {
    /// JSON payload to report. Uses a built-in sample when omitted.
    file: Option<PathBuf>,

    /// Milliseconds between two lines.
    #[arg(long, default_value_t = 500)]
    pacing_ms: Tick,

    /// Reject bare words and primitive keys.
    #[arg(long)]
    strict: bool,

    /// Pace with the wall clock instead of simulated ticks.
    #[arg(long)]
    realtime: bool,

    /// Echo stdin lines through the UART receiver instead of reporting.
    #[arg(long, conflicts_with = "file")]
    echo: bool,
}

/// Milliseconds since start, from the host monotonic clock.
struct HostClock {
    start: Instant,
}

impl Clock for HostClock {
    fn now(&self) -> Tick {
        // Truncation gives the same wraparound as the hardware counter.
        self.start.elapsed().as_millis() as Tick
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    if args.echo {
        let uart = Transport::new(SimUart::new());
        if let Err(e) = uart.init() {
            eprintln!("Error: UART init failed: {e}");
            return ExitCode::FAILURE;
        }
        return match echo(&uart) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {e}");
                ExitCode::FAILURE
            }
        };
    }

    let payload = match &args.file {
        Some(path) => match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("Error: Unable to read file '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => DEFAULT_PAYLOAD.as_bytes().to_vec(),
    };

    let config = PipelineConfig {
        pacing_ms: args.pacing_ms,
        mode: if args.strict {
            Mode::Strict
        } else {
            Mode::Lenient
        },
    };

    let uart = Transport::new(SimUart::new());
    if let Err(e) = uart.init() {
        eprintln!("Error: UART init failed: {e}");
        return ExitCode::FAILURE;
    }

    let parsed = if args.realtime {
        let clock = HostClock {
            start: Instant::now(),
        };
        run(&payload, config, &uart, &clock, || {
            std::thread::sleep(std::time::Duration::from_millis(1))
        })
    } else {
        let ticks = TickSource::new();
        run(&payload, config, &uart, &ticks, || ticks.on_tick())
    };

    if parsed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Service the pipeline, the UART interrupt and the tick until the report is
/// complete. Returns whether the payload parsed.
fn run<C: Clock>(
    payload: &[u8],
    config: PipelineConfig,
    uart: &Transport<SimUart>,
    clock: &C,
    mut tick: impl FnMut(),
) -> bool {
    let mut pipeline: Pipeline<'_, _, _> = Pipeline::with_config(payload, uart, clock, config);
    let mut stdout = std::io::stdout().lock();

    while pipeline.phase() != Phase::Complete {
        pipeline.advance();
        uart.on_interrupt();
        tick();

        let sent = uart.with_hw(|hw| hw.take_sent());
        if !sent.is_empty() {
            let _ = stdout.write_all(&sent);
            let _ = stdout.flush();
        }
    }

    // Flush the last line out of the transmitter.
    while uart.drain_tx() > 0 {}
    let sent = uart.with_hw(|hw| hw.take_sent());
    let _ = stdout.write_all(&sent);

    log::info!("{} lines sent", pipeline.transmissions());
    matches!(pipeline.parse_result(), Some(Ok(_)))
}

/// Feed each stdin line to the receiver and print the echo. Lines longer
/// than the receive buffer come back in pieces.
fn echo(uart: &Transport<SimUart>) -> std::io::Result<()> {
    let mut echo = Echo::new(uart);
    let mut stdout = std::io::stdout().lock();

    for line in std::io::stdin().lock().lines() {
        let mut bytes = line?.into_bytes();
        bytes.push(b'\n');

        let mut rest = bytes.as_slice();
        while !rest.is_empty() {
            echo.advance();
            let taken = uart.feed(rest);
            rest = &rest[taken..];
            echo.advance();

            uart.drain_tx();
            stdout.write_all(&uart.with_hw(|hw| hw.take_sent()))?;
        }
        stdout.flush()?;
    }

    log::info!("{} lines echoed", echo.echoed());
    Ok(())
}
