use anyhow::{bail, Context};
use clap::Parser;
use std::io;
use std::time::{Duration, Instant};
use telemetry::receiver::{autodetect_port, parse_line, parse_quaternion, Line, TelemetryReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Connect to a telemetry stream and print what arrives.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Serial port (auto-detected if omitted)
    #[arg(long)]
    port: Option<String>,

    #[arg(long, default_value_t = 115_200)]
    baud: u32,

    /// Give up if no sample arrives within this many seconds
    #[arg(long, default_value_t = 10.0)]
    wait_secs: f64,

    /// Stop after this many samples (0 reads forever)
    #[arg(long, default_value_t = 0)]
    count: u64,

    /// Print every raw line as received
    #[arg(long)]
    raw: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let port = match args.port {
        Some(port) => port,
        None => autodetect_port()?.context("no serial ports found")?,
    };
    info!(port = %port, baud = args.baud, "connecting");

    let mut reader = TelemetryReader::open(&port, args.baud, Duration::from_secs(1))
        .with_context(|| format!("opening {port}"))?;
    let wait = Duration::from_secs_f64(args.wait_secs);
    let started = Instant::now();
    let mut samples = 0u64;

    loop {
        let Some(line) = reader.read_line()? else {
            if samples == 0 && started.elapsed() > wait {
                bail!(
                    "no data from {} after {:?}; check power, the sketch, and that the baud rate is {}",
                    reader.port_name(),
                    wait,
                    args.baud
                );
            }
            continue;
        };
        if line.is_empty() {
            continue;
        }
        if args.raw {
            println!("{line}");
        }

        match parse_line(&line) {
            Line::Header => info!("stream header received"),
            Line::Record(record) => {
                let q = record.orientation;
                let w = record.angular_rate;
                println!(
                    "t={:>10}us q=({:.6}, {:.6}, {:.6}, {:.6}) w=({:.6}, {:.6}, {:.6})",
                    record.timestamp.as_micros(), q.w, q.x, q.y, q.z, w.x, w.y, w.z
                );
                samples += 1;
            }
            Line::Other(text) => match parse_quaternion(&text) {
                Ok(q) => {
                    println!("quaternion: w={:.6}, x={:.6}, y={:.6}, z={:.6}", q.w, q.x, q.y, q.z);
                    samples += 1;
                }
                Err(_) => warn!(line = %text, "device says"),
            },
        }

        if args.count > 0 && samples >= args.count {
            info!(samples, "done");
            return Ok(());
        }
    }
}
