use anyhow::{bail, Context};
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use telemetry::transport::open_serial;
use telemetry::{
    BusConfig, DeviceError, DeviceSession, IdleStrategy, MonotonicTimebase, SimulatedImu,
    Streamer, TelemetryConfig, Timestamp, Transport,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Sample an IMU at a fixed rate and stream orientation and angular rate as CSV.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// TOML file with [bus], [sampling] and [transport] sections
    #[arg(long)]
    config: Option<PathBuf>,

    /// I2C bus device
    #[arg(long)]
    bus: Option<String>,

    /// Device address, decimal or 0x-prefixed hex
    #[arg(long, value_parser = parse_address)]
    address: Option<u16>,

    /// Bus clock rate in Hz (informational)
    #[arg(long)]
    bus_clock: Option<u32>,

    /// Keep the device on its internal oscillator
    #[arg(long)]
    no_external_crystal: bool,

    /// Samples per second
    #[arg(long)]
    rate: Option<u32>,

    /// What to do between polls of the timebase
    #[arg(long, value_enum)]
    idle: Option<IdleStrategy>,

    /// Sleep between polls when --idle=sleep, in microseconds
    #[arg(long)]
    sleep_us: Option<u64>,

    /// Serial port to stream to (standard output if omitted)
    #[arg(long)]
    port: Option<String>,

    #[arg(long)]
    baud: Option<u32>,

    /// Use a simulated IMU instead of the BNO055
    #[arg(long)]
    simulate: bool,

    /// Simulated yaw rate in rad/s
    #[arg(long, default_value_t = telemetry::sim::DEFAULT_YAW_RATE)]
    simulate_yaw_rate: f64,

    /// Fail every Nth simulated orientation read (0 disables)
    #[arg(long, default_value_t = 0)]
    simulate_dropouts: u32,

    /// Initial timebase value in microseconds, to exercise the counter wrap
    #[arg(long, default_value_t = 0)]
    start_micros: u32,
}

fn parse_address(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid address {s:?}: {e}"))
}

impl Args {
    fn into_config(self) -> anyhow::Result<(TelemetryConfig, Args)> {
        let mut config = match &self.config {
            Some(path) => TelemetryConfig::from_file(path)?,
            None => TelemetryConfig::default(),
        };
        let bus = &mut config.bus;
        if let Some(path) = &self.bus {
            bus.path = path.clone();
        }
        if let Some(address) = self.address {
            bus.address = address;
        }
        if let Some(clock) = self.bus_clock {
            bus.clock_hz = clock;
        }
        if self.no_external_crystal {
            bus.external_crystal = false;
        }
        if let Some(rate) = self.rate {
            config.sampling.rate_hz = rate;
        }
        if let Some(idle) = self.idle {
            config.sampling.idle = idle;
        }
        if let Some(sleep_us) = self.sleep_us {
            config.sampling.sleep_us = sleep_us;
        }
        if let Some(port) = &self.port {
            config.transport.port = Some(port.clone());
        }
        if let Some(baud) = self.baud {
            config.transport.baud = baud;
        }
        config.validate()?;
        Ok((config, self))
    }
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout may be the data stream.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let (config, args) = Args::parse().into_config()?;

    let sink: Box<dyn Write> = match &config.transport.port {
        Some(port) => {
            let serial = open_serial(port, config.transport.baud, config.transport.write_timeout())
                .with_context(|| format!("opening {port}"))?;
            info!(port = %port, baud = config.transport.baud, "streaming to serial port");
            Box::new(serial)
        }
        None => Box::new(io::stdout().lock()),
    };
    let timebase = MonotonicTimebase::starting_at(Timestamp::from_micros(args.start_micros));

    if args.simulate {
        let imu = SimulatedImu::new(args.simulate_yaw_rate).with_dropouts(args.simulate_dropouts);
        stream(&config, sink, timebase, move |_| Ok(imu))
    } else {
        stream_hardware(&config, sink, timebase)
    }
}

#[cfg(target_os = "linux")]
fn stream_hardware(
    config: &TelemetryConfig,
    sink: Box<dyn Write>,
    timebase: MonotonicTimebase,
) -> anyhow::Result<()> {
    stream(config, sink, timebase, telemetry::Bno055::open)
}

#[cfg(not(target_os = "linux"))]
fn stream_hardware(
    _config: &TelemetryConfig,
    _sink: Box<dyn Write>,
    _timebase: MonotonicTimebase,
) -> anyhow::Result<()> {
    bail!("BNO055 access needs Linux I2C; run with --simulate on this platform")
}

fn stream<S, F>(
    config: &TelemetryConfig,
    sink: Box<dyn Write>,
    timebase: MonotonicTimebase,
    open: F,
) -> anyhow::Result<()>
where
    S: DeviceSession,
    F: FnOnce(&BusConfig) -> Result<S, DeviceError>,
{
    let mut streamer: Streamer<S, _, _> =
        Streamer::from_config(timebase, Transport::new(sink), &config.sampling)?;

    let result = streamer
        .start_with(|| open(&config.bus))
        .and_then(|()| streamer.run());

    let stats = streamer.stats();
    error!(
        state = %streamer.state(),
        emitted = stats.emitted,
        skipped = stats.skipped,
        dropped = stats.dropped,
        late = stats.late,
        max_lateness_us = stats.max_lateness_us,
        "streamer stopped"
    );
    match result {
        Ok(()) => bail!("streamer stopped without an error"),
        Err(e) => Err(e).context("telemetry stream halted"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_parse_in_hex_and_decimal() {
        assert_eq!(parse_address("0x28"), Ok(0x28));
        assert_eq!(parse_address("41"), Ok(41));
        assert!(parse_address("0xZZ").is_err());
    }

    #[test]
    fn flags_override_file_defaults() {
        let args = Args::parse_from([
            "stream_telemetry",
            "--rate",
            "200",
            "--address",
            "0x29",
            "--no-external-crystal",
        ]);
        let (config, _) = args.into_config().unwrap();
        assert_eq!(config.sampling.rate_hz, 200);
        assert_eq!(config.bus.address, 0x29);
        assert!(!config.bus.external_crystal);
        assert_eq!(config.transport.port, None);
    }

    #[test]
    fn zero_rate_is_rejected_up_front() {
        let args = Args::parse_from(["stream_telemetry", "--rate", "0"]);
        assert!(args.into_config().is_err());
    }
}
