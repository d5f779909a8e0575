use crate::scheduler::Idle;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use telemetry_traits::BusConfig;
use thiserror::Error;

/// Timebase ticks per second.
pub const MICROS_PER_SECOND: u32 = 1_000_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("sampling rate must be at least 1 Hz")]
    ZeroRate,
    #[error("sampling rate {0} Hz exceeds the 1 MHz timebase")]
    RateTooHigh(u32),
    #[error("idle sleep of {sleep_us} us is too long for a {period_us} us period")]
    IdleSleepTooLong { sleep_us: u64, period_us: u32 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum IdleStrategy {
    /// Busy-poll the timebase
    #[default]
    Spin,
    /// Yield the thread between polls
    Yield,
    /// Sleep `sleep_us` between polls
    Sleep,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SamplingConfig {
    pub rate_hz: u32,
    pub idle: IdleStrategy,
    pub sleep_us: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        SamplingConfig { rate_hz: 100, idle: IdleStrategy::Spin, sleep_us: 50 }
    }
}

impl SamplingConfig {
    /// `1_000_000 / rate_hz`, truncated.
    pub fn period_us(&self) -> Result<u32, ConfigError> {
        match self.rate_hz {
            0 => Err(ConfigError::ZeroRate),
            rate if rate > MICROS_PER_SECOND => Err(ConfigError::RateTooHigh(rate)),
            rate => Ok(MICROS_PER_SECOND / rate),
        }
    }

    /// Sleeping is capped at a tenth of the period.
    pub fn idle(&self) -> Result<Idle, ConfigError> {
        let period_us = self.period_us()?;
        Ok(match self.idle {
            IdleStrategy::Spin => Idle::Spin,
            IdleStrategy::Yield => Idle::Yield,
            IdleStrategy::Sleep => {
                if self.sleep_us.saturating_mul(10) > u64::from(period_us) {
                    return Err(ConfigError::IdleSleepTooLong { sleep_us: self.sleep_us, period_us });
                }
                Idle::Sleep(Duration::from_micros(self.sleep_us))
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportConfig {
    /// Serial device to stream to. Standard output when unset.
    pub port: Option<String>,
    pub baud: u32,
    pub write_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig { port: None, baud: 115_200, write_timeout_ms: 50 }
    }
}

impl TransportConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    pub bus: BusConfig,
    pub sampling: SamplingConfig,
    pub transport: TransportConfig,
}

impl TelemetryConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Checks everything that can be checked before touching hardware.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sampling.idle().map(|_| ())
    }
}
