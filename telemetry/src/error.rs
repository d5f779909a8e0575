use crate::config::ConfigError;
use crate::streamer::SessionState;
use std::io;
use telemetry_traits::DeviceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The device could not be brought up. Terminal for this process.
    #[error("startup failed: {0}")]
    Startup(#[source] DeviceError),
    #[error("transport failed: {0}")]
    Transport(#[source] io::Error),
    #[error("operation needs a ready session, state is {0}")]
    NotReady(SessionState),
}
