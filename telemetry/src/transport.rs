//! Write-only byte sink for encoded frames.

use serialport::SerialPort;
use std::io::{self, Write};
use std::time::Duration;
use tracing::debug;

/// Wraps any `Write` and hands it whole, flushed lines.
pub struct Transport<W: Write> {
    sink: W,
    // A previous write stopped mid-line.
    partial: bool,
}

impl<W: Write> Transport<W> {
    pub fn new(sink: W) -> Self {
        Transport { sink, partial: false }
    }

    /// Writes `frame` and flushes before returning, so nothing is pipelined
    /// into the next tick. After a failed write the next frame starts on a
    /// fresh line, keeping a cut-off record from swallowing the following one.
    /// A frame the sink refused outright leaves nothing to terminate.
    pub fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        if self.partial {
            self.sink.write_all(b"\n")?;
            self.partial = false;
        }
        let mut written = 0;
        let result = loop {
            if written == frame.len() {
                break self.sink.flush();
            }
            match self.sink.write(&frame[written..]) {
                Ok(0) => {
                    break Err(io::Error::new(io::ErrorKind::WriteZero, "sink accepted no bytes"))
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => break Err(e),
            }
        };
        if result.is_err() && written > 0 && written < frame.len() {
            self.partial = true;
        }
        result
    }

    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

/// A write that ran out of time is a lost frame, not a dead link.
pub fn is_dropped_frame(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

pub fn open_serial(
    port_name: &str,
    baud_rate: u32,
    write_timeout: Duration,
) -> Result<Box<dyn SerialPort>, serialport::Error> {
    let port = serialport::new(port_name, baud_rate)
        .timeout(write_timeout)
        .open()?;
    debug!(port = port_name, baud_rate, "opened serial transport");
    Ok(port)
}
