#![allow(dead_code)]

use std::io::{self, Write};
use telemetry::{BusConfig, DeviceError, DeviceSession, Quaternion, Vector3};

/// A session whose orientation reads fail at chosen indices.
pub struct Scripted {
    pub reads: usize,
    pub fail_on: Vec<usize>,
}

impl Scripted {
    pub fn failing_on(fail_on: &[usize]) -> Self {
        Scripted { reads: 0, fail_on: fail_on.to_vec() }
    }
}

impl DeviceSession for Scripted {
    fn open(_config: &BusConfig) -> Result<Self, DeviceError> {
        Ok(Scripted::failing_on(&[]))
    }

    fn read_orientation(&mut self) -> Result<Quaternion, DeviceError> {
        let index = self.reads;
        self.reads += 1;
        if self.fail_on.contains(&index) {
            return Err(DeviceError::TransientReadFailure(format!("scripted failure {index}")));
        }
        Ok(Quaternion::IDENTITY)
    }

    fn read_angular_rate(&mut self) -> Result<Vector3, DeviceError> {
        Ok(Vector3::new(0.0, 0.0, 0.125))
    }
}

/// A bus with nothing on it.
pub struct Absent;

impl DeviceSession for Absent {
    fn open(config: &BusConfig) -> Result<Self, DeviceError> {
        Err(DeviceError::DeviceNotDetected(format!("no ack at {:#04x}", config.address)))
    }

    fn read_orientation(&mut self) -> Result<Quaternion, DeviceError> {
        unreachable!("never opened")
    }

    fn read_angular_rate(&mut self) -> Result<Vector3, DeviceError> {
        unreachable!("never opened")
    }
}

/// Accepts `frames` whole writes, then fails every write with `kind`.
pub struct FailingSink {
    pub written: Vec<u8>,
    pub frames: usize,
    pub kind: io::ErrorKind,
}

impl FailingSink {
    pub fn after(frames: usize, kind: io::ErrorKind) -> Self {
        FailingSink { written: Vec::new(), frames, kind }
    }
}

impl Write for FailingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.frames == 0 {
            return Err(io::Error::new(self.kind, "sink refused"));
        }
        self.frames -= 1;
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes).lines().map(str::to_string).collect()
}
