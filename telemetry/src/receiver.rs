//! Host side of the link: find the board, read its lines, pull samples out.

use crate::encoder::{FIELD_COUNT, HEADER};
use crate::sampler::TelemetryRecord;
use crate::timebase::Timestamp;
use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::io::{self, BufRead, BufReader};
use std::thread;
use std::time::{Duration, Instant};
use telemetry_traits::{Quaternion, Vector3};
use thiserror::Error;
use tracing::debug;

/// Substrings that mark a port as a likely microcontroller bridge.
const PORT_HINTS: [&str; 4] = ["arduino", "usb", "cp210x", "ch340"];

#[derive(Debug, Error)]
pub enum ReceiverError {
    #[error("serial port: {0}")]
    Serial(#[from] serialport::Error),
    #[error("read failed: {0}")]
    Io(#[from] io::Error),
    #[error("no sample within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },
    #[error("bad field {index}: {value:?}")]
    BadField { index: usize, value: String },
    #[error("expected 4 numbers, found {0}")]
    TooFewNumbers(usize),
}

/// A classified line from the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    Header,
    Record(TelemetryRecord),
    /// Diagnostics, boot noise, partial lines.
    Other(String),
}

pub fn parse_line(line: &str) -> Line {
    let trimmed = line.trim();
    if trimmed == HEADER.trim_end() {
        return Line::Header;
    }
    match decode_record(trimmed) {
        Ok(record) => Line::Record(record),
        Err(_) => Line::Other(trimmed.to_string()),
    }
}

/// Strict inverse of the encoder: a timestamp followed by seven floats.
pub fn decode_record(line: &str) -> Result<TelemetryRecord, DecodeError> {
    let fields: Vec<&str> = line.trim().split(',').collect();
    if fields.len() != FIELD_COUNT {
        return Err(DecodeError::FieldCount { expected: FIELD_COUNT, found: fields.len() });
    }
    let bad = |index: usize| DecodeError::BadField { index, value: fields[index].to_string() };

    let timestamp = fields[0].parse::<u32>().map_err(|_| bad(0))?;
    let mut values = [0.0f64; FIELD_COUNT - 1];
    for (i, value) in values.iter_mut().enumerate() {
        *value = fields[i + 1].parse::<f64>().map_err(|_| bad(i + 1))?;
    }

    Ok(TelemetryRecord {
        timestamp: Timestamp::from_micros(timestamp),
        orientation: Quaternion::new(values[0], values[1], values[2], values[3]),
        angular_rate: Vector3::new(values[4], values[5], values[6]),
    })
}

/// Lenient extraction: the first four numbers on the line, as `(w, x, y, z)`.
///
/// Accepts anything that carries a quaternion up front, including lines from
/// older firmware without a timestamp.
pub fn parse_quaternion(line: &str) -> Result<Quaternion, DecodeError> {
    if let Ok(record) = decode_record(line) {
        return Ok(record.orientation);
    }
    let numbers: Vec<f64> = numbers(line).take(4).collect();
    match numbers[..] {
        [w, x, y, z] => Ok(Quaternion::new(w, x, y, z)),
        _ => Err(DecodeError::TooFewNumbers(numbers.len())),
    }
}

/// Numeric tokens in `line`: optional sign, digits, optional fraction and exponent.
fn numbers(line: &str) -> impl Iterator<Item = f64> + '_ {
    let bytes = line.as_bytes();
    let mut pos = 0;
    std::iter::from_fn(move || {
        while pos < bytes.len() {
            let start = pos;
            let mut end = pos;
            if matches!(bytes[end], b'+' | b'-') {
                end += 1;
            }
            let digits = count_digits(&bytes[end..]);
            if digits == 0 {
                pos = start + 1;
                continue;
            }
            end += digits;
            if bytes.get(end) == Some(&b'.') {
                let fraction = count_digits(&bytes[end + 1..]);
                if fraction > 0 {
                    end += 1 + fraction;
                }
            }
            if matches!(bytes.get(end), Some(b'e' | b'E')) {
                let mut exp = end + 1;
                if matches!(bytes.get(exp), Some(b'+' | b'-')) {
                    exp += 1;
                }
                let exp_digits = count_digits(&bytes[exp.min(bytes.len())..]);
                if exp_digits > 0 {
                    end = exp + exp_digits;
                }
            }
            pos = end;
            if let Ok(value) = line[start..end].parse::<f64>() {
                return Some(value);
            }
        }
        None
    })
}

fn count_digits(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_digit()).count()
}

/// Picks the port most likely to be the board, else the first one listed.
pub fn pick_port(ports: &[SerialPortInfo]) -> Option<String> {
    ports
        .iter()
        .find(|port| {
            let description = port_description(port).to_lowercase();
            PORT_HINTS.iter().any(|hint| description.contains(hint))
        })
        .or_else(|| ports.first())
        .map(|port| port.port_name.clone())
}

fn port_description(port: &SerialPortInfo) -> String {
    match &port.port_type {
        SerialPortType::UsbPort(usb) => format!(
            "usb {} {} {}",
            port.port_name,
            usb.manufacturer.as_deref().unwrap_or_default(),
            usb.product.as_deref().unwrap_or_default()
        ),
        _ => port.port_name.clone(),
    }
}

pub fn autodetect_port() -> Result<Option<String>, ReceiverError> {
    let ports = serialport::available_ports()?;
    for port in &ports {
        debug!(port = %port.port_name, description = %port_description(port), "found serial port");
    }
    Ok(pick_port(&ports))
}

/// Line reader over a serial link to the streamer.
pub struct TelemetryReader {
    port_name: String,
    reader: BufReader<Box<dyn SerialPort>>,
    // Bytes of a line cut short by the read timeout.
    pending: Vec<u8>,
}

impl TelemetryReader {
    /// Opens `port_name` and pulses DTR, which resets most boards so the
    /// stream starts from its header.
    pub fn open(port_name: &str, baud_rate: u32, timeout: Duration) -> Result<Self, ReceiverError> {
        let mut port = serialport::new(port_name, baud_rate).timeout(timeout).open()?;
        // Not every adapter wires DTR; a missing reset is harmless.
        if let Err(e) = reset_board(port.as_mut()) {
            debug!(error = %e, "DTR reset not supported");
        }
        Ok(TelemetryReader {
            port_name: port_name.to_string(),
            reader: BufReader::new(port),
            pending: Vec::new(),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Next line without its terminator. `None` when the port timed out
    /// before a whole line arrived; the part already read is kept for the
    /// next call.
    pub fn read_line(&mut self) -> Result<Option<String>, ReceiverError> {
        Ok(next_line(&mut self.reader, &mut self.pending)?)
    }

    /// Blocks until a line yields a quaternion, or `timeout` passes.
    pub fn read_quaternion(&mut self, timeout: Option<Duration>) -> Result<Quaternion, ReceiverError> {
        let start = Instant::now();
        loop {
            if let Some(line) = self.read_line()? {
                if let Ok(q) = parse_quaternion(&line) {
                    return Ok(q);
                }
            }
            if let Some(limit) = timeout {
                if start.elapsed() > limit {
                    return Err(ReceiverError::Timeout(limit));
                }
            }
        }
    }
}

fn next_line<R: BufRead>(reader: &mut R, pending: &mut Vec<u8>) -> io::Result<Option<String>> {
    match reader.read_until(b'\n', pending) {
        Ok(_) if pending.ends_with(b"\n") => {
            let line = String::from_utf8_lossy(pending).trim().to_string();
            pending.clear();
            Ok(Some(line))
        }
        Ok(_) => Ok(None),
        Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
        Err(e) => Err(e),
    }
}

fn reset_board(port: &mut dyn SerialPort) -> Result<(), serialport::Error> {
    port.write_data_terminal_ready(false)?;
    thread::sleep(Duration::from_millis(50));
    port.write_data_terminal_ready(true)?;
    thread::sleep(Duration::from_millis(200));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode_line;
    use serialport::UsbPortInfo;

    #[test]
    fn classifies_header_records_and_noise() {
        assert_eq!(parse_line(HEADER), Line::Header);
        assert_eq!(
            parse_line(crate::streamer::NOT_DETECTED_MESSAGE),
            Line::Other("No IMU detected. Check wiring or bus address!".into())
        );
        let record = TelemetryRecord {
            timestamp: Timestamp::from_micros(12_345),
            orientation: Quaternion::new(0.5, -0.5, 0.5, -0.5),
            angular_rate: Vector3::new(0.25, 0.0, -1.5),
        };
        assert_eq!(parse_line(&encode_line(&record)), Line::Record(record));
    }

    #[test]
    fn truncated_record_is_noise() {
        assert!(matches!(parse_line("1000,1.00000000,0.000"), Line::Other(_)));
        assert_eq!(
            decode_record("x,1,2,3,4,5,6,7"),
            Err(DecodeError::BadField { index: 0, value: "x".into() })
        );
    }

    #[test]
    fn quaternion_from_free_text() {
        let q = parse_quaternion("qW: 0.9994 qX: -0.0012 qY: 1e-3 qZ: +0.0349").unwrap();
        assert_eq!(q, Quaternion::new(0.9994, -0.0012, 1e-3, 0.0349));
        assert_eq!(parse_quaternion("only 1 2 3"), Err(DecodeError::TooFewNumbers(3)));
    }

    #[test]
    fn quaternion_from_record_skips_timestamp() {
        let q = parse_quaternion(
            "1000,1.00000000,0.00000000,0.00000000,0.00000000,0.00000000,0.00000000,0.00000000",
        )
        .unwrap();
        assert_eq!(q, Quaternion::IDENTITY);
    }

    /// Hands out one chunk per read; `None` is a read timeout.
    struct Trickle(std::collections::VecDeque<Option<&'static [u8]>>);

    impl io::Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.pop_front() {
                Some(Some(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(chunk);
                    Ok(chunk.len())
                }
                Some(None) => Err(io::Error::new(io::ErrorKind::TimedOut, "no data")),
                None => Ok(0),
            }
        }
    }

    #[test]
    fn line_split_by_timeout_is_reassembled() {
        let chunks = [Some(&b"7,0.5,"[..]), None, Some(&b"0.5,0.5,0.5\n"[..])];
        let mut reader = BufReader::new(Trickle(chunks.into_iter().collect()));
        let mut pending = Vec::new();

        assert_eq!(next_line(&mut reader, &mut pending).unwrap(), None);
        assert_eq!(
            next_line(&mut reader, &mut pending).unwrap().as_deref(),
            Some("7,0.5,0.5,0.5,0.5")
        );
        assert!(pending.is_empty());
        assert_eq!(next_line(&mut reader, &mut pending).unwrap(), None);
    }

    fn usb(name: &str, product: &str) -> SerialPortInfo {
        SerialPortInfo {
            port_name: name.to_string(),
            port_type: SerialPortType::UsbPort(UsbPortInfo {
                vid: 0x2341,
                pid: 0x0043,
                serial_number: None,
                manufacturer: None,
                product: Some(product.to_string()),
            }),
        }
    }

    #[test]
    fn prefers_hinted_ports() {
        let ports = vec![
            SerialPortInfo { port_name: "/dev/ttyS0".into(), port_type: SerialPortType::Unknown },
            usb("/dev/ttyACM0", "Arduino Uno"),
        ];
        assert_eq!(pick_port(&ports).as_deref(), Some("/dev/ttyACM0"));

        let plain = vec![SerialPortInfo {
            port_name: "/dev/ttyS1".into(),
            port_type: SerialPortType::Unknown,
        }];
        assert_eq!(pick_port(&plain).as_deref(), Some("/dev/ttyS1"));
        assert_eq!(pick_port(&[]), None);
    }
}
