//! Line-oriented CSV wire format.
//!
//! ```text
//! Timestamp, Q.W, Q.X, Q.Y, Q.Z, W.X, W.Y, W.Z
//! 1000,1.00000000,0.00000000,0.00000000,0.00000000,0.00000000,0.00000000,0.00000000
//! ```

use crate::sampler::TelemetryRecord;

/// Written once, right after the session becomes ready.
pub const HEADER: &str = "Timestamp, Q.W, Q.X, Q.Y, Q.Z, W.X, W.Y, W.Z\n";

/// Digits after the decimal point for every float field.
pub const PRECISION: usize = 8;

/// Number of comma-separated fields in a data line.
pub const FIELD_COUNT: usize = 8;

pub fn encode_line(record: &TelemetryRecord) -> String {
    let q = &record.orientation;
    let w = &record.angular_rate;
    format!(
        "{},{:.p$},{:.p$},{:.p$},{:.p$},{:.p$},{:.p$},{:.p$}\n",
        record.timestamp.as_micros(),
        q.w,
        q.x,
        q.y,
        q.z,
        w.x,
        w.y,
        w.z,
        p = PRECISION,
    )
}

pub fn encode(record: &TelemetryRecord) -> Vec<u8> {
    encode_line(record).into_bytes()
}
