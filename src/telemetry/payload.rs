//! Per-frame JSON messages.
//!
//! Keys keep the names existing dashboards subscribe to (`temps`, `angle`,
//! `theta1`, `theta2`). Output uses `", "` and `": "` separators so payloads
//! stay byte-identical to recorded runs.

use std::io;

use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;

/// Decimal places for the time and angle fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Precision {
    pub time: u32,
    pub angle: u32,
}

impl Precision {
    pub const SINGLE: Precision = Precision { time: 4, angle: 4 };
    pub const COUPLED: Precision = Precision { time: 3, angle: 2 };
}

pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FramePayload {
    Coupled { temps: f64, theta1: f64, theta2: f64 },
    Single { temps: f64, angle: f64 },
}

impl FramePayload {
    pub fn single(elapsed_seconds: f64, angle_degrees: f64, precision: Precision) -> Self {
        FramePayload::Single {
            temps: round_to(elapsed_seconds, precision.time),
            angle: round_to(angle_degrees, precision.angle),
        }
    }

    pub fn coupled(elapsed_seconds: f64, angles_degrees: [f64; 2], precision: Precision) -> Self {
        FramePayload::Coupled {
            temps: round_to(elapsed_seconds, precision.time),
            theta1: round_to(angles_degrees[0], precision.angle),
            theta2: round_to(angles_degrees[1], precision.angle),
        }
    }

    pub fn elapsed_seconds(&self) -> f64 {
        match self {
            FramePayload::Coupled { temps, .. } | FramePayload::Single { temps, .. } => *temps,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let mut out = Vec::with_capacity(64);
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, SpacedFormatter);
        self.serialize(&mut serializer)?;
        // serde_json only ever writes valid UTF-8.
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

/// Compact JSON with a space after `,` and `:`.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}
