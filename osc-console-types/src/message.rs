use std::fmt;

use serde::{Deserialize, Serialize};

/// A single OSC argument as the console understands it.
///
/// Narrower than the wire format: every wire type is mapped onto one of
/// these four so that a record always has one argument per type tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OscArg {
    Int(i64),
    Float(f64),
    Str(String),
    Blob(Vec<u8>),
}

impl fmt::Display for OscArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OscArg::Int(v) => write!(f, "{}", v),
            // Debug keeps the decimal point on whole values ("2.0", not "2")
            OscArg::Float(v) => write!(f, "{:?}", v),
            OscArg::Str(s) => f.write_str(s),
            OscArg::Blob(bytes) => {
                for b in bytes {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}

/// One OSC message as received from the network or read back from a log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub address: String,
    /// One type code per entry in `args`.
    pub type_tags: String,
    pub args: Vec<OscArg>,
    /// `host:port` of the sender, or the label recorded in a log file.
    pub source: String,
}

impl MessageRecord {
    pub fn new(
        address: impl Into<String>,
        type_tags: impl Into<String>,
        args: Vec<OscArg>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            type_tags: type_tags.into(),
            args,
            source: source.into(),
        }
    }

    /// Arguments joined the way they are written to the message log.
    pub fn joined_args(&self) -> String {
        self.args
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A timestamped message parsed from a log file. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Seconds since local midnight.
    pub timestamp: f64,
    pub message: MessageRecord,
}

impl LogEvent {
    pub fn new(timestamp: f64, message: MessageRecord) -> Self {
        Self { timestamp, message }
    }
}
