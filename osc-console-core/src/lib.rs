//! Core of the OSC diagnostic console: live capture, log replay and forwarding.
//!
//! Live mode receives OSC over UDP and records each message to the
//! [`MessageSink`]. Playback mode parses a saved log and replays it through
//! the [`LogPlayer`] at the original pace. Either source can be forwarded
//! to another host. [`Console`] coordinates the two modes.

use std::sync::Arc;

use osc_console_types::MessageRecord;

pub mod clock;
pub mod config;
pub mod console;
pub mod error;
pub mod forwarder;
pub mod listener;
pub mod log_format;
pub mod observable;
pub mod parser;
pub mod player;
pub mod sink;
pub mod ticker;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use console::Console;
pub use error::{ConsoleError, ConsoleResult, TransportError, TransportResult};
pub use forwarder::{AsyncForwarder, ForwarderHandle};
pub use listener::OscListener;
pub use player::LogPlayer;
pub use sink::{Diagnostics, MessageSink};
pub use ticker::PlaybackTicker;
pub use transport::{OscTransport, RecordingTransport, UdpTransport};

/// Receives each message with an optional recorded timestamp.
/// `None` means "now"; replayed messages carry their original time.
pub type MessageHandler = Arc<dyn Fn(&MessageRecord, Option<f64>) + Send + Sync>;
