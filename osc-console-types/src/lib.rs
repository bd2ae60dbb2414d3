//! # osc-console-types
//!
//! Shared data types for the OSC console: decoded message records, replay
//! log events, playback state and forwarding settings. Used by
//! osc-console-core and the text front end.

mod forwarding;
mod message;
mod playback;

pub use forwarding::ForwardingConfig;
pub use message::{LogEvent, MessageRecord, OscArg};
pub use playback::{Mode, PlaybackState, PlaybackWindow};
