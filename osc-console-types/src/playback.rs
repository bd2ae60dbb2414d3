use serde::{Deserialize, Serialize};

/// Transport state of the log player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn name(self) -> &'static str {
        match self {
            PlaybackState::Stopped => "stopped",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
        }
    }
}

/// User-adjustable replay window, in seconds since midnight.
///
/// Defaults to `[first event, last event + 1s]` when a log is opened.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PlaybackWindow {
    pub requested_start: f64,
    pub requested_end: f64,
}

impl PlaybackWindow {
    pub fn new(requested_start: f64, requested_end: f64) -> Self {
        Self {
            requested_start,
            requested_end,
        }
    }
}

/// Which side owns message input: the network listener or the log player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    Live,
    Playback,
}

impl Mode {
    pub fn name(self) -> &'static str {
        match self {
            Mode::Live => "live",
            Mode::Playback => "playback",
        }
    }
}
