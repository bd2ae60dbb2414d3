#![allow(dead_code)]
//! Test harness utilities for osc-console-core integration tests.

use std::net::{SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use osc_console_core::transport::encode_record;
use osc_console_core::{Diagnostics, LogPlayer, ManualClock};
use osc_console_types::{MessageRecord, OscArg};

/// Screen diagnostics captured for assertions.
#[derive(Default)]
pub struct ScreenCapture {
    lines: Mutex<Vec<String>>,
}

impl ScreenCapture {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn contains(&self, text: &str) -> bool {
        self.lines().iter().any(|l| l == text)
    }
}

impl Diagnostics for ScreenCapture {
    fn screen(&self, text: &str) {
        self.lines.lock().unwrap().push(text.to_string());
    }
}

/// Dispatched messages with their time override.
pub type Dispatched = Arc<Mutex<Vec<(MessageRecord, Option<f64>)>>>;

/// A player on a manual clock, with dispatches and screen output captured.
pub fn manual_player() -> (LogPlayer, Arc<ManualClock>, Arc<ScreenCapture>, Dispatched) {
    let clock = Arc::new(ManualClock::new());
    let screen = Arc::new(ScreenCapture::default());
    let player = LogPlayer::new(clock.clone(), screen.clone());
    let dispatched: Dispatched = Arc::new(Mutex::new(Vec::new()));
    let d = Arc::clone(&dispatched);
    player.set_message_handler(Arc::new(move |rec: &MessageRecord, t: Option<f64>| {
        d.lock().unwrap().push((rec.clone(), t));
    }));
    (player, clock, screen, dispatched)
}

pub fn addresses(dispatched: &Dispatched) -> Vec<String> {
    dispatched
        .lock()
        .unwrap()
        .iter()
        .map(|(rec, _)| rec.address.clone())
        .collect()
}

/// Check `cursor == #events before current time`.
pub fn assert_cursor_invariant(player: &LogPlayer) {
    assert_eq!(
        player.cursor_index(),
        player.events_before_current_time(),
        "cursor out of step at t={}",
        player.current_time()
    );
}

/// Send one OSC message to `dest` from an ephemeral socket.
pub fn send_osc(dest: SocketAddr, address: &str, args: Vec<OscArg>) {
    let tags: String = args
        .iter()
        .map(|a| match a {
            OscArg::Int(_) => 'i',
            OscArg::Float(_) => 'f',
            OscArg::Str(_) => 's',
            OscArg::Blob(_) => 'b',
        })
        .collect();
    let record = MessageRecord::new(address, tags, args, "test");
    let bytes = encode_record(&record).unwrap();
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.send_to(&bytes, dest).unwrap();
}

/// Poll `check` until it returns true or `timeout` passes.
pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    check()
}

/// Reserve a free UDP port on loopback (released before returning).
pub fn free_port() -> u16 {
    UdpSocket::bind("127.0.0.1:0")
        .and_then(|s| s.local_addr())
        .map(|a| a.port())
        .unwrap()
}
