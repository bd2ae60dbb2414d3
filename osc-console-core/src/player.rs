//! Log player: replays a parsed log against a virtual playback clock.
//!
//! The player keeps its own notion of "current time" (seconds since
//! midnight, matching the log's timestamps). Each `tick` advances it by the
//! wall-clock time elapsed since the previous tick, then dispatches every
//! event the clock has passed. The cursor always points at the first event
//! not yet dispatched: `cursor == #events with timestamp < current time`.
//!
//! `LogPlayer` is a cheap cloneable handle. State lives behind a mutex;
//! observer callbacks and message dispatch run after the mutex is released,
//! so callbacks may call back into the player. A re-entrant `tick` (from a
//! callback, or a timer firing while a tick is still running) returns
//! immediately.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use osc_console_types::{LogEvent, PlaybackState, PlaybackWindow};

use crate::clock::Clock;
use crate::error::{ConsoleError, ConsoleResult};
use crate::log_format::format_time_of_day;
use crate::observable::{ObserverList, PendingNotifications};
use crate::parser::{parse_log, ParseDiagnostic};
use crate::sink::Diagnostics;
use crate::MessageHandler;

pub const END_OF_PERIOD: &str = "Reached end of requested playback period";
pub const END_OF_LOG: &str = "Reached end of log file";

/// Something that happened while the state lock was held, delivered after release.
enum Change {
    Time(f64),
    Start(f64),
    End(f64),
    State(PlaybackState),
    Dispatch(LogEvent),
    Screen(String),
}

struct PlayerCore {
    events: Vec<LogEvent>,
    /// `None` until the first explicit seek; reads as `window.requested_start`.
    current_time: Option<f64>,
    cursor: usize,
    window: PlaybackWindow,
    state: PlaybackState,
    last_tick_wall: f64,
    first_time: f64,
    last_time: f64,
}

impl PlayerCore {
    fn new() -> Self {
        Self {
            events: Vec::new(),
            current_time: None,
            cursor: 0,
            window: PlaybackWindow::default(),
            state: PlaybackState::Stopped,
            last_tick_wall: 0.0,
            first_time: 0.0,
            last_time: 0.0,
        }
    }

    fn effective_time(&self) -> f64 {
        self.current_time.unwrap_or(self.window.requested_start)
    }

    /// Number of events strictly before `t`.
    fn count_before(&self, t: f64) -> usize {
        self.events.partition_point(|e| e.timestamp < t)
    }

    fn resync_cursor(&mut self) {
        self.cursor = self.count_before(self.effective_time());
    }

    /// Assign the current time without touching the cursor.
    fn assign_time(&mut self, t: Option<f64>, changes: &mut Vec<Change>) {
        let before = self.effective_time();
        self.current_time = t;
        let after = self.effective_time();
        if after != before {
            changes.push(Change::Time(after));
        }
    }

    fn seek(&mut self, t: Option<f64>, changes: &mut Vec<Change>) {
        self.assign_time(t, changes);
        self.resync_cursor();
    }

    fn set_start(&mut self, t: f64, changes: &mut Vec<Change>) {
        if self.window.requested_start == t {
            return;
        }
        let before = self.effective_time();
        self.window.requested_start = t;
        changes.push(Change::Start(t));
        // while unset, the current time follows the start
        let after = self.effective_time();
        if after != before {
            changes.push(Change::Time(after));
            self.resync_cursor();
        }
    }

    fn set_end(&mut self, t: f64, changes: &mut Vec<Change>) {
        if self.window.requested_end == t {
            return;
        }
        self.window.requested_end = t;
        changes.push(Change::End(t));
    }

    fn set_state(&mut self, state: PlaybackState, changes: &mut Vec<Change>) {
        if self.state != state {
            self.state = state;
            changes.push(Change::State(state));
        }
    }

    fn stop(&mut self, reason: &str, changes: &mut Vec<Change>) {
        if self.state != PlaybackState::Stopped {
            let text = if reason.is_empty() {
                "Stopping playback".to_string()
            } else {
                format!("Stopping playback: {}", reason)
            };
            log::info!(target: "player", "{}", text);
            changes.push(Change::Screen(text));
            self.set_state(PlaybackState::Stopped, changes);
        }
        self.seek(None, changes);
    }

    fn play(&mut self, now: f64, changes: &mut Vec<Change>) {
        match self.state {
            PlaybackState::Playing => {}
            PlaybackState::Stopped => {
                self.resync_cursor();
                self.last_tick_wall = now;
                self.set_state(PlaybackState::Playing, changes);
            }
            PlaybackState::Paused => {
                // don't replay the time spent paused
                self.last_tick_wall = now;
                self.set_state(PlaybackState::Playing, changes);
            }
        }
    }

    fn tick(&mut self, now: f64, changes: &mut Vec<Change>) {
        if self.state != PlaybackState::Playing {
            return;
        }
        let dt = (now - self.last_tick_wall).max(0.0);
        let t = self.effective_time() + dt;
        self.assign_time(Some(t), changes);

        while self.cursor < self.events.len() && self.events[self.cursor].timestamp < t {
            changes.push(Change::Dispatch(self.events[self.cursor].clone()));
            self.cursor += 1;
        }

        if t > self.window.requested_end {
            self.stop(END_OF_PERIOD, changes);
        } else if self.cursor >= self.events.len() {
            self.stop(END_OF_LOG, changes);
        }
        self.last_tick_wall = now;
    }
}

#[derive(Default)]
struct PlayerObservers {
    time: ObserverList<f64>,
    start: ObserverList<f64>,
    end: ObserverList<f64>,
    state: ObserverList<PlaybackState>,
    message: Option<MessageHandler>,
}

struct PlayerShared {
    core: Mutex<PlayerCore>,
    observers: Mutex<PlayerObservers>,
    ticking: AtomicBool,
    clock: Arc<dyn Clock>,
    diagnostics: Arc<dyn Diagnostics>,
}

/// Held for the duration of a tick; a second acquire fails until it drops.
struct TickGuard<'a>(&'a AtomicBool);

impl<'a> TickGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Handle to the replay engine. Clones share the same player.
#[derive(Clone)]
pub struct LogPlayer {
    shared: Arc<PlayerShared>,
}

impl LogPlayer {
    pub fn new(clock: Arc<dyn Clock>, diagnostics: Arc<dyn Diagnostics>) -> Self {
        Self {
            shared: Arc::new(PlayerShared {
                core: Mutex::new(PlayerCore::new()),
                observers: Mutex::new(PlayerObservers::default()),
                ticking: AtomicBool::new(false),
                clock,
                diagnostics,
            }),
        }
    }

    fn core(&self) -> MutexGuard<'_, PlayerCore> {
        self.shared
            .core
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn observers(&self) -> MutexGuard<'_, PlayerObservers> {
        self.shared
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` under the state lock, then deliver what it changed.
    fn mutate<R>(&self, f: impl FnOnce(&mut PlayerCore, &mut Vec<Change>) -> R) -> R {
        let mut changes = Vec::new();
        let result = {
            let mut core = self.core();
            f(&mut *core, &mut changes)
        };
        self.deliver(changes);
        result
    }

    fn deliver(&self, changes: Vec<Change>) {
        if changes.is_empty() {
            return;
        }
        let mut pending = PendingNotifications::new();
        {
            let observers = self.observers();
            for change in changes {
                match change {
                    Change::Time(t) => pending.push(observers.time.prepare(t)),
                    Change::Start(t) => pending.push(observers.start.prepare(t)),
                    Change::End(t) => pending.push(observers.end.prepare(t)),
                    Change::State(s) => pending.push(observers.state.prepare(s)),
                    Change::Dispatch(event) => {
                        if let Some(handler) = observers.message.clone() {
                            pending.defer(move || handler(&event.message, Some(event.timestamp)));
                        }
                    }
                    Change::Screen(text) => {
                        let diagnostics = Arc::clone(&self.shared.diagnostics);
                        pending.defer(move || diagnostics.screen(&text));
                    }
                }
            }
        }
        pending.fire();
    }

    // ─── Subscriptions ──────────────────────────────────────────────

    /// Receives each dispatched event with its recorded timestamp as the time override.
    pub fn set_message_handler(&self, handler: MessageHandler) {
        self.observers().message = Some(handler);
    }

    pub fn on_time_changed<F: Fn(&f64) + Send + Sync + 'static>(&self, f: F) {
        self.observers().time.subscribe(f);
    }

    pub fn on_start_changed<F: Fn(&f64) + Send + Sync + 'static>(&self, f: F) {
        self.observers().start.subscribe(f);
    }

    pub fn on_end_changed<F: Fn(&f64) + Send + Sync + 'static>(&self, f: F) {
        self.observers().end.subscribe(f);
    }

    pub fn on_state_changed<F: Fn(&PlaybackState) + Send + Sync + 'static>(&self, f: F) {
        self.observers().state.subscribe(f);
    }

    // ─── Loading ────────────────────────────────────────────────────

    /// Read and load a log file. Only a read failure is an error; problems
    /// inside the file are reported as screen diagnostics.
    pub fn open(&self, path: &Path) -> ConsoleResult {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                log::error!(target: "player", "cannot open {}: {}", path.display(), e);
                self.shared
                    .diagnostics
                    .screen(&format!("Unable to open {}: {}", path.display(), e));
                return Err(ConsoleError::Io(e));
            }
        };
        self.load(&text, &path.display().to_string());
        Ok(())
    }

    /// Load log text, replacing any previous log.
    pub fn load(&self, text: &str, label: &str) {
        self.mutate(|core, changes| {
            if core.state != PlaybackState::Stopped {
                core.stop("", changes);
            }
        });

        let diagnostics = Arc::clone(&self.shared.diagnostics);
        let parsed = parse_log(text, &mut |d: &ParseDiagnostic| diagnostics.screen(&d.to_string()));
        let count = parsed.events.len();
        log::info!(
            target: "player",
            "loaded {} events from {} ({} diagnostics)",
            count,
            label,
            parsed.diagnostics.len()
        );

        self.mutate(|core, changes| {
            core.events = parsed.events;
            core.first_time = parsed.first_time;
            core.last_time = parsed.last_time;
            core.set_start(parsed.first_time, changes);
            core.set_end(parsed.last_time, changes);
            core.seek(None, changes);
            changes.push(Change::Screen(format!(
                "Opened {}: {} events from {} to {}",
                label,
                count,
                format_time_of_day(parsed.first_time),
                format_time_of_day(parsed.last_time)
            )));
        });
    }

    // ─── Transport ──────────────────────────────────────────────────

    pub fn play(&self) {
        let now = self.shared.clock.now();
        self.mutate(|core, changes| core.play(now, changes));
    }

    /// Pause a playing log. Has no effect when stopped.
    pub fn pause(&self) {
        self.mutate(|core, changes| {
            if core.state == PlaybackState::Playing {
                core.set_state(PlaybackState::Paused, changes);
            }
        });
    }

    /// Stop and rewind to the requested start. Rewinds even if already stopped.
    pub fn stop(&self, reason: &str) {
        self.mutate(|core, changes| core.stop(reason, changes));
    }

    /// Advance virtual time and dispatch every event it passes.
    pub fn tick(&self) {
        let Some(_guard) = TickGuard::acquire(&self.shared.ticking) else {
            return;
        };
        let now = self.shared.clock.now();
        self.mutate(|core, changes| core.tick(now, changes));
    }

    // ─── Seeking ────────────────────────────────────────────────────

    pub fn set_playback_time(&self, t: f64) {
        if !t.is_finite() {
            log::warn!(target: "player", "ignoring seek to {}", t);
            return;
        }
        self.mutate(|core, changes| core.seek(Some(t), changes));
    }

    pub fn set_requested_start(&self, t: f64) {
        if !t.is_finite() {
            log::warn!(target: "player", "ignoring start {}", t);
            return;
        }
        self.mutate(|core, changes| core.set_start(t, changes));
    }

    pub fn set_requested_end(&self, t: f64) {
        if !t.is_finite() {
            log::warn!(target: "player", "ignoring end {}", t);
            return;
        }
        self.mutate(|core, changes| core.set_end(t, changes));
    }

    // ─── Queries ────────────────────────────────────────────────────

    pub fn state(&self) -> PlaybackState {
        self.core().state
    }

    pub fn current_time(&self) -> f64 {
        self.core().effective_time()
    }

    /// True until the first explicit seek after open/stop.
    pub fn is_time_unset(&self) -> bool {
        self.core().current_time.is_none()
    }

    pub fn requested_start(&self) -> f64 {
        self.core().window.requested_start
    }

    pub fn requested_end(&self) -> f64 {
        self.core().window.requested_end
    }

    pub fn window(&self) -> PlaybackWindow {
        self.core().window
    }

    /// First event time and last event time + 1s of the loaded log.
    pub fn bounds(&self) -> (f64, f64) {
        let core = self.core();
        (core.first_time, core.last_time)
    }

    pub fn cursor_index(&self) -> usize {
        self.core().cursor
    }

    pub fn event_count(&self) -> usize {
        self.core().events.len()
    }

    /// Number of events strictly before the current time.
    pub fn events_before_current_time(&self) -> usize {
        let core = self.core();
        core.count_before(core.effective_time())
    }
}
