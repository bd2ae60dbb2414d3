//! Mode coordinator: owns the listener, the log player, the ticker and the
//! forwarder, and switches between live and playback modes.
//!
//! Exactly one message source is active at a time. Entering a mode always
//! tears down the other mode's side effects first. Both sources feed the
//! same router, which formats each message into the sink and hands it to
//! the forwarder when forwarding is on.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use osc_console_types::{ForwardingConfig, MessageRecord, Mode};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{ConsoleError, ConsoleResult};
use crate::forwarder::{AsyncForwarder, ForwarderHandle};
use crate::listener::OscListener;
use crate::log_format::{format_comment_line, format_event_line, local_time_of_day};
use crate::observable::Observable;
use crate::player::LogPlayer;
use crate::sink::{Diagnostics, MessageSink};
use crate::ticker::PlaybackTicker;
use crate::transport::{resolve, OscTransport, UdpTransport};
use crate::MessageHandler;

/// Shared by the listener thread and player dispatch.
struct MessageRouter {
    sink: Arc<MessageSink>,
    forwarder: RwLock<Option<ForwarderHandle>>,
}

impl MessageRouter {
    fn route(&self, record: &MessageRecord, time_override: Option<f64>) {
        let timestamp = time_override.unwrap_or_else(local_time_of_day);
        self.sink.append(format_event_line(timestamp, record), false);

        let forwarder = self
            .forwarder
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = forwarder.as_ref() {
            handle.send(record.clone());
        }
    }

    fn set_forwarder(&self, handle: Option<ForwarderHandle>) {
        *self
            .forwarder
            .write()
            .unwrap_or_else(PoisonError::into_inner) = handle;
    }
}

pub struct Console {
    config: Config,
    sink: Arc<MessageSink>,
    router: Arc<MessageRouter>,
    player: LogPlayer,
    listener: Option<OscListener>,
    ticker: Option<PlaybackTicker>,
    forwarder: Option<AsyncForwarder>,
    /// Used for every forwarder instead of a fresh UDP socket when set.
    transport: Option<Arc<dyn OscTransport>>,
    listen_host: String,
    mode: Observable<Mode>,
    port: Observable<u16>,
    forward_host: Observable<String>,
    forward_port: Observable<u16>,
    forwarding_enabled: Observable<bool>,
    shut_down: bool,
}

impl Console {
    pub fn new(config: Config) -> Self {
        Self::with_parts(config, Arc::new(SystemClock::new()), None)
    }

    /// Build with an explicit clock and, optionally, a shared transport for forwarding.
    pub fn with_parts(
        config: Config,
        clock: Arc<dyn Clock>,
        transport: Option<Arc<dyn OscTransport>>,
    ) -> Self {
        let sink = Arc::new(MessageSink::new(
            config.display_queue_capacity(),
            config.log_capacity(),
        ));
        let router = Arc::new(MessageRouter {
            sink: Arc::clone(&sink),
            forwarder: RwLock::new(None),
        });

        let player = LogPlayer::new(clock, sink.clone());
        let player_router = Arc::clone(&router);
        player.set_message_handler(Arc::new(move |record: &MessageRecord, t: Option<f64>| {
            player_router.route(record, t)
        }));

        let forwarding = config.forwarding();
        let listen_host = config.listen_host();
        let port = config.listen_port();

        let mut console = Self {
            sink,
            router,
            player,
            listener: None,
            ticker: None,
            forwarder: None,
            transport,
            listen_host,
            mode: Observable::new(Mode::Live),
            port: Observable::new(port),
            forward_host: Observable::new(forwarding.destination_host.clone()),
            forward_port: Observable::new(forwarding.destination_port),
            forwarding_enabled: Observable::new(false),
            shut_down: false,
            config,
        };

        if forwarding.enabled {
            if let Err(e) = console.set_forwarding_enabled(true) {
                log::warn!(target: "console", "forwarding from config not enabled: {}", e);
            }
        }
        console
    }

    // ─── Mode ───────────────────────────────────────────────────────

    pub fn mode(&self) -> Mode {
        *self.mode.get()
    }

    /// Switch message source. A no-op if the mode is already fully active;
    /// asking for live mode again after a failed bind retries the bind.
    pub fn set_mode(&mut self, mode: Mode) -> ConsoleResult {
        match mode {
            Mode::Live => {
                if self.mode() == Mode::Live && self.listener.is_some() {
                    return Ok(());
                }
                self.teardown_playback();
                self.mode.set(Mode::Live);
                self.open_listener()
            }
            Mode::Playback => {
                if self.mode() == Mode::Playback && self.ticker.is_some() {
                    return Ok(());
                }
                self.close_listener();
                self.mode.set(Mode::Playback);
                let ticker =
                    PlaybackTicker::spawn(self.player.clone(), self.config.tick_interval())?;
                self.ticker = Some(ticker);
                Ok(())
            }
        }
    }

    fn teardown_playback(&mut self) {
        self.player.stop("");
        if let Some(mut ticker) = self.ticker.take() {
            ticker.stop();
        }
    }

    fn open_listener(&mut self) -> ConsoleResult {
        self.close_listener();
        let port = self.port();
        self.sink.screen(&format!("Opening server on port {}", port));

        let router = Arc::clone(&self.router);
        let handler: MessageHandler =
            Arc::new(move |record: &MessageRecord, t: Option<f64>| router.route(record, t));
        match OscListener::open(&self.listen_host, port, handler) {
            Ok(listener) => {
                self.listener = Some(listener);
                Ok(())
            }
            Err(e) => {
                log::error!(target: "console", "{}", e);
                self.sink.screen(&format!(
                    "Unable to open server on port {}. Possibly it is already open.",
                    port
                ));
                Err(e)
            }
        }
    }

    fn close_listener(&mut self) {
        if let Some(mut listener) = self.listener.take() {
            listener.close();
        }
    }

    /// Bound address of the live listener, if one is open.
    pub fn listener_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(|l| l.local_addr())
    }

    // ─── Listen port ────────────────────────────────────────────────

    pub fn listen_host(&self) -> &str {
        &self.listen_host
    }

    pub fn port(&self) -> u16 {
        *self.port.get()
    }

    /// Change the listen port, reopening the listener in live mode.
    /// Forwarding is switched off if it would now loop back into the listener.
    pub fn set_port(&mut self, port: u16) -> ConsoleResult {
        if !self.port.set(port) {
            return Ok(());
        }
        if self.forwarding().is_forward_to_self(&self.listen_host, port) {
            self.sink.screen(&format!(
                "Forwarding disabled: {} is this console's listen port",
                self.forwarding().destination()
            ));
            self.stop_forwarder();
            self.forwarding_enabled.set(false);
        }
        if self.mode() == Mode::Live {
            self.open_listener()?;
        }
        Ok(())
    }

    pub fn on_port_changed<F: Fn(&u16) + Send + Sync + 'static>(&mut self, f: F) {
        self.port.subscribe(f);
    }

    pub fn on_mode_changed<F: Fn(&Mode) + Send + Sync + 'static>(&mut self, f: F) {
        self.mode.subscribe(f);
    }

    // ─── Forwarding ─────────────────────────────────────────────────

    pub fn forwarding(&self) -> ForwardingConfig {
        ForwardingConfig {
            enabled: *self.forwarding_enabled.get(),
            destination_host: self.forward_host.get().clone(),
            destination_port: *self.forward_port.get(),
        }
    }

    pub fn forward_host(&self) -> &str {
        self.forward_host.get()
    }

    pub fn forward_port(&self) -> u16 {
        *self.forward_port.get()
    }

    pub fn forwarding_enabled(&self) -> bool {
        *self.forwarding_enabled.get()
    }

    /// Handle to the running forwarder, if any.
    pub fn forwarder(&self) -> Option<ForwarderHandle> {
        self.forwarder.as_ref().map(|f| f.handle())
    }

    pub fn set_forward_host(&mut self, host: &str) -> ConsoleResult {
        let candidate = ForwardingConfig {
            destination_host: host.trim().to_string(),
            ..self.forwarding()
        };
        self.check_not_self(&candidate)?;
        if candidate.destination_host == self.forward_host() {
            return Ok(());
        }
        if self.forwarding_enabled() {
            let forwarder = self.build_forwarder(&candidate)?;
            self.install_forwarder(forwarder, &candidate);
        }
        self.forward_host.set(candidate.destination_host);
        Ok(())
    }

    pub fn set_forward_port(&mut self, port: u16) -> ConsoleResult {
        let candidate = ForwardingConfig {
            destination_port: port,
            ..self.forwarding()
        };
        self.check_not_self(&candidate)?;
        if port == self.forward_port() {
            return Ok(());
        }
        if self.forwarding_enabled() {
            let forwarder = self.build_forwarder(&candidate)?;
            self.install_forwarder(forwarder, &candidate);
        }
        self.forward_port.set(port);
        Ok(())
    }

    pub fn set_forwarding_enabled(&mut self, enabled: bool) -> ConsoleResult {
        if enabled == self.forwarding_enabled() {
            return Ok(());
        }
        if !enabled {
            self.stop_forwarder();
            self.forwarding_enabled.set(false);
            log::info!(target: "console", "forwarding disabled");
            return Ok(());
        }
        let candidate = ForwardingConfig {
            enabled: true,
            ..self.forwarding()
        };
        self.check_not_self(&candidate)?;
        let forwarder = self.build_forwarder(&candidate)?;
        self.install_forwarder(forwarder, &candidate);
        self.forwarding_enabled.set(true);
        Ok(())
    }

    pub fn on_forward_host_changed<F: Fn(&String) + Send + Sync + 'static>(&mut self, f: F) {
        self.forward_host.subscribe(f);
    }

    pub fn on_forward_port_changed<F: Fn(&u16) + Send + Sync + 'static>(&mut self, f: F) {
        self.forward_port.subscribe(f);
    }

    pub fn on_forwarding_enabled_changed<F: Fn(&bool) + Send + Sync + 'static>(&mut self, f: F) {
        self.forwarding_enabled.subscribe(f);
    }

    fn check_not_self(&self, candidate: &ForwardingConfig) -> ConsoleResult {
        let enabled = ForwardingConfig {
            enabled: candidate.enabled || self.forwarding_enabled(),
            ..candidate.clone()
        };
        if !enabled.is_forward_to_self(&self.listen_host, self.port()) {
            return Ok(());
        }
        log::warn!(target: "console", "rejected forward to self: {}", candidate.destination());
        self.sink.screen(&format!(
            "Cannot forward to {}: that is this console's listen port",
            candidate.destination()
        ));
        Err(ConsoleError::ForwardToSelf {
            host: candidate.destination_host.clone(),
            port: candidate.destination_port,
        })
    }

    fn stop_forwarder(&mut self) {
        self.router.set_forwarder(None);
        if let Some(mut forwarder) = self.forwarder.take() {
            forwarder.close();
        }
    }

    /// Resolve and start a worker for `target` without touching the running one.
    fn build_forwarder(&self, target: &ForwardingConfig) -> ConsoleResult<AsyncForwarder> {
        let host = &target.destination_host;
        let port = target.destination_port;

        let dest = resolve(host, port).map_err(|e| {
            log::error!(target: "console", "{}", e);
            self.sink
                .screen(&format!("Unable to forward to {}:{}: {}", host, port, e));
            ConsoleError::Resolve {
                host: host.clone(),
                port,
            }
        })?;

        let transport: Arc<dyn OscTransport> = match &self.transport {
            Some(transport) => Arc::clone(transport),
            None => Arc::new(UdpTransport::for_destination(
                dest,
                self.config.forwarder_send_timeout(),
            )?),
        };
        Ok(AsyncForwarder::start(
            transport,
            dest,
            self.config.forwarder_queue_capacity(),
            self.config.forwarder_poll_timeout(),
        )?)
    }

    /// Swap `forwarder` in for the running worker, if any.
    fn install_forwarder(&mut self, forwarder: AsyncForwarder, target: &ForwardingConfig) {
        self.stop_forwarder();
        self.router.set_forwarder(Some(forwarder.handle()));
        self.forwarder = Some(forwarder);
        self.sink
            .screen(&format!("Forwarding messages to {}", target.destination()));
    }

    // ─── Message log ────────────────────────────────────────────────

    pub fn sink(&self) -> &Arc<MessageSink> {
        &self.sink
    }

    /// Write the retained message log. Nothing is changed on failure.
    pub fn save_log(&self, path: &Path) -> ConsoleResult {
        match self.sink.save(path) {
            Ok(()) => {
                self.sink
                    .screen(&format!("Saved log to {}", path.display()));
                Ok(())
            }
            Err(e) => {
                log::error!(target: "console", "cannot save {}: {}", path.display(), e);
                self.sink
                    .screen(&format!("Unable to save {}: {}", path.display(), e));
                Err(ConsoleError::Io(e))
            }
        }
    }

    /// Add a user annotation to the log; replay shows it as a screen message.
    pub fn add_note(&self, text: &str) {
        self.sink
            .append(format_comment_line(local_time_of_day(), text.trim()), false);
    }

    pub fn clear_log(&self) {
        self.sink.clear();
    }

    // ─── Playback ───────────────────────────────────────────────────

    pub fn player(&self) -> &LogPlayer {
        &self.player
    }

    /// Open a log for replay and switch to playback mode. An unreadable
    /// file leaves the mode and the loaded log as they were.
    pub fn open_log(&mut self, path: &Path) -> ConsoleResult {
        let text = std::fs::read_to_string(path).map_err(|e| {
            log::error!(target: "console", "cannot open {}: {}", path.display(), e);
            self.sink
                .screen(&format!("Unable to open {}: {}", path.display(), e));
            ConsoleError::Io(e)
        })?;
        self.set_mode(Mode::Playback)?;
        self.player.load(&text, &path.display().to_string());
        Ok(())
    }

    // ─── Shutdown ───────────────────────────────────────────────────

    /// Listener first, then forwarder, then player, so nothing sends into
    /// a closed transport. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.close_listener();
        self.stop_forwarder();
        self.teardown_playback();
        log::info!(target: "console", "shut down");
    }
}

impl Drop for Console {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::transport::RecordingTransport;
    use osc_console_types::OscArg;

    fn console_on(port: u16) -> (Console, Arc<RecordingTransport>) {
        let config = Config::from_toml_str(&format!(
            "[listen]\nhost = \"127.0.0.1\"\nport = {}\n",
            port
        ))
        .unwrap();
        let transport = Arc::new(RecordingTransport::new());
        let console = Console::with_parts(
            config,
            Arc::new(ManualClock::new()),
            Some(transport.clone() as Arc<dyn OscTransport>),
        );
        (console, transport)
    }

    #[test]
    fn forward_to_own_port_rejected() {
        let (mut console, _) = console_on(47123);
        console.set_forward_host("localhost").unwrap();
        console.set_forward_port(47123).unwrap();
        let err = console.set_forwarding_enabled(true).unwrap_err();
        assert!(matches!(err, ConsoleError::ForwardToSelf { port: 47123, .. }));
        assert!(!console.forwarding_enabled());
        assert!(console.forwarder().is_none());
    }

    #[test]
    fn enabled_forwarding_cannot_be_pointed_at_self() {
        let (mut console, _) = console_on(47124);
        console.set_forward_port(9).unwrap();
        console.set_forwarding_enabled(true).unwrap();
        assert!(console.set_forward_port(47124).is_err());
        assert_eq!(console.forward_port(), 9);
        assert!(console.forwarding_enabled());
    }

    #[test]
    fn port_change_onto_destination_disables_forwarding() {
        let (mut console, _) = console_on(47125);
        console.set_forward_port(47126).unwrap();
        console.set_forwarding_enabled(true).unwrap();
        // playback mode so no socket is bound
        console.set_mode(Mode::Playback).unwrap();
        console.set_port(47126).unwrap();
        assert!(!console.forwarding_enabled());
        assert!(console.forwarder().is_none());
    }

    #[test]
    fn unresolvable_destination_keeps_running_forwarder() {
        let (mut console, transport) = console_on(0);
        console.set_forward_port(9).unwrap();
        console.set_forwarding_enabled(true).unwrap();
        let before = console.forwarder().unwrap().destination();

        let err = console.set_forward_host("no-such-host.invalid").unwrap_err();
        assert!(matches!(err, ConsoleError::Resolve { .. }));
        assert_eq!(console.forward_host(), "127.0.0.1");
        assert!(console.forwarding_enabled());
        let handle = console.forwarder().unwrap();
        assert_eq!(handle.destination(), before);
        assert!(handle.is_running());

        // the router still forwards through the old worker
        console.router.route(
            &MessageRecord::new("/still", "i", vec![OscArg::Int(1)], "src"),
            None,
        );
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        while transport.sent().is_empty() && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(transport.sent_addresses(), vec!["/still".to_string()]);
    }

    #[test]
    fn unresolvable_destination_is_not_enabled() {
        let (mut console, _) = console_on(0);
        console.set_forward_host("no-such-host.invalid").unwrap();
        let changes = Arc::new(std::sync::Mutex::new(Vec::new()));
        let c = Arc::clone(&changes);
        console.on_forwarding_enabled_changed(move |on| c.lock().unwrap().push(*on));

        assert!(console.set_forwarding_enabled(true).is_err());
        assert!(!console.forwarding_enabled());
        assert!(console.forwarder().is_none());
        assert!(changes.lock().unwrap().is_empty());
    }

    #[test]
    fn notes_are_persisted_comment_lines() {
        let (console, _) = console_on(0);
        console.add_note("check this");
        let lines = console.sink().messages();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with(" *** check this"));
    }

    #[test]
    fn playback_dispatch_is_logged_and_forwarded() {
        let (mut console, transport) = console_on(0);
        console.set_forward_port(9).unwrap();
        console.set_forwarding_enabled(true).unwrap();
        console.set_mode(Mode::Playback).unwrap();

        let router = Arc::clone(&console.router);
        router.route(
            &MessageRecord::new("/y", "s", vec![OscArg::Str("hi".into())], "src"),
            Some(3723.004),
        );
        assert!(console
            .sink()
            .messages()
            .contains(&"01:02:03.004 src /y (s): hi".to_string()));

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        while transport.sent().is_empty() && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(transport.sent_addresses(), vec!["/y".to_string()]);
    }

    #[test]
    fn shutdown_twice_is_harmless() {
        let (mut console, _) = console_on(0);
        console.set_mode(Mode::Playback).unwrap();
        console.shutdown();
        console.shutdown();
        assert!(console.listener_addr().is_none());
    }
}
