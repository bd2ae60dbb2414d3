//! Periodic timer driving `LogPlayer::tick` while playback mode is active.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};

use crate::player::LogPlayer;

pub struct PlaybackTicker {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PlaybackTicker {
    pub fn spawn(player: LogPlayer, interval: Duration) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("playback-ticker".into())
            .spawn(move || {
                log::debug!(target: "ticker", "started, interval {:?}", interval);
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => player.tick(),
                        // explicit stop or the owner went away
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                log::debug!(target: "ticker", "stopped");
            })?;
        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stop the timer thread and wait for it. Safe to call twice.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!(target: "ticker", "ticker thread panicked");
            }
        }
    }
}

impl Drop for PlaybackTicker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::sink::MessageSink;
    use osc_console_types::PlaybackState;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn ticker_plays_log_to_the_end() {
        let sink = Arc::new(MessageSink::new(64, 64));
        let player = LogPlayer::new(Arc::new(SystemClock::new()), sink.clone());
        player.load(
            "00:00:01.000 h:1 /a (): \n00:00:01.020 h:1 /b (): \n",
            "test",
        );
        player.play();
        let mut ticker = PlaybackTicker::spawn(player.clone(), Duration::from_millis(1)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while player.state() == PlaybackState::Playing && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        ticker.stop();
        assert_eq!(player.state(), PlaybackState::Stopped);
        assert!(!ticker.is_running());
    }

    #[test]
    fn stop_is_idempotent() {
        let sink = Arc::new(MessageSink::new(4, 4));
        let player = LogPlayer::new(Arc::new(SystemClock::new()), sink);
        let mut ticker = PlaybackTicker::spawn(player, Duration::from_millis(10)).unwrap();
        ticker.stop();
        ticker.stop();
        assert!(!ticker.is_running());
    }
}
