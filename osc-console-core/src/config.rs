use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use osc_console_types::ForwardingConfig;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    listen: ListenConfig,
    #[serde(default)]
    forward: ForwardConfig,
    #[serde(default)]
    playback: PlaybackConfig,
    #[serde(default)]
    display: DisplayConfig,
    #[serde(default)]
    forwarder: ForwarderConfig,
}

#[derive(Deserialize, Default)]
struct ListenConfig {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Deserialize, Default)]
struct ForwardConfig {
    enabled: Option<bool>,
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Deserialize, Default)]
struct PlaybackConfig {
    tick_interval_ms: Option<u64>,
}

#[derive(Deserialize, Default)]
struct DisplayConfig {
    queue_capacity: Option<usize>,
    log_capacity: Option<usize>,
}

#[derive(Deserialize, Default)]
struct ForwarderConfig {
    queue_capacity: Option<usize>,
    send_timeout_ms: Option<u64>,
    poll_timeout_ms: Option<u64>,
}

/// Console settings: embedded defaults overlaid with the user's config file.
pub struct Config {
    listen: ListenConfig,
    forward: ForwardConfig,
    playback: PlaybackConfig,
    display: DisplayConfig,
    forwarder: ForwarderConfig,
}

impl Config {
    pub fn load() -> Self {
        let mut config = Self::embedded();

        if let Some(path) = user_config_path() {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                        Ok(user) => config.merge(user),
                        Err(e) => {
                            log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                        }
                    },
                    Err(e) => {
                        log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
                    }
                }
            }
        }

        config
    }

    /// Embedded defaults only, ignoring any user file.
    pub fn embedded() -> Self {
        let base: ConfigFile =
            toml::from_str(DEFAULT_CONFIG).expect("Failed to parse embedded config.toml");
        Self::from_file(base)
    }

    /// Embedded defaults overlaid with `contents`.
    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        let user: ConfigFile = toml::from_str(contents)?;
        let mut config = Self::embedded();
        config.merge(user);
        Ok(config)
    }

    fn from_file(file: ConfigFile) -> Self {
        Config {
            listen: file.listen,
            forward: file.forward,
            playback: file.playback,
            display: file.display,
            forwarder: file.forwarder,
        }
    }

    fn merge(&mut self, user: ConfigFile) {
        if user.listen.host.is_some() {
            self.listen.host = user.listen.host;
        }
        if user.listen.port.is_some() {
            self.listen.port = user.listen.port;
        }
        if user.forward.enabled.is_some() {
            self.forward.enabled = user.forward.enabled;
        }
        if user.forward.host.is_some() {
            self.forward.host = user.forward.host;
        }
        if user.forward.port.is_some() {
            self.forward.port = user.forward.port;
        }
        if user.playback.tick_interval_ms.is_some() {
            self.playback.tick_interval_ms = user.playback.tick_interval_ms;
        }
        if user.display.queue_capacity.is_some() {
            self.display.queue_capacity = user.display.queue_capacity;
        }
        if user.display.log_capacity.is_some() {
            self.display.log_capacity = user.display.log_capacity;
        }
        if user.forwarder.queue_capacity.is_some() {
            self.forwarder.queue_capacity = user.forwarder.queue_capacity;
        }
        if user.forwarder.send_timeout_ms.is_some() {
            self.forwarder.send_timeout_ms = user.forwarder.send_timeout_ms;
        }
        if user.forwarder.poll_timeout_ms.is_some() {
            self.forwarder.poll_timeout_ms = user.forwarder.poll_timeout_ms;
        }
    }

    pub fn listen_host(&self) -> String {
        self.listen.host.clone().unwrap_or_else(|| "localhost".to_string())
    }

    pub fn listen_port(&self) -> u16 {
        self.listen.port.unwrap_or(37000)
    }

    pub fn forwarding(&self) -> ForwardingConfig {
        let fallback = ForwardingConfig::default();
        ForwardingConfig {
            enabled: self.forward.enabled.unwrap_or(fallback.enabled),
            destination_host: self
                .forward
                .host
                .clone()
                .unwrap_or(fallback.destination_host),
            destination_port: self.forward.port.unwrap_or(fallback.destination_port),
        }
    }

    /// Replay ticker period (clamped to 1..1000 ms).
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.playback.tick_interval_ms.unwrap_or(1).clamp(1, 1000))
    }

    /// Display queue capacity (clamped to 1..10000).
    pub fn display_queue_capacity(&self) -> usize {
        self.display.queue_capacity.unwrap_or(50).clamp(1, 10_000)
    }

    /// Retained message log lines (clamped to 1..1000000).
    pub fn log_capacity(&self) -> usize {
        self.display.log_capacity.unwrap_or(10_000).clamp(1, 1_000_000)
    }

    pub fn forwarder_queue_capacity(&self) -> usize {
        self.forwarder.queue_capacity.unwrap_or(512).clamp(1, 65_536)
    }

    pub fn forwarder_send_timeout(&self) -> Duration {
        Duration::from_millis(self.forwarder.send_timeout_ms.unwrap_or(500).clamp(1, 60_000))
    }

    pub fn forwarder_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.forwarder.poll_timeout_ms.unwrap_or(100).clamp(1, 5_000))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::embedded()
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("osc-console").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_embedded_config() {
        let config = Config::embedded();
        assert_eq!(config.listen_host(), "localhost");
        assert_eq!(config.listen_port(), 37000);
        let fwd = config.forwarding();
        assert!(!fwd.enabled);
        assert_eq!(fwd.destination_host, "127.0.0.1");
        assert_eq!(fwd.destination_port, 5000);
        assert_eq!(config.tick_interval(), Duration::from_millis(1));
        assert_eq!(config.display_queue_capacity(), 50);
        assert_eq!(config.log_capacity(), 10_000);
        assert_eq!(config.forwarder_send_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_user_overrides_merge() {
        let config = Config::from_toml_str(
            r#"
            [listen]
            port = 9000

            [forward]
            enabled = true
            "#,
        )
        .unwrap();
        assert_eq!(config.listen_port(), 9000);
        // untouched keys keep their defaults
        assert_eq!(config.listen_host(), "localhost");
        assert!(config.forwarding().enabled);
        assert_eq!(config.forwarding().destination_port, 5000);
    }

    #[test]
    fn test_out_of_range_values_clamped() {
        let config = Config::from_toml_str(
            r#"
            [playback]
            tick_interval_ms = 0

            [display]
            queue_capacity = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.tick_interval(), Duration::from_millis(1));
        assert_eq!(config.display_queue_capacity(), 1);
    }

    #[test]
    fn test_malformed_user_config_is_error() {
        assert!(Config::from_toml_str("[listen]\nport = \"nope\"").is_err());
    }
}
