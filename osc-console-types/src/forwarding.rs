use serde::{Deserialize, Serialize};

/// Host literals treated as "this machine" by the forward-to-self guard.
const LOCAL_HOSTS: &[&str] = &["localhost", "127.0.0.1", "::1", "0.0.0.0"];

/// Where decoded messages are re-sent when forwarding is on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingConfig {
    pub enabled: bool,
    pub destination_host: String,
    pub destination_port: u16,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            destination_host: "127.0.0.1".to_string(),
            destination_port: 5000,
        }
    }
}

impl ForwardingConfig {
    /// True if the destination would loop messages back into our own listener.
    ///
    /// Compares host strings only; no name resolution is done.
    pub fn targets_listener(&self, listen_host: &str, listen_port: u16) -> bool {
        if self.destination_port != listen_port {
            return false;
        }
        let dest = self.destination_host.trim().to_ascii_lowercase();
        let listen = listen_host.trim().to_ascii_lowercase();
        dest == listen || (LOCAL_HOSTS.contains(&dest.as_str()) && LOCAL_HOSTS.contains(&listen.as_str()))
    }

    /// Enabled and pointed at the listener.
    pub fn is_forward_to_self(&self, listen_host: &str, listen_port: u16) -> bool {
        self.enabled && self.targets_listener(listen_host, listen_port)
    }

    pub fn destination(&self) -> String {
        format!("{}:{}", self.destination_host, self.destination_port)
    }
}
