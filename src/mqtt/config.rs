use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Client id prefix; the process id is appended so parallel runs do not
    /// kick each other off the broker.
    pub client_id: String,
    pub keep_alive_secs: u64,
    /// TLS with the system trust roots. Disable for plain-TCP test brokers.
    pub tls: bool,
    /// Outgoing request queue between the handler and the network thread.
    pub queue_capacity: usize,
    /// Upper bound for the TCP/TLS/CONNECT handshake.
    pub connect_timeout_secs: u64,
    /// How long closing a connected link waits for DISCONNECT to flush
    /// before the network thread is aborted.
    pub close_timeout_ms: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            client_id: "pendulum-telemetry".to_owned(),
            keep_alive_secs: 60,
            tls: true,
            queue_capacity: 100,
            connect_timeout_secs: 5,
            close_timeout_ms: 250,
        }
    }
}

impl MqttConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    pub fn effective_client_id(&self) -> String {
        format!("{}-{}", self.client_id, std::process::id())
    }
}
