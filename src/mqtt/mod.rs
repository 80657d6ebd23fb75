//! # MQTT Integration Module
//!
//! Publish-only broker access for the telemetry handlers. A session owns at
//! most one connection; each connection runs its own network thread so the
//! frame dispatch never waits on the socket.
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── config.rs       - Client id, keep-alive, TLS and queue settings
//! ├── credentials.rs  - Broker login from the secrets file
//! ├── broker.rs       - BrokerClient trait and the rumqttc implementation
//! ├── session.rs      - Connection lifecycle and publish statistics
//! └── error.rs        - SessionError
//! ```
//!
//! ## Connection Lifecycle
//!
//! ```text
//! Uninitialized ──connect()──► Connecting ──CONNACK 0──► Connected
//!       ▲                          │                        │
//!       └──────── disconnect() ────┴────────────────────────┘
//! ```
//!
//! Publishing is refused outside `Connected`. Messages go out with QoS 0 and
//! are never retained or queued across reconnects.

pub mod broker;
pub mod config;
pub mod credentials;
pub mod error;
pub mod session;
