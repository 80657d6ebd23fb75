use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rumqttc::{
    Client, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet,
    QoS, Transport,
};
use tokio::runtime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::config::MqttConfig;
use super::credentials::Credentials;
use super::error::SessionError;

/// One live broker connection.
pub trait BrokerLink: Send {
    /// True once the broker acknowledged the connection, false again after
    /// any network error or close.
    fn is_connected(&self) -> bool;

    /// Queues a fire-and-forget message. Never blocks.
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), SessionError>;

    /// Stops the network loop and closes the connection. The network loop
    /// has exited when this returns.
    fn close(self);
}

/// Opens broker connections. The connection handshake completes in the
/// background after `connect` returns.
pub trait BrokerClient: Send {
    type Link: BrokerLink;

    fn connect(&mut self, credentials: &Credentials) -> Result<Self::Link, SessionError>;
}

/// `rumqttc` backed client. Every link owns a dedicated network thread
/// driving the connection's event loop.
pub struct RumqttBroker {
    config: MqttConfig,
}

impl RumqttBroker {
    pub fn new(config: MqttConfig) -> Self {
        Self { config }
    }

    fn options(&self, credentials: &Credentials) -> Result<MqttOptions, SessionError> {
        if credentials.host.is_empty() {
            return Err(SessionError::NoBroker);
        }
        let client_id = self.config.effective_client_id();
        if client_id.trim().is_empty() || client_id.starts_with(' ') {
            return Err(SessionError::InvalidClientId(client_id));
        }

        let mut options = MqttOptions::new(client_id, credentials.host.clone(), credentials.port);
        options
            .set_credentials(credentials.username.clone(), credentials.password.clone())
            .set_keep_alive(self.config.keep_alive());
        if self.config.tls {
            options.set_transport(Transport::tls_with_default_config());
        }
        Ok(options)
    }
}

impl BrokerClient for RumqttBroker {
    type Link = RumqttLink;

    fn connect(&mut self, credentials: &Credentials) -> Result<RumqttLink, SessionError> {
        let options = self.options(credentials)?;
        let endpoint = format!("{}:{}", credentials.host, credentials.port);
        let runtime = runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(SessionError::Spawn)?;

        let (client, mut connection) = Client::new(options, self.config.queue_capacity.max(1));
        let mut network = connection.eventloop.network_options();
        network.set_connection_timeout(self.config.connect_timeout_secs.max(1));
        connection.eventloop.set_network_options(network);

        let shared = Arc::new(LinkShared::default());
        let (done_tx, done) = mpsc::channel::<()>();
        let loop_shared = shared.clone();
        let loop_endpoint = endpoint.clone();

        let thread = thread::Builder::new()
            .name("mqtt-network".to_owned())
            .spawn(move || {
                runtime.block_on(network_loop(
                    &mut connection.eventloop,
                    &loop_shared,
                    &loop_endpoint,
                ));
                drop(connection);
                drop(loop_shared);
                drop(done_tx);
            })
            .map_err(SessionError::Spawn)?;

        info!("MQTT network thread started for {}", endpoint);
        Ok(RumqttLink {
            client,
            shared,
            done,
            thread,
            endpoint,
            close_timeout: self.config.close_timeout(),
        })
    }
}

/// State shared between a link and its network thread.
#[derive(Debug, Default)]
struct LinkShared {
    connected: AtomicBool,
    stop: CancellationToken,
}

pub struct RumqttLink {
    client: Client,
    shared: Arc<LinkShared>,
    // Disconnects when the network thread ends.
    done: mpsc::Receiver<()>,
    thread: JoinHandle<()>,
    endpoint: String,
    close_timeout: Duration,
}

impl BrokerLink for RumqttLink {
    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), SessionError> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec())?;
        Ok(())
    }

    fn close(self) {
        info!("Closing MQTT connection to {}", self.endpoint);
        let acknowledged = self.shared.connected.swap(false, Ordering::AcqRel);

        // A DISCONNECT only makes sense on an established connection. Anything
        // else (pending handshake, dead socket) is aborted right away.
        let graceful = acknowledged
            && match self.client.try_disconnect() {
                Ok(()) => true,
                Err(e) => {
                    debug!("Disconnect not queued ({}), aborting network loop", e);
                    false
                }
            };
        drop(self.client);

        if graceful {
            if let Err(RecvTimeoutError::Timeout) = self.done.recv_timeout(self.close_timeout) {
                warn!(
                    "DISCONNECT to {} not flushed within {:?}, aborting",
                    self.endpoint, self.close_timeout
                );
            }
        }
        self.shared.stop.cancel();

        if self.thread.join().is_err() {
            error!("MQTT network thread for {} panicked", self.endpoint);
        }
    }
}

/// Numeric CONNACK reason, 0 meaning accepted.
pub fn reason_code(code: ConnectReturnCode) -> u8 {
    match code {
        ConnectReturnCode::Success => 0,
        ConnectReturnCode::RefusedProtocolVersion => 1,
        ConnectReturnCode::BadClientId => 2,
        ConnectReturnCode::ServiceUnavailable => 3,
        ConnectReturnCode::BadUserNamePassword => 4,
        ConnectReturnCode::NotAuthorized => 5,
    }
}

async fn network_loop(eventloop: &mut EventLoop, shared: &LinkShared, endpoint: &str) {
    loop {
        let notification = tokio::select! {
            _ = shared.stop.cancelled() => {
                debug!("MQTT network loop for {} aborted", endpoint);
                break;
            }
            notification = eventloop.poll() => notification,
        };

        match notification {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                let code = reason_code(ack.code);
                if code == 0 {
                    shared.connected.store(true, Ordering::Release);
                    info!("Successfully connected to the broker {}", endpoint);
                } else {
                    warn!("MQTT connection to {} failed. Code: {}", endpoint, code);
                    break;
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("DISCONNECT sent to {}", endpoint);
                break;
            }
            Ok(event) => trace!("MQTT event: {:?}", event),
            Err(ConnectionError::ConnectionRefused(code)) => {
                warn!(
                    "MQTT connection to {} failed. Code: {}",
                    endpoint,
                    reason_code(code)
                );
                break;
            }
            Err(ConnectionError::RequestsDone) => {
                debug!("MQTT client for {} dropped", endpoint);
                break;
            }
            Err(e) => {
                error!("MQTT connection error on {}: {}", endpoint, e);
                break;
            }
        }
    }

    shared.connected.store(false, Ordering::Release);
    debug!("MQTT network thread for {} finished", endpoint);
}
