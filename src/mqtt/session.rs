use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use super::broker::{BrokerClient, BrokerLink};
use super::credentials::Credentials;
use super::error::SessionError;

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Uninitialized,
    /// Link exists, broker has not acknowledged (or dropped us since).
    Connecting,
    Connected,
}

#[derive(Clone, Debug, Default)]
pub struct SessionStats {
    pub connects: usize,
    pub messages_sent: usize,
    pub publish_failures: usize,
    pub last_activity: Option<DateTime<Local>>,
}

/// Owns at most one broker link at a time.
pub struct MqttSession<C: BrokerClient> {
    client: C,
    credentials: Credentials,
    link: Option<C::Link>,
    stats: SessionStats,
}

impl<C: BrokerClient> MqttSession<C> {
    pub fn new(client: C, credentials: Credentials) -> Self {
        Self {
            client,
            credentials,
            link: None,
            stats: SessionStats::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        match &self.link {
            None => ConnectionState::Uninitialized,
            Some(link) if link.is_connected() => ConnectionState::Connected,
            Some(_) => ConnectionState::Connecting,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Tears down any existing link, then opens a new one. Returns once the
    /// network loop runs; the handshake finishes later.
    pub fn connect(&mut self) -> Result<(), SessionError> {
        if self.link.is_some() {
            debug!("Replacing existing MQTT session");
            self.disconnect();
        }

        let link = self.client.connect(&self.credentials)?;
        self.link = Some(link);
        self.stats.connects += 1;
        self.stats.last_activity = Some(Local::now());
        info!("MQTT connecting to {}:{}", self.credentials.host, self.credentials.port);
        Ok(())
    }

    /// Sends one message. Refused unless the broker acknowledged the link.
    pub fn publish(&mut self, topic: &str, payload: &str) -> Result<(), SessionError> {
        let link = match self.link.as_mut() {
            Some(link) if link.is_connected() => link,
            _ => return Err(SessionError::NotConnected),
        };

        match link.publish(topic, payload) {
            Ok(()) => {
                self.stats.messages_sent += 1;
                self.stats.last_activity = Some(Local::now());
                Ok(())
            }
            Err(e) => {
                self.stats.publish_failures += 1;
                Err(e)
            }
        }
    }

    /// Closes the link if there is one.
    pub fn disconnect(&mut self) {
        match self.link.take() {
            Some(link) => {
                link.close();
                info!(
                    "MQTT stopped ({} sent, {} failed)",
                    self.stats.messages_sent, self.stats.publish_failures
                );
            }
            None => debug!("MQTT disconnect requested without a session"),
        }
    }
}

impl<C: BrokerClient> Drop for MqttSession<C> {
    fn drop(&mut self) {
        if self.link.is_some() {
            warn!("MQTT session dropped while open, closing");
            self.disconnect();
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakeBroker;
    use super::*;
    use std::sync::atomic::Ordering;

    fn session(broker: &FakeBroker) -> MqttSession<FakeBroker> {
        MqttSession::new(broker.clone(), Credentials::default())
    }

    #[test]
    fn starts_uninitialized() {
        let broker = FakeBroker::acknowledging();
        let session = session(&broker);
        assert_eq!(session.state(), ConnectionState::Uninitialized);
        assert_eq!(broker.journal().connects, 0);
    }

    #[test]
    fn reconnect_closes_the_previous_link_first() {
        let broker = FakeBroker::acknowledging();
        let mut session = session(&broker);
        session.connect().expect("first connect");
        session.connect().expect("second connect");

        let journal = broker.journal();
        assert_eq!(journal.connects, 2);
        assert_eq!(journal.closes, 1);
        assert_eq!(journal.open_links, 1);
    }

    #[test]
    fn publish_is_refused_until_acknowledged() {
        let broker = FakeBroker::default();
        let mut session = session(&broker);
        session.connect().expect("connect");
        assert_eq!(session.state(), ConnectionState::Connecting);

        assert!(matches!(
            session.publish("t", "{}"),
            Err(SessionError::NotConnected)
        ));
        assert!(broker.journal().published.is_empty());
    }

    #[test]
    fn publish_records_stats() {
        let broker = FakeBroker::acknowledging();
        let mut session = session(&broker);
        session.connect().expect("connect");
        session.publish("t", "{\"a\":1}").expect("publish");

        broker.fail_publish.store(true, Ordering::SeqCst);
        assert!(session.publish("t", "{\"a\":2}").is_err());

        assert_eq!(session.stats().messages_sent, 1);
        assert_eq!(session.stats().publish_failures, 1);
        assert!(session.stats().last_activity.is_some());
        assert_eq!(broker.journal().published.len(), 1);
    }

    #[test]
    fn disconnect_without_session_is_a_no_op() {
        let broker = FakeBroker::acknowledging();
        let mut session = session(&broker);
        session.disconnect();
        session.disconnect();
        assert_eq!(broker.journal().closes, 0);
    }

    #[test]
    fn failed_connect_leaves_session_uninitialized() {
        let broker = FakeBroker::acknowledging();
        broker.refuse_connect.store(true, Ordering::SeqCst);
        let mut session = session(&broker);
        assert!(session.connect().is_err());
        assert_eq!(session.state(), ConnectionState::Uninitialized);
    }

    #[test]
    fn dropping_an_open_session_closes_it() {
        let broker = FakeBroker::acknowledging();
        {
            let mut session = session(&broker);
            session.connect().expect("connect");
        }
        assert_eq!(broker.journal().open_links, 0);
    }
}
