//! Frame lifecycle controller for pendulum telemetry.
//!
//! Runs inside the host's frame dispatch and never blocks it:
//!
//! ```text
//! frame == 1 ──► reconnect session
//! connected? ──no──► return
//! objects?  ──no──► log, return (retried next frame)
//! sample ─► round ─► publish
//! frame >= stop ──► cancel playback, disconnect
//! ```

use tracing::{debug, error, info, trace, warn};

use super::payload::{FramePayload, Precision};
use super::sampler::rotation_x_degrees;
use crate::host::scene::Scene;
use crate::host::{FrameHandler, HandlerPhase, PlaybackControl};
use crate::mqtt::broker::BrokerClient;
use crate::mqtt::session::MqttSession;

/// Objects whose rotation is published.
#[derive(Debug, Clone, PartialEq)]
pub enum Tracked {
    Single {
        object: String,
        /// Tried when `object` is not in the scene.
        fallback: Option<String>,
    },
    Coupled {
        first: String,
        second: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryProfile {
    pub handler_name: String,
    pub phase: HandlerPhase,
    pub topic: String,
    pub tracked: Tracked,
    pub stop_frame: i32,
    pub precision: Precision,
}

impl TelemetryProfile {
    /// Single pendulum, sampled before evaluation, stops at 1000.
    pub fn simple() -> Self {
        Self {
            handler_name: "pendulum_telemetry".to_owned(),
            phase: HandlerPhase::Pre,
            topic: "FABLAB_21_22/Blender/Pendule/out".to_owned(),
            tracked: Tracked::Single {
                object: "Pendule".to_owned(),
                fallback: Some("pendule".to_owned()),
            },
            stop_frame: 1000,
            precision: Precision::SINGLE,
        }
    }

    /// Two coupled pendulums, sampled after physics, stops at 1500.
    pub fn coupled() -> Self {
        Self {
            handler_name: "coupled_pendulum_telemetry".to_owned(),
            phase: HandlerPhase::Post,
            topic: "FABLAB_21_22/Blender/Pendules_coupl/out".to_owned(),
            tracked: Tracked::Coupled {
                first: "Pendule1".to_owned(),
                second: "Pendule2".to_owned(),
            },
            stop_frame: 1500,
            precision: Precision::COUPLED,
        }
    }

    /// Names of every object the profile reads.
    pub fn object_names(&self) -> Vec<&str> {
        match &self.tracked {
            Tracked::Single { object, .. } => vec![object.as_str()],
            Tracked::Coupled { first, second } => vec![first.as_str(), second.as_str()],
        }
    }
}

pub struct PendulumTelemetry<C: BrokerClient> {
    profile: TelemetryProfile,
    session: MqttSession<C>,
}

impl<C: BrokerClient> PendulumTelemetry<C> {
    pub fn new(profile: TelemetryProfile, session: MqttSession<C>) -> Self {
        Self { profile, session }
    }

    #[cfg(test)]
    pub fn session(&self) -> &MqttSession<C> {
        &self.session
    }

    fn sample(&self, scene: &Scene) -> Option<FramePayload> {
        let elapsed = scene.elapsed_seconds();
        match &self.profile.tracked {
            Tracked::Single { object, fallback } => {
                let found = scene.object(object).or_else(|| {
                    fallback
                        .as_deref()
                        .and_then(|name| scene.object(name))
                });
                let Some(found) = found else {
                    warn!("{} object not found!", object);
                    return None;
                };
                let Some(angle) = rotation_x_degrees(found) else {
                    warn!("{} has an invalid transform", found.name());
                    return None;
                };
                Some(FramePayload::single(elapsed, angle, self.profile.precision))
            }
            Tracked::Coupled { first, second } => {
                let (Some(a), Some(b)) = (scene.object(first), scene.object(second)) else {
                    warn!("{} or {} object not found!", first, second);
                    return None;
                };
                match (rotation_x_degrees(a), rotation_x_degrees(b)) {
                    (Some(theta1), Some(theta2)) => Some(FramePayload::coupled(
                        elapsed,
                        [theta1, theta2],
                        self.profile.precision,
                    )),
                    _ => {
                        warn!("{} or {} has an invalid transform", first, second);
                        None
                    }
                }
            }
        }
    }

    fn publish(&mut self, payload: &FramePayload) {
        let json = match payload.to_json() {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to encode payload: {}", e);
                return;
            }
        };
        match self.session.publish(&self.profile.topic, &json) {
            Ok(()) => trace!("t={} published {}", payload.elapsed_seconds(), json),
            Err(e) => warn!("Publication error: {}", e),
        }
    }
}

impl<C: BrokerClient> FrameHandler for PendulumTelemetry<C> {
    fn name(&self) -> &str {
        &self.profile.handler_name
    }

    fn on_frame(&mut self, scene: &Scene, playback: &mut dyn PlaybackControl) {
        let frame = scene.frame_current;

        if frame == 1 {
            info!("Frame 1: initialising MQTT connection");
            if let Err(e) = self.session.connect() {
                error!("Critical error during MQTT initialisation: {}", e);
            }
        }

        if !self.session.is_connected() {
            debug!("Frame {}: no connected session, skipping", frame);
            return;
        }

        let Some(payload) = self.sample(scene) else {
            return;
        };
        self.publish(&payload);

        if frame >= self.profile.stop_frame {
            info!("End of animation reached at frame {}", frame);
            playback.cancel_playback(false);
            self.session.disconnect();
        }
    }

    fn detach(&mut self) {
        self.session.disconnect();
        let stats = self.session.stats();
        debug!(
            "{} detached: {} connects, last activity {}",
            self.profile.handler_name,
            stats.connects,
            stats
                .last_activity
                .map(|t| t.format("%H:%M:%S%.3f").to_string())
                .unwrap_or_else(|| "never".to_owned())
        );
    }
}
