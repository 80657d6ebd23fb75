//! Playback driver with compile-time state safety via statum.
//!
//! Each advanced frame is dispatched as:
//!
//! ```text
//! frame_current += 1 ─► pre handlers ─► rig step + apply ─► post handlers
//! ```
//!
//! Past `frame_end` playback wraps to `frame_start` (rig reset) when looping,
//! so a handler has to cancel explicitly to stop at the end.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use statum::{machine, state};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::rig::Rig;
use super::scene::Scene;
use super::{FrameCallbackRegistry, HandlerPhase, HandlerRegistry, PlaybackControl};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    pub fps: u32,
    pub frame_start: i32,
    pub frame_end: i32,
    /// Wrap to `frame_start` after `frame_end` instead of stopping.
    pub looping: bool,
    /// Pace frames with the wall clock. Off runs frames back to back.
    pub realtime: bool,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            fps: 24,
            frame_start: 1,
            frame_end: 1500,
            looping: true,
            realtime: true,
        }
    }
}

impl PlaybackSettings {
    pub fn validate(&self) -> Result<(), PlaybackError> {
        if self.fps == 0 {
            return Err(PlaybackError::ZeroFps);
        }
        if self.frame_end < self.frame_start {
            return Err(PlaybackError::EmptyRange {
                start: self.frame_start,
                end: self.frame_end,
            });
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("frame rate must be at least 1 fps")]
    ZeroFps,

    #[error("frame range {start}..={end} is empty")]
    EmptyRange { start: i32, end: i32 },
}

/// Result of advancing one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Continue,
    /// A handler cancelled playback.
    Cancelled,
    /// Reached `frame_end` without looping.
    Finished,
}

#[derive(Debug, Default)]
struct CancelRequest {
    restore_frame: Option<bool>,
}

impl PlaybackControl for CancelRequest {
    fn cancel_playback(&mut self, restore_frame: bool) {
        // First request wins for the frame.
        if self.restore_frame.is_none() {
            self.restore_frame = Some(restore_frame);
        }
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum PlaybackState {
    Idle,
    Playing,
}

#[machine]
pub struct Playback<S: PlaybackState> {
    scene: Scene,
    rig: Option<Box<dyn Rig>>,
    registry: HandlerRegistry,
    looping: bool,
    realtime: bool,
    shutdown: CancellationToken,
    // Frame playback started from, for restore_frame cancellation.
    play_origin: i32,
}

impl<S: PlaybackState> Playback<S> {
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn registry(&mut self) -> &mut dyn FrameCallbackRegistry {
        &mut self.registry
    }

    /// Detaches every handler. Used on shutdown.
    pub fn release_handlers(&mut self) {
        if self.registry.is_empty() {
            return;
        }
        self.registry.clear();
    }

    fn evaluate(&mut self, step: bool) {
        if let Some(rig) = self.rig.as_mut() {
            if step {
                rig.step(1.0 / f64::from(self.scene.fps()));
            }
            rig.apply(&mut self.scene);
        }
    }

    /// Runs both handler phases around scene evaluation for the current
    /// frame. Returns the cancellation request, if any handler made one.
    fn dispatch_frame(&mut self, step: bool) -> Option<bool> {
        let mut request = CancelRequest::default();
        self.registry
            .dispatch(HandlerPhase::Pre, &self.scene, &mut request);
        self.evaluate(step);
        self.registry
            .dispatch(HandlerPhase::Post, &self.scene, &mut request);
        request.restore_frame
    }

    fn apply_cancel(&mut self, restore_frame: bool) {
        if restore_frame {
            info!(
                "Playback cancelled at frame {}, restoring frame {}",
                self.scene.frame_current, self.play_origin
            );
            self.jump_to(self.play_origin);
        } else {
            info!("Playback cancelled at frame {}", self.scene.frame_current);
        }
    }

    /// Sets the frame without dispatching handlers.
    fn jump_to(&mut self, frame: i32) {
        self.scene.frame_current = frame;
        if frame == self.scene.frame_start {
            if let Some(rig) = self.rig.as_mut() {
                rig.reset();
            }
        }
        self.evaluate(false);
    }
}

impl Playback<Idle> {
    pub fn create(
        settings: &PlaybackSettings,
        rig: Option<Box<dyn Rig>>,
        shutdown: CancellationToken,
    ) -> Self {
        let mut scene = Scene::new(settings.fps, settings.frame_start, settings.frame_end);
        if let Some(rig) = rig.as_ref() {
            rig.apply(&mut scene);
        }
        debug!(
            "Playback created: frames {}..={} at {} fps",
            settings.frame_start,
            settings.frame_end,
            scene.fps()
        );

        Self::new(
            scene,
            rig,
            HandlerRegistry::new(),
            settings.looping,
            settings.realtime,
            shutdown,
            settings.frame_start,
        )
    }

    /// Moves to `frame` and dispatches frame-change handlers for it, as a
    /// scrub or "jump to start" would. A handler may already cancel here.
    pub fn frame_set(&mut self, frame: i32) -> FrameOutcome {
        self.jump_to(frame);
        self.play_origin = frame;
        match self.dispatch_frame(false) {
            Some(restore_frame) => {
                self.apply_cancel(restore_frame);
                FrameOutcome::Cancelled
            }
            None => FrameOutcome::Continue,
        }
    }

    /// Starts playback from the current frame.
    pub fn play(mut self) -> Playback<Playing> {
        info!(
            "Playback started at frame {} ({} fps)",
            self.scene.frame_current,
            self.scene.fps()
        );
        self.play_origin = self.scene.frame_current;
        self.transition()
    }
}

impl Playback<Playing> {
    /// Advances one frame and dispatches handlers for it.
    pub fn advance(&mut self) -> FrameOutcome {
        let next = self.scene.frame_current + 1;
        let cancel = if next > self.scene.frame_end {
            if !self.looping {
                info!("Reached end frame {}", self.scene.frame_end);
                return FrameOutcome::Finished;
            }
            debug!("Wrapping playback to frame {}", self.scene.frame_start);
            self.scene.frame_current = self.scene.frame_start;
            if let Some(rig) = self.rig.as_mut() {
                rig.reset();
            }
            self.dispatch_frame(false)
        } else {
            self.scene.frame_current = next;
            self.dispatch_frame(true)
        };

        match cancel {
            Some(restore_frame) => {
                self.apply_cancel(restore_frame);
                FrameOutcome::Cancelled
            }
            None => FrameOutcome::Continue,
        }
    }

    /// Advances frames until a handler cancels, the end is reached without
    /// looping, or the shutdown token fires.
    pub async fn run(mut self) -> (Playback<Idle>, FrameOutcome) {
        let period = Duration::from_secs_f64(1.0 / f64::from(self.scene.fps()));
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let outcome = loop {
            if self.realtime {
                tokio::select! {
                    _ = self.shutdown.cancelled() => {
                        warn!("Playback interrupted at frame {}", self.scene.frame_current);
                        break FrameOutcome::Cancelled;
                    }
                    _ = ticker.tick() => {}
                }
            } else if self.shutdown.is_cancelled() {
                warn!("Playback interrupted at frame {}", self.scene.frame_current);
                break FrameOutcome::Cancelled;
            } else {
                tokio::task::yield_now().await;
            }

            match self.advance() {
                FrameOutcome::Continue => {}
                other => break other,
            }
        };

        (self.stop(), outcome)
    }

    pub fn stop(self) -> Playback<Idle> {
        debug!("Playback stopped at frame {}", self.scene.frame_current);
        self.transition()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::rig::{RigConfig, SimplePendulum};
    use crate::host::scene::Scene;
    use crate::host::FrameHandler;
    use std::sync::{Arc, Mutex};

    /// Records (frame, x rotation) of "Pendule" whenever it runs.
    struct Recorder {
        name: &'static str,
        seen: Arc<Mutex<Vec<(i32, Option<f64>)>>>,
        cancel_at: Option<(i32, bool)>,
    }

    impl FrameHandler for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn on_frame(&mut self, scene: &Scene, playback: &mut dyn PlaybackControl) {
            let angle = scene
                .object("Pendule")
                .map(|o| o.matrix_world.euler_xyz()[0]);
            self.seen
                .lock()
                .expect("recorder lock")
                .push((scene.frame_current, angle));
            if let Some((frame, restore)) = self.cancel_at {
                if scene.frame_current >= frame {
                    playback.cancel_playback(restore);
                }
            }
        }
    }

    fn recorder(
        name: &'static str,
        cancel_at: Option<(i32, bool)>,
    ) -> (Box<Recorder>, Arc<Mutex<Vec<(i32, Option<f64>)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Box::new(Recorder {
            name,
            seen: seen.clone(),
            cancel_at,
        });
        (recorder, seen)
    }

    fn settings(frame_end: i32, looping: bool) -> PlaybackSettings {
        PlaybackSettings {
            fps: 24,
            frame_start: 1,
            frame_end,
            looping,
            realtime: false,
        }
    }

    fn pendulum() -> Option<Box<dyn Rig>> {
        Some(Box::new(SimplePendulum::new("Pendule", RigConfig::default())))
    }

    #[test]
    fn looping_playback_wraps_to_start() {
        let mut idle = Playback::create(&settings(3, true), None, CancellationToken::new());
        let (handler, seen) = recorder("recorder", None);
        idle.registry().register(HandlerPhase::Pre, handler);

        let mut playing = idle.play();
        for _ in 0..4 {
            assert_eq!(playing.advance(), FrameOutcome::Continue);
        }
        let frames: Vec<i32> = seen.lock().unwrap().iter().map(|(f, _)| *f).collect();
        assert_eq!(frames, vec![2, 3, 1, 2]);
    }

    #[test]
    fn non_looping_playback_finishes() {
        let idle = Playback::create(&settings(2, false), None, CancellationToken::new());
        let mut playing = idle.play();
        assert_eq!(playing.advance(), FrameOutcome::Continue);
        assert_eq!(playing.advance(), FrameOutcome::Finished);
    }

    #[test]
    fn pre_handlers_see_the_previous_frame_state() {
        let mut idle = Playback::create(&settings(10, true), pendulum(), CancellationToken::new());
        let (pre, pre_seen) = recorder("pre", None);
        let (post, post_seen) = recorder("post", None);
        idle.registry().register(HandlerPhase::Pre, pre);
        idle.registry().register(HandlerPhase::Post, post);

        let mut playing = idle.play();
        playing.advance();
        playing.advance();

        let pre_seen = pre_seen.lock().unwrap();
        let post_seen = post_seen.lock().unwrap();
        // Pre at frame 3 observes what post observed at frame 2.
        assert_eq!(pre_seen[1].1, post_seen[0].1);
        assert_ne!(pre_seen[1].1, post_seen[1].1);
    }

    #[test]
    fn cancel_without_restore_keeps_the_frame() {
        let mut idle = Playback::create(&settings(100, true), None, CancellationToken::new());
        let (handler, _) = recorder("stopper", Some((5, false)));
        idle.registry().register(HandlerPhase::Pre, handler);

        let mut playing = idle.play();
        let mut outcome = FrameOutcome::Continue;
        while outcome == FrameOutcome::Continue {
            outcome = playing.advance();
        }
        assert_eq!(outcome, FrameOutcome::Cancelled);
        assert_eq!(playing.scene().frame_current, 5);
    }

    #[test]
    fn cancel_with_restore_returns_to_origin() {
        let mut idle = Playback::create(&settings(100, true), None, CancellationToken::new());
        let (handler, _) = recorder("stopper", Some((5, true)));
        idle.registry().register(HandlerPhase::Post, handler);

        let mut playing = idle.play();
        while playing.advance() == FrameOutcome::Continue {}
        assert_eq!(playing.scene().frame_current, 1);
    }

    #[test]
    fn frame_set_dispatches_handlers() {
        let mut idle = Playback::create(&settings(10, true), pendulum(), CancellationToken::new());
        let (handler, seen) = recorder("recorder", None);
        idle.registry().register(HandlerPhase::Post, handler);

        assert_eq!(idle.frame_set(1), FrameOutcome::Continue);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, 1);
        assert!(seen[0].1.is_some());
    }

    #[test]
    fn cancel_on_the_start_frame_is_reported() {
        let mut idle = Playback::create(&settings(10, true), None, CancellationToken::new());
        let (handler, seen) = recorder("stopper", Some((1, false)));
        idle.registry().register(HandlerPhase::Pre, handler);

        assert_eq!(idle.frame_set(1), FrameOutcome::Cancelled);
        assert_eq!(idle.scene().frame_current, 1);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn settings_validation() {
        assert_eq!(PlaybackSettings::default().validate(), Ok(()));
        assert_eq!(
            PlaybackSettings {
                fps: 0,
                ..PlaybackSettings::default()
            }
            .validate(),
            Err(PlaybackError::ZeroFps)
        );
        assert_eq!(
            settings(0, true).validate(),
            Err(PlaybackError::EmptyRange { start: 1, end: 0 })
        );
    }

    #[tokio::test]
    async fn run_stops_on_handler_cancel() {
        let mut idle = Playback::create(&settings(50, true), None, CancellationToken::new());
        let (handler, seen) = recorder("stopper", Some((20, false)));
        idle.registry().register(HandlerPhase::Pre, handler);

        let (idle, outcome) = idle.play().run().await;
        assert_eq!(outcome, FrameOutcome::Cancelled);
        assert_eq!(idle.scene().frame_current, 20);
        assert_eq!(seen.lock().unwrap().len(), 19);
    }

    #[tokio::test]
    async fn run_honours_shutdown_token() {
        let token = CancellationToken::new();
        token.cancel();
        let idle = Playback::create(&settings(50, true), None, token);
        let (idle, outcome) = idle.play().run().await;
        assert_eq!(outcome, FrameOutcome::Cancelled);
        assert_eq!(idle.scene().frame_current, 1);
    }
}
