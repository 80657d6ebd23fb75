use tracing::info;

use crate::host::scene::Scene;
use crate::host::{FrameHandler, HandlerPhase, PlaybackControl};

/// Stops a looping playback once it reaches the scene's last frame instead
/// of wrapping around.
#[derive(Debug, Default)]
pub struct StopAtEnd;

impl StopAtEnd {
    pub const NAME: &'static str = "stop_at_end";
    pub const PHASE: HandlerPhase = HandlerPhase::Pre;
}

impl FrameHandler for StopAtEnd {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn on_frame(&mut self, scene: &Scene, playback: &mut dyn PlaybackControl) {
        if scene.frame_current >= scene.frame_end {
            info!("Last frame {} reached, stopping playback", scene.frame_end);
            playback.cancel_playback(false);
        }
    }
}
