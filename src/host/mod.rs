//! # Animation Host Adapter
//!
//! A minimal animation host for the telemetry handlers: a scene of named
//! objects, a frame-change callback registry with two timing points, a
//! looping playback driver, and pendulum rigs that move the objects.
//!
//! ```text
//! host/
//! ├── scene.rs     - Scene, objects and world transforms
//! ├── playback.rs  - Playback driver (Idle → Playing) ticking frames
//! └── rig.rs       - Pendulum physics evaluated once per frame
//! ```
//!
//! Handlers never touch the registry internals. They implement
//! [`FrameHandler`] and are attached through [`FrameCallbackRegistry`], which
//! keeps registration idempotent by handler name.

pub mod playback;
pub mod rig;
pub mod scene;

use std::fmt;

use tracing::{debug, info};

use scene::Scene;

/// When a handler runs relative to scene evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerPhase {
    /// Runs after the frame counter moved but before objects are evaluated,
    /// so handlers observe the previous frame's transforms.
    Pre,
    /// Runs after evaluation (including physics) of the current frame.
    Post,
}

impl fmt::Display for HandlerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerPhase::Pre => write!(f, "frame_change_pre"),
            HandlerPhase::Post => write!(f, "frame_change_post"),
        }
    }
}

/// Playback operations a handler may request during dispatch.
pub trait PlaybackControl {
    /// Stops playback. With `restore_frame` the frame jumps back to where
    /// playback started, otherwise it stays on the current frame.
    fn cancel_playback(&mut self, restore_frame: bool);
}

/// A per-frame callback.
pub trait FrameHandler: Send {
    /// Registration key. Two handlers with the same name never coexist.
    fn name(&self) -> &str;

    fn on_frame(&mut self, scene: &Scene, playback: &mut dyn PlaybackControl);

    /// Called once when the handler is removed from the registry.
    fn detach(&mut self) {}
}

/// Capability to attach and detach frame handlers.
pub trait FrameCallbackRegistry {
    /// Adds `handler` under `phase`, first detaching any handler with the same
    /// name from every phase.
    fn register(&mut self, phase: HandlerPhase, handler: Box<dyn FrameHandler>);

    /// Removes the named handler, running its detach hook. Returns whether a
    /// handler was found.
    fn unregister(&mut self, name: &str) -> bool;

    fn registered(&self, phase: HandlerPhase) -> Vec<String>;
}

/// In-process handler lists, one per phase.
#[derive(Default)]
pub struct HandlerRegistry {
    pre: Vec<Box<dyn FrameHandler>>,
    post: Vec<Box<dyn FrameHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn list_mut(&mut self, phase: HandlerPhase) -> &mut Vec<Box<dyn FrameHandler>> {
        match phase {
            HandlerPhase::Pre => &mut self.pre,
            HandlerPhase::Post => &mut self.post,
        }
    }

    fn take(&mut self, name: &str) -> Vec<(HandlerPhase, Box<dyn FrameHandler>)> {
        let mut removed = Vec::new();
        for phase in [HandlerPhase::Pre, HandlerPhase::Post] {
            let list = self.list_mut(phase);
            let mut index = 0;
            while index < list.len() {
                if list[index].name() == name {
                    removed.push((phase, list.remove(index)));
                } else {
                    index += 1;
                }
            }
        }
        removed
    }

    /// Runs every handler registered for `phase` in registration order.
    pub fn dispatch(
        &mut self,
        phase: HandlerPhase,
        scene: &Scene,
        playback: &mut dyn PlaybackControl,
    ) {
        for handler in self.list_mut(phase).iter_mut() {
            handler.on_frame(scene, playback);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pre.is_empty() && self.post.is_empty()
    }

    /// Detaches every handler, e.g. on shutdown.
    pub fn clear(&mut self) {
        for phase in [HandlerPhase::Pre, HandlerPhase::Post] {
            for mut handler in std::mem::take(self.list_mut(phase)) {
                debug!("Detaching handler '{}' from {}", handler.name(), phase);
                handler.detach();
            }
        }
    }
}

impl FrameCallbackRegistry for HandlerRegistry {
    fn register(&mut self, phase: HandlerPhase, handler: Box<dyn FrameHandler>) {
        let name = handler.name().to_owned();
        for (old_phase, mut old) in self.take(&name) {
            old.detach();
            info!("Former handler '{}' removed from {}", name, old_phase);
        }
        self.list_mut(phase).push(handler);
        info!("Handler '{}' registered on {}", name, phase);
    }

    fn unregister(&mut self, name: &str) -> bool {
        let removed = self.take(name);
        let found = !removed.is_empty();
        for (phase, mut handler) in removed {
            handler.detach();
            info!("Handler '{}' unregistered from {}", name, phase);
        }
        found
    }

    fn registered(&self, phase: HandlerPhase) -> Vec<String> {
        let list = match phase {
            HandlerPhase::Pre => &self.pre,
            HandlerPhase::Post => &self.post,
        };
        list.iter().map(|h| h.name().to_owned()).collect()
    }
}
