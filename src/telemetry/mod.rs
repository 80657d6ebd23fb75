//! # Pendulum Telemetry
//!
//! Frame handlers that read pendulum rotations out of the scene and stream
//! them to the broker, one message per frame.
//!
//! ```text
//! telemetry/
//! ├── handler.rs      - Frame lifecycle: connect at frame 1, publish, stop
//! ├── sampler.rs      - World X rotation in degrees
//! ├── payload.rs      - Rounded JSON messages
//! └── stop_at_end.rs  - Cancels looping playback on the last frame
//! ```
//!
//! Two profiles exist. The single pendulum samples before evaluation and
//! stops at frame 1000; the coupled pair samples after physics and stops at
//! frame 1500.

pub mod handler;
pub mod payload;
pub mod sampler;
pub mod stop_at_end;
