//! Core library for the Sound Button widget.
//!
//! A sound button plays one bounded audio clip and renders two pieces of
//! feedback: a progress ring sampled from the playback position every frame,
//! and a play/stop icon that morphs between shapes when playback toggles.
//! Each module owns one part of that coordination (engine session, progress
//! sampling, icon morphing, frame scheduling) and [`PlaybackCoordinator`]
//! sequences them. Layout, painting and the audio engine itself live outside
//! this crate.

pub mod activation;
pub mod audio;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod icon;
pub mod progress;
pub mod render;
pub mod timeline;

pub use activation::{ActivationRequest, ButtonId, ExclusivePlayback, FlagChange};
pub use audio::{
    AudioEngine, CallLog, ClipHandle, EngineCall, EngineEvent, PlaybackSession, SessionEvent,
    SessionId, SessionManager, SimulatedClip, SimulatedEngine,
};
pub use config::{Appearance, ButtonConfig, ClipIdentity, Color, Palette, TimingConfig};
pub use coordinator::{Phase, PlaybackCoordinator, TickOutcome};
pub use error::{ConfigurationError, Result, SoundButtonError};
pub use icon::{ease_out_cubic, IconGeometry, IconPoints, IconShape, MorphFrame, MorphRun, Point};
pub use progress::{progress_fraction, ProgressTick, ProgressTracker};
pub use render::{ProgressRing, RenderState};
pub use timeline::{FramePacer, Lane, ManualClock, ScheduledTask, Scheduler};
