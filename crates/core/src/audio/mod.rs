use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{ClipIdentity, Result, SoundButtonError};

pub mod simulated;

pub use simulated::{CallLog, EngineCall, SimulatedClip, SimulatedEngine};

/// Notifications an engine connection produces while it is polled.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Decoding finished and the clip can be played.
    Ready { duration: Duration },
    /// Playback reached the end of the clip.
    Ended,
    /// The clip could not be loaded. Engines are not required to report this;
    /// a load that never resolves is caught by the coordinator's timeout.
    Failed { reason: String },
}

/// One live connection to the audio engine for a single clip.
pub trait ClipHandle {
    /// Returns the next pending notification, if any.
    fn poll_event(&mut self) -> Option<EngineEvent>;
    /// Starts output from the current cursor.
    fn play(&mut self);
    /// Halts output and rewinds the cursor.
    fn stop(&mut self);
    /// Ramps the output gain independently of the transport state.
    fn fade_volume(&mut self, from: f32, to: f32, duration: Duration);
    /// Playback position; only meaningful while playing.
    fn elapsed(&self) -> Duration;
    /// Frees every engine resource held by the connection.
    fn release(&mut self);
}

/// The external decode/transport engine.
pub trait AudioEngine {
    type Clip: ClipHandle;

    /// Starts loading `identity` asynchronously. Readiness is reported through
    /// [`ClipHandle::poll_event`].
    fn load(&mut self, identity: &ClipIdentity) -> Result<Self::Clip>;
}

/// Tag distinguishing successive bindings of one manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum LoadState {
    Loading,
    Loaded(Duration),
    Failed(String),
}

/// Bookkeeping for the clip currently bound to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSession {
    id: SessionId,
    identity: ClipIdentity,
    state: LoadState,
}

impl PlaybackSession {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn identity(&self) -> &ClipIdentity {
        &self.identity
    }

    pub fn loaded(&self) -> bool {
        matches!(self.state, LoadState::Loaded(_))
    }

    pub fn failed(&self) -> bool {
        matches!(self.state, LoadState::Failed(_))
    }

    /// Clip length, known once loading has finished.
    pub fn duration(&self) -> Option<Duration> {
        match self.state {
            LoadState::Loaded(duration) => Some(duration),
            _ => None,
        }
    }
}

/// Engine notifications tagged with the binding they belong to.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Ready {
        session: SessionId,
        duration: Duration,
    },
    Ended {
        session: SessionId,
    },
    Failed {
        session: SessionId,
        reason: String,
    },
}

impl SessionEvent {
    pub fn session(&self) -> SessionId {
        match self {
            SessionEvent::Ready { session, .. }
            | SessionEvent::Ended { session }
            | SessionEvent::Failed { session, .. } => *session,
        }
    }
}

struct LiveSession<C> {
    session: PlaybackSession,
    clip: C,
}

/// Owns at most one engine connection and forwards transport calls to it.
pub struct SessionManager<E: AudioEngine> {
    engine: E,
    live: Option<LiveSession<E::Clip>>,
    next_id: u64,
}

impl<E: AudioEngine> SessionManager<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            live: None,
            next_id: 0,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.live.as_ref().map(|live| &live.session)
    }

    /// Binds `identity`. A live, healthy session for the same identity is kept
    /// as is; anything else is released before the new load starts.
    pub fn bind(&mut self, identity: &ClipIdentity) -> Result<SessionId> {
        if let Some(live) = &self.live {
            if live.session.identity == *identity && !live.session.failed() {
                debug!(session = %live.session.id, clip = %identity, "clip already bound");
                return Ok(live.session.id);
            }
        }
        self.rebind(identity)
    }

    /// Releases whatever is bound and loads `identity` from scratch.
    pub fn rebind(&mut self, identity: &ClipIdentity) -> Result<SessionId> {
        self.release();

        let clip = self.engine.load(identity)?;
        self.next_id += 1;
        let id = SessionId(self.next_id);
        debug!(session = %id, clip = %identity, "loading clip");
        self.live = Some(LiveSession {
            session: PlaybackSession {
                id,
                identity: identity.clone(),
                state: LoadState::Loading,
            },
            clip,
        });
        Ok(id)
    }

    /// Drains one notification from the live connection.
    pub fn poll(&mut self) -> Option<SessionEvent> {
        let live = self.live.as_mut()?;
        let session = live.session.id;
        loop {
            let event = live.clip.poll_event()?;
            return Some(match event {
                EngineEvent::Ready { duration } => {
                    // A session given up on stays failed until it is rebound.
                    if live.session.failed() {
                        debug!(%session, "ignoring late ready for failed clip");
                        continue;
                    }
                    debug!(%session, ?duration, "clip ready");
                    live.session.state = LoadState::Loaded(duration);
                    SessionEvent::Ready { session, duration }
                }
                EngineEvent::Ended => SessionEvent::Ended { session },
                EngineEvent::Failed { reason } => {
                    warn!(%session, clip = %live.session.identity, %reason, "clip failed to load");
                    live.session.state = LoadState::Failed(reason.clone());
                    SessionEvent::Failed { session, reason }
                }
            });
        }
    }

    /// Marks the live session as failed without waiting for the engine.
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        if let Some(live) = self.live.as_mut() {
            live.session.state = LoadState::Failed(reason.into());
        }
    }

    pub fn play(&mut self) -> Result<()> {
        let live = self.live_mut()?;
        if !live.session.loaded() {
            return Err(SoundButtonError::SessionNotReady {
                url: live.session.identity.url.clone(),
            });
        }
        live.clip.play();
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        self.live_mut()?.clip.stop();
        Ok(())
    }

    pub fn fade_volume(&mut self, from: f32, to: f32, duration: Duration) -> Result<()> {
        self.live_mut()?.clip.fade_volume(from, to, duration);
        Ok(())
    }

    /// Playback position of the live session, zero when nothing is bound.
    pub fn elapsed(&self) -> Duration {
        self.live
            .as_ref()
            .map(|live| live.clip.elapsed())
            .unwrap_or_default()
    }

    /// Releases the live session. Safe to call any number of times.
    pub fn release(&mut self) {
        if let Some(mut live) = self.live.take() {
            debug!(session = %live.session.id, "releasing clip");
            live.clip.release();
        }
    }

    fn live_mut(&mut self) -> Result<&mut LiveSession<E::Clip>> {
        self.live.as_mut().ok_or(SoundButtonError::SessionReleased)
    }
}

impl<E: AudioEngine> Drop for SessionManager<E> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<E: AudioEngine> fmt::Debug for SessionManager<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("session", &self.session())
            .field("next_id", &self.next_id)
            .finish()
    }
}
