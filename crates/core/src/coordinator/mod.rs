//! Reactive state machine binding one audio session to the progress ring and
//! the play/stop icon.
//!
//! The coordinator never decides activation itself. The embedder owns the
//! active flag, feeds it in through [`PlaybackCoordinator::set_active`] and
//! receives [`ActivationRequest`]s back from [`PlaybackCoordinator::press`] and
//! [`PlaybackCoordinator::tick`]. All time-driven work runs on frame ticks
//! through a [`Scheduler`] whose per-lane generations keep superseded loops
//! from publishing.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    activation::{ActivationRequest, ButtonId},
    audio::{AudioEngine, PlaybackSession, SessionEvent, SessionId, SessionManager},
    icon::{IconGeometry, IconPoints, IconShape, MorphFrame, MorphRun},
    progress::{ProgressTick, ProgressTracker},
    render::RenderState,
    timeline::{Lane, Scheduler},
    ButtonConfig, ClipIdentity, Result, SoundButtonError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Waiting for the bound clip to become playable.
    Loading,
    /// Ready and silent.
    Idle,
    /// The clip is audible and the progress loop is running.
    Playing,
    /// The clip failed to load or did not load in time.
    Errored,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Loading => write!(f, "Loading"),
            Phase::Idle => write!(f, "Idle"),
            Phase::Playing => write!(f, "Playing"),
            Phase::Errored => write!(f, "Errored"),
        }
    }
}

/// What a tick produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutcome {
    /// Requests for the owner of the active flag.
    pub requests: Vec<ActivationRequest>,
    /// Whether the render state changed during the tick.
    pub changed: bool,
}

pub struct PlaybackCoordinator<E: AudioEngine> {
    id: ButtonId,
    config: ButtonConfig,
    geometry: IconGeometry,
    sessions: SessionManager<E>,
    session: Option<SessionId>,
    scheduler: Scheduler,
    phase: Phase,
    active: bool,
    progress: ProgressTracker,
    icon: IconPoints,
    morph: Option<MorphRun>,
    failure: Option<String>,
    torn_down: bool,
}

impl<E: AudioEngine> PlaybackCoordinator<E> {
    /// Validates `config` and starts loading its clip. The icon starts in the
    /// play shape and the active flag starts false.
    pub fn new(id: ButtonId, config: ButtonConfig, engine: E, now: Duration) -> Result<Self> {
        config.validate()?;

        let geometry = IconGeometry::from_appearance(&config.appearance);
        let mut sessions = SessionManager::new(engine);
        let session = sessions.bind(&config.clip)?;
        info!(button = %id, clip = %config.clip, "sound button created");

        let mut coordinator = Self {
            icon: geometry.points(IconShape::Play),
            id,
            config,
            geometry,
            sessions,
            session: Some(session),
            scheduler: Scheduler::new(),
            phase: Phase::Loading,
            active: false,
            progress: ProgressTracker::new(),
            morph: None,
            failure: None,
            torn_down: false,
        };
        coordinator.arm_load_timeout(now);
        Ok(coordinator)
    }

    pub fn id(&self) -> &ButtonId {
        &self.id
    }

    pub fn config(&self) -> &ButtonConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn progress(&self) -> f32 {
        self.progress.value()
    }

    pub fn icon(&self) -> IconPoints {
        self.icon
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn engine(&self) -> &E {
        self.sessions.engine()
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.sessions.session()
    }

    /// Whether work is queued on `lane` for a future tick.
    pub fn is_scheduled(&self, lane: Lane) -> bool {
        self.scheduler.is_pending(lane)
    }

    /// The load failure behind [`Phase::Errored`].
    pub fn error(&self) -> Option<SoundButtonError> {
        self.failure
            .as_ref()
            .map(|reason| SoundButtonError::ClipUnavailable {
                url: self.config.clip.url.clone(),
                reason: reason.clone(),
            })
    }

    pub fn render_state(&self) -> RenderState {
        RenderState::new(
            self.phase,
            self.progress.value(),
            self.icon,
            &self.config.appearance,
        )
    }

    /// Translates a click or tap into a request for the flag owner.
    pub fn press(&self) -> ActivationRequest {
        if self.active {
            ActivationRequest::Stop(self.id.clone())
        } else {
            ActivationRequest::Play(self.id.clone())
        }
    }

    /// Delivers the owner's active flag. Repeating the current value is a
    /// no-op. While the clip is loading or failed the flag is only recorded
    /// and acted upon once the clip becomes ready, although clearing it still
    /// returns the icon to the play shape.
    pub fn set_active(&mut self, active: bool, now: Duration) -> Result<()> {
        if self.torn_down || active == self.active {
            return Ok(());
        }
        self.active = active;

        match (active, self.phase) {
            (true, Phase::Idle) => self.activate(now),
            (false, Phase::Playing) => self.deactivate(now),
            (_, phase) => {
                debug!(button = %self.id, active, %phase, "active flag recorded");
                if !active {
                    self.settle_icon(IconShape::Play, now);
                }
                Ok(())
            }
        }
    }

    /// Switches to another clip. In-flight loops are cancelled, the old
    /// session is released and the new one starts loading. Setting the bound
    /// clip again only reloads it after a failure.
    pub fn set_clip(&mut self, clip: ClipIdentity, now: Duration) -> Result<()> {
        if self.torn_down {
            return Ok(());
        }
        let retry = self.phase == Phase::Errored;
        if clip == self.config.clip && !retry {
            return Ok(());
        }
        let mut config = self.config.clone();
        config.clip = clip;
        config.validate()?;

        info!(button = %self.id, clip = %config.clip, "rebinding clip");
        self.scheduler.supersede(Lane::Progress);
        self.scheduler.supersede(Lane::DeferredStop);
        self.scheduler.supersede(Lane::Morph);
        if let Some(run) = self.morph.take() {
            self.icon = run.target();
        }
        self.progress.set_duration(Duration::ZERO);
        self.failure = None;
        self.config = config;
        self.phase = Phase::Loading;

        // A failed session may still hold a late load result, so a retry
        // always starts a fresh load.
        let bound = if retry {
            self.sessions.rebind(&self.config.clip)
        } else {
            self.sessions.bind(&self.config.clip)
        };
        match bound {
            Ok(session) => {
                self.session = Some(session);
                self.arm_load_timeout(now);
                Ok(())
            }
            Err(err) => {
                self.session = None;
                self.fail(err.to_string());
                Err(err)
            }
        }
    }

    /// Runs one display frame: drains engine notifications, then every task
    /// that is due at `now`.
    pub fn tick(&mut self, now: Duration) -> Result<TickOutcome> {
        let mut outcome = TickOutcome::default();
        if self.torn_down {
            return Ok(outcome);
        }

        while let Some(event) = self.sessions.poll() {
            if Some(event.session()) != self.session {
                debug!(button = %self.id, session = %event.session(), "dropping stale session event");
                continue;
            }
            self.handle_session_event(event, now, &mut outcome)?;
        }

        for task in self.scheduler.take_due(now) {
            // An earlier task in this batch may have superseded the lane.
            if !self.scheduler.is_current(&task) {
                continue;
            }
            match task.lane {
                Lane::Progress => self.progress_frame(now, &mut outcome),
                Lane::Morph => self.morph_frame(now, &mut outcome),
                Lane::DeferredStop => {
                    debug!(button = %self.id, "fade-out finished, stopping");
                    self.sessions.stop()?;
                }
                Lane::LoadTimeout => {
                    if self.phase == Phase::Loading {
                        let waited = self.config.timing.load_timeout().unwrap_or_default();
                        self.fail(format!("no response within {} ms", waited.as_millis()));
                        outcome.changed = true;
                    }
                }
            }
        }

        Ok(outcome)
    }

    /// Releases the session and drops all scheduled work. Later calls have no
    /// effect.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.scheduler.clear();
        self.morph = None;
        self.session = None;
        self.sessions.release();
        info!(button = %self.id, "sound button torn down");
    }

    fn handle_session_event(
        &mut self,
        event: SessionEvent,
        now: Duration,
        outcome: &mut TickOutcome,
    ) -> Result<()> {
        match event {
            SessionEvent::Ready { duration, .. } => {
                if self.phase != Phase::Loading {
                    return Ok(());
                }
                self.scheduler.supersede(Lane::LoadTimeout);
                self.progress.set_duration(duration);
                self.phase = Phase::Idle;
                outcome.changed = true;
                info!(button = %self.id, ?duration, "clip ready");
                if self.active {
                    self.activate(now)?;
                }
            }
            SessionEvent::Ended { .. } => {
                if self.active {
                    debug!(button = %self.id, "clip ended, requesting stop");
                    outcome.requests.push(ActivationRequest::Stop(self.id.clone()));
                }
            }
            SessionEvent::Failed { reason, .. } => {
                self.fail(reason);
                outcome.changed = true;
            }
        }
        Ok(())
    }

    fn activate(&mut self, now: Duration) -> Result<()> {
        // A fade-out still waiting for its stop is cut short so playback
        // restarts from the beginning.
        if self.scheduler.is_pending(Lane::DeferredStop) {
            self.scheduler.supersede(Lane::DeferredStop);
            self.sessions.stop()?;
        }

        self.sessions.play()?;
        self.sessions
            .fade_volume(0.0, 1.0, self.config.timing.fade_in())?;
        self.start_morph(IconShape::Stop, now);
        self.progress.reset();
        self.scheduler.supersede(Lane::Progress);
        self.scheduler.schedule_frame(Lane::Progress, now);
        self.phase = Phase::Playing;
        info!(button = %self.id, "playback started");
        Ok(())
    }

    fn deactivate(&mut self, now: Duration) -> Result<()> {
        let fade_out = self.config.timing.fade_out();
        self.sessions.fade_volume(1.0, 0.0, fade_out)?;
        self.scheduler.supersede(Lane::DeferredStop);
        self.scheduler.schedule_at(Lane::DeferredStop, now + fade_out);
        self.start_morph(IconShape::Play, now);
        self.progress.reset();
        self.phase = Phase::Idle;
        info!(button = %self.id, ?fade_out, "playback stopping");
        Ok(())
    }

    fn start_morph(&mut self, shape: IconShape, now: Duration) {
        self.scheduler.supersede(Lane::Morph);
        self.morph = Some(MorphRun::new(
            now,
            self.config.timing.icon_animation(),
            self.icon,
            shape,
            &self.geometry,
        ));
        self.scheduler.schedule_frame(Lane::Morph, now);
    }

    /// Morphs towards `shape` unless the icon is already there or heading
    /// there.
    fn settle_icon(&mut self, shape: IconShape, now: Duration) {
        let heading = self.morph.as_ref().map_or(self.icon, MorphRun::target);
        if heading != self.geometry.points(shape) {
            self.start_morph(shape, now);
        }
    }

    fn progress_frame(&mut self, now: Duration, outcome: &mut TickOutcome) {
        let playing = self.active && self.phase == Phase::Playing;
        match self.progress.tick(playing, || self.sessions.elapsed()) {
            ProgressTick::Published(_) => {
                outcome.changed = true;
                self.scheduler.schedule_frame(Lane::Progress, now);
            }
            ProgressTick::Stopped => {
                debug!(button = %self.id, "progress loop finished");
            }
        }
    }

    fn morph_frame(&mut self, now: Duration, outcome: &mut TickOutcome) {
        let Some(frame) = self.morph.as_ref().map(|run| run.sample(now)) else {
            return;
        };
        self.icon = frame.points();
        outcome.changed = true;
        match frame {
            MorphFrame::InFlight(_) => self.scheduler.schedule_frame(Lane::Morph, now),
            MorphFrame::Finished(_) => self.morph = None,
        }
    }

    fn fail(&mut self, reason: String) {
        warn!(button = %self.id, clip = %self.config.clip, %reason, "clip unavailable");
        self.scheduler.supersede(Lane::LoadTimeout);
        self.sessions.mark_failed(reason.clone());
        self.failure = Some(reason);
        self.phase = Phase::Errored;
    }

    fn arm_load_timeout(&mut self, now: Duration) {
        self.scheduler.supersede(Lane::LoadTimeout);
        if let Some(timeout) = self.config.timing.load_timeout() {
            self.scheduler.schedule_at(Lane::LoadTimeout, now + timeout);
        }
    }
}

impl<E: AudioEngine> Drop for PlaybackCoordinator<E> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<E: AudioEngine> fmt::Debug for PlaybackCoordinator<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackCoordinator")
            .field("id", &self.id)
            .field("clip", &self.config.clip)
            .field("phase", &self.phase)
            .field("active", &self.active)
            .field("progress", &self.progress.value())
            .field("session", &self.session)
            .field("scheduled", &self.scheduler.len())
            .field("torn_down", &self.torn_down)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EngineCall, ManualClock, SimulatedEngine};

    const MS: Duration = Duration::from_millis(1);

    struct Rig {
        clock: ManualClock,
        button: PlaybackCoordinator<SimulatedEngine>,
    }

    impl Rig {
        fn new(config: ButtonConfig) -> Self {
            let clock = ManualClock::new();
            let engine = SimulatedEngine::new(clock.clone())
                .with_clip("a.mp3", MS * 1000)
                .with_clip("b.mp3", MS * 4000)
                .with_silent_clip("hang.mp3")
                .with_failing_clip("bad.mp3", "decode error")
                .with_load_latency(MS * 20);
            let button =
                PlaybackCoordinator::new(ButtonId::new("btn"), config, engine, clock.now())
                    .unwrap();
            Self { clock, button }
        }

        fn ready() -> Self {
            let mut rig = Self::new(ButtonConfig::new(ClipIdentity::new("a.mp3", "mp3")));
            rig.run(MS * 20, MS * 10);
            assert_eq!(rig.button.phase(), Phase::Idle);
            rig
        }

        fn run(&mut self, span: Duration, step: Duration) -> Vec<ActivationRequest> {
            let end = self.clock.now() + span;
            let mut requests = Vec::new();
            while self.clock.now() < end {
                let now = self.clock.advance(step);
                requests.extend(self.button.tick(now).unwrap().requests);
            }
            requests
        }

        fn count(&self, predicate: impl Fn(&EngineCall) -> bool) -> usize {
            self.button.engine().log().count(predicate)
        }
    }

    #[test]
    fn starts_loading_with_the_play_icon() {
        let rig = Rig::new(ButtonConfig::new(ClipIdentity::new("a.mp3", "mp3")));
        let state = rig.button.render_state();
        assert!(state.loading);
        assert_eq!(state.progress, 0.0);
        assert_eq!(
            state.icon,
            IconGeometry::from_appearance(&rig.button.config().appearance)
                .points(IconShape::Play)
        );
    }

    #[test]
    fn rejects_invalid_configuration() {
        let mut config = ButtonConfig::new(ClipIdentity::new("", "mp3"));
        config.timing.fade_in_ms = 10.0;
        let engine = SimulatedEngine::new(ManualClock::new());
        let err =
            PlaybackCoordinator::new(ButtonId::new("x"), config, engine, Duration::ZERO)
                .unwrap_err();
        assert!(matches!(err, SoundButtonError::Configuration(_)));
    }

    #[test]
    fn press_requests_the_opposite_of_the_flag() {
        let mut rig = Rig::ready();
        assert_eq!(rig.button.press(), ActivationRequest::Play(ButtonId::new("btn")));
        rig.button.set_active(true, rig.clock.now()).unwrap();
        assert_eq!(rig.button.press(), ActivationRequest::Stop(ButtonId::new("btn")));
    }

    #[test]
    fn repeated_flags_do_not_touch_the_engine() {
        let mut rig = Rig::ready();
        let now = rig.clock.now();
        rig.button.set_active(false, now).unwrap();
        rig.button.set_active(true, now).unwrap();
        rig.button.set_active(true, now).unwrap();
        assert_eq!(rig.count(|call| matches!(call, EngineCall::Play)), 1);

        rig.button.set_active(false, now).unwrap();
        rig.button.set_active(false, now).unwrap();
        rig.run(MS * 400, MS * 10);
        assert_eq!(rig.count(|call| matches!(call, EngineCall::Stop)), 1);
    }

    #[test]
    fn progress_follows_playback() {
        let mut rig = Rig::ready();
        rig.button.set_active(true, rig.clock.now()).unwrap();
        rig.run(MS * 250, MS * 10);
        let progress = rig.button.progress();
        assert!((progress - 0.25).abs() < 0.01, "progress was {progress}");
    }

    #[test]
    fn activation_before_ready_waits_for_the_clip() {
        let mut rig = Rig::new(ButtonConfig::new(ClipIdentity::new("a.mp3", "mp3")));
        rig.button.set_active(true, rig.clock.now()).unwrap();
        assert_eq!(rig.count(|call| matches!(call, EngineCall::Play)), 0);

        rig.run(MS * 20, MS * 10);
        assert_eq!(rig.button.phase(), Phase::Playing);
        assert_eq!(rig.count(|call| matches!(call, EngineCall::Play)), 1);
    }

    #[test]
    fn natural_end_requests_stop() {
        let mut rig = Rig::ready();
        rig.button.set_active(true, rig.clock.now()).unwrap();
        let requests = rig.run(MS * 1100, MS * 10);
        assert_eq!(requests, vec![ActivationRequest::Stop(ButtonId::new("btn"))]);
        assert_eq!(rig.button.progress(), 1.0);
        // The owner has not reacted yet, so the button keeps playing.
        assert_eq!(rig.button.phase(), Phase::Playing);
    }

    #[test]
    fn reactivating_during_fade_out_restarts_cleanly() {
        let mut rig = Rig::ready();
        rig.button.set_active(true, rig.clock.now()).unwrap();
        rig.run(MS * 100, MS * 10);
        rig.button.set_active(false, rig.clock.now()).unwrap();
        rig.run(MS * 100, MS * 10);
        rig.button.set_active(true, rig.clock.now()).unwrap();
        assert!(!rig.button.is_scheduled(Lane::DeferredStop));
        assert_eq!(rig.count(|call| matches!(call, EngineCall::Stop)), 1);

        rig.run(MS * 500, MS * 10);
        assert_eq!(rig.button.phase(), Phase::Playing);
        assert_eq!(rig.count(|call| matches!(call, EngineCall::Stop)), 1);
        assert_eq!(rig.count(|call| matches!(call, EngineCall::Play)), 2);
    }

    #[test]
    fn silent_load_times_out_into_errored() {
        let mut config = ButtonConfig::new(ClipIdentity::new("hang.mp3", "mp3"));
        config.timing.load_timeout_ms = Some(500.0);
        let mut rig = Rig::new(config);

        rig.run(MS * 490, MS * 10);
        assert_eq!(rig.button.phase(), Phase::Loading);
        rig.run(MS * 10, MS * 10);
        assert_eq!(rig.button.phase(), Phase::Errored);
        assert!(rig.button.render_state().errored);
        assert!(matches!(
            rig.button.error(),
            Some(SoundButtonError::ClipUnavailable { .. })
        ));
    }

    #[test]
    fn engine_failure_is_reported_and_retry_reloads() {
        let mut rig = Rig::new(ButtonConfig::new(ClipIdentity::new("bad.mp3", "mp3")));
        rig.run(MS * 20, MS * 10);
        assert_eq!(rig.button.phase(), Phase::Errored);
        let err = rig.button.error().unwrap();
        assert!(err.to_string().contains("decode error"));

        rig.button
            .set_clip(ClipIdentity::new("bad.mp3", "mp3"), rig.clock.now())
            .unwrap();
        assert_eq!(rig.button.phase(), Phase::Loading);
        assert_eq!(rig.count(|call| matches!(call, EngineCall::Load { .. })), 2);
    }

    #[test]
    fn retry_after_timeout_reloads_even_if_the_clip_arrived_late() {
        let mut config = ButtonConfig::new(ClipIdentity::new("a.mp3", "mp3"));
        config.timing.load_timeout_ms = Some(10.0);
        let mut rig = Rig::new(config);
        rig.run(MS * 10, MS * 10);
        assert_eq!(rig.button.phase(), Phase::Errored);

        // The engine resolves after the timeout; the button stays failed.
        rig.run(MS * 20, MS * 10);
        assert_eq!(rig.button.phase(), Phase::Errored);
        assert!(!rig.button.session().unwrap().loaded());

        rig.button
            .set_clip(ClipIdentity::new("a.mp3", "mp3"), rig.clock.now())
            .unwrap();
        assert_eq!(rig.button.phase(), Phase::Loading);
        assert!(rig.button.error().is_none());
        assert_eq!(rig.count(|call| matches!(call, EngineCall::Load { .. })), 2);
        assert_eq!(rig.count(|call| matches!(call, EngineCall::Release { .. })), 1);
    }

    #[test]
    fn clearing_the_flag_while_loading_restores_the_play_icon() {
        let mut rig = Rig::ready();
        let geometry = IconGeometry::from_appearance(&rig.button.config().appearance);
        rig.button.set_active(true, rig.clock.now()).unwrap();
        rig.run(MS * 500, MS * 10);
        assert_eq!(rig.button.icon(), geometry.points(IconShape::Stop));

        rig.button
            .set_clip(ClipIdentity::new("b.mp3", "mp3"), rig.clock.now())
            .unwrap();
        rig.button.set_active(false, rig.clock.now()).unwrap();
        assert!(rig.button.is_scheduled(Lane::Morph));

        rig.run(MS * 1000, MS * 10);
        assert_eq!(rig.button.phase(), Phase::Idle);
        assert!(!rig.button.is_active());
        assert!(rig.button.icon().approx_eq(&geometry.points(IconShape::Play), 1e-4));
        assert_eq!(rig.count(|call| matches!(call, EngineCall::Play)), 1);
    }

    #[test]
    fn clearing_the_flag_on_an_idle_icon_does_not_animate() {
        let mut rig = Rig::new(ButtonConfig::new(ClipIdentity::new("a.mp3", "mp3")));
        rig.button.set_active(true, rig.clock.now()).unwrap();
        rig.button.set_active(false, rig.clock.now()).unwrap();
        assert!(!rig.button.is_scheduled(Lane::Morph));
    }

    #[test]
    fn timeout_is_disarmed_once_ready() {
        let mut config = ButtonConfig::new(ClipIdentity::new("a.mp3", "mp3"));
        config.timing.load_timeout_ms = Some(100.0);
        let mut rig = Rig::new(config);
        rig.run(MS * 300, MS * 10);
        assert_eq!(rig.button.phase(), Phase::Idle);
        assert!(rig.button.error().is_none());
    }

    #[test]
    fn rebinding_the_same_clip_is_a_no_op() {
        let mut rig = Rig::ready();
        rig.button
            .set_clip(ClipIdentity::new("a.mp3", "mp3"), rig.clock.now())
            .unwrap();
        assert_eq!(rig.button.phase(), Phase::Idle);
        assert_eq!(rig.count(|call| matches!(call, EngineCall::Load { .. })), 1);
    }

    #[test]
    fn teardown_releases_once_and_stops_ticking() {
        let mut rig = Rig::ready();
        rig.button.set_active(true, rig.clock.now()).unwrap();
        rig.run(MS * 50, MS * 10);
        rig.button.teardown();
        let progress = rig.button.progress();
        let icon = rig.button.icon();

        rig.run(MS * 500, MS * 10);
        rig.button.teardown();
        assert_eq!(rig.button.progress(), progress);
        assert_eq!(rig.button.icon(), icon);
        assert_eq!(rig.count(|call| matches!(call, EngineCall::Release { .. })), 1);
        assert!(rig.button.is_torn_down());
    }
}
