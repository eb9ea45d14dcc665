//! Deterministic in-process engine used by tests and the headless driver.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use crate::{
    audio::{AudioEngine, ClipHandle, EngineEvent},
    ClipIdentity, ManualClock, Result,
};

/// Every call the engine receives, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Load { url: String },
    Play,
    Stop,
    FadeVolume { from: f32, to: f32, duration: Duration },
    Release { url: String },
}

/// Shared view over the calls recorded by a [`SimulatedEngine`] and its clips.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<EngineCall>>>,
}

impl CallLog {
    pub fn calls(&self) -> Vec<EngineCall> {
        self.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&EngineCall) -> bool) -> usize {
        self.lock().iter().filter(|call| predicate(call)).count()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn push(&self, call: EngineCall) {
        self.lock().push(call);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<EngineCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Behaviour {
    Playable(Duration),
    Failing(String),
    /// Never resolves, like an engine that silently drops a bad URL.
    Silent,
}

/// Engine whose clips resolve after a fixed latency on a [`ManualClock`].
/// URLs that were never registered stay loading forever.
#[derive(Debug)]
pub struct SimulatedEngine {
    clock: ManualClock,
    clips: HashMap<String, Behaviour>,
    load_latency: Duration,
    log: CallLog,
}

impl SimulatedEngine {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            clips: HashMap::new(),
            load_latency: Duration::ZERO,
            log: CallLog::default(),
        }
    }

    pub fn with_clip(mut self, url: impl Into<String>, duration: Duration) -> Self {
        self.clips.insert(url.into(), Behaviour::Playable(duration));
        self
    }

    pub fn with_failing_clip(mut self, url: impl Into<String>, reason: impl Into<String>) -> Self {
        self.clips
            .insert(url.into(), Behaviour::Failing(reason.into()));
        self
    }

    pub fn with_silent_clip(mut self, url: impl Into<String>) -> Self {
        self.clips.insert(url.into(), Behaviour::Silent);
        self
    }

    pub fn with_load_latency(mut self, latency: Duration) -> Self {
        self.load_latency = latency;
        self
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }
}

impl AudioEngine for SimulatedEngine {
    type Clip = SimulatedClip;

    fn load(&mut self, identity: &ClipIdentity) -> Result<SimulatedClip> {
        self.log.push(EngineCall::Load {
            url: identity.url.clone(),
        });
        let behaviour = self
            .clips
            .get(&identity.url)
            .cloned()
            .unwrap_or(Behaviour::Silent);
        Ok(SimulatedClip {
            url: identity.url.clone(),
            clock: self.clock.clone(),
            behaviour,
            resolves_at: self.clock.now() + self.load_latency,
            resolved: false,
            started_at: None,
            ended: false,
            fade: None,
            released: false,
            log: self.log.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Fade {
    from: f32,
    to: f32,
    started_at: Duration,
    duration: Duration,
}

#[derive(Debug)]
pub struct SimulatedClip {
    url: String,
    clock: ManualClock,
    behaviour: Behaviour,
    resolves_at: Duration,
    resolved: bool,
    started_at: Option<Duration>,
    ended: bool,
    fade: Option<Fade>,
    released: bool,
    log: CallLog,
}

impl SimulatedClip {
    /// Output gain at the current clock time, following the last fade.
    pub fn gain(&self) -> f32 {
        let Some(fade) = self.fade else {
            return 1.0;
        };
        if fade.duration.is_zero() {
            return fade.to;
        }
        let elapsed = self.clock.now().saturating_sub(fade.started_at);
        let t = (elapsed.as_secs_f32() / fade.duration.as_secs_f32()).min(1.0);
        fade.from + (fade.to - fade.from) * t
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    fn clip_duration(&self) -> Duration {
        match self.behaviour {
            Behaviour::Playable(duration) => duration,
            _ => Duration::ZERO,
        }
    }
}

impl ClipHandle for SimulatedClip {
    fn poll_event(&mut self) -> Option<EngineEvent> {
        if self.released {
            return None;
        }
        let now = self.clock.now();
        if !self.resolved {
            if now < self.resolves_at {
                return None;
            }
            return match &self.behaviour {
                Behaviour::Playable(duration) => {
                    self.resolved = true;
                    Some(EngineEvent::Ready {
                        duration: *duration,
                    })
                }
                Behaviour::Failing(reason) => {
                    self.resolved = true;
                    Some(EngineEvent::Failed {
                        reason: reason.clone(),
                    })
                }
                Behaviour::Silent => None,
            };
        }
        if self.started_at.is_some() && !self.ended && self.elapsed() >= self.clip_duration() {
            self.ended = true;
            return Some(EngineEvent::Ended);
        }
        None
    }

    fn play(&mut self) {
        self.log.push(EngineCall::Play);
        if self.started_at.is_none() {
            self.started_at = Some(self.clock.now());
            self.ended = false;
        }
    }

    fn stop(&mut self) {
        self.log.push(EngineCall::Stop);
        self.started_at = None;
    }

    fn fade_volume(&mut self, from: f32, to: f32, duration: Duration) {
        self.log.push(EngineCall::FadeVolume { from, to, duration });
        self.fade = Some(Fade {
            from,
            to,
            started_at: self.clock.now(),
            duration,
        });
    }

    fn elapsed(&self) -> Duration {
        self.started_at
            .map(|started| {
                self.clock
                    .now()
                    .saturating_sub(started)
                    .min(self.clip_duration())
            })
            .unwrap_or_default()
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.log.push(EngineCall::Release {
                url: self.url.clone(),
            });
        }
    }
}
