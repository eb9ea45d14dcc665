use std::time::Duration;

/// Fraction of `duration` covered by `elapsed`, clamped to `[0, 1]`. A clip
/// without a known length reports no progress.
pub fn progress_fraction(elapsed: Duration, duration: Duration) -> f32 {
    if duration.is_zero() {
        return 0.0;
    }
    (elapsed.as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0) as f32
}

/// Outcome of one progress frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressTick {
    /// A new value was published and the loop wants another frame.
    Published(f32),
    /// Playback is no longer active; the loop ends without publishing.
    Stopped,
}

/// Holds the published progress value for the bound clip.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    duration: Duration,
    value: f32,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Records the length of a freshly loaded clip and clears the value.
    pub fn set_duration(&mut self, duration: Duration) {
        self.duration = duration;
        self.value = 0.0;
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
    }

    /// Runs one frame of the sampling loop. `elapsed` is only queried while
    /// `active` holds.
    pub fn tick(&mut self, active: bool, elapsed: impl FnOnce() -> Duration) -> ProgressTick {
        if !active {
            return ProgressTick::Stopped;
        }
        self.value = progress_fraction(elapsed(), self.duration);
        ProgressTick::Published(self.value)
    }
}
