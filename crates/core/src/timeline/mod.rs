use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

/// Manually advanced clock shared between a frame driver and anything that
/// needs to read "now" between ticks, such as the simulated engine. Clones
/// observe the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        *self.lock()
    }

    /// Moves the clock forward and returns the new time.
    pub fn advance(&self, delta: Duration) -> Duration {
        let mut now = self.lock();
        *now += delta;
        *now
    }

    /// Jumps to `time`. The clock never runs backwards.
    pub fn set(&self, time: Duration) {
        let mut now = self.lock();
        *now = (*now).max(time);
    }

    pub fn reset(&self) {
        *self.lock() = Duration::ZERO;
    }

    fn lock(&self) -> MutexGuard<'_, Duration> {
        // A plain Duration cannot be left half-written, so a poisoned guard is
        // still usable.
        self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fixed-rate frame timing for drivers that emulate a display clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePacer {
    period: Duration,
}

impl FramePacer {
    /// Creates a pacer for `fps` frames per second; zero is treated as one.
    pub fn from_fps(fps: u32) -> Self {
        let fps = u64::from(fps.max(1));
        Self {
            period: Duration::from_nanos(1_000_000_000 / fps),
        }
    }

    pub fn with_period(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_nanos(1)),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Frame timestamps after `start` up to and including `end`.
    pub fn frames(&self, start: Duration, end: Duration) -> impl Iterator<Item = Duration> {
        let period = self.period;
        std::iter::successors(Some(start + period), move |previous| Some(*previous + period))
            .take_while(move |time| *time <= end)
    }
}

/// Independent streams of scheduled work. Each lane carries its own
/// generation counter so that superseding one loop never disturbs another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    /// Per-frame progress sampling.
    Progress,
    /// Per-frame icon interpolation.
    Morph,
    /// One-shot `stop()` after a fade-out.
    DeferredStop,
    /// One-shot check that the bound clip finished loading.
    LoadTimeout,
}

impl Lane {
    pub const ALL: [Lane; 4] = [
        Lane::Progress,
        Lane::Morph,
        Lane::DeferredStop,
        Lane::LoadTimeout,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTask {
    pub lane: Lane,
    pub generation: u64,
    pub due: Duration,
}

/// Cooperative task queue driven by frame ticks. Loops are expressed as tasks
/// that re-arm themselves at the end of a tick instead of recursing.
#[derive(Debug, Default)]
pub struct Scheduler {
    tasks: Vec<ScheduledTask>,
    generations: [u64; 4],
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self, lane: Lane) -> u64 {
        self.generations[lane.index()]
    }

    /// Invalidates everything queued on `lane` and returns the generation new
    /// work on that lane must carry.
    pub fn supersede(&mut self, lane: Lane) -> u64 {
        let slot = &mut self.generations[lane.index()];
        *slot += 1;
        let generation = *slot;
        self.tasks
            .retain(|task| task.lane != lane || task.generation == generation);
        generation
    }

    pub fn is_current(&self, task: &ScheduledTask) -> bool {
        task.generation == self.generation(task.lane)
    }

    /// Arms `lane` for the next frame tick at or after `now`.
    pub fn schedule_frame(&mut self, lane: Lane, now: Duration) {
        self.schedule_at(lane, now);
    }

    /// Arms `lane` for the first tick at or after `due`.
    pub fn schedule_at(&mut self, lane: Lane, due: Duration) {
        let generation = self.generation(lane);
        self.tasks.push(ScheduledTask {
            lane,
            generation,
            due,
        });
    }

    /// Removes and returns the current-generation tasks that are due, ordered
    /// by due time. Tasks armed while the batch is processed wait for the next
    /// tick.
    pub fn take_due(&mut self, now: Duration) -> Vec<ScheduledTask> {
        let generations = self.generations;
        self.tasks
            .retain(|task| task.generation == generations[task.lane.index()]);

        let mut due = Vec::new();
        self.tasks.retain(|task| {
            if task.due <= now {
                due.push(*task);
                false
            } else {
                true
            }
        });
        due.sort_by_key(|task| task.due);
        due
    }

    pub fn is_pending(&self, lane: Lane) -> bool {
        let generation = self.generation(lane);
        self.tasks
            .iter()
            .any(|task| task.lane == lane && task.generation == generation)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Drops every queued task and invalidates all lanes.
    pub fn clear(&mut self) {
        for lane in Lane::ALL {
            self.supersede(lane);
        }
        self.tasks.clear();
    }
}
