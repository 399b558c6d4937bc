//! World time for the orchestration loop.

use std::time::Duration;

/// Monotonic world time that only advances while the world is running.
///
/// Large gaps (a backgrounded window, a debugger pause) are clamped to
/// `max_step` so distance-driven fades never jump.
#[derive(Debug, Clone)]
pub struct WorldClock {
    world_time: f64,
    diff: f64,
    max_step: f64,
    paused: bool,
}

impl WorldClock {
    pub fn new(max_step: Duration) -> Self {
        Self {
            world_time: 0.0,
            diff: 0.0,
            max_step: max_step.as_secs_f64(),
            paused: false,
        }
    }

    /// Advances by the real time elapsed since the last call. Returns the
    /// applied step, which is zero while paused.
    pub fn advance(&mut self, elapsed: Duration) -> f64 {
        if self.paused {
            self.diff = 0.0;
            return 0.0;
        }
        self.diff = elapsed.as_secs_f64().min(self.max_step);
        self.world_time += self.diff;
        self.diff
    }

    pub fn world_time(&self) -> f64 {
        self.world_time
    }

    /// Step applied by the most recent `advance`.
    pub fn diff(&self) -> f64 {
        self.diff
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

impl Default for WorldClock {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
