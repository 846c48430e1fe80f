//! Simulation time and deferred work.
//!
//! - [`TickTime`] - The clock handed to everything ticked in a world step
//! - [`TimerQueue`] - One-shot and periodic callbacks relative to simulation time
//! - [`Fault`] - A contained failure of a single tick or timer

mod fault;
mod timer_queue;

pub use fault::{Fault, run_isolated};
pub use timer_queue::{TimerCallback, TimerId, TimerQueue};

/// The simulation clock for one world step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickTime {
    /// Number of steps taken so far, including this one.
    pub tick_count: u64,
    /// Simulation time since the world started, in milliseconds.
    pub total_elapsed_ms: i64,
    /// Length of this step, in milliseconds.
    pub elapsed_ms_delta: i64,
}

impl TickTime {
    /// The clock for the step following this one.
    #[must_use]
    pub fn next(self, delta_ms: i64) -> Self {
        Self {
            tick_count: self.tick_count + 1,
            total_elapsed_ms: self.total_elapsed_ms + delta_ms,
            elapsed_ms_delta: delta_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_accumulates() {
        let time = TickTime::default().next(200).next(200).next(150);
        assert_eq!(time.tick_count, 3);
        assert_eq!(time.total_elapsed_ms, 550);
        assert_eq!(time.elapsed_ms_delta, 150);
    }
}
