//! Deferred timer queue.
//!
//! Based on the scheduled tick containers, but keyed by simulation time rather
//! than by position: callbacks are run on the simulation thread at the end of a
//! world step and decide themselves whether they run again.

use std::sync::atomic::{AtomicU64, Ordering};

use realm_utils::locks::SyncMutex;

use super::{Fault, TickTime, run_isolated};

/// A timer callback. Returns whether a repeating timer should be rescheduled.
pub type TimerCallback<W> = Box<dyn FnMut(&W, &TickTime) -> anyhow::Result<bool> + Send>;

/// Identifies a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

struct Timer<W> {
    id: TimerId,
    delay_ms: i64,
    remaining_ms: i64,
    repeat: bool,
    callback: TimerCallback<W>,
}

/// Callbacks scheduled relative to simulation time, owned by `W`.
pub struct TimerQueue<W> {
    timers: SyncMutex<Vec<Timer<W>>>,
    next_id: AtomicU64,
    /// Bumped by [`TimerQueue::clear`].
    generation: AtomicU64,
}

impl<W> TimerQueue<W> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            timers: SyncMutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            generation: AtomicU64::new(0),
        }
    }

    /// Schedules `callback` to run once `delay_ms` of simulation time has passed.
    ///
    /// A repeating timer runs again after another `delay_ms` for as long as the
    /// callback returns `Ok(true)`. The return value of a one-shot timer is ignored.
    pub fn schedule<F>(&self, delay_ms: u32, repeat: bool, callback: F) -> TimerId
    where
        F: FnMut(&W, &TickTime) -> anyhow::Result<bool> + Send + 'static,
    {
        let id = TimerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.timers.lock().push(Timer {
            id,
            delay_ms: i64::from(delay_ms),
            remaining_ms: i64::from(delay_ms),
            repeat,
            callback: Box::new(callback),
        });

        log::trace!("Scheduled timer {} in {delay_ms}ms (repeat={repeat})", id.0);
        id
    }

    /// Advances every timer by the step length and runs the ones that are due.
    ///
    /// Timers are visited from the back of the list so finished ones can be removed
    /// in place. A failing callback is logged and its timer discarded; the pass
    /// continues with the next timer. Callbacks may schedule new timers, which
    /// are first considered on the next pass. A callback that clears the queue
    /// ends the pass and the timers it had taken are dropped.
    ///
    /// Returns the number of callbacks that ran.
    pub fn process(&self, owner: &W, time: &TickTime) -> usize {
        let generation = self.generation.load(Ordering::Acquire);
        let mut timers = std::mem::take(&mut *self.timers.lock());
        let mut fired = 0;

        for i in (0..timers.len()).rev() {
            if self.generation.load(Ordering::Acquire) != generation {
                break;
            }
            let timer = &mut timers[i];
            timer.remaining_ms -= time.elapsed_ms_delta;
            if timer.remaining_ms > 0 {
                continue;
            }

            fired += 1;
            let keep = match run_isolated(|| (timer.callback)(owner, time)) {
                Ok(again) => timer.repeat && again,
                Err(Fault::Error(err)) => {
                    log::error!("Timer {} failed: {err:#}", timer.id.0);
                    false
                }
                Err(fault @ Fault::Panic(_)) => {
                    log::error!("Timer {} {fault}", timer.id.0);
                    false
                }
            };

            if keep {
                timer.remaining_ms = timer.delay_ms;
            } else {
                timers.remove(i);
            }
        }

        let mut stored = self.timers.lock();
        if self.generation.load(Ordering::Acquire) != generation {
            return fired;
        }
        timers.append(&mut stored);
        *stored = timers;
        fired
    }

    /// Number of pending timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.timers.lock().len()
    }

    /// Returns true if no timers are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timers.lock().is_empty()
    }

    /// Drops every pending timer.
    pub fn clear(&self) {
        let mut timers = self.timers.lock();
        timers.clear();
        self.generation.fetch_add(1, Ordering::Release);
    }
}

impl<W> Default for TimerQueue<W> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    #[derive(Default)]
    struct Owner {
        hits: AtomicUsize,
    }

    fn step(time: &mut TickTime, delta: i64) -> TickTime {
        *time = time.next(delta);
        *time
    }

    #[test]
    fn test_one_shot_fires_once() {
        let queue = TimerQueue::<Owner>::new();
        let owner = Owner::default();
        let mut time = TickTime::default();

        queue.schedule(500, false, |owner: &Owner, _| {
            owner.hits.fetch_add(1, Ordering::Relaxed);
            Ok(true)
        });

        assert_eq!(queue.process(&owner, &step(&mut time, 200)), 0);
        assert_eq!(queue.process(&owner, &step(&mut time, 200)), 0);
        assert_eq!(queue.process(&owner, &step(&mut time, 200)), 1);
        assert_eq!(queue.process(&owner, &step(&mut time, 200)), 0);

        assert_eq!(owner.hits.load(Ordering::Relaxed), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_repeat_until_callback_stops() {
        let queue = TimerQueue::<Owner>::new();
        let owner = Owner::default();
        let mut time = TickTime::default();

        queue.schedule(100, true, |owner: &Owner, _| {
            let hits = owner.hits.fetch_add(1, Ordering::Relaxed) + 1;
            Ok(hits < 3)
        });

        for _ in 0..10 {
            queue.process(&owner, &step(&mut time, 100));
        }

        assert_eq!(owner.hits.load(Ordering::Relaxed), 3);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_failing_timer_is_discarded_without_stopping_others() {
        let queue = TimerQueue::<Owner>::new();
        let owner = Owner::default();
        let mut time = TickTime::default();

        queue.schedule(0, true, |owner: &Owner, _| {
            owner.hits.fetch_add(1, Ordering::Relaxed);
            Ok(true)
        });
        queue.schedule(0, true, |_: &Owner, _| Err(anyhow::anyhow!("broken timer")));
        queue.schedule(0, true, |_: &Owner, _| panic!("panicking timer"));
        queue.schedule(0, true, |owner: &Owner, _| {
            owner.hits.fetch_add(1, Ordering::Relaxed);
            Ok(true)
        });

        assert_eq!(queue.process(&owner, &step(&mut time, 200)), 4);
        assert_eq!(owner.hits.load(Ordering::Relaxed), 2);
        assert_eq!(queue.len(), 2);

        queue.process(&owner, &step(&mut time, 200));
        assert_eq!(owner.hits.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn test_timers_scheduled_from_callbacks_run_next_pass() {
        let queue = Arc::new(TimerQueue::<Owner>::new());
        let owner = Owner::default();
        let mut time = TickTime::default();

        let inner = queue.clone();
        queue.schedule(0, false, move |_: &Owner, _| {
            inner.schedule(0, false, |owner: &Owner, _| {
                owner.hits.fetch_add(1, Ordering::Relaxed);
                Ok(false)
            });
            Ok(false)
        });

        assert_eq!(queue.process(&owner, &step(&mut time, 200)), 1);
        assert_eq!(owner.hits.load(Ordering::Relaxed), 0);
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.process(&owner, &step(&mut time, 200)), 1);
        assert_eq!(owner.hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_clear_from_callback_drops_the_taken_timers() {
        let queue = Arc::new(TimerQueue::<Owner>::new());
        let owner = Owner::default();
        let mut time = TickTime::default();

        queue.schedule(0, true, |owner: &Owner, _| {
            owner.hits.fetch_add(1, Ordering::Relaxed);
            Ok(true)
        });
        queue.schedule(60_000, false, |owner: &Owner, _| {
            owner.hits.fetch_add(1, Ordering::Relaxed);
            Ok(false)
        });
        let inner = queue.clone();
        queue.schedule(0, false, move |_: &Owner, _| {
            inner.clear();
            Ok(false)
        });

        assert_eq!(queue.process(&owner, &step(&mut time, 200)), 1);
        assert!(queue.is_empty());

        assert_eq!(queue.process(&owner, &step(&mut time, 60_000)), 0);
        assert_eq!(owner.hits.load(Ordering::Relaxed), 0);
    }
}
