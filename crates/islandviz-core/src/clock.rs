//! Render clock abstraction
//!
//! The engine never reads wall time directly. Production hosts use
//! [`SystemClock`]; tests step a [`ManualClock`] by hand so smoothing math can
//! be checked without real time passing.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Time source and tick scheduler for the render loop
pub trait Clock {
    /// Seconds since the clock was created
    fn now(&self) -> f64;

    /// Schedule the next tick `delay` from now, or suspend ticking with `None`
    fn request_tick(&mut self, delay: Option<Duration>);
}

/// Wall clock that a host loop can block on
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
    shared: Arc<(Mutex<WakeState>, Condvar)>,
}

#[derive(Debug, Default)]
struct WakeState {
    deadline: Option<Instant>,
    woken: bool,
}

impl SystemClock {
    /// Clock starting at zero now
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            shared: Arc::new((Mutex::new(WakeState::default()), Condvar::new())),
        }
    }

    /// Block until the requested tick is due, a [`wake`](Self::wake) arrives,
    /// or `max_wait` elapses. Returns `true` when a tick is due.
    pub fn wait_for_tick(&self, max_wait: Duration) -> bool {
        let (lock, condvar) = &*self.shared;
        let give_up = Instant::now() + max_wait;
        let mut state = lock.lock();
        loop {
            if state.woken {
                state.woken = false;
                return true;
            }
            let now = Instant::now();
            if let Some(deadline) = state.deadline {
                if now >= deadline {
                    state.deadline = None;
                    return true;
                }
            }
            if now >= give_up {
                return false;
            }
            let until = state.deadline.map_or(give_up, |d| d.min(give_up));
            condvar.wait_until(&mut state, until);
        }
    }

    /// Wake a waiting host loop immediately, e.g. after new host inputs
    pub fn wake(&self) {
        let (lock, condvar) = &*self.shared;
        lock.lock().woken = true;
        condvar.notify_all();
    }

    /// Whether a tick is currently scheduled
    pub fn is_scheduled(&self) -> bool {
        self.shared.0.lock().deadline.is_some()
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn request_tick(&mut self, delay: Option<Duration>) {
        let (lock, condvar) = &*self.shared;
        lock.lock().deadline = delay.map(|d| Instant::now() + d);
        condvar.notify_all();
    }
}

/// Hand-stepped clock for deterministic tests
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: f64,
    requested: Option<Duration>,
    requests: usize,
}

impl ManualClock {
    /// Clock at t = 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward
    pub fn advance(&mut self, secs: f64) {
        self.now += secs;
    }

    /// Jump to the most recently requested tick; `false` when suspended
    pub fn advance_to_tick(&mut self) -> bool {
        match self.requested {
            Some(delay) => {
                self.now += delay.as_secs_f64();
                true
            }
            None => false,
        }
    }

    /// Delay of the most recent tick request
    pub fn requested(&self) -> Option<Duration> {
        self.requested
    }

    /// Number of tick requests seen
    pub fn request_count(&self) -> usize {
        self.requests
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.now
    }

    fn request_tick(&mut self, delay: Option<Duration>) {
        self.requested = delay;
        self.requests += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_steps() {
        let mut clock = ManualClock::new();
        assert_eq!(clock.now(), 0.0);
        clock.request_tick(Some(Duration::from_millis(250)));
        assert!(clock.advance_to_tick());
        assert!((clock.now() - 0.25).abs() < 1e-12);

        clock.request_tick(None);
        assert!(!clock.advance_to_tick());
        assert_eq!(clock.request_count(), 2);
    }

    #[test]
    fn test_system_clock_waits_for_deadline() {
        let mut clock = SystemClock::new();
        clock.request_tick(Some(Duration::from_millis(5)));
        assert!(clock.is_scheduled());
        assert!(clock.wait_for_tick(Duration::from_secs(2)));
        assert!(!clock.is_scheduled());
    }

    #[test]
    fn test_system_clock_suspended_times_out() {
        let mut clock = SystemClock::new();
        clock.request_tick(None);
        assert!(!clock.wait_for_tick(Duration::from_millis(10)));
    }

    #[test]
    fn test_wake_interrupts_wait() {
        let clock = SystemClock::new();
        let waker = clock.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(5));
            waker.wake();
        });
        assert!(clock.wait_for_tick(Duration::from_secs(5)));
        handle.join().unwrap();
    }
}
