//! Cancellable, phase-tagged countdown for room actors.
//!
//! A room has at most one countdown running: the trivia round clock or the
//! lounge intermission clock. [`Countdown::arm`] starts it (replacing
//! whatever was running), and [`Countdown::wait_for_tick`] resolves once per
//! interval with the seconds remaining, disarming itself on expiry.
//!
//! Every tick carries the tag it was armed with, so the state machine can
//! drop ticks that belong to a phase it already left.
//!
//! # Integration
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* may arm() or cancel() */ }
//!         tick = countdown.wait_for_tick() => {
//!             let step = machine.timer_tick(tick.tag, tick.remaining, tick.expired);
//!         }
//!     }
//! }
//! ```
//!
//! `wait_for_tick` mutates state only after its sleep completes, so it is
//! safe to drop mid-wait when another `select!` branch wins.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CountdownConfig {
    /// Time between ticks. One second for a visible seconds counter.
    pub interval: Duration,
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
        }
    }
}

impl CountdownConfig {
    pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

    /// Clamps a too-small interval up to [`Self::MIN_INTERVAL`].
    pub fn validated(mut self) -> Self {
        if self.interval < Self::MIN_INTERVAL {
            warn!(
                interval_ms = self.interval.as_millis() as u64,
                min_ms = Self::MIN_INTERVAL.as_millis() as u64,
                "countdown interval too small, clamping"
            );
            self.interval = Self::MIN_INTERVAL;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Tick
// ---------------------------------------------------------------------------

/// One resolved tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerTick<T> {
    /// Tag passed to [`Countdown::arm`].
    pub tag: T,
    /// Seconds left after this tick.
    pub remaining: u32,
    /// True on the final tick; the countdown is disarmed afterwards.
    pub expired: bool,
    /// Arm generation this tick belongs to.
    pub generation: u64,
}

// ---------------------------------------------------------------------------
// Countdown
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Armed<T> {
    tag: T,
    remaining: u32,
    next: Instant,
}

/// Single-slot countdown owned by one room actor.
#[derive(Debug)]
pub struct Countdown<T> {
    interval: Duration,
    armed: Option<Armed<T>>,
    generation: u64,
    ticks_fired: u64,
}

impl<T: Clone> Countdown<T> {
    pub fn new(config: CountdownConfig) -> Self {
        let config = config.validated();
        Self {
            interval: config.interval,
            armed: None,
            generation: 0,
            ticks_fired: 0,
        }
    }

    /// Starts counting `seconds` down for `tag`, replacing any running
    /// countdown. Returns the new generation.
    pub fn arm(&mut self, tag: T, seconds: u32) -> u64 {
        if self.armed.is_some() {
            debug!(generation = self.generation, "replacing running countdown");
        }
        self.generation += 1;
        self.armed = Some(Armed {
            tag,
            remaining: seconds,
            next: Instant::now() + self.interval,
        });
        debug!(generation = self.generation, seconds, "countdown armed");
        self.generation
    }

    /// Stops the countdown. Returns the tag it was running for.
    pub fn cancel(&mut self) -> Option<T> {
        let armed = self.armed.take()?;
        debug!(generation = self.generation, remaining = armed.remaining, "countdown cancelled");
        Some(armed.tag)
    }

    /// Waits for the next tick.
    ///
    /// Pends forever while disarmed; `tokio::select!` keeps serving its
    /// other branches.
    pub async fn wait_for_tick(&mut self) -> TimerTick<T> {
        let Some(deadline) = self.armed.as_ref().map(|a| a.next) else {
            return std::future::pending().await;
        };

        time::sleep_until(deadline).await;

        let interval = self.interval;
        let generation = self.generation;
        let Some(armed) = self.armed.as_mut() else {
            return std::future::pending().await;
        };

        let now = Instant::now();
        armed.remaining = armed.remaining.saturating_sub(1);
        // Late wakeups resume from now instead of bursting.
        armed.next = if now.saturating_duration_since(deadline) > interval {
            now + interval
        } else {
            deadline + interval
        };
        self.ticks_fired += 1;

        let remaining = armed.remaining;
        let tag = armed.tag.clone();
        let expired = remaining == 0;
        if expired {
            self.armed = None;
            debug!(generation, "countdown expired");
        } else {
            trace!(generation, remaining, "countdown tick");
        }

        TimerTick {
            tag,
            remaining,
            expired,
            generation,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    pub fn tag(&self) -> Option<&T> {
        self.armed.as_ref().map(|a| &a.tag)
    }

    /// Seconds left, or `None` while disarmed.
    pub fn remaining(&self) -> Option<u32> {
        self.armed.as_ref().map(|a| a.remaining)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Total ticks delivered since creation, across all arms.
    pub fn ticks_fired(&self) -> u64 {
        self.ticks_fired
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl<T: Clone> Default for Countdown<T> {
    fn default() -> Self {
        Self::new(CountdownConfig::default())
    }
}
