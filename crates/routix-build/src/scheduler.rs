//! Debounce and latch protocol as a pure state machine.
//!
//! The scheduler never touches timers or tasks itself. [`Scheduler::handle`]
//! takes one [`Event`] and the current time, updates the state, and returns
//! the [`Action`]s the driver must carry out. Timers are identified by a
//! generation number so a late firing of a replaced timer is ignored.
//!
//! Rules:
//! - every mutation refreshes the last-invalidate timestamp;
//! - an armed timer is always replaced on a new mutation, except while parses
//!   are in flight, in which case arming waits for the last latch release;
//! - on the last latch release the timer is armed for whatever remains of the
//!   debounce window, measured from the most recent mutation;
//! - a firing timer schedules a rebuild unless one is already scheduled.

use std::time::{Duration, Instant};

use bitflags::bitflags;
use routix_core::Record;
use strum::Display;

bitflags! {
    /// Outputs marked for regeneration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Outputs: u8 {
        const ROUTES = 1;
        const TREE = 1 << 1;
        const EXTRAS = 1 << 2;
    }
}

impl Outputs {
    /// Outputs a change to `record` can affect.
    pub fn of(record: &Record) -> Self {
        let mut outputs = Self::empty();
        if record.rebuild {
            outputs |= Self::ROUTES | Self::TREE;
        }
        if record.rebuild_extras {
            outputs |= Self::EXTRAS;
        }
        outputs
    }
}

/// Coarse state of a builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Phase {
    /// `start` has not been called.
    Stopped,
    /// Nothing pending.
    Idle,
    /// Waiting for the debounce window to elapse.
    ArmedTimer,
    /// Parses in flight.
    AwaitingLatches,
    /// A rebuild is queued behind the build lock.
    Scheduled,
    /// A rebuild is running.
    Running,
}

/// Input to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Start,
    /// Records changed in a way that affects these outputs.
    Invalidate(Outputs),
    /// A parse started.
    LatchAcquired,
    /// A parse settled.
    LatchReleased,
    /// The timer of this generation elapsed.
    TimerFired(u64),
    BuildStarted,
    BuildFinished,
}

/// Effect the driver must carry out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Replace any armed timer with one firing `TimerFired(generation)` after `delay`.
    ArmTimer { generation: u64, delay: Duration },
    /// Drop the armed timer.
    CancelTimer,
    /// Queue a rebuild.
    RunBuild,
    /// Wake `on_change` listeners.
    NotifyChange,
}

/// Scheduler state of one builder.
#[derive(Debug, Clone)]
pub struct Scheduler {
    debounce: Duration,
    started: bool,
    timer: Option<u64>,
    generation: u64,
    scheduled: bool,
    running: bool,
    latches: usize,
    dirty: Outputs,
    last_invalidate: Option<Instant>,
}

impl Scheduler {
    /// Create a stopped scheduler.
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            started: false,
            timer: None,
            generation: 0,
            scheduled: false,
            running: false,
            latches: 0,
            dirty: Outputs::empty(),
            last_invalidate: None,
        }
    }

    /// Apply one event.
    pub fn handle(&mut self, event: Event, now: Instant) -> Vec<Action> {
        match event {
            Event::Start => {
                self.started = true;
                self.dirty = Outputs::all();
                self.last_invalidate = Some(now);
                if self.latches > 0 {
                    return Vec::new();
                }
                self.arm(Duration::ZERO)
            }
            Event::Invalidate(outputs) => {
                self.dirty |= outputs;
                self.last_invalidate = Some(now);
                if !self.started || self.latches > 0 {
                    return Vec::new();
                }
                self.arm(self.debounce)
            }
            Event::LatchAcquired => {
                self.latches += 1;
                self.last_invalidate = Some(now);
                match self.timer.take() {
                    Some(_) => vec![Action::CancelTimer],
                    None => Vec::new(),
                }
            }
            Event::LatchReleased => {
                self.latches = self.latches.saturating_sub(1);
                if self.latches > 0 || !self.started {
                    return Vec::new();
                }
                let elapsed = self
                    .last_invalidate
                    .map_or(self.debounce, |t| now.saturating_duration_since(t));
                self.arm(self.debounce.saturating_sub(elapsed))
            }
            Event::TimerFired(generation) => {
                if self.timer != Some(generation) {
                    return Vec::new();
                }
                self.timer = None;
                if self.scheduled {
                    return Vec::new();
                }
                self.scheduled = true;
                vec![Action::RunBuild]
            }
            Event::BuildStarted => {
                self.scheduled = false;
                self.running = true;
                Vec::new()
            }
            Event::BuildFinished => {
                self.running = false;
                Vec::new()
            }
        }
    }

    fn arm(&mut self, delay: Duration) -> Vec<Action> {
        self.generation += 1;
        self.timer = Some(self.generation);
        vec![
            Action::ArmTimer {
                generation: self.generation,
                delay,
            },
            Action::NotifyChange,
        ]
    }

    /// Take the outputs dirtied since the last take.
    pub fn take_dirty(&mut self) -> Outputs {
        std::mem::take(&mut self.dirty)
    }

    /// Mark outputs dirty again, e.g. after a failed rebuild.
    pub fn restore_dirty(&mut self, outputs: Outputs) {
        self.dirty |= outputs;
    }

    /// Outputs currently dirty.
    pub fn dirty(&self) -> Outputs {
        self.dirty
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Number of parses in flight.
    pub fn latches(&self) -> usize {
        self.latches
    }

    /// Started, with no timer, rebuild or parse pending.
    pub fn is_idle(&self) -> bool {
        self.started && self.timer.is_none() && !self.scheduled && !self.running && self.latches == 0
    }

    pub fn phase(&self) -> Phase {
        if !self.started {
            Phase::Stopped
        } else if self.running {
            Phase::Running
        } else if self.scheduled {
            Phase::Scheduled
        } else if self.latches > 0 {
            Phase::AwaitingLatches
        } else if self.timer.is_some() {
            Phase::ArmedTimer
        } else {
            Phase::Idle
        }
    }
}
