//! Completion detection state machine.
//!
//! ```text
//! start ──thinking──────────────────────────┐
//!   │                                       ▼
//!   └─other──▶ GRACE(n) ──thinking──▶ THINKING ◀──thinking── IDLE_PENDING(k)
//!                 │                     │  ▲                    │  │
//!          budget spent            idle │  └───unknown──────────┘  │ k == debounce
//!                 ▼                     ▼                          ▼
//!           NeverStarted         IDLE_PENDING(1)               Verify ──▶ Completed
//!                                                                 └──thinking──▶ THINKING
//! ```
//!
//! The machine never sleeps or reads anything itself: the caller feeds it one
//! status per tick and acts on the returned [`Step`].

use crate::detect::Status;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Ticks tolerated after an injection before the target picks it up
    pub grace_ticks: u32,
    /// Consecutive idle ticks needed before completion is checked
    pub idle_debounce: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            grace_ticks: 5,
            idle_debounce: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting indefinitely for work to start (background tracking)
    Standby,
    Grace { remaining: u32 },
    Thinking,
    IdlePending { idle: u32 },
}

/// What the caller should do after feeding a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Nothing to report
    Hold,
    /// The target just started working
    Started,
    /// Still working
    Busy,
    /// Debounce reached: read the status once more and call [`Machine::verify`]
    Verify,
    /// The re-check saw the target busy again
    Resumed,
    /// Finished
    Completed,
    /// Grace budget spent without the target ever starting
    NeverStarted,
}

#[derive(Debug, Clone)]
pub struct Machine {
    phase: Phase,
    was_thinking: bool,
    thresholds: Thresholds,
}

impl Machine {
    /// Machine for an operator-driven session, before its first reading
    pub fn active(thresholds: Thresholds) -> Self {
        Self {
            phase: Phase::Grace {
                remaining: thresholds.grace_ticks,
            },
            was_thinking: false,
            thresholds,
        }
    }

    /// Machine for background tracking of one target
    pub fn passive(thresholds: Thresholds) -> Self {
        Self {
            phase: Phase::Standby,
            was_thinking: false,
            thresholds,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn was_thinking(&self) -> bool {
        self.was_thinking
    }

    pub fn idle_count(&self) -> u32 {
        match self.phase {
            Phase::IdlePending { idle } => idle,
            _ => 0,
        }
    }

    /// First reading of a session. Work already under way skips the grace.
    pub fn start(&mut self, status: Status) -> Step {
        if status == Status::Thinking {
            self.enter_thinking();
            return Step::Started;
        }
        self.phase = Phase::Grace {
            remaining: self.thresholds.grace_ticks,
        };
        Step::Hold
    }

    /// Feed one tick's reading
    pub fn observe(&mut self, status: Status) -> Step {
        match (self.phase, status) {
            (Phase::Standby | Phase::Grace { .. }, Status::Thinking) => {
                self.enter_thinking();
                Step::Started
            }
            (Phase::Standby, _) => Step::Hold,
            (Phase::Grace { remaining }, _) => {
                let remaining = remaining.saturating_sub(1);
                self.phase = Phase::Grace { remaining };
                if remaining == 0 {
                    Step::NeverStarted
                } else {
                    Step::Hold
                }
            }
            (Phase::Thinking | Phase::IdlePending { .. }, Status::Thinking) => {
                self.enter_thinking();
                Step::Busy
            }
            (Phase::Thinking, Status::Idle) if self.was_thinking => self.count_idle(1),
            (Phase::IdlePending { idle }, Status::Idle) if self.was_thinking => {
                self.count_idle(idle + 1)
            }
            (Phase::IdlePending { .. }, _) => {
                // an unknown reading breaks the idle streak
                self.phase = Phase::Thinking;
                Step::Hold
            }
            (Phase::Thinking, _) => Step::Hold,
        }
    }

    /// Re-check after [`Step::Verify`]
    pub fn verify(&mut self, status: Status) -> Step {
        if status == Status::Thinking {
            self.enter_thinking();
            return Step::Resumed;
        }
        self.was_thinking = false;
        self.phase = Phase::Standby;
        Step::Completed
    }

    /// A new payload went in: wait for it with a fresh grace budget
    pub fn restart(&mut self) {
        self.was_thinking = false;
        self.phase = Phase::Grace {
            remaining: self.thresholds.grace_ticks,
        };
    }

    fn enter_thinking(&mut self) {
        self.was_thinking = true;
        self.phase = Phase::Thinking;
    }

    fn count_idle(&mut self, idle: u32) -> Step {
        self.phase = Phase::IdlePending { idle };
        if idle >= self.thresholds.idle_debounce {
            Step::Verify
        } else {
            Step::Hold
        }
    }
}
