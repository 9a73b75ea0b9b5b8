//! Wall-clock access behind a trait.
//!
//! The benchmark and the interpreter's `clock()` builtin read time through
//! [`Clock`], so tests can swap in [`TestClock`] and control every reading
//! without real waiting.

use std::collections::VecDeque;
use std::error::Error;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    /// The host clock could not produce a usable timestamp.
    Unavailable,
}

impl fmt::Display for ClockError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "system clock unavailable"),
        }
    }
}

impl Error for ClockError {}

/// Millisecond timestamps since an epoch.
///
/// Takes `&mut self` so test doubles can consume scripted readings.
pub trait Clock {
    fn now_ms(&mut self) -> Result<u64, ClockError>;
}

/// The host wall clock, measured against `UNIX_EPOCH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&mut self) -> Result<u64, ClockError> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .map_err(|_| ClockError::Unavailable)
    }
}

/// Virtual time clock for deterministic testing.
///
/// Time only moves when explicitly advanced via `advance_by()`, or along a
/// queue of scripted readings consumed by successive `now_ms` calls.
pub struct TestClock {
    /// Current virtual time in milliseconds
    current_time_ms: u64,
    /// Readings handed out before falling back to the current time
    scripted_readings: VecDeque<u64>,
}

impl TestClock {
    /// Create a new TestClock starting at time 0.
    pub fn new() -> Self {
        Self::at(0)
    }

    /// Create a TestClock whose virtual time starts at `ms`.
    pub fn at(ms: u64) -> Self {
        Self {
            current_time_ms: ms,
            scripted_readings: VecDeque::new(),
        }
    }

    /// Create a TestClock that answers successive `now_ms` calls with the
    /// given readings. Once the queue runs out the last reading sticks.
    pub fn with_readings(readings: impl IntoIterator<Item = u64>) -> Self {
        Self {
            current_time_ms: 0,
            scripted_readings: readings.into_iter().collect(),
        }
    }

    /// Advance virtual time by the specified milliseconds.
    pub fn advance_by(&mut self, ms: u64) {
        self.current_time_ms += ms;
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now_ms(&mut self) -> Result<u64, ClockError> {
        if let Some(reading) = self.scripted_readings.pop_front() {
            self.current_time_ms = reading;
        }
        Ok(self.current_time_ms)
    }
}
