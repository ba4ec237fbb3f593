//! HSMS timer settings.
//!
//! All values are whole seconds. Out-of-range values are clamped and 0 selects
//! the standard default, so a `Timers` value is always usable.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default reply timeout
pub const DEFAULT_T3: u64 = 45;
/// Default connect separation time
pub const DEFAULT_T5: u64 = 10;
/// Default control transaction timeout
pub const DEFAULT_T6: u64 = 5;
/// Default not-selected timeout
pub const DEFAULT_T7: u64 = 10;
/// Default inter-character timeout
pub const DEFAULT_T8: u64 = 5;

/// The HSMS timers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timer {
    /// Reply timeout for data transactions
    T3,
    /// Connect separation timeout
    T5,
    /// Control transaction timeout
    T6,
    /// Not-selected timeout
    T7,
    /// Network inter-character timeout
    T8,
    /// Link test interval
    LinkTest,
}

impl Timer {
    /// Standard timer number, 0 for the link test interval
    pub fn number(self) -> u8 {
        match self {
            Timer::T3 => 3,
            Timer::T5 => 5,
            Timer::T6 => 6,
            Timer::T7 => 7,
            Timer::T8 => 8,
            Timer::LinkTest => 0,
        }
    }
}

impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timer::LinkTest => f.write_str("linktest"),
            t => write!(f, "T{}", t.number()),
        }
    }
}

fn clamp(value: u64, default: u64, max: u64) -> u64 {
    if value == 0 {
        default
    } else {
        value.min(max)
    }
}

/// Raw timer values as they appear in configuration
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
struct TimerSettings {
    t3: u64,
    t5: u64,
    t6: u64,
    t7: u64,
    t8: u64,
    link_test: u64,
}

impl From<TimerSettings> for Timers {
    fn from(s: TimerSettings) -> Self {
        Timers::new(s.t3, s.t5, s.t6, s.t7, s.t8, s.link_test)
    }
}

/// Timer configuration for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TimerSettings")]
pub struct Timers {
    t3: u64,
    t5: u64,
    t6: u64,
    t7: u64,
    t8: u64,
    link_test: u64,
}

impl Timers {
    /// Create timers, clamping every value into its valid range
    pub fn new(t3: u64, t5: u64, t6: u64, t7: u64, t8: u64, link_test: u64) -> Self {
        Self {
            t3: clamp(t3, DEFAULT_T3, 120),
            t5: clamp(t5, DEFAULT_T5, 240),
            t6: clamp(t6, DEFAULT_T6, 240),
            t7: clamp(t7, DEFAULT_T7, 240),
            t8: clamp(t8, DEFAULT_T8, 120),
            link_test: link_test.min(120),
        }
    }

    /// Replace T3
    pub fn with_t3(self, secs: u64) -> Self {
        Self::new(secs, self.t5, self.t6, self.t7, self.t8, self.link_test)
    }

    /// Replace T5
    pub fn with_t5(self, secs: u64) -> Self {
        Self::new(self.t3, secs, self.t6, self.t7, self.t8, self.link_test)
    }

    /// Replace T6
    pub fn with_t6(self, secs: u64) -> Self {
        Self::new(self.t3, self.t5, secs, self.t7, self.t8, self.link_test)
    }

    /// Replace T7
    pub fn with_t7(self, secs: u64) -> Self {
        Self::new(self.t3, self.t5, self.t6, secs, self.t8, self.link_test)
    }

    /// Replace T8
    pub fn with_t8(self, secs: u64) -> Self {
        Self::new(self.t3, self.t5, self.t6, self.t7, secs, self.link_test)
    }

    /// Replace the link test interval (0 disables it)
    pub fn with_link_test(self, secs: u64) -> Self {
        Self::new(self.t3, self.t5, self.t6, self.t7, self.t8, secs)
    }

    /// Configured value of a timer in seconds
    pub fn seconds(&self, timer: Timer) -> u64 {
        match timer {
            Timer::T3 => self.t3,
            Timer::T5 => self.t5,
            Timer::T6 => self.t6,
            Timer::T7 => self.t7,
            Timer::T8 => self.t8,
            Timer::LinkTest => self.link_test,
        }
    }

    /// Configured duration of a timer
    pub fn duration(&self, timer: Timer) -> Duration {
        Duration::from_secs(self.seconds(timer))
    }

    /// Reply timeout
    pub fn t3(&self) -> Duration {
        self.duration(Timer::T3)
    }

    /// Connect separation timeout
    pub fn t5(&self) -> Duration {
        self.duration(Timer::T5)
    }

    /// Control transaction timeout
    pub fn t6(&self) -> Duration {
        self.duration(Timer::T6)
    }

    /// Not-selected timeout
    pub fn t7(&self) -> Duration {
        self.duration(Timer::T7)
    }

    /// Inter-character timeout
    pub fn t8(&self) -> Duration {
        self.duration(Timer::T8)
    }

    /// Link test interval, `None` when disabled
    pub fn link_test(&self) -> Option<Duration> {
        (self.link_test > 0).then(|| Duration::from_secs(self.link_test))
    }
}

impl Default for Timers {
    fn default() -> Self {
        Self::new(0, 0, 0, 0, 0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let timers = Timers::default();
        assert_eq!(timers.t3(), Duration::from_secs(45));
        assert_eq!(timers.t5(), Duration::from_secs(10));
        assert_eq!(timers.t6(), Duration::from_secs(5));
        assert_eq!(timers.t7(), Duration::from_secs(10));
        assert_eq!(timers.t8(), Duration::from_secs(5));
        assert_eq!(timers.link_test(), None);
    }

    #[test]
    fn test_clamping() {
        assert_eq!(Timers::default().with_t3(0).seconds(Timer::T3), 45);
        assert_eq!(Timers::default().with_t3(1200).seconds(Timer::T3), 120);
        assert_eq!(Timers::default().with_t3(1).seconds(Timer::T3), 1);
        assert_eq!(Timers::default().with_t5(500).seconds(Timer::T5), 240);
        assert_eq!(Timers::default().with_t8(121).seconds(Timer::T8), 120);
        assert_eq!(
            Timers::default().with_link_test(300).link_test(),
            Some(Duration::from_secs(120))
        );
    }

    #[test]
    fn test_with_keeps_other_values() {
        let timers = Timers::new(10, 20, 30, 40, 50, 60).with_t6(7);
        assert_eq!(timers, Timers::new(10, 20, 7, 40, 50, 60));
    }

    #[test]
    fn test_deserialize_clamps() {
        let timers: Timers = serde_yaml::from_str("t3: 1200\nt7: 3\nlink_test: 15\n").unwrap();
        assert_eq!(timers.seconds(Timer::T3), 120);
        assert_eq!(timers.seconds(Timer::T7), 3);
        assert_eq!(timers.seconds(Timer::T5), DEFAULT_T5);
        assert_eq!(timers.link_test(), Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_timer_display() {
        assert_eq!(Timer::T7.to_string(), "T7");
        assert_eq!(Timer::LinkTest.to_string(), "linktest");
    }
}
