//! Validated scalar types shared across the crate
//!
//! Bare integers travel badly: a queue capacity, a metrics interval and a
//! syslog priority are all "just numbers" until one is passed where the other
//! belongs. These newtypes make the compiler reject that.

use nutype::nutype;

/// Maximum number of events a queue holds before `put` starts failing.
#[nutype(
    validate(greater_or_equal = 1),
    derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)
)]
pub struct QueueCapacity(usize);

impl Default for QueueCapacity {
    fn default() -> Self {
        Self::try_new(100).expect("default capacity is valid")
    }
}

/// Seconds between two metric sweeps of an actor's queue pool.
#[nutype(
    validate(greater_or_equal = 1),
    derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)
)]
pub struct MetricsInterval(u64);

impl Default for MetricsInterval {
    fn default() -> Self {
        Self::try_new(1).expect("default interval is valid")
    }
}

/// Per-event hop budget, decremented on every consumer entry.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize
))]
pub struct EventTtl(u64);

impl EventTtl {
    /// The default hop budget of a freshly created event.
    pub const DEFAULT: u64 = 254;
}

impl Default for EventTtl {
    fn default() -> Self {
        Self::new(Self::DEFAULT)
    }
}

/// Syslog severity, 0 (emergency) through 7 (debug).
#[nutype(
    validate(less_or_equal = 7),
    derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)
)]
pub struct SyslogLevel(u8);

impl SyslogLevel {
    pub const EMERGENCY: u8 = 0;
    pub const ALERT: u8 = 1;
    pub const CRITICAL: u8 = 2;
    pub const ERROR: u8 = 3;
    pub const WARNING: u8 = 4;
    pub const NOTICE: u8 = 5;
    pub const INFO: u8 = 6;
    pub const DEBUG: u8 = 7;

    /// The lowercase severity name used by the human log formatter.
    pub fn name(&self) -> &'static str {
        match self.into_inner() {
            0 => "emergency",
            1 => "alert",
            2 => "critical",
            3 => "error",
            4 => "warning",
            5 => "notice",
            6 => "informational",
            _ => "debug",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_rejects_zero() {
        assert!(QueueCapacity::try_new(0).is_err());
        assert_eq!(QueueCapacity::default().into_inner(), 100);
    }

    #[test]
    fn syslog_level_bounds() {
        assert!(SyslogLevel::try_new(8).is_err());
        assert_eq!(SyslogLevel::try_new(6).unwrap().name(), "informational");
    }

    #[test]
    fn ttl_default() {
        assert_eq!(EventTtl::default().into_inner(), 254);
    }
}
