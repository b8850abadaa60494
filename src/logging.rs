//! The per-module log handle
//!
//! Log records are pipeline data: each module writes [`Log`] events into its
//! own `logs` queue, which the router fans into the `_logs` funnel. Overflow
//! is lossy; the log path must never block a hot consumer.

use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::domain::SyslogLevel;
use crate::event::{now_timestamp, Event, Log};
use crate::queue::{Queue, TrySendError};

/// Emits Wishbone formatted log messages following the syslog priority
/// definition into a module's `logs` queue.
#[derive(Clone)]
pub struct Logging {
    name: String,
    queue: Queue,
    overflow_notified: Arc<AtomicBool>,
}

impl Logging {
    pub fn new(name: impl Into<String>, queue: Queue) -> Self {
        Self {
            name: name.into(),
            queue,
            overflow_notified: Arc::new(AtomicBool::new(false)),
        }
    }

    fn log(&self, level: u8, message: impl Into<String>) {
        let record = Log {
            time: now_timestamp(),
            level: SyslogLevel::try_new(level).expect("levels are 0..=7"),
            pid: process::id(),
            module: self.name.clone(),
            message: message.into(),
        };
        let event = Event::new(record.to_value());
        if let Err(TrySendError::Full(_)) = self.queue.try_put(event.into()) {
            if !self.overflow_notified.swap(true, Ordering::Relaxed) {
                eprintln!("Log queue full for module '{}'. Dropping messages", self.name);
            }
        }
    }

    /// Priority 0.
    pub fn emergency(&self, message: impl Into<String>) {
        self.log(SyslogLevel::EMERGENCY, message);
    }

    /// Priority 1.
    pub fn alert(&self, message: impl Into<String>) {
        self.log(SyslogLevel::ALERT, message);
    }

    /// Priority 2.
    pub fn critical(&self, message: impl Into<String>) {
        self.log(SyslogLevel::CRITICAL, message);
    }

    /// Priority 3.
    pub fn error(&self, message: impl Into<String>) {
        self.log(SyslogLevel::ERROR, message);
    }

    /// Priority 4.
    pub fn warning(&self, message: impl Into<String>) {
        self.log(SyslogLevel::WARNING, message);
    }

    /// Priority 5.
    pub fn notice(&self, message: impl Into<String>) {
        self.log(SyslogLevel::NOTICE, message);
    }

    /// Priority 6.
    pub fn info(&self, message: impl Into<String>) {
        self.log(SyslogLevel::INFO, message);
    }

    /// Priority 7.
    pub fn debug(&self, message: impl Into<String>) {
        self.log(SyslogLevel::DEBUG, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::QueueCapacity;
    use crate::event::Log;

    #[test]
    fn log_records_land_on_the_queue() {
        let queue = Queue::new(QueueCapacity::try_new(10).unwrap());
        let logging = Logging::new("tester", queue.clone());

        logging.warning("something odd");

        let envelope = queue.try_get().unwrap();
        let event = envelope.as_event().unwrap();
        let record = Log::from_value(&event.get("data").unwrap()).unwrap();
        assert_eq!(record.level.into_inner(), SyslogLevel::WARNING);
        assert_eq!(record.module, "tester");
        assert_eq!(record.message, "something odd");
        assert_eq!(record.pid, std::process::id());
    }

    #[test]
    fn overflow_is_lossy() {
        let queue = Queue::new(QueueCapacity::try_new(1).unwrap());
        let logging = Logging::new("tester", queue.clone());
        logging.info("one");
        logging.info("two");
        logging.info("three");
        assert_eq!(queue.stats().dropped_total, 2);
    }
}
