//! Per-queue event functions
//!
//! A function chain declared on a queue runs, in declared order, on every
//! event a consumer takes off that queue, before the module's own handler
//! sees it. A failing function is logged and skipped; the event survives.
//! Returning `None` drops the event instead.

pub mod loglevel_filter;
pub mod modify;

use crate::error::Result;
use crate::event::Event;

/// One link of a per-queue function chain.
pub trait EventFunction: Send + Sync {
    /// Transforms `event`. `Ok(None)` drops the event before the module's
    /// handler runs.
    fn apply(&self, event: Event) -> Result<Option<Event>>;
}
