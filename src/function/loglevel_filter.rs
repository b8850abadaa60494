//! Drops log events above a configured severity.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, WishboneError};
use crate::event::Event;

use super::EventFunction;

/// Lets a log event pass only when its level is at or below `max_loglevel`.
/// Hung on the `_logs` inbox queues to silence debug chatter.
pub struct LogLevelFilter {
    source: String,
    max_loglevel: u64,
}

#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FilterArgs {
    source: String,
    max_loglevel: u64,
}

impl Default for FilterArgs {
    fn default() -> Self {
        Self {
            source: "data.level".to_string(),
            max_loglevel: 6,
        }
    }
}

impl LogLevelFilter {
    pub fn from_arguments(arguments: Value) -> Result<Arc<dyn EventFunction>> {
        let args: FilterArgs = serde_json::from_value(arguments)
            .map_err(|err| WishboneError::InvalidData(format!("loglevel_filter arguments: {err}")))?;
        Ok(Arc::new(Self {
            source: args.source,
            max_loglevel: args.max_loglevel,
        }))
    }
}

impl EventFunction for LogLevelFilter {
    fn apply(&self, event: Event) -> Result<Option<Event>> {
        let level = event
            .get(&self.source)?
            .as_u64()
            .ok_or_else(|| WishboneError::InvalidData(format!("{} is not a level", self.source)))?;
        if level <= self.max_loglevel {
            Ok(Some(event))
        } else {
            Ok(None)
        }
    }
}
