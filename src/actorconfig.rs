//! The configuration record handed to every actor
//!
//! A simple object holding the attributes an actor expects: identity, queue
//! capacity, metrics cadence, the lookup table exposed to parameter
//! templates, per-queue function chains and the optional protocol codec.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::domain::{MetricsInterval, QueueCapacity};
use crate::function::EventFunction;
use crate::protocol::Protocol;
use crate::template::Lookups;

/// Per-queue function chains, in declared order.
pub type FunctionChains = HashMap<String, Vec<Arc<dyn EventFunction>>>;

#[derive(Clone)]
pub struct ActorConfig {
    /// The name identifying the actor instance.
    pub name: String,
    /// The capacity of the instance's queues.
    pub size: QueueCapacity,
    /// Seconds between metric sweeps.
    pub frequency: MetricsInterval,
    /// Lookup functions exposed to parameter templates.
    pub lookups: Lookups,
    /// Short free-form description of the instance.
    pub description: String,
    /// Function chains keyed by queue name.
    pub functions: FunctionChains,
    /// Name of the configured protocol instance, if any.
    pub protocol_name: Option<String>,
    /// The protocol codec itself.
    pub protocol: Option<Protocol>,
    /// Whether decoded payloads are full event mappings rather than bare data.
    pub protocol_event: bool,
    /// Modules whose consumption completion releases the event's waiter.
    pub confirmation_modules: HashSet<String>,
    /// Disables the consumer/background safety nets so failures propagate.
    /// Useful for tests only.
    pub disable_exception_handling: bool,
}

impl ActorConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: QueueCapacity::default(),
            frequency: MetricsInterval::default(),
            lookups: Lookups::new(),
            description: "A Wishbone actor.".to_string(),
            functions: FunctionChains::new(),
            protocol_name: None,
            protocol: None,
            protocol_event: false,
            confirmation_modules: HashSet::new(),
            disable_exception_handling: false,
        }
    }

    pub fn with_size(mut self, size: QueueCapacity) -> Self {
        self.size = size;
        self
    }

    pub fn with_frequency(mut self, frequency: MetricsInterval) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn with_lookups(mut self, lookups: Lookups) -> Self {
        self.lookups = lookups;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_functions(mut self, functions: FunctionChains) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_protocol(
        mut self,
        name: impl Into<String>,
        protocol: Protocol,
        event: bool,
    ) -> Self {
        self.protocol_name = Some(name.into());
        self.protocol = Some(protocol);
        self.protocol_event = event;
        self
    }

    pub fn with_confirmation_modules(mut self, modules: HashSet<String>) -> Self {
        self.confirmation_modules = modules;
        self
    }

    pub fn with_disabled_exception_handling(mut self) -> Self {
        self.disable_exception_handling = true;
        self
    }
}

impl std::fmt::Debug for ActorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorConfig")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("frequency", &self.frequency)
            .field("description", &self.description)
            .field("protocol_name", &self.protocol_name)
            .field("protocol_event", &self.protocol_event)
            .finish()
    }
}
