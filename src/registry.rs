//! The component registry
//!
//! Components are addressed by a four-dot qualified name
//! `<namespace>.<kind>.<category>.<name>`, e.g.
//! `wishbone.module.flow.funnel`. Instead of runtime plugin discovery the
//! registry is populated at startup: every builtin registers itself in
//! [`ComponentRegistry::with_builtins`], and embedders add their own
//! components through [`ComponentRegistry::register`]. The registry is
//! read-only once handed to the router.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::actorconfig::ActorConfig;
use crate::error::{Result, WishboneError};
use crate::function::{loglevel_filter::LogLevelFilter, modify, EventFunction};
use crate::lookup::{file::FileLookup, random_integer::RandomInteger, Lookup};
use crate::module::{
    acknowledge::Acknowledge, funnel::Funnel, humanlogformat::HumanLogFormat, stdout::Stdout,
    syslog::Syslog, testevent::TestEvent, Module,
};
use crate::protocol::{
    dummy::{DummyDecode, DummyEncode},
    json::{JsonDecode, JsonEncode},
    Protocol,
};

/// The four component kinds a qualified name can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ComponentKind {
    Protocol,
    Module,
    Function,
    Lookup,
}

impl ComponentKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "protocol" => Some(Self::Protocol),
            "module" => Some(Self::Module),
            "function" => Some(Self::Function),
            "lookup" => Some(Self::Lookup),
            _ => None,
        }
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Protocol => "protocol",
            Self::Module => "module",
            Self::Function => "function",
            Self::Lookup => "lookup",
        };
        f.write_str(label)
    }
}

/// What a component constructs when instantiated with its arguments.
#[derive(Clone)]
pub enum Factory {
    Module(Arc<dyn Fn(ActorConfig, Value) -> Result<Arc<dyn Module>> + Send + Sync>),
    Protocol(Arc<dyn Fn(Value) -> Result<Protocol> + Send + Sync>),
    Function(Arc<dyn Fn(Value) -> Result<Arc<dyn EventFunction>> + Send + Sync>),
    Lookup(Arc<dyn Fn(Value) -> Result<Arc<dyn Lookup>> + Send + Sync>),
}

impl Factory {
    fn kind(&self) -> ComponentKind {
        match self {
            Self::Module(_) => ComponentKind::Module,
            Self::Protocol(_) => ComponentKind::Protocol,
            Self::Function(_) => ComponentKind::Function,
            Self::Lookup(_) => ComponentKind::Lookup,
        }
    }
}

/// One registered component and its metadata.
#[derive(Clone)]
pub struct Component {
    pub namespace: String,
    pub kind: ComponentKind,
    pub category: String,
    pub name: String,
    pub title: String,
    pub doc: String,
    pub version: String,
    pub factory: Factory,
}

impl Component {
    pub fn qualified_name(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.namespace, self.kind, self.category, self.name
        )
    }
}

/// Name-indexed factory store for every discoverable component.
pub struct ComponentRegistry {
    components: BTreeMap<String, Component>,
}

impl ComponentRegistry {
    /// An empty registry; embedders start here when they want full control
    /// over what is available.
    pub fn new() -> Self {
        Self {
            components: BTreeMap::new(),
        }
    }

    /// A registry holding every builtin protocol, module, function and
    /// lookup.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        register_builtin_protocols(&mut registry);
        register_builtin_modules(&mut registry);
        register_builtin_functions(&mut registry);
        register_builtin_lookups(&mut registry);
        registry
    }

    /// Registers a component. The factory's kind must match the name's kind
    /// segment; a mismatched registration is not a valid component.
    pub fn register(
        &mut self,
        namespace: &str,
        kind: ComponentKind,
        category: &str,
        name: &str,
        title: &str,
        doc: &str,
        factory: Factory,
    ) -> Result<()> {
        if factory.kind() != kind {
            return Err(WishboneError::InvalidComponent(format!(
                "{namespace}.{kind}.{category}.{name}"
            )));
        }
        let component = Component {
            namespace: namespace.to_string(),
            kind,
            category: category.to_string(),
            name: name.to_string(),
            title: title.to_string(),
            doc: doc.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            factory,
        };
        self.components
            .insert(component.qualified_name(), component);
        Ok(())
    }

    /// Splits and checks a qualified name for the proper format.
    pub fn validate_name(name: &str) -> Result<(String, ComponentKind, String, String)> {
        let parts: Vec<&str> = name.split('.').collect();
        if parts.len() != 4 {
            return Err(WishboneError::InvalidComponent(format!(
                "component name '{name}' should consist out of 4 parts"
            )));
        }
        let kind = ComponentKind::parse(parts[1]).ok_or_else(|| {
            WishboneError::InvalidComponent(format!(
                "component name '{name}' has an invalid component type name"
            ))
        })?;
        Ok((
            parts[0].to_string(),
            kind,
            parts[2].to_string(),
            parts[3].to_string(),
        ))
    }

    /// Resolves a qualified name to its component.
    pub fn get(&self, name: &str) -> Result<&Component> {
        Self::validate_name(name)?;
        self.components
            .get(name)
            .ok_or_else(|| WishboneError::NoSuchComponent(name.to_string()))
    }

    /// Whether the component with `name` exists.
    pub fn exists(&self, name: &str) -> bool {
        self.get(name).is_ok()
    }

    /// All components, ordered by qualified name.
    pub fn list(&self) -> impl Iterator<Item = &Component> {
        self.components.values()
    }

    pub fn get_title(&self, name: &str) -> Result<String> {
        Ok(self.get(name)?.title.clone())
    }

    pub fn get_doc(&self, name: &str) -> Result<String> {
        Ok(self.get(name)?.doc.clone())
    }

    pub fn get_version(&self, name: &str) -> Result<String> {
        Ok(self.get(name)?.version.clone())
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn register_builtin_protocols(registry: &mut ComponentRegistry) {
    registry
        .register(
            "wishbone",
            ComponentKind::Protocol,
            "decode",
            "dummy",
            "Hands input through untouched.",
            "Installed on input modules without a configured protocol.",
            Factory::Protocol(Arc::new(|_args| Ok(Protocol::Decode(Arc::new(DummyDecode))))),
        )
        .expect("builtin registration");
    registry
        .register(
            "wishbone",
            ComponentKind::Protocol,
            "encode",
            "dummy",
            "Hands payloads through untouched.",
            "Installed on output modules without a configured protocol.",
            Factory::Protocol(Arc::new(|_args| Ok(Protocol::Encode(Arc::new(DummyEncode))))),
        )
        .expect("builtin registration");
    registry
        .register(
            "wishbone",
            ComponentKind::Protocol,
            "decode",
            "json",
            "Decodes JSON documents into payloads.",
            "Accepts concatenated or newline-separated documents.",
            Factory::Protocol(Arc::new(|_args| Ok(Protocol::Decode(Arc::new(JsonDecode))))),
        )
        .expect("builtin registration");
    registry
        .register(
            "wishbone",
            ComponentKind::Protocol,
            "encode",
            "json",
            "Encodes payloads into JSON.",
            "The inverse of wishbone.protocol.decode.json.",
            Factory::Protocol(Arc::new(|_args| Ok(Protocol::Encode(Arc::new(JsonEncode))))),
        )
        .expect("builtin registration");
}

fn register_builtin_modules(registry: &mut ComponentRegistry) {
    registry
        .register(
            "wishbone",
            ComponentKind::Module,
            "flow",
            "funnel",
            "Merges multiple incoming queues into one.",
            "Consumes every adopted inbound queue into its outbox.",
            Factory::Module(Arc::new(Funnel::new)),
        )
        .expect("builtin registration");
    registry
        .register(
            "wishbone",
            ComponentKind::Module,
            "flow",
            "acknowledge",
            "Lets events pass based on acknowledgement state.",
            "Holds an ack_id table; duplicates go to the dropped queue until acknowledged.",
            Factory::Module(Arc::new(Acknowledge::new)),
        )
        .expect("builtin registration");
    registry
        .register(
            "wishbone",
            ComponentKind::Module,
            "input",
            "testevent",
            "Generates a test event at the chosen interval.",
            "The data field of the generated event contains the configured payload.",
            Factory::Module(Arc::new(TestEvent::new)),
        )
        .expect("builtin registration");
    registry
        .register(
            "wishbone",
            ComponentKind::Module,
            "output",
            "stdout",
            "Prints incoming events to STDOUT.",
            "Prints the selected part of each incoming event, optionally colorized.",
            Factory::Module(Arc::new(Stdout::new)),
        )
        .expect("builtin registration");
    registry
        .register(
            "wishbone",
            ComponentKind::Module,
            "output",
            "syslog",
            "Writes incoming messages to syslog.",
            "Sends RFC 3164 datagrams to the local syslog socket.",
            Factory::Module(Arc::new(Syslog::new)),
        )
        .expect("builtin registration");
    registry
        .register(
            "wishbone",
            ComponentKind::Module,
            "process",
            "humanlogformat",
            "Converts the internal log format into human readable form.",
            "Reshapes structured log records into one printable line per record.",
            Factory::Module(Arc::new(HumanLogFormat::new)),
        )
        .expect("builtin registration");
}

fn register_builtin_functions(registry: &mut ComponentRegistry) {
    registry
        .register(
            "wishbone",
            ComponentKind::Function,
            "process",
            "set",
            "Sets a field to the desired value.",
            "String values are templates rendered against the processed event.",
            Factory::Function(Arc::new(modify::Set::from_arguments)),
        )
        .expect("builtin registration");
    registry
        .register(
            "wishbone",
            ComponentKind::Function,
            "process",
            "lowercase",
            "Lowercases a string field.",
            "Reads source, writes the lowercased value to destination.",
            Factory::Function(Arc::new(modify::Lowercase::from_arguments)),
        )
        .expect("builtin registration");
    registry
        .register(
            "wishbone",
            ComponentKind::Function,
            "process",
            "loglevel_filter",
            "Drops the log event if max_loglevel has been exceeded.",
            "Validates whether the record level is smaller or equal to max_loglevel.",
            Factory::Function(Arc::new(LogLevelFilter::from_arguments)),
        )
        .expect("builtin registration");
}

fn register_builtin_lookups(registry: &mut ComponentRegistry) {
    registry
        .register(
            "wishbone",
            ComponentKind::Lookup,
            "internal",
            "random_integer",
            "Returns a random integer.",
            "Returns a random integer between minimum and maximum.",
            Factory::Lookup(Arc::new(RandomInteger::from_arguments)),
        )
        .expect("builtin registration");
    registry
        .register(
            "wishbone",
            ComponentKind::Lookup,
            "external",
            "file",
            "Serves values out of a structured data file.",
            "Resolves a dotted key inside a cached JSON or YAML document.",
            Factory::Lookup(Arc::new(FileLookup::from_arguments)),
        )
        .expect("builtin registration");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_resolvable() {
        let registry = ComponentRegistry::with_builtins();
        for name in [
            "wishbone.module.flow.funnel",
            "wishbone.module.flow.acknowledge",
            "wishbone.module.input.testevent",
            "wishbone.module.output.stdout",
            "wishbone.module.output.syslog",
            "wishbone.module.process.humanlogformat",
            "wishbone.protocol.decode.json",
            "wishbone.function.process.loglevel_filter",
            "wishbone.lookup.internal.random_integer",
        ] {
            assert!(registry.exists(name), "missing {name}");
        }
    }

    #[test]
    fn malformed_names_are_invalid() {
        let registry = ComponentRegistry::with_builtins();
        assert!(matches!(
            registry.get("wishbone.funnel"),
            Err(WishboneError::InvalidComponent(_))
        ));
        assert!(matches!(
            registry.get("wishbone.widget.flow.funnel"),
            Err(WishboneError::InvalidComponent(_))
        ));
        assert!(matches!(
            registry.get("wishbone.module.flow.missing"),
            Err(WishboneError::NoSuchComponent(_))
        ));
    }

    #[test]
    fn listing_is_ordered() {
        let registry = ComponentRegistry::with_builtins();
        let names: Vec<String> = registry.list().map(Component::qualified_name).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert!(names.len() >= 13);
    }

    #[test]
    fn metadata_accessors_work() {
        let registry = ComponentRegistry::with_builtins();
        assert_eq!(
            registry.get_title("wishbone.module.flow.funnel").unwrap(),
            "Merges multiple incoming queues into one."
        );
        assert!(!registry
            .get_doc("wishbone.module.flow.funnel")
            .unwrap()
            .is_empty());
        assert_eq!(
            registry.get_version("wishbone.module.flow.funnel").unwrap(),
            env!("CARGO_PKG_VERSION")
        );
    }
}
