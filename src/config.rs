//! Bootstrap configuration
//!
//! The declarative description of a pipeline: protocol, function and lookup
//! instances, module instances with their per-queue function chains, and the
//! routing table wiring named queues together. Loaded from YAML, validated
//! strictly, then enriched with the implicit parts every pipeline carries:
//! the `_logs`/`_metrics` funnels, one logs and one metrics connection per
//! user module, and the configured log sink chain behind `_logs`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load bootstrap file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to validate configuration file: {0}")]
    Schema(#[from] serde_yaml::Error),

    #[error("module instance names cannot start with _: '{0}'")]
    ReservedName(String),

    #[error("no protocol module defined with name '{protocol}' for module instance '{module}'")]
    UndeclaredProtocol { module: String, protocol: String },

    #[error("no function defined with name '{function}' for module instance '{module}'")]
    UndeclaredFunction { module: String, function: String },

    #[error("routingtable rule \"{rule}\" does not have the right format: {reason}")]
    InvalidRoute { rule: String, reason: String },

    #[error("cannot connect '{rule}': queue '{endpoint}' is already part of a connection")]
    EndpointTaken { rule: String, endpoint: String },
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// One declared protocol instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProtocolSpec {
    pub protocol: String,
    #[serde(default)]
    pub event: bool,
    #[serde(default = "empty_object")]
    pub arguments: Value,
}

/// One declared function instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionSpec {
    pub function: String,
    #[serde(default = "empty_object")]
    pub arguments: Value,
}

/// One declared lookup instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LookupSpec {
    pub lookup: String,
    #[serde(default = "empty_object")]
    pub arguments: Value,
}

/// One declared module instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleSpec {
    pub module: String,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_object")]
    pub arguments: Value,
    #[serde(default)]
    pub functions: BTreeMap<String, Vec<String>>,
}

/// The raw bootstrap file shape. Unknown keys are rejected.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BootstrapFile {
    #[serde(default)]
    pub protocols: BTreeMap<String, ProtocolSpec>,
    #[serde(default)]
    pub functions: BTreeMap<String, FunctionSpec>,
    #[serde(default)]
    pub lookups: BTreeMap<String, LookupSpec>,
    pub modules: BTreeMap<String, ModuleSpec>,
    pub routingtable: Vec<String>,
}

/// A directed pair of queue endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub source_module: String,
    pub source_queue: String,
    pub destination_module: String,
    pub destination_queue: String,
}

impl std::fmt::Display for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.source_module, self.source_queue, self.destination_module, self.destination_queue
        )
    }
}

/// How the `_logs` funnel is terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogStyle {
    #[default]
    Stdout,
    Syslog,
}

/// The validated, enriched pipeline description the router consumes.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub protocols: BTreeMap<String, ProtocolSpec>,
    pub functions: BTreeMap<String, FunctionSpec>,
    pub lookups: BTreeMap<String, LookupSpec>,
    pub modules: BTreeMap<String, ModuleSpec>,
    pub routingtable: Vec<Connection>,
}

/// Loads and validates a bootstrap file into a [`PipelineConfig`].
pub struct ConfigFile {
    log_style: LogStyle,
    identification: String,
    colorize_stdout: bool,
}

impl ConfigFile {
    pub fn new(log_style: LogStyle) -> Self {
        Self {
            log_style,
            identification: "wishbone".to_string(),
            colorize_stdout: true,
        }
    }

    /// The string identifying this instance in log output.
    pub fn with_identification(mut self, identification: impl Into<String>) -> Self {
        self.identification = identification.into();
        self
    }

    pub fn with_colorized_stdout(mut self, colorize: bool) -> Self {
        self.colorize_stdout = colorize;
        self
    }

    pub fn load(&self, path: &Path) -> Result<PipelineConfig, ConfigError> {
        let raw = fs::read_to_string(path)?;
        self.parse(&raw)
    }

    pub fn parse(&self, raw: &str) -> Result<PipelineConfig, ConfigError> {
        let file: BootstrapFile = serde_yaml::from_str(raw)?;
        self.build(file)
    }

    /// Validates the declaration and injects the implicit log and metric
    /// plumbing.
    pub fn build(&self, file: BootstrapFile) -> Result<PipelineConfig, ConfigError> {
        for (name, spec) in &file.modules {
            if name.starts_with('_') {
                return Err(ConfigError::ReservedName(name.clone()));
            }
            if let Some(protocol) = &spec.protocol {
                if !file.protocols.contains_key(protocol) {
                    return Err(ConfigError::UndeclaredProtocol {
                        module: name.clone(),
                        protocol: protocol.clone(),
                    });
                }
            }
            for functions in spec.functions.values() {
                for function in functions {
                    if !file.functions.contains_key(function) {
                        return Err(ConfigError::UndeclaredFunction {
                            module: name.clone(),
                            function: function.clone(),
                        });
                    }
                }
            }
        }

        let mut modules = file.modules.clone();
        let mut routingtable = Vec::new();
        let mut endpoints: Vec<(String, String)> = Vec::new();

        let add_connection =
            |routingtable: &mut Vec<Connection>,
             endpoints: &mut Vec<(String, String)>,
             connection: Connection|
             -> Result<(), ConfigError> {
                for (module, queue) in [
                    (&connection.source_module, &connection.source_queue),
                    (&connection.destination_module, &connection.destination_queue),
                ] {
                    let endpoint = (module.clone(), queue.clone());
                    if endpoints.contains(&endpoint) {
                        return Err(ConfigError::EndpointTaken {
                            rule: connection.to_string(),
                            endpoint: format!("{module}.{queue}"),
                        });
                    }
                    endpoints.push(endpoint);
                }
                routingtable.push(connection);
                Ok(())
            };

        for rule in &file.routingtable {
            let connection = parse_route(rule)?;
            add_connection(&mut routingtable, &mut endpoints, connection)?;
        }

        // The implicit funnels centralizing every module's logs and metrics.
        modules.insert(
            "_logs".to_string(),
            funnel_spec("Centralizes the logs of all modules."),
        );
        modules.insert(
            "_metrics".to_string(),
            funnel_spec("Centralizes the metrics of all modules."),
        );
        for name in file.modules.keys() {
            for (queue, funnel) in [("logs", "_logs"), ("metrics", "_metrics")] {
                add_connection(
                    &mut routingtable,
                    &mut endpoints,
                    Connection {
                        source_module: name.clone(),
                        source_queue: queue.to_string(),
                        destination_module: funnel.to_string(),
                        destination_queue: format!("_{name}"),
                    },
                )?;
            }
        }

        // The log sink chain behind the funnel.
        match self.log_style {
            LogStyle::Stdout => {
                modules.insert(
                    "_logs_format".to_string(),
                    ModuleSpec {
                        module: "wishbone.module.process.humanlogformat".to_string(),
                        protocol: None,
                        description: "Create a human readable log format.".to_string(),
                        arguments: json!({
                            "colorize": self.colorize_stdout,
                            "ident": self.identification,
                        }),
                        functions: BTreeMap::new(),
                    },
                );
                modules.insert(
                    "_logs_stdout".to_string(),
                    ModuleSpec {
                        module: "wishbone.module.output.stdout".to_string(),
                        protocol: None,
                        description: "Prints all incoming logs to STDOUT.".to_string(),
                        arguments: empty_object(),
                        functions: BTreeMap::new(),
                    },
                );
                add_connection(
                    &mut routingtable,
                    &mut endpoints,
                    Connection {
                        source_module: "_logs".to_string(),
                        source_queue: "outbox".to_string(),
                        destination_module: "_logs_format".to_string(),
                        destination_queue: "inbox".to_string(),
                    },
                )?;
                add_connection(
                    &mut routingtable,
                    &mut endpoints,
                    Connection {
                        source_module: "_logs_format".to_string(),
                        source_queue: "outbox".to_string(),
                        destination_module: "_logs_stdout".to_string(),
                        destination_queue: "inbox".to_string(),
                    },
                )?;
            }
            LogStyle::Syslog => {
                modules.insert(
                    "_logs_syslog".to_string(),
                    ModuleSpec {
                        module: "wishbone.module.output.syslog".to_string(),
                        protocol: None,
                        description: "Writes all incoming messages to syslog.".to_string(),
                        arguments: json!({
                            "ident": self.identification,
                            "message": "{{ data.module }}: {{ data.message }}",
                        }),
                        functions: BTreeMap::new(),
                    },
                );
                add_connection(
                    &mut routingtable,
                    &mut endpoints,
                    Connection {
                        source_module: "_logs".to_string(),
                        source_queue: "outbox".to_string(),
                        destination_module: "_logs_syslog".to_string(),
                        destination_queue: "inbox".to_string(),
                    },
                )?;
            }
        }

        Ok(PipelineConfig {
            protocols: file.protocols,
            functions: file.functions,
            lookups: file.lookups,
            modules,
            routingtable,
        })
    }
}

fn funnel_spec(description: &str) -> ModuleSpec {
    ModuleSpec {
        module: "wishbone.module.flow.funnel".to_string(),
        protocol: None,
        description: description.to_string(),
        arguments: empty_object(),
        functions: BTreeMap::new(),
    }
}

/// Parses a `"src_module.src_queue -> dst_module.dst_queue"` rule.
pub fn parse_route(rule: &str) -> Result<Connection, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidRoute {
        rule: rule.to_string(),
        reason: reason.to_string(),
    };
    let (left, right) = rule
        .split_once("->")
        .ok_or_else(|| invalid("missing '->'"))?;

    let parse_side = |side: &str| -> Result<(String, String), ConfigError> {
        let side = side.trim();
        let (module, queue) = side.split_once('.').ok_or_else(|| invalid("missing a dot"))?;
        if module.is_empty() || queue.is_empty() || queue.contains('.') {
            return Err(invalid("endpoints must be module.queue"));
        }
        Ok((module.to_string(), queue.to_string()))
    };

    let (source_module, source_queue) = parse_side(left)?;
    let (destination_module, destination_queue) = parse_side(right)?;
    Ok(Connection {
        source_module,
        source_queue,
        destination_module,
        destination_queue,
    })
}
