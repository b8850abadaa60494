//! # Wishbone - A framework for building event-pipeline servers
//!
//! A user declares a set of modules (input, process, flow, output) and a
//! routing table between their named queues; the runtime instantiates each
//! module, wires queues together through adoption, and shovels events
//! through with backpressure, per-queue function chains, metrics, logging
//! and controlled shutdown.
//!
//! ## Core components
//!
//! - **Event model**: [`Event`], [`Bulk`] and the [`Envelope`] queues carry;
//!   dotted-path addressing, TTL hop budget, confirmation barriers.
//! - **Bounded queues**: [`Queue`]/[`QueuePool`] with backpressure or
//!   fall-through shedding, monotone stats, queue adoption between actors.
//! - **Actor runtime**: [`Actor`] with consumer tasks, supervised background
//!   tasks, a metric producer and templated parameters re-rendered per
//!   event.
//! - **Component registry**: [`ComponentRegistry`], a compile-time factory
//!   index addressed by `<namespace>.<kind>.<category>.<name>` names.
//! - **Configuration**: [`ConfigFile`] loads the YAML bootstrap declaration
//!   and injects the implicit log/metric plumbing.
//! - **Router**: [`Router`] assembles the configured topology and owns the
//!   start/stop sequence.
//!
//! ## Example
//!
//! ```no_run
//! use wishbone::{ComponentRegistry, ConfigFile, LogStyle, Router};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let pipeline = ConfigFile::new(LogStyle::Stdout).load("bootstrap.yaml".as_ref())?;
//! let mut router = Router::new(ComponentRegistry::with_builtins());
//! router.initialize(&pipeline)?;
//! router.start().await?;
//! router.block().await;
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod actorconfig;
pub mod config;
pub mod domain;
pub mod error;
pub mod event;
pub mod function;
pub mod logging;
pub mod lookup;
pub mod module;
pub mod protocol;
pub mod queue;
pub mod registry;
pub mod router;
pub mod template;
pub mod utils;

pub use actor::{Actor, ActorState};
pub use actorconfig::ActorConfig;
pub use config::{ConfigFile, Connection, LogStyle, PipelineConfig};
pub use domain::{EventTtl, MetricsInterval, QueueCapacity, SyslogLevel};
pub use error::{Result, WishboneError};
pub use event::{Bulk, Envelope, Event, Log, Metric};
pub use logging::Logging;
pub use module::{Module, ModuleType};
pub use queue::{Queue, QueuePool, QueueStats, TrySendError};
pub use registry::{Component, ComponentKind, ComponentRegistry, Factory};
pub use router::{ModulePool, Router};
