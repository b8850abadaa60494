//! The default router
//!
//! Responsible for shoveling messages from one module to the other:
//! instantiates the configured protocols, lookups, functions and modules,
//! wires the routing table through queue adoption, and orchestrates start
//! and stop. Shutdown stops the non-log modules first, polls until every
//! `logs` queue has drained, then takes the log pipeline down and releases
//! the block barrier.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tracing::{debug, info};

use crate::actor::ActorState;
use crate::actorconfig::{ActorConfig, FunctionChains};
use crate::config::PipelineConfig;
use crate::domain::{MetricsInterval, QueueCapacity};
use crate::error::{Result, WishboneError};
use crate::function::EventFunction;
use crate::module::Module;
use crate::registry::{ComponentRegistry, Factory};
use crate::template::Lookups;

/// How often the shutdown poll re-checks the logs queues.
const DRAIN_POLL: Duration = Duration::from_millis(100);

/// Holds the instantiated module instances by name.
#[derive(Default)]
pub struct ModulePool {
    modules: BTreeMap<String, Arc<dyn Module>>,
}

impl ModulePool {
    pub fn insert(&mut self, name: impl Into<String>, module: Arc<dyn Module>) {
        self.modules.insert(name.into(), module);
    }

    pub fn get(&self, name: &str) -> Result<&Arc<dyn Module>> {
        self.modules
            .get(name)
            .ok_or_else(|| WishboneError::NoSuchModule(name.to_string()))
    }

    pub fn list(&self) -> impl Iterator<Item = (&String, &Arc<dyn Module>)> {
        self.modules.iter()
    }
}

/// The default Wishbone router.
pub struct Router {
    registry: ComponentRegistry,
    size: QueueCapacity,
    frequency: MetricsInterval,
    pool: ModulePool,
    blocked: watch::Sender<bool>,
}

impl Router {
    pub fn new(registry: ComponentRegistry) -> Self {
        let (blocked, _) = watch::channel(false);
        Self {
            registry,
            size: QueueCapacity::default(),
            frequency: MetricsInterval::default(),
            pool: ModulePool::default(),
            blocked,
        }
    }

    /// The capacity of every queue the router's modules create.
    pub fn with_size(mut self, size: QueueCapacity) -> Self {
        self.size = size;
        self
    }

    /// The interval at which metrics are produced.
    pub fn with_frequency(mut self, frequency: MetricsInterval) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn pool(&self) -> &ModulePool {
        &self.pool
    }

    /// Registers an externally constructed module instance.
    pub fn register_module(&mut self, module: Arc<dyn Module>) {
        let name = module.actor().name().to_string();
        self.pool.insert(name, module);
    }

    /// Connects one queue to the other, `<module>.<queue>` syntax on both
    /// sides.
    pub fn connect_queue(&self, source: &str, destination: &str) -> Result<()> {
        let (source_module, source_queue) = split_endpoint(source)?;
        let (destination_module, destination_queue) = split_endpoint(destination)?;

        let source = self.pool.get(&source_module)?;
        let destination = self.pool.get(&destination_module)?;
        source
            .actor()
            .connect(&source_queue, destination.actor(), &destination_queue)
    }

    /// Instantiates everything the configuration declares and wires the
    /// graph. Fails before any module starts.
    pub fn initialize(&mut self, config: &PipelineConfig) -> Result<()> {
        let mut protocols = HashMap::new();
        for (name, spec) in &config.protocols {
            let component = self.registry.get(&spec.protocol)?;
            let Factory::Protocol(factory) = &component.factory else {
                return Err(WishboneError::InvalidComponent(spec.protocol.clone()));
            };
            let protocol =
                factory(spec.arguments.clone()).map_err(|err| WishboneError::ProtocolInitFailure {
                    name: name.clone(),
                    reason: err.to_string(),
                })?;
            protocols.insert(name.clone(), (protocol, spec.event));
        }

        let mut lookups = Lookups::new();
        for (name, spec) in &config.lookups {
            let component = self.registry.get(&spec.lookup)?;
            let Factory::Lookup(factory) = &component.factory else {
                return Err(WishboneError::InvalidComponent(spec.lookup.clone()));
            };
            lookups.insert(name.clone(), factory(spec.arguments.clone())?);
        }

        let mut functions = HashMap::new();
        for (name, spec) in &config.functions {
            let component = self.registry.get(&spec.function)?;
            let Factory::Function(factory) = &component.factory else {
                return Err(WishboneError::InvalidComponent(spec.function.clone()));
            };
            functions.insert(name.clone(), factory(spec.arguments.clone())?);
        }

        for (name, spec) in &config.modules {
            let component = self.registry.get(&spec.module)?;
            let Factory::Module(factory) = &component.factory else {
                return Err(WishboneError::InvalidComponent(spec.module.clone()));
            };

            let mut module_functions = FunctionChains::new();
            for (queue, declared) in &spec.functions {
                let chain: Vec<Arc<dyn EventFunction>> = declared
                    .iter()
                    .filter_map(|function| functions.get(function).cloned())
                    .collect();
                module_functions.insert(queue.clone(), chain);
            }

            let description = if spec.description.is_empty() {
                component.title.clone()
            } else {
                spec.description.clone()
            };

            let mut actor_config = ActorConfig::new(name)
                .with_size(self.size)
                .with_frequency(self.frequency)
                .with_lookups(lookups.clone())
                .with_description(description)
                .with_functions(module_functions);
            if let Some(protocol_name) = &spec.protocol {
                let (protocol, event) = protocols
                    .get(protocol_name)
                    .expect("references validated at load");
                actor_config =
                    actor_config.with_protocol(protocol_name, protocol.clone(), *event);
            }

            let module = factory(actor_config, spec.arguments.clone()).map_err(|err| {
                WishboneError::ModuleInitFailure {
                    module: name.clone(),
                    reason: err.to_string(),
                }
            })?;
            self.pool.insert(name.clone(), module);
            debug!(module = %name, component = %spec.module, "module instantiated");
        }

        for connection in &config.routingtable {
            // The loader invents `_<module>` inbox slots on the funnels it
            // injects; those are created here, explicitly, before wiring.
            if connection.destination_module.starts_with('_') {
                let destination = self.pool.get(&connection.destination_module)?;
                destination
                    .actor()
                    .pool()
                    .create_queue(&connection.destination_queue);
            }
            self.connect_queue(
                &format!("{}.{}", connection.source_module, connection.source_queue),
                &format!(
                    "{}.{}",
                    connection.destination_module, connection.destination_queue
                ),
            )?;
        }

        Ok(())
    }

    /// Starts all registered modules.
    pub async fn start(&self) -> Result<()> {
        for (name, module) in self.pool.list() {
            module
                .start()
                .await
                .map_err(|err| match err {
                    failure @ WishboneError::ModuleInitFailure { .. } => failure,
                    other => WishboneError::ModuleInitFailure {
                        module: name.clone(),
                        reason: other.to_string(),
                    },
                })?;
        }
        info!("router started");
        Ok(())
    }

    /// Stops all running modules: first everything outside the log pipeline,
    /// then, once the logs queues drained, the log pipeline itself.
    pub async fn stop(&self) {
        let mut log_modules: HashSet<String> = self.get_children("_logs").into_iter().collect();
        log_modules.insert("_logs".to_string());

        for (name, module) in self.pool.list() {
            if !log_modules.contains(name) && module.actor().state() == ActorState::Running {
                module.stop().await;
            }
        }

        while !self.logs_empty() {
            sleep(DRAIN_POLL).await;
        }

        for (name, module) in self.pool.list() {
            if log_modules.contains(name) && module.actor().state() == ActorState::Running {
                module.stop().await;
            }
        }

        // The log pipeline's own logs queues are unconnected and may hold a
        // few shedding-mode records; clear them so nothing lingers.
        for (_, module) in self.pool.list() {
            if let Some(queue) = module.actor().pool().get_queue("logs") {
                while queue.try_get().is_some() {}
            }
        }

        info!("router stopped");
        self.blocked.send_replace(true);
    }

    /// Blocks until [`Router::stop`] has finished the shutdown sequence.
    pub async fn block(&self) {
        let mut rx = self.blocked.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// All module names reachable from `module` by following connections.
    pub fn get_children(&self, module: &str) -> Vec<String> {
        if self.pool.get(module).is_err() {
            return Vec::new();
        }
        let mut children = Vec::new();
        let mut stack = vec![module.to_string()];
        while let Some(current) = stack.pop() {
            let Ok(instance) = self.pool.get(&current) else {
                continue;
            };
            for endpoint in instance.actor().children() {
                let name = endpoint
                    .split('.')
                    .next()
                    .unwrap_or_default()
                    .to_string();
                if !children.contains(&name) {
                    children.push(name.clone());
                    stack.push(name);
                }
            }
        }
        children
    }

    /// Whether any module still holds unshipped log events. Only connected
    /// logs queues count; an unconnected one sheds instead of shipping.
    fn logs_empty(&self) -> bool {
        self.pool.list().all(|(_, module)| {
            module
                .actor()
                .pool()
                .get_queue("logs")
                .map(|queue| queue.fall_through() || queue.size() == 0)
                .unwrap_or(true)
        })
    }
}

fn split_endpoint(endpoint: &str) -> Result<(String, String)> {
    match endpoint.split_once('.') {
        Some((module, queue)) if !module.is_empty() && !queue.is_empty() => {
            Ok((module.to_string(), queue.to_string()))
        }
        _ => Err(WishboneError::NoSuchModule(endpoint.to_string())),
    }
}
