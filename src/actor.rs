//! The actor runtime
//!
//! An [`Actor`] owns a queue pool, a log handle and a set of tokio tasks:
//! one per registered consumer, one metric producer, plus any supervised
//! background tasks a module starts. Consumers drain a named queue and run
//! the module's handler on every envelope, after re-rendering the templated
//! parameters, burning one TTL hop and applying the queue's function chain.
//! Handler success routes a copy of the envelope to `success`, failure to
//! `failed` with the error recorded on the event.

use std::collections::HashMap;
use std::env;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

use crate::actorconfig::ActorConfig;
use crate::error::{Result, WishboneError};
use crate::event::{now_timestamp, Envelope, Event, Metric};
use crate::logging::Logging;
use crate::queue::{Queue, QueuePool, TrySendError};
use crate::template::{Kwargs, RenderedKwargs};

/// How long `submit` sleeps between retries against a full queue.
const SUBMIT_RETRY: Duration = Duration::from_millis(100);

/// How long a failed background task waits before it is restarted.
const BACKGROUND_RESTART: Duration = Duration::from_secs(2);

/// Actor lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorState {
    Initialized,
    Running,
    Stopped,
}

/// The execution harness shared by every module instance.
pub struct Actor {
    config: ActorConfig,
    pool: QueuePool,
    logging: Logging,
    kwargs: Kwargs,
    initial_kwargs: RenderedKwargs,
    arguments: Map<String, Value>,
    state: watch::Sender<ActorState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    consumer_queues: Mutex<Vec<String>>,
    children: Mutex<HashMap<String, String>>,
    parents: Mutex<HashMap<String, String>>,
    metrics_spawned: AtomicBool,
}

impl Actor {
    /// Builds the harness. String-typed arguments are compiled to templates
    /// here; they are re-rendered against every consumed event.
    pub fn new(config: ActorConfig, arguments: Value) -> Arc<Self> {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let pool = QueuePool::new(config.size);
        let logging = Logging::new(
            config.name.clone(),
            pool.get_queue("logs").expect("standard queue"),
        );
        let kwargs = Kwargs::compile(&arguments);
        let initial_kwargs = kwargs.render_static(&config.lookups);
        let (state, _) = watch::channel(ActorState::Initialized);

        Arc::new(Self {
            config,
            pool,
            logging,
            kwargs,
            initial_kwargs,
            arguments,
            state,
            tasks: Mutex::new(Vec::new()),
            consumer_queues: Mutex::new(Vec::new()),
            children: Mutex::new(HashMap::new()),
            parents: Mutex::new(HashMap::new()),
            metrics_spawned: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ActorConfig {
        &self.config
    }

    pub fn pool(&self) -> &QueuePool {
        &self.pool
    }

    pub fn logging(&self) -> &Logging {
        &self.logging
    }

    /// Raw module arguments as declared in the bootstrap file.
    pub fn arguments(&self) -> &Map<String, Value> {
        &self.arguments
    }

    /// Parameters rendered once against an empty context, for reads before
    /// the first event arrives.
    pub fn initial_kwargs(&self) -> &RenderedKwargs {
        &self.initial_kwargs
    }

    /// Renders the parameter set against an arbitrary context.
    pub fn render_kwargs(&self, context: &Value) -> RenderedKwargs {
        self.kwargs.render(context, &self.config.lookups)
    }

    pub fn state(&self) -> ActorState {
        *self.state.borrow()
    }

    fn is_stopped(&self) -> bool {
        self.state() == ActorState::Stopped
    }

    /// Waits until the actor leaves the initialized state.
    async fn wait_started(&self) {
        let mut rx = self.state.subscribe();
        loop {
            if *rx.borrow_and_update() != ActorState::Initialized {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Registers `handler` to process all envelopes in `queue_name`.
    ///
    /// Do not trap errors in the handler: a failing handler routes the
    /// envelope to `failed`, a succeeding one to `success`.
    pub fn register_consumer<F, Fut>(self: &Arc<Self>, handler: F, queue_name: &str)
    where
        F: Fn(Envelope, RenderedKwargs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let queue = self.pool.create_queue(queue_name);
        self.consumer_queues
            .lock()
            .expect("consumer registry lock")
            .push(queue_name.to_string());

        let actor = Arc::clone(self);
        let queue_name = queue_name.to_string();
        let handle = tokio::spawn(async move {
            actor.wait_started().await;
            if actor.is_stopped() {
                return;
            }
            actor
                .logging
                .debug(format!("Consumer registered on queue '{queue_name}'"));
            let mut state_rx = actor.state.subscribe();
            loop {
                let envelope = tokio::select! {
                    envelope = queue.get() => envelope,
                    _ = wait_stopped(&mut state_rx) => break,
                };
                actor.process(envelope, &queue_name, &handler).await;
            }
        });
        self.tasks.lock().expect("task registry lock").push(handle);
    }

    async fn process<F, Fut>(&self, mut envelope: Envelope, queue_name: &str, handler: &F)
    where
        F: Fn(Envelope, RenderedKwargs) -> Fut + Send + Sync,
        Fut: Future<Output = Result<()>> + Send,
    {
        let context = envelope
            .as_event()
            .map(|event| event.dump(true))
            .unwrap_or_else(|| Value::Object(Map::new()));
        let rendered = self.render_kwargs(&context);

        if let Err(err) = envelope.decrement_ttl() {
            self.logging.warning(format!(
                "Event with UUID {} dropped. Reason: {}",
                envelope.uuid().unwrap_or_default(),
                err
            ));
            return;
        }

        if let Some(chain) = self.config.functions.get(queue_name) {
            for function in chain {
                let Some(event) = envelope.as_event() else {
                    break;
                };
                match function.apply(event.clone()) {
                    Ok(Some(next)) => envelope = next.into(),
                    Ok(None) => {
                        self.logging
                            .debug("Event dropped by queue function.".to_string());
                        return;
                    }
                    Err(err) => {
                        if self.config.disable_exception_handling {
                            panic!("queue function failed: {err}");
                        }
                        self.logging.error(format!(
                            "Function is skipped as it is causing an error. Reason: '{err}'"
                        ));
                    }
                }
            }
        }

        match handler(envelope.clone(), rendered).await {
            Ok(()) => {
                let success = self.pool.get_queue("success").expect("standard queue");
                self.submit(envelope.clone(), &success).await;
            }
            Err(err) => {
                if self.config.disable_exception_handling {
                    panic!("consumer of '{}' failed: {err}", self.config.name);
                }
                envelope.record_error(&self.config.name, &err);
                self.logging.error(err.to_string());
                let failed = self.pool.get_queue("failed").expect("standard queue");
                self.submit(envelope.clone(), &failed).await;
            }
        }

        envelope.confirm_for(&self.config.name);
    }

    /// Starts a supervised long-running task. A failing task is logged and
    /// restarted after a fixed backoff; returning `Ok` ends it for good.
    pub fn send_to_background<F, Fut>(self: &Arc<Self>, task: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let actor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            actor.wait_started().await;
            while actor.state() == ActorState::Running {
                match task().await {
                    Ok(()) => break,
                    Err(err) => {
                        if actor.config.disable_exception_handling {
                            panic!("background task of '{}' failed: {err}", actor.config.name);
                        }
                        actor.logging.error(format!(
                            "Backgrounded function of module instance '{}' caused an error. \
                             This needs attention. Restarting it in 2 seconds. Reason: {err}",
                            actor.config.name
                        ));
                        sleep(BACKGROUND_RESTART).await;
                    }
                }
            }
        });
        self.tasks.lock().expect("task registry lock").push(handle);
    }

    /// Producer-side backpressured send: retries while the queue is full,
    /// gives up once the actor leaves the running states. Bounded shutdown
    /// beats delivery here.
    pub async fn submit(&self, envelope: Envelope, queue: &Queue) {
        let mut envelope = envelope;
        while !self.is_stopped() {
            match queue.try_put(envelope) {
                Ok(()) => return,
                Err(TrySendError::Full(returned)) => {
                    envelope = returned;
                    sleep(SUBMIT_RETRY).await;
                }
            }
        }
    }

    /// Connects the local `source` queue to `destination_queue` on
    /// `destination`. The destination's queue handle is replaced by the
    /// source's queue instance, so both ends share one buffer.
    ///
    /// Each endpoint can participate in at most one connection. The source
    /// queue is auto-created; the destination queue must have been declared
    /// by its module.
    pub fn connect(
        &self,
        source: &str,
        destination: &Actor,
        destination_queue: &str,
    ) -> Result<()> {
        // Check both endpoints before touching any bookkeeping so a failed
        // connect leaves no trace behind.
        if !destination.pool.has_queue(destination_queue) {
            return Err(WishboneError::QueueMissing {
                module: destination.config.name.clone(),
                queue: destination_queue.to_string(),
            });
        }
        if !self.pool.has_queue(source) {
            self.logging.debug(format!(
                "Module instance '{}' has no queue '{}' so auto created.",
                self.config.name, source
            ));
            self.pool.create_queue(source);
        }

        {
            let mut children = self.children.lock().expect("children lock");
            let mut parents = destination.parents.lock().expect("parents lock");
            if let Some(peer) = children.get(source) {
                return Err(WishboneError::QueueConnected {
                    endpoint: format!("{}.{}", self.config.name, source),
                    peer: peer.clone(),
                });
            }
            if let Some(peer) = parents.get(destination_queue) {
                return Err(WishboneError::QueueConnected {
                    endpoint: format!("{}.{}", destination.config.name, destination_queue),
                    peer: peer.clone(),
                });
            }
            children.insert(
                source.to_string(),
                format!("{}.{}", destination.config.name, destination_queue),
            );
            parents.insert(
                destination_queue.to_string(),
                format!("{}.{}", self.config.name, source),
            );
        }

        let shared = self.pool.get_queue(source).expect("created above");
        destination.pool.adopt(destination_queue, shared.clone());
        shared.disable_fall_through();
        self.logging.debug(format!(
            "Connected queue {}.{} to {}.{}",
            self.config.name, source, destination.config.name, destination_queue
        ));
        Ok(())
    }

    /// The `module.queue` endpoints this actor's queues feed into.
    pub fn children(&self) -> Vec<String> {
        self.children
            .lock()
            .expect("children lock")
            .values()
            .cloned()
            .collect()
    }

    /// Starts the metric producer, once. Every `frequency` seconds it emits
    /// one metric event per stat field of every queue in the pool.
    pub fn spawn_metric_producer(self: &Arc<Self>) {
        if self.metrics_spawned.swap(true, Ordering::Relaxed) {
            return;
        }
        let actor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            actor.wait_started().await;
            let source = env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
            let interval = Duration::from_secs(actor.config.frequency.into_inner());
            let metrics = actor.pool.get_queue("metrics").expect("standard queue");
            while actor.state() == ActorState::Running {
                for queue_name in actor.pool.list_queues() {
                    let Some(queue) = actor.pool.get_queue(&queue_name) else {
                        continue;
                    };
                    for (stat, value) in queue.stats().fields() {
                        let metric = Metric {
                            time: now_timestamp(),
                            kind: "wishbone".to_string(),
                            source: source.clone(),
                            name: format!(
                                "module.{}.queue.{}.{}",
                                actor.config.name, queue_name, stat
                            ),
                            value,
                            unit: String::new(),
                            tags: Vec::new(),
                        };
                        actor
                            .submit(Event::new(metric.to_value()).into(), &metrics)
                            .await;
                    }
                }
                sleep(interval).await;
            }
        });
        self.tasks.lock().expect("task registry lock").push(handle);
    }

    /// Checks that every queue with a declared function chain has a
    /// registered consumer; silently never-applied functions are a
    /// configuration bug.
    pub fn validate_applied_functions(&self) -> Result<()> {
        let consumers = self.consumer_queues.lock().expect("consumer registry lock");
        for queue in self.config.functions.keys() {
            if !consumers.contains(queue) {
                return Err(WishboneError::ModuleInitFailure {
                    module: self.config.name.clone(),
                    reason: format!(
                        "functions defined on queue '{queue}' which doesn't have a registered consumer"
                    ),
                });
            }
        }
        Ok(())
    }

    /// Moves the actor into the running state, releasing consumers and
    /// background tasks.
    pub fn transition_running(&self) -> Result<()> {
        self.validate_applied_functions()?;
        self.state.send_replace(ActorState::Running);
        self.logging.debug(format!(
            "Started with max queue size of {} events and metrics interval of {} seconds.",
            self.config.size.into_inner(),
            self.config.frequency.into_inner()
        ));
        Ok(())
    }

    /// Clears the run flag and cancels every remaining task. Consumers and
    /// background loops observe the flag at their next suspension point; the
    /// abort catches the ones parked in a blocking get.
    pub fn halt(&self) {
        self.logging.info("Received stop. Initiating shutdown.");
        self.state.send_replace(ActorState::Stopped);
        for handle in self.tasks.lock().expect("task registry lock").drain(..) {
            handle.abort();
        }
    }
}

async fn wait_stopped(rx: &mut watch::Receiver<ActorState>) {
    loop {
        if *rx.borrow_and_update() == ActorState::Stopped {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::QueueCapacity;
    use serde_json::json;

    fn running_actor(name: &str) -> Arc<Actor> {
        let actor = Actor::new(ActorConfig::new(name), Value::Null);
        actor.transition_running().unwrap();
        actor
    }

    #[tokio::test]
    async fn consumer_routes_success_and_failure() {
        let actor = Actor::new(ActorConfig::new("probe"), Value::Null);
        actor.pool().create_queue("inbox");
        actor.register_consumer(
            |envelope: Envelope, _kwargs| async move {
                let event = envelope.as_event().expect("single event");
                if event.get("data").unwrap() == json!("bad") {
                    return Err(WishboneError::InvalidData("bad payload".to_string()));
                }
                Ok(())
            },
            "inbox",
        );
        actor.transition_running().unwrap();

        let inbox = actor.pool().get_queue("inbox").unwrap();
        inbox.try_put(Event::new(json!("good")).into()).unwrap();
        inbox.try_put(Event::new(json!("bad")).into()).unwrap();

        let success = actor.pool().get_queue("success").unwrap();
        let failed = actor.pool().get_queue("failed").unwrap();
        let ok = success.get().await;
        let bad = failed.get().await;

        assert_eq!(ok.as_event().unwrap().get("data").unwrap(), json!("good"));
        let recorded = bad.as_event().unwrap().get("errors.probe").unwrap();
        assert_eq!(recorded[0], json!("invalid_data"));
        assert_eq!(success.stats().in_total, 1);
        assert_eq!(failed.stats().in_total, 1);

        actor.halt();
    }

    #[tokio::test]
    async fn ttl_expired_events_are_dropped() {
        let actor = Actor::new(ActorConfig::new("hopper"), Value::Null);
        actor.pool().create_queue("inbox");
        actor.register_consumer(|_envelope, _kwargs| async move { Ok(()) }, "inbox");
        actor.transition_running().unwrap();

        let inbox = actor.pool().get_queue("inbox").unwrap();
        let expired = Event::new(json!("x")).with_ttl(crate::domain::EventTtl::new(0));
        inbox.try_put(expired.into()).unwrap();
        let alive = Event::new(json!("y"));
        inbox.try_put(alive.into()).unwrap();

        // Only the live event reaches success.
        let success = actor.pool().get_queue("success").unwrap();
        let envelope = success.get().await;
        assert_eq!(envelope.as_event().unwrap().get("data").unwrap(), json!("y"));
        assert_eq!(success.size(), 0);

        actor.halt();
    }

    #[tokio::test]
    async fn submit_backpressure_holds_until_space() {
        let config = ActorConfig::new("pusher").with_size(QueueCapacity::try_new(1).unwrap());
        let actor = Actor::new(config, Value::Null);
        actor.transition_running().unwrap();

        let queue = actor.pool().create_queue("outbox");
        queue.disable_fall_through();
        queue.try_put(Event::new(json!(0)).into()).unwrap();

        let submitter = {
            let actor = Arc::clone(&actor);
            let queue = queue.clone();
            tokio::spawn(async move {
                actor.submit(Event::new(json!(1)).into(), &queue).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!submitter.is_finished());

        queue.try_get().unwrap();
        submitter.await.unwrap();
        assert_eq!(queue.size(), 1);

        actor.halt();
    }

    #[tokio::test]
    async fn connect_is_endpoint_unique() {
        let a = running_actor("a");
        let b = running_actor("b");
        let c = running_actor("c");
        b.pool().create_queue("inbox");
        c.pool().create_queue("inbox");

        a.connect("outbox", &b, "inbox").unwrap();
        assert!(matches!(
            a.connect("outbox", &c, "inbox"),
            Err(WishboneError::QueueConnected { .. })
        ));
        assert!(matches!(
            c.connect("outbox", &b, "inbox"),
            Err(WishboneError::QueueConnected { .. })
        ));
        assert_eq!(a.children(), vec!["b.inbox".to_string()]);
    }

    #[tokio::test]
    async fn connect_requires_declared_destination() {
        let a = running_actor("a");
        let b = running_actor("b");
        assert!(matches!(
            a.connect("outbox", &b, "undeclared"),
            Err(WishboneError::QueueMissing { .. })
        ));

        // The failed attempt left no endpoint bookkeeping behind: once the
        // queue exists, the same pair connects cleanly.
        b.pool().create_queue("undeclared");
        a.connect("outbox", &b, "undeclared").unwrap();
        assert_eq!(a.children(), vec!["b.undeclared".to_string()]);
    }

    #[tokio::test]
    async fn functions_on_consumerless_queue_fail_start() {
        let mut config = ActorConfig::new("chained");
        config.functions.insert("inbox".to_string(), Vec::new());
        let actor = Actor::new(config, Value::Null);
        assert!(matches!(
            actor.transition_running(),
            Err(WishboneError::ModuleInitFailure { .. })
        ));
    }
}
