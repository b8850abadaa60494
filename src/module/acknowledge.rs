//! Lets events pass or not based on an in-flight acknowledgement table
//!
//! The module stores an `ack_id` derived from each passing event and only
//! lets events through whose `ack_id` is not currently held. An `ack_id` is
//! released by sending an event carrying it into the `acknowledge` queue;
//! typically a downstream module's `success` or `failed` queue is wired
//! there.
//!
//! Parameters:
//!
//! - `ack_id` (str, none): template identifying the event. Without it a
//!   random 4-character token is generated per event.
//!
//! Queues: `inbox`, `outbox`, `acknowledge`, `dropped`.
//!
//! Variables written in the event `tmp.<name>` namespace: `ack_id`.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;

use crate::actor::Actor;
use crate::actorconfig::ActorConfig;
use crate::error::Result;
use crate::event::Envelope;
use crate::template::RenderedKwargs;

use super::{Module, ModuleType};

/// Mutex-guarded table of unacknowledged identifiers.
struct AckTable {
    entries: Mutex<HashSet<String>>,
}

impl AckTable {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashSet::new()),
        }
    }

    /// Removes `value`; false when it was not held.
    fn ack(&self, value: &str) -> bool {
        self.entries.lock().expect("ack table lock").remove(value)
    }

    /// Claims `value`; false when it is already held.
    fn unack(&self, value: &str) -> bool {
        self.entries
            .lock()
            .expect("ack table lock")
            .insert(value.to_string())
    }

    fn len(&self) -> usize {
        self.entries.lock().expect("ack table lock").len()
    }
}

pub struct Acknowledge {
    actor: Arc<Actor>,
    table: AckTable,
}

impl Acknowledge {
    pub fn new(config: ActorConfig, arguments: Value) -> Result<Arc<dyn Module>> {
        let actor = Actor::new(config, arguments);
        for queue in ["inbox", "outbox", "acknowledge", "dropped"] {
            actor.pool().create_queue(queue);
        }

        let module = Arc::new(Self {
            actor,
            table: AckTable::new(),
        });
        let consumer = Arc::clone(&module);
        module.actor.register_consumer(
            move |envelope, kwargs| {
                let consumer = Arc::clone(&consumer);
                async move { consumer.consume(envelope, kwargs).await }
            },
            "inbox",
        );
        let acknowledger = Arc::clone(&module);
        module.actor.register_consumer(
            move |envelope, kwargs| {
                let acknowledger = Arc::clone(&acknowledger);
                async move { acknowledger.acknowledge(envelope, kwargs).await }
            },
            "acknowledge",
        );
        Ok(module)
    }

    fn ack_field(&self) -> String {
        format!("tmp.{}.ack_id", self.actor.name())
    }

    async fn consume(&self, envelope: Envelope, kwargs: RenderedKwargs) -> Result<()> {
        let Envelope::Event(mut event) = envelope else {
            return Ok(());
        };
        let ack_id = match kwargs.get_str("ack_id") {
            Some(rendered) => rendered.to_string(),
            None => generate_id(),
        };

        if event.has(&self.ack_field()) {
            self.actor.logging().warning(format!(
                "Event arriving to <inbox> with {} already set. Perhaps that should have been \
                 the <acknowledge> queue instead.",
                self.ack_field()
            ));
            return Ok(());
        }

        event.set(Value::String(ack_id.clone()), &self.ack_field());
        if self.table.unack(&ack_id) {
            let outbox = self.actor.pool().get_queue("outbox").expect("declared queue");
            self.actor.submit(event.into(), &outbox).await;
        } else {
            self.actor.logging().debug(format!(
                "Event with still unacknowledged <ack_id> '{ack_id}' send to <dropped> queue."
            ));
            let dropped = self.actor.pool().get_queue("dropped").expect("declared queue");
            self.actor.submit(event.into(), &dropped).await;
        }
        Ok(())
    }

    async fn acknowledge(&self, envelope: Envelope, _kwargs: RenderedKwargs) -> Result<()> {
        let Envelope::Event(event) = envelope else {
            return Ok(());
        };
        match event.get(&self.ack_field()) {
            Ok(value) => {
                let ack_id = value.as_str().unwrap_or_default().to_string();
                if self.table.ack(&ack_id) {
                    self.actor
                        .logging()
                        .debug(format!("Event acknowledged with <ack_id> '{ack_id}'."));
                } else {
                    self.actor.logging().debug(format!(
                        "Event with <ack_id> '{ack_id}' received but was not previously acknowledged."
                    ));
                }
            }
            Err(_) => {
                self.actor.logging().warning(format!(
                    "Received event without '{}' therefore it is dropped",
                    self.ack_field()
                ));
            }
        }
        Ok(())
    }
}

fn generate_id() -> String {
    let mut rng = rand::rng();
    (0..4)
        .map(|_| rng.random_range(b'a'..=b'z') as char)
        .collect()
}

#[async_trait]
impl Module for Acknowledge {
    fn actor(&self) -> &Arc<Actor> {
        &self.actor
    }

    fn module_type(&self) -> ModuleType {
        ModuleType::Flow
    }

    async fn post_hook(&self) {
        self.actor.logging().debug(format!(
            "The ack table has {} events unacknowledged.",
            self.table.len()
        ));
    }
}
