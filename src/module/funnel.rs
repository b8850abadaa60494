//! Merges multiple incoming queues into one outgoing queue
//!
//! The funnel declares only `outbox`; its inbound queues appear through
//! adoption when other modules are connected to it. One consumer per adopted
//! queue shovels everything into `outbox`. The router leans on this for the
//! central `_logs` and `_metrics` fan-in.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::actor::Actor;
use crate::actorconfig::ActorConfig;
use crate::error::Result;

use super::{Module, ModuleType};

pub struct Funnel {
    actor: Arc<Actor>,
}

impl Funnel {
    pub fn new(config: ActorConfig, arguments: Value) -> Result<Arc<dyn Module>> {
        let actor = Actor::new(config, arguments);
        actor.pool().create_queue("outbox");
        Ok(Arc::new(Self { actor }))
    }
}

#[async_trait]
impl Module for Funnel {
    fn actor(&self) -> &Arc<Actor> {
        &self.actor
    }

    fn module_type(&self) -> ModuleType {
        ModuleType::Flow
    }

    async fn pre_hook(&self) -> Result<()> {
        // Inbound queues exist by now; connections are wired before start.
        for queue_name in self.actor.pool().list_custom_queues() {
            if queue_name == "outbox" {
                continue;
            }
            let actor = Arc::clone(&self.actor);
            self.actor.register_consumer(
                move |envelope, _kwargs| {
                    let actor = Arc::clone(&actor);
                    async move {
                        let outbox = actor.pool().get_queue("outbox").expect("declared queue");
                        actor.submit(envelope, &outbox).await;
                        Ok(())
                    }
                },
                &queue_name,
            );
        }
        Ok(())
    }
}
