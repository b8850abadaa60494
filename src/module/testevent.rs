//! Generates a test event at the chosen interval
//!
//! Parameters:
//!
//! - `interval` (float, 1): seconds between generated events; 0 means as
//!   fast as possible.
//! - `payload` (any, "test"): the content of the generated event. String
//!   payloads are templates re-rendered per event.
//! - `destination` (str, "data"): where to write the payload.
//!
//! Queues: `outbox`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::time::{sleep, Duration};

use crate::actor::{Actor, ActorState};
use crate::actorconfig::ActorConfig;
use crate::error::Result;
use crate::event::Event;
use crate::protocol::Decode;

use super::{input_decoder, Module, ModuleType};

pub struct TestEvent {
    actor: Arc<Actor>,
    decoder: Arc<dyn Decode>,
}

impl TestEvent {
    pub fn new(config: ActorConfig, arguments: Value) -> Result<Arc<dyn Module>> {
        let decoder = input_decoder(&config)?;
        let actor = Actor::new(config, arguments);
        actor.pool().create_queue("outbox");
        Ok(Arc::new(Self { actor, decoder }))
    }
}

#[async_trait]
impl Module for TestEvent {
    fn actor(&self) -> &Arc<Actor> {
        &self.actor
    }

    fn module_type(&self) -> ModuleType {
        ModuleType::Input
    }

    async fn pre_hook(&self) -> Result<()> {
        let actor = Arc::clone(&self.actor);
        let decoder = Arc::clone(&self.decoder);
        self.actor.send_to_background(move || {
            let actor = Arc::clone(&actor);
            let decoder = Arc::clone(&decoder);
            async move {
                let outbox = actor.pool().get_queue("outbox").expect("declared queue");
                while actor.state() == ActorState::Running {
                    let kwargs = actor.render_kwargs(&Value::Object(Map::new()));
                    let payload = kwargs
                        .get("payload")
                        .cloned()
                        .unwrap_or_else(|| Value::String("test".to_string()));
                    let destination = kwargs.get_str("destination").unwrap_or("data").to_string();
                    let interval = kwargs.get_f64("interval").unwrap_or(1.0).max(0.0);

                    for decoded in decoder.decode_value(&payload)? {
                        let mut event = Event::new(Value::Null);
                        event.set(decoded, &destination);
                        actor.submit(event.into(), &outbox).await;
                        sleep(Duration::from_secs_f64(interval)).await;
                    }
                }
                actor.logging().info("Stopped producing events.");
                Ok(())
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn produces_events_at_interval() {
        let module = TestEvent::new(
            ActorConfig::new("gen"),
            json!({"interval": 0.005, "payload": "tick"}),
        )
        .unwrap();
        module.start().await.unwrap();

        let outbox = module.actor().pool().get_queue("outbox").unwrap();
        let first = outbox.get().await;
        assert_eq!(first.as_event().unwrap().get("data").unwrap(), json!("tick"));

        module.stop().await;
    }

    #[tokio::test]
    async fn custom_destination_is_honored() {
        let module = TestEvent::new(
            ActorConfig::new("gen"),
            json!({"interval": 0.005, "payload": "x", "destination": "tmp.slot"}),
        )
        .unwrap();
        module.start().await.unwrap();

        let outbox = module.actor().pool().get_queue("outbox").unwrap();
        let event = outbox.get().await;
        assert_eq!(
            event.as_event().unwrap().get("tmp.slot").unwrap(),
            json!("x")
        );

        module.stop().await;
    }
}
