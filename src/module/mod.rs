//! Module instances
//!
//! A module is an [`Actor`] plus behavior: consumers on its declared queues,
//! background producers, and the pre/post hooks run inside start and stop.
//! Input modules own a decoder, output modules an encoder; both fall back to
//! the passthrough codec when no protocol is configured.

pub mod acknowledge;
pub mod funnel;
pub mod humanlogformat;
pub mod stdout;
pub mod syslog;
pub mod testevent;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::actor::Actor;
use crate::actorconfig::ActorConfig;
use crate::error::{Result, WishboneError};
use crate::event::Event;
use crate::protocol::dummy::{DummyDecode, DummyEncode};
use crate::protocol::{Decode, Encode, Protocol};

/// What role a module plays in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleType {
    Input,
    Output,
    Flow,
    Process,
}

impl std::fmt::Display for ModuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Flow => "flow",
            Self::Process => "process",
        };
        f.write_str(label)
    }
}

/// A runnable module instance.
#[async_trait]
pub trait Module: Send + Sync {
    fn actor(&self) -> &Arc<Actor>;

    fn module_type(&self) -> ModuleType;

    /// Override point run inside [`Module::start`], before the actor goes
    /// running. Consumers and background tasks are typically set up here.
    async fn pre_hook(&self) -> Result<()> {
        Ok(())
    }

    /// Override point run inside [`Module::stop`], after the tasks are gone.
    async fn post_hook(&self) {}

    /// Starts the module: metric producer, pre hook, then the transition to
    /// running (which validates the function chains).
    async fn start(&self) -> Result<()> {
        self.actor().spawn_metric_producer();
        self.pre_hook().await?;
        self.actor().transition_running()
    }

    /// Stops the module: run flag cleared, remaining tasks cancelled, post
    /// hook fired.
    async fn stop(&self) {
        self.actor().halt();
        self.post_hook().await;
        self.actor().logging().debug("Exit.");
    }
}

/// The decoder an input module should use: the configured protocol, or the
/// passthrough decoder when none was set up.
pub fn input_decoder(config: &ActorConfig) -> Result<Arc<dyn Decode>> {
    match &config.protocol {
        None => Ok(Arc::new(DummyDecode)),
        Some(Protocol::Decode(decoder)) => Ok(Arc::clone(decoder)),
        Some(Protocol::Encode(_)) => Err(WishboneError::ProtocolInitFailure {
            name: config.protocol_name.clone().unwrap_or_default(),
            reason: "an encoder cannot feed an input module".to_string(),
        }),
    }
}

/// The encoder an output module should use, with the same fallback.
pub fn output_encoder(config: &ActorConfig) -> Result<Arc<dyn Encode>> {
    match &config.protocol {
        None => Ok(Arc::new(DummyEncode)),
        Some(Protocol::Encode(encoder)) => Ok(Arc::clone(encoder)),
        Some(Protocol::Decode(_)) => Err(WishboneError::ProtocolInitFailure {
            name: config.protocol_name.clone().unwrap_or_default(),
            reason: "a decoder cannot feed an output module".to_string(),
        }),
    }
}

/// Builds an event from one decoded payload. With `protocol_event` set the
/// payload must be a complete event mapping and is slurped; otherwise it
/// lands under `data`.
pub fn generate_event(config: &ActorConfig, payload: Value) -> Result<Event> {
    let event = if config.protocol_event {
        Event::from_value(payload)?
    } else {
        Event::new(payload)
    };
    Ok(event.with_confirmation(config.confirmation_modules.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn generate_event_wraps_payload() {
        let config = ActorConfig::new("in");
        let event = generate_event(&config, json!({"k": "v"})).unwrap();
        assert_eq!(event.get("data").unwrap(), json!({"k": "v"}));
    }

    #[test]
    fn generate_event_slurps_full_mappings() {
        let mut config = ActorConfig::new("in");
        config.protocol_event = true;
        let dump = Event::new(json!("payload")).dump(true);
        let event = generate_event(&config, dump).unwrap();
        assert_eq!(event.get("data").unwrap(), json!("payload"));

        assert!(generate_event(&config, json!({"data": 1})).is_err());
    }

    #[test]
    fn input_decoder_rejects_encoders() {
        let mut config = ActorConfig::new("in");
        config.protocol_name = Some("enc".to_string());
        config.protocol = Some(Protocol::Encode(Arc::new(DummyEncode)));
        assert!(input_decoder(&config).is_err());
    }
}
