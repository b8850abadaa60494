//! Writes incoming log events to syslog
//!
//! Sends RFC 3164 formatted datagrams to the local syslog socket. The
//! severity comes from the event's log record; the facility is fixed to
//! `user`.
//!
//! Parameters:
//!
//! - `ident` (str, "wishbone"): the identification string of the entries.
//! - `message` (str, "{{ data.module }}: {{ data.message }}"): template of
//!   the line written to syslog.
//!
//! Queues: `inbox`.

use std::process;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::net::UnixDatagram;
use tokio::sync::Mutex;

use crate::actor::Actor;
use crate::actorconfig::ActorConfig;
use crate::error::{Result, WishboneError};
use crate::event::Envelope;
use crate::template::RenderedKwargs;

use super::{Module, ModuleType};

const SYSLOG_PATH: &str = "/dev/log";
const FACILITY_USER: u8 = 1;

pub struct Syslog {
    actor: Arc<Actor>,
    socket: Mutex<Option<UnixDatagram>>,
}

impl Syslog {
    pub fn new(config: ActorConfig, arguments: Value) -> Result<Arc<dyn Module>> {
        let actor = Actor::new(config, arguments);
        actor.pool().create_queue("inbox");

        let module = Arc::new(Self {
            actor,
            socket: Mutex::new(None),
        });
        let consumer = Arc::clone(&module);
        module.actor.register_consumer(
            move |envelope, kwargs| {
                let consumer = Arc::clone(&consumer);
                async move { consumer.consume(envelope, kwargs).await }
            },
            "inbox",
        );
        Ok(module)
    }

    async fn consume(&self, envelope: Envelope, kwargs: RenderedKwargs) -> Result<()> {
        let event = envelope
            .as_event()
            .ok_or_else(|| WishboneError::InvalidData("bulks cannot be syslogged".to_string()))?;
        let severity = event
            .get("data.level")
            .ok()
            .and_then(|level| level.as_u64())
            .unwrap_or(6) as u8;
        let ident = kwargs.get_str("ident").unwrap_or("wishbone");
        let message = match kwargs.get_str("message") {
            Some(rendered) => rendered.to_string(),
            None => default_message(event)?,
        };

        let priority = (FACILITY_USER << 3) | (severity & 7);
        let line = format!("<{priority}>{ident}[{}]: {message}", process::id());

        let mut socket = self.socket.lock().await;
        if socket.is_none() {
            *socket = Some(UnixDatagram::unbound()?);
        }
        socket
            .as_ref()
            .expect("socket set above")
            .send_to(line.as_bytes(), SYSLOG_PATH)
            .await?;
        Ok(())
    }
}

fn default_message(event: &crate::event::Event) -> Result<String> {
    let module = event.get("data.module")?;
    let message = event.get("data.message")?;
    Ok(format!(
        "{}: {}",
        module.as_str().unwrap_or_default(),
        message.as_str().unwrap_or_default()
    ))
}

#[async_trait]
impl Module for Syslog {
    fn actor(&self) -> &Arc<Actor> {
        &self.actor
    }

    fn module_type(&self) -> ModuleType {
        ModuleType::Output
    }
}
