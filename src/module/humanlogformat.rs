//! Converts the internal log format into human readable form
//!
//! Log events are reshaped from the structured record traveling the `logs`
//! queues into a line suited for STDOUT or a logfile:
//!
//! `2023-08-04T19:54:43 wishbone[3342]: informational dictgenerator: Initiated`
//!
//! Parameters:
//!
//! - `colorize` (bool, true): color the line according to its level.
//! - `ident` (str, program name): the identification string in front of the
//!   pid.
//!
//! Queues: `inbox`, `outbox`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, TimeZone};
use colored::{Color, Colorize};
use serde::Deserialize;
use serde_json::Value;

use crate::actor::Actor;
use crate::actorconfig::ActorConfig;
use crate::error::{Result, WishboneError};
use crate::event::{Envelope, Log};

use super::{Module, ModuleType};

pub struct HumanLogFormat {
    actor: Arc<Actor>,
    colorize: bool,
    ident: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct FormatArgs {
    colorize: Option<bool>,
    ident: Option<String>,
}

fn level_color(level: u8) -> Color {
    match level {
        0 => Color::Magenta,
        1 => Color::BrightMagenta,
        2 => Color::Red,
        3 => Color::BrightRed,
        4 => Color::BrightYellow,
        5 => Color::BrightBlack,
        _ => Color::BrightWhite,
    }
}

fn program_name() -> String {
    std::env::args()
        .next()
        .as_deref()
        .and_then(|path| std::path::Path::new(path).file_name()?.to_str().map(String::from))
        .unwrap_or_else(|| "wishbone".to_string())
}

impl HumanLogFormat {
    pub fn new(config: ActorConfig, arguments: Value) -> Result<Arc<dyn Module>> {
        let args: FormatArgs = if arguments.is_null() {
            FormatArgs::default()
        } else {
            serde_json::from_value(arguments.clone())
                .map_err(|err| WishboneError::InvalidData(format!("humanlogformat arguments: {err}")))?
        };

        let actor = Actor::new(config, arguments);
        actor.pool().create_queue("inbox");
        actor.pool().create_queue("outbox");

        let module = Arc::new(Self {
            actor,
            colorize: args.colorize.unwrap_or(true),
            ident: args.ident.unwrap_or_else(program_name),
        });
        let consumer = Arc::clone(&module);
        module.actor.register_consumer(
            move |envelope, _kwargs| {
                let consumer = Arc::clone(&consumer);
                async move { consumer.consume(envelope).await }
            },
            "inbox",
        );
        Ok(module)
    }

    async fn consume(&self, envelope: Envelope) -> Result<()> {
        let event = envelope.as_event().ok_or_else(|| {
            WishboneError::InvalidData("bulks cannot be log records".to_string())
        })?;
        let record = Log::from_value(&event.get("data")?)
            .map_err(|_| WishboneError::InvalidData("incoming data needs to be a log record".to_string()))?;

        let secs = record.time.trunc() as i64;
        let nanos = (record.time.fract() * 1e9) as u32;
        let when = Local
            .timestamp_opt(secs, nanos)
            .single()
            .unwrap_or_else(Local::now);

        let line = format!(
            "{} {}[{}]: {} {}: {}",
            when.format("%Y-%m-%dT%H:%M:%S"),
            self.ident,
            record.pid,
            record.level.name(),
            record.module,
            record.message
        );
        let line = if self.colorize {
            line.as_str()
                .color(level_color(record.level.into_inner()))
                .to_string()
        } else {
            line
        };

        let mut event = event.clone();
        event.set(Value::String(line), "data");
        let outbox = self.actor.pool().get_queue("outbox").expect("declared queue");
        self.actor.submit(event.into(), &outbox).await;
        Ok(())
    }
}

#[async_trait]
impl Module for HumanLogFormat {
    fn actor(&self) -> &Arc<Actor> {
        &self.actor
    }

    fn module_type(&self) -> ModuleType {
        ModuleType::Process
    }
}
