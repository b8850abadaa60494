//! Prints incoming events to standard output
//!
//! Parameters:
//!
//! - `selection` (str, "data"): the part of the event to print; an empty
//!   string prints the complete event.
//! - `counter` (bool, false): prefix each line with an incrementing number.
//! - `prefix` (str, ""): static prefix put in front of each line.
//! - `pid` (bool, false): include the printing process id.
//! - `colorize` (bool, false): wrap output in ANSI color escapes.
//! - `foreground_color` / `background_color`: color names used when
//!   colorizing.
//!
//! Queues: `inbox`.

use std::io::Write;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use colored::{Color, Colorize};
use serde::Deserialize;
use serde_json::Value;

use crate::actor::Actor;
use crate::actorconfig::ActorConfig;
use crate::error::{Result, WishboneError};
use crate::event::Envelope;
use crate::protocol::Encode;
use crate::template::RenderedKwargs;

use super::{output_encoder, Module, ModuleType};

const FOREGROUNDS: [&str; 8] = [
    "BLACK", "RED", "GREEN", "YELLOW", "BLUE", "MAGENTA", "CYAN", "WHITE",
];

pub struct Stdout {
    actor: Arc<Actor>,
    encoder: Arc<dyn Encode>,
    counter: Option<AtomicU64>,
    include_pid: bool,
    colorize: bool,
    foreground: Color,
    background: Option<Color>,
}

#[derive(Deserialize)]
#[serde(default)]
struct StdoutArgs {
    counter: bool,
    pid: bool,
    colorize: bool,
    foreground_color: String,
    background_color: String,
}

impl Default for StdoutArgs {
    fn default() -> Self {
        Self {
            counter: false,
            pid: false,
            colorize: false,
            foreground_color: "WHITE".to_string(),
            background_color: "RESET".to_string(),
        }
    }
}

impl Stdout {
    pub fn new(config: ActorConfig, arguments: Value) -> Result<Arc<dyn Module>> {
        let encoder = output_encoder(&config)?;
        let args: StdoutArgs = if arguments.is_null() {
            StdoutArgs::default()
        } else {
            serde_json::from_value(arguments.clone())
                .map_err(|err| WishboneError::InvalidData(format!("stdout arguments: {err}")))?
        };

        if !FOREGROUNDS.contains(&args.foreground_color.as_str()) {
            return Err(WishboneError::InvalidData(
                "foreground value is not correct".to_string(),
            ));
        }
        if args.background_color != "RESET"
            && !FOREGROUNDS.contains(&args.background_color.as_str())
        {
            return Err(WishboneError::InvalidData(
                "background value is not correct".to_string(),
            ));
        }

        let foreground = Color::from(args.foreground_color.to_lowercase().as_str());
        let background = (args.background_color != "RESET")
            .then(|| Color::from(args.background_color.to_lowercase().as_str()));

        let actor = Actor::new(config, arguments);
        actor.pool().create_queue("inbox");

        let module = Arc::new(Self {
            actor,
            encoder,
            counter: args.counter.then(|| AtomicU64::new(0)),
            include_pid: args.pid,
            colorize: args.colorize,
            foreground,
            background,
        });
        let consumer = Arc::clone(&module);
        module.actor.register_consumer(
            move |envelope, kwargs| {
                let consumer = Arc::clone(&consumer);
                async move { consumer.consume(envelope, kwargs) }
            },
            "inbox",
        );
        Ok(module)
    }

    fn consume(&self, envelope: Envelope, kwargs: RenderedKwargs) -> Result<()> {
        let selection = kwargs.get_str("selection").unwrap_or("data");
        let data = match &envelope {
            Envelope::Bulk(bulk) => {
                let lines: Vec<String> = bulk
                    .dump_field_as_list(selection)
                    .into_iter()
                    .map(|value| match value {
                        Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .collect();
                Value::String(lines.join("\n"))
            }
            Envelope::Event(event) => event.get(selection)?,
        };

        let bytes = self.encoder.encode(&data)?;
        let mut text = String::from_utf8_lossy(&bytes).into_owned();
        if let Some(counter) = &self.counter {
            let count = counter.fetch_add(1, Ordering::Relaxed) + 1;
            text = format!("{count} - {text}");
        }
        if self.include_pid {
            text = format!("PID-{}: {}", process::id(), text);
        }
        let prefix = kwargs.get_str("prefix").unwrap_or("");
        let line = format!("{prefix}{text}");
        let line = if self.colorize {
            let colored = line.as_str().color(self.foreground);
            let colored = match self.background {
                Some(background) => colored.on_color(background),
                None => colored,
            };
            colored.to_string()
        } else {
            line
        };

        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{line}")?;
        stdout.flush()?;
        Ok(())
    }
}

#[async_trait]
impl Module for Stdout {
    fn actor(&self) -> &Arc<Actor> {
        &self.actor
    }

    fn module_type(&self) -> ModuleType {
        ModuleType::Output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use serde_json::json;

    #[tokio::test]
    async fn rejects_unknown_colors() {
        assert!(Stdout::new(
            ActorConfig::new("out"),
            json!({"foreground_color": "PINK"})
        )
        .is_err());
    }

    #[tokio::test]
    async fn consumed_events_reach_success() {
        let module = Stdout::new(ActorConfig::new("out"), json!({})).unwrap();
        module.start().await.unwrap();

        let inbox = module.actor().pool().get_queue("inbox").unwrap();
        inbox.try_put(Event::new(json!("printed")).into()).unwrap();

        let success = module.actor().pool().get_queue("success").unwrap();
        let envelope = success.get().await;
        assert_eq!(
            envelope.as_event().unwrap().get("data").unwrap(),
            json!("printed")
        );

        module.stop().await;
    }

    #[tokio::test]
    async fn missing_selection_fails_the_event() {
        let module = Stdout::new(ActorConfig::new("out"), json!({"selection": "data.absent"}))
            .unwrap();
        module.start().await.unwrap();

        let inbox = module.actor().pool().get_queue("inbox").unwrap();
        inbox.try_put(Event::new(json!("x")).into()).unwrap();

        let failed = module.actor().pool().get_queue("failed").unwrap();
        let envelope = failed.get().await;
        assert!(envelope.as_event().unwrap().has("errors.out"));

        module.stop().await;
    }
}
