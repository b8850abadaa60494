//! Field modification functions.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, WishboneError};
use crate::event::Event;
use crate::template::{Lookups, Template};

use super::EventFunction;

/// Sets a field to a value. String values are templates rendered against the
/// event being processed.
pub struct Set {
    data: SetData,
    destination: String,
}

enum SetData {
    Template(Template),
    Literal(Value),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SetArgs {
    data: Value,
    #[serde(default = "default_destination")]
    destination: String,
}

fn default_destination() -> String {
    "data".to_string()
}

impl Set {
    pub fn from_arguments(arguments: Value) -> Result<Arc<dyn EventFunction>> {
        let args: SetArgs = serde_json::from_value(arguments)
            .map_err(|err| WishboneError::InvalidData(format!("set arguments: {err}")))?;
        let data = match args.data {
            Value::String(s) => SetData::Template(Template::compile(&s)),
            other => SetData::Literal(other),
        };
        Ok(Arc::new(Self {
            data,
            destination: args.destination,
        }))
    }
}

impl EventFunction for Set {
    fn apply(&self, mut event: Event) -> Result<Option<Event>> {
        let value = match &self.data {
            SetData::Template(template) => {
                Value::String(template.render(&event.dump(true), &Lookups::new()))
            }
            SetData::Literal(value) => value.clone(),
        };
        event.set(value, &self.destination);
        Ok(Some(event))
    }
}

/// Lowercases a string field in place.
pub struct Lowercase {
    source: String,
    destination: String,
}

#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LowercaseArgs {
    source: String,
    destination: String,
}

impl Default for LowercaseArgs {
    fn default() -> Self {
        Self {
            source: "data".to_string(),
            destination: "data".to_string(),
        }
    }
}

impl Lowercase {
    pub fn from_arguments(arguments: Value) -> Result<Arc<dyn EventFunction>> {
        let args: LowercaseArgs = serde_json::from_value(arguments)
            .map_err(|err| WishboneError::InvalidData(format!("lowercase arguments: {err}")))?;
        Ok(Arc::new(Self {
            source: args.source,
            destination: args.destination,
        }))
    }
}

impl EventFunction for Lowercase {
    fn apply(&self, mut event: Event) -> Result<Option<Event>> {
        let value = event.get(&self.source)?;
        let text = value
            .as_str()
            .ok_or_else(|| WishboneError::InvalidData(format!("{} is not a string", self.source)))?;
        event.set(Value::String(text.to_lowercase()), &self.destination);
        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_renders_templates() {
        let function =
            Set::from_arguments(json!({"data": "copy of {{ data }}", "destination": "tmp.copy"}))
                .unwrap();
        let event = Event::new(json!("original"));
        let event = function.apply(event).unwrap().unwrap();
        assert_eq!(event.get("tmp.copy").unwrap(), json!("copy of original"));
    }

    #[test]
    fn lowercase_rewrites_field() {
        let function = Lowercase::from_arguments(json!({})).unwrap();
        let event = Event::new(json!("LOUD"));
        let event = function.apply(event).unwrap().unwrap();
        assert_eq!(event.get("data").unwrap(), json!("loud"));
    }

    #[test]
    fn lowercase_fails_on_non_string() {
        let function = Lowercase::from_arguments(json!({})).unwrap();
        let event = Event::new(json!(5));
        assert!(function.apply(event).is_err());
    }
}
