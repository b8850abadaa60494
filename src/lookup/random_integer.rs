//! Returns a random integer between a configured minimum and maximum.

use std::sync::Arc;

use rand::Rng;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, WishboneError};

use super::Lookup;

pub struct RandomInteger {
    minimum: i64,
    maximum: i64,
}

#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct RandomIntegerArgs {
    minimum: i64,
    maximum: i64,
}

impl RandomInteger {
    pub fn from_arguments(arguments: Value) -> Result<Arc<dyn Lookup>> {
        let args: RandomIntegerArgs = serde_json::from_value(arguments)
            .map_err(|err| WishboneError::InvalidData(format!("random_integer arguments: {err}")))?;
        if args.minimum > args.maximum {
            return Err(WishboneError::InvalidData(
                "minimum is larger than maximum".to_string(),
            ));
        }
        Ok(Arc::new(Self {
            minimum: args.minimum,
            maximum: args.maximum,
        }))
    }
}

impl Lookup for RandomInteger {
    fn lookup(&self) -> Value {
        Value::from(rand::rng().random_range(self.minimum..=self.maximum))
    }
}
