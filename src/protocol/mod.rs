//! Protocol codecs
//!
//! Input modules own a [`Decode`] collaborator turning raw input into payload
//! values; output modules own an [`Encode`] turning payloads back into bytes.
//! A configured protocol instance is one or the other.

pub mod dummy;
pub mod json;

use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;

/// Turns a chunk of raw input into zero or more payload values.
pub trait Decode: Send + Sync {
    fn decode(&self, data: &[u8]) -> Result<Vec<Value>>;

    /// Decodes a value that never left the process: strings run through the
    /// byte decoder, structured values pass through as-is.
    fn decode_value(&self, data: &Value) -> Result<Vec<Value>> {
        match data {
            Value::String(s) => self.decode(s.as_bytes()),
            other => Ok(vec![other.clone()]),
        }
    }
}

/// Turns a payload value into bytes for the outside world.
pub trait Encode: Send + Sync {
    fn encode(&self, data: &Value) -> Result<Vec<u8>>;
}

/// A configured protocol instance: a decoder for inputs or an encoder for
/// outputs.
#[derive(Clone)]
pub enum Protocol {
    Decode(Arc<dyn Decode>),
    Encode(Arc<dyn Encode>),
}

impl std::fmt::Debug for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decode(_) => f.write_str("Protocol::Decode"),
            Self::Encode(_) => f.write_str("Protocol::Encode"),
        }
    }
}
