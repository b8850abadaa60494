//! Passthrough codecs, installed when a module has no configured protocol.

use serde_json::Value;

use crate::error::{Result, WishboneError};

use super::{Decode, Encode};

/// Hands input through untouched: bytes become one string payload.
#[derive(Debug, Default)]
pub struct DummyDecode;

impl Decode for DummyDecode {
    fn decode(&self, data: &[u8]) -> Result<Vec<Value>> {
        let text = std::str::from_utf8(data)
            .map_err(|err| WishboneError::ProtocolError(format!("input is not utf-8: {err}")))?;
        Ok(vec![Value::String(text.to_string())])
    }
}

/// Hands payloads through untouched: strings as their bytes, everything else
/// in its JSON rendering.
#[derive(Debug, Default)]
pub struct DummyEncode;

impl Encode for DummyEncode {
    fn encode(&self, data: &Value) -> Result<Vec<u8>> {
        match data {
            Value::String(s) => Ok(s.clone().into_bytes()),
            other => Ok(other.to_string().into_bytes()),
        }
    }
}
