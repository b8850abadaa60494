//! JSON codec pair
//!
//! The decoder accepts a stream of concatenated or newline-separated JSON
//! documents and yields one payload per document. Decode ∘ encode is the
//! identity on serializable payloads.

use serde_json::{Deserializer, Value};

use crate::error::{Result, WishboneError};

use super::{Decode, Encode};

#[derive(Debug, Default)]
pub struct JsonDecode;

impl Decode for JsonDecode {
    fn decode(&self, data: &[u8]) -> Result<Vec<Value>> {
        let mut payloads = Vec::new();
        for document in Deserializer::from_slice(data).into_iter::<Value>() {
            let value = document
                .map_err(|err| WishboneError::ProtocolError(format!("invalid JSON: {err}")))?;
            payloads.push(value);
        }
        Ok(payloads)
    }
}

#[derive(Debug, Default)]
pub struct JsonEncode;

impl Encode for JsonEncode {
    fn encode(&self, data: &Value) -> Result<Vec<u8>> {
        serde_json::to_vec(data)
            .map_err(|err| WishboneError::ProtocolError(format!("cannot encode: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_splits_documents() {
        let payloads = JsonDecode.decode(b"{\"a\": 1}\n{\"b\": 2}").unwrap();
        assert_eq!(payloads, vec![json!({"a": 1}), json!({"b": 2})]);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(JsonDecode.decode(b"{not json").is_err());
    }

    #[test]
    fn encode_decode_is_identity() {
        let payload = json!({"nested": {"list": [1, 2, 3]}, "text": "x"});
        let bytes = JsonEncode.encode(&payload).unwrap();
        let back = JsonDecode.decode(&bytes).unwrap();
        assert_eq!(back, vec![payload]);
    }
}
