//! DataMap - the key/value payload carried in companion data items
//!
//! Encoded as a CBOR map so payloads stay compact on the BLE link.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::PayloadError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    Long(i64),
    Double(f64),
    Text(String),
}

impl DataValue {
    fn type_name(&self) -> &'static str {
        match self {
            DataValue::Long(_) => "long",
            DataValue::Double(_) => "double",
            DataValue::Text(_) => "text",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataMap {
    entries: BTreeMap<String, DataValue>,
}

impl DataMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_long(mut self, key: &str, value: i64) -> Self {
        self.entries.insert(key.to_string(), DataValue::Long(value));
        self
    }

    pub fn put_text(mut self, key: &str, value: impl Into<String>) -> Self {
        self.entries.insert(key.to_string(), DataValue::Text(value.into()));
        self
    }

    pub fn get_long(&self, key: &str) -> Result<i64, PayloadError> {
        match self.entries.get(key) {
            Some(DataValue::Long(value)) => Ok(*value),
            Some(other) => {
                log::debug!("Key {} holds {}, expected long", key, other.type_name());
                Err(PayloadError::WrongType {
                    key: key.to_string(),
                    expected: "long",
                })
            }
            None => Err(PayloadError::MissingKey(key.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PayloadError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| PayloadError::Encode(e.to_string()))?;
        Ok(buf)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, PayloadError> {
        ciborium::from_reader(data).map_err(|e| PayloadError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_values_survive_encoding() {
        let map = DataMap::new()
            .put_long("bpm", 72)
            .put_long("timestamp", 1_700_000_000_123);
        let decoded = DataMap::from_bytes(&map.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.get_long("bpm").unwrap(), 72);
        assert_eq!(decoded.get_long("timestamp").unwrap(), 1_700_000_000_123);
    }

    #[test]
    fn test_missing_and_mistyped_keys() {
        let map = DataMap::new().put_text("bpm", "fast");
        assert!(matches!(map.get_long("timestamp"), Err(PayloadError::MissingKey(_))));
        assert!(matches!(map.get_long("bpm"), Err(PayloadError::WrongType { .. })));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        assert!(matches!(
            DataMap::from_bytes(&[0xff, 0x00, 0x13]),
            Err(PayloadError::Decode(_))
        ));
    }
}
