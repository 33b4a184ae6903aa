//! Revision envelope wrapping every persisted collection container.
//!
//! The envelope carries the optimistic-concurrency token: a counter bumped
//! on every successful write. Readers tolerate documents written before
//! envelopes existed (and values restored from old snapshots) by treating
//! them as revision 0.

use reqbase_core::{ReqbaseResult, StorageError};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

/// A collection container plus its revision counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub revision: u64,
    pub value: T,
}

impl<T: Default> Default for Envelope<T> {
    fn default() -> Self {
        Self {
            revision: 0,
            value: T::default(),
        }
    }
}

impl<T> Envelope<T> {
    /// Decode a stored document into an envelope.
    ///
    /// A missing document reads as revision 0 with the empty value. A
    /// document that is not envelope-shaped is taken as a pre-envelope
    /// container and also reads as revision 0.
    pub fn decode(key: &str, stored: Option<Value>) -> ReqbaseResult<Self>
    where
        T: DeserializeOwned + Default,
    {
        let Some(raw) = stored else {
            return Ok(Self::default());
        };
        if is_envelope(&raw) {
            return serde_json::from_value(raw).map_err(|e| {
                StorageError::Serialization {
                    key: key.to_string(),
                    reason: e.to_string(),
                }
                .into()
            });
        }
        let value = serde_json::from_value(raw).map_err(|e| StorageError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { revision: 0, value })
    }

    /// Encode the envelope for persistence.
    pub fn encode(&self, key: &str) -> ReqbaseResult<Value>
    where
        T: Serialize,
    {
        serde_json::to_value(self).map_err(|e| {
            StorageError::Serialization {
                key: key.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

/// Read just the revision counter out of a stored document.
pub(crate) fn stored_revision(stored: &Option<Value>) -> u64 {
    stored
        .as_ref()
        .filter(|raw| is_envelope(raw))
        .and_then(|raw| raw.get("revision"))
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

fn is_envelope(raw: &Value) -> bool {
    raw.as_object()
        .map(|o| o.contains_key("revision") && o.contains_key("value"))
        .unwrap_or(false)
}
