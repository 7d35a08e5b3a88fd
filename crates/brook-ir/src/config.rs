//! Typed codec for the per-instruction scheduling blob.
//!
//! The blob is opaque JSON attached to an instruction's `backend_config`.
//! Upstream producers serialize 64-bit queue ids either as JSON numbers or as
//! decimal strings, so both forms are accepted on decode.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::spec::Instruction;

/// Queue id denoting ordinary synchronous execution on the default stream.
pub const DEFAULT_QUEUE_ID: u64 = 0;

/// Scheduling metadata decoded from an instruction's backend config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulingConfig {
    #[serde(default, deserialize_with = "queue_id")]
    pub operation_queue_id: u64,
    #[serde(default, deserialize_with = "queue_id_list")]
    pub wait_on_operation_queues: Vec<u64>,
}

impl SchedulingConfig {
    /// Decodes the scheduling config recorded on `instruction`.
    ///
    /// An absent blob decodes to the default config (default queue, no
    /// waits); a present but malformed blob is an error.
    pub fn of(instruction: &Instruction) -> Result<Self, ConfigError> {
        Self::decode(instruction.backend_config.as_deref())
    }

    pub fn decode(raw: Option<&str>) -> Result<Self, ConfigError> {
        match raw {
            None => Ok(Self::default()),
            Some(blob) => serde_json::from_str(blob).map_err(ConfigError::from),
        }
    }

    /// Encodes this config into the canonical blob form.
    pub fn encode(&self) -> Result<String, ConfigError> {
        serde_json::to_string(self).map_err(ConfigError::from)
    }

    /// Returns `true` when the instruction is assigned to a non-default queue.
    pub fn requests_nondefault_queue(&self) -> bool {
        self.operation_queue_id != DEFAULT_QUEUE_ID
    }
}

/// Failure to decode or encode a scheduling blob.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed backend config: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum U64OrString {
    Num(u64),
    Str(String),
}

impl U64OrString {
    fn value<E: serde::de::Error>(self) -> Result<u64, E> {
        match self {
            U64OrString::Num(value) => Ok(value),
            U64OrString::Str(text) => text
                .trim()
                .parse::<u64>()
                .map_err(|_| E::custom(format!("invalid queue id `{text}`"))),
        }
    }
}

fn queue_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    U64OrString::deserialize(deserializer)?.value()
}

fn queue_id_list<'de, D>(deserializer: D) -> Result<Vec<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<U64OrString>::deserialize(deserializer)?;
    raw.into_iter().map(U64OrString::value).collect()
}
