//! Serializer for checkpoint state (state <-> bytes).
//!
//! Used by persistent backends; the in-memory stores hold `FlowState`
//! directly and never serialize. Round-trip equality is the only contract the
//! engine relies on.

use crate::state::FlowState;

use super::CheckpointError;

/// Serializes and deserializes state for checkpoint storage.
pub trait Serializer: Send + Sync {
    fn serialize(&self, state: &FlowState) -> Result<Vec<u8>, CheckpointError>;
    fn deserialize(&self, bytes: &[u8]) -> Result<FlowState, CheckpointError>;
}

/// JSON serializer; the default for `SqliteCheckpointer`.
///
/// `serde_json`'s `preserve_order` feature keeps field order stable across
/// the round trip.
#[derive(Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, state: &FlowState) -> Result<Vec<u8>, CheckpointError> {
        serde_json::to_vec(state).map_err(|e| CheckpointError::Serialization(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<FlowState, CheckpointError> {
        serde_json::from_slice(bytes).map_err(|e| CheckpointError::Serialization(e.to_string()))
    }
}
