//! Wire representation of changes.
//!
//! Catch-up and live delivery use the same JSON object, so the id read in
//! [`extract_id`] behaves identically for both sources.

use crate::error::Result;
use crate::types::{Change, ChangeId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON shape of a change as delivered to clients.
#[derive(Debug, Serialize)]
pub struct ChangeResponse<'a> {
    pub id: ChangeId,
    pub status: &'static str,
    pub created_at: String,
    pub author: &'a Map<String, Value>,
    pub metadata: &'a Map<String, Value>,
    pub payload: &'a Map<String, Value>,
}

impl<'a> ChangeResponse<'a> {
    pub fn from_change(change: &'a Change) -> Self {
        Self {
            id: change.id,
            status: change.action.as_str(),
            created_at: change.created_at.to_rfc3339(),
            author: &change.author,
            metadata: &change.metadata,
            payload: &change.payload,
        }
    }
}

/// Serialize a change into its wire form.
pub fn encode_change(change: &Change) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&ChangeResponse::from_change(change))?)
}

/// Only the top-level id; every other field is skipped without being built.
#[derive(Deserialize)]
struct IdOnly {
    id: u64,
}

/// Read the top-level `id` of a wire payload.
///
/// Returns `None` when the payload is not a JSON object or carries no
/// non-negative integer id.
pub fn extract_id(payload: &[u8]) -> Option<ChangeId> {
    serde_json::from_slice::<IdOnly>(payload)
        .ok()
        .map(|only| ChangeId(only.id))
}
