//! Editor state snapshots for undo/redo.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An opaque, immutable copy of the editor state at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditState {
    pub id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub state: serde_json::Value,
}

impl EditState {
    pub fn capture(state: serde_json::Value, captured_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            captured_at,
            state,
        }
    }
}
