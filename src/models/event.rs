//! Payloads delivered by the trigger runtime.

use serde::Deserialize;
use serde_json::Value;

/// Object-finalize event. Fields are optional because the runtime does not
/// guarantee them; handlers treat missing values as a no-op.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ObjectFinalizedEvent {
    pub bucket: Option<String>,
    pub name: Option<String>,
    pub content_type: Option<String>,
    pub size: Option<u64>,
}

/// Document-deleted event carrying a snapshot of the removed document.
#[derive(Debug, Deserialize, Default)]
pub struct DocumentDeletedEvent {
    pub id: Option<String>,
    pub data: Option<Value>,
}

/// Query accepted by the batch sweep trigger.
#[derive(Debug, Deserialize, Default)]
pub struct SweepQuery {
    pub prefix: Option<String>,
}
