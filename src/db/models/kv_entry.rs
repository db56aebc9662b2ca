use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A raw row of the key-value table; `value` is an opaque serialized payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KvEntry {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}
