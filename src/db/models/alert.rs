use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::messages::MessageKind;

/// One outgoing message and what happened when it was dispatched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    pub id: String,
    pub session_id: String,
    pub kind: MessageKind,
    pub recipient: String,
    pub body: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub delivered: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}
