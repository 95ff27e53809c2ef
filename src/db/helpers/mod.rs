use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

use crate::messages::MessageKind;

pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_kind(value: &str) -> Result<MessageKind> {
    match value {
        "SessionStart" => Ok(MessageKind::SessionStart),
        "Distress" => Ok(MessageKind::Distress),
        "AutomaticAlert" => Ok(MessageKind::AutomaticAlert),
        other => Err(anyhow!("unknown alert kind {other}")),
    }
}
