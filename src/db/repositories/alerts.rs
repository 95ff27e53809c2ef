use anyhow::{Context, Result};
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_kind, to_i64},
    models::AlertRecord,
};

fn row_to_alert(row: &Row) -> Result<AlertRecord> {
    let kind: String = row.get("kind")?;
    let created_at: String = row.get("created_at")?;

    Ok(AlertRecord {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        kind: parse_kind(&kind)?,
        recipient: row.get("recipient")?,
        body: row.get("body")?,
        latitude: row.get("latitude")?,
        longitude: row.get("longitude")?,
        delivered: row.get("delivered")?,
        error: row.get("error")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

impl Database {
    pub async fn insert_alert(&self, alert: &AlertRecord) -> Result<()> {
        let record = alert.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO emergency_alerts (
                    id, session_id, kind, recipient, body,
                    latitude, longitude, delivered, error, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    record.id,
                    record.session_id,
                    record.kind.as_str(),
                    record.recipient,
                    record.body,
                    record.latitude,
                    record.longitude,
                    record.delivered,
                    record.error,
                    record.created_at.to_rfc3339(),
                ],
            )
            .with_context(|| "failed to insert alert record")?;
            Ok(())
        })
        .await
    }

    /// Most recent alerts first.
    pub async fn list_recent_alerts(&self, limit: u64) -> Result<Vec<AlertRecord>> {
        let limit = to_i64(limit)?;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, kind, recipient, body, latitude, longitude,
                        delivered, error, created_at
                 FROM emergency_alerts
                 ORDER BY created_at DESC
                 LIMIT ?1",
            )?;

            let mut rows = stmt.query(params![limit])?;
            let mut alerts = Vec::new();
            while let Some(row) = rows.next()? {
                alerts.push(row_to_alert(row)?);
            }

            Ok(alerts)
        })
        .await
    }

    pub async fn get_alerts_for_session(&self, session_id: &str) -> Result<Vec<AlertRecord>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, kind, recipient, body, latitude, longitude,
                        delivered, error, created_at
                 FROM emergency_alerts
                 WHERE session_id = ?1
                 ORDER BY created_at ASC",
            )?;

            let mut rows = stmt.query(params![session_id])?;
            let mut alerts = Vec::new();
            while let Some(row) = rows.next()? {
                alerts.push(row_to_alert(row)?);
            }

            Ok(alerts)
        })
        .await
    }
}
