use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};

use signoff_core::audit::{AuditEvent, AuditOutcome};
use signoff_core::domain::approval::RequestId;

use super::{decode_error, RepositoryError};
use crate::DbPool;

pub struct SqlAuditRepository {
    pool: DbPool,
}

impl SqlAuditRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, event: &AuditEvent) -> Result<(), RepositoryError> {
        self.append_all(std::slice::from_ref(event)).await
    }

    /// Writes the batch in one transaction; either every event lands or none do.
    pub async fn append_all(&self, events: &[AuditEvent]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for event in events {
            insert_event(&mut *tx, event).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Events for one request in the order they occurred.
    pub async fn list_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<AuditEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, request_id, correlation_id, event_type, actor, outcome,
                    note, metadata_json, occurred_at
             FROM audit_event
             WHERE request_id = ?
             ORDER BY occurred_at ASC, rowid ASC",
        )
        .bind(&request_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_event).collect::<Result<Vec<_>, _>>()
    }
}

/// Inserts one event on an open connection so callers can share their
/// transaction with it.
pub(crate) async fn insert_event(
    conn: &mut SqliteConnection,
    event: &AuditEvent,
) -> Result<(), RepositoryError> {
    let metadata_json = serde_json::to_string(&event.metadata).map_err(decode_error)?;
    sqlx::query(
        "INSERT INTO audit_event (id, request_id, correlation_id, event_type, actor,
                                  outcome, note, metadata_json, occurred_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&event.event_id)
    .bind(&event.request_id.0)
    .bind(&event.correlation_id)
    .bind(&event.event_type)
    .bind(&event.actor)
    .bind(event.outcome.as_str())
    .bind(&event.note)
    .bind(metadata_json)
    .bind(event.occurred_at.to_rfc3339())
    .execute(conn)
    .await?;
    Ok(())
}

fn parse_outcome(raw: &str) -> Result<AuditOutcome, RepositoryError> {
    match raw {
        "success" => Ok(AuditOutcome::Success),
        "rejected" => Ok(AuditOutcome::Rejected),
        other => Err(RepositoryError::Decode(format!("unknown audit outcome `{other}`"))),
    }
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<AuditEvent, RepositoryError> {
    let event_id: String = row.try_get("id").map_err(decode_error)?;
    let request_id: String = row.try_get("request_id").map_err(decode_error)?;
    let correlation_id: String = row.try_get("correlation_id").map_err(decode_error)?;
    let event_type: String = row.try_get("event_type").map_err(decode_error)?;
    let actor: String = row.try_get("actor").map_err(decode_error)?;
    let outcome: String = row.try_get("outcome").map_err(decode_error)?;
    let note: String = row.try_get("note").map_err(decode_error)?;
    let metadata_json: String = row.try_get("metadata_json").map_err(decode_error)?;
    let occurred_at: String = row.try_get("occurred_at").map_err(decode_error)?;

    let metadata: BTreeMap<String, String> =
        serde_json::from_str(&metadata_json).map_err(decode_error)?;
    let occurred_at = DateTime::parse_from_rfc3339(&occurred_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(decode_error)?;

    Ok(AuditEvent {
        event_id,
        request_id: RequestId(request_id),
        correlation_id,
        event_type,
        actor,
        outcome: parse_outcome(&outcome)?,
        note,
        metadata,
        occurred_at,
    })
}
