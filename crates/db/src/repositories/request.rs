use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;

use signoff_core::audit::AuditEvent;
use signoff_core::domain::approval::{
    ActorId, ApprovalRequest, ApproverCapacity, ApproverSlot, RequestId, RequestKind, RequestState,
};
use signoff_core::errors::ApplicationError;
use signoff_core::workflow::RequestStore;

use super::audit::insert_event;
use super::{decode_error, RepositoryError};
use crate::DbPool;

const REQUEST_COLUMNS: &str = "id, kind, subject, designated_approver, state,
    first_approver, first_capacity, first_recorded_at,
    second_approver, second_capacity, second_recorded_at,
    refusal_reason, starts_on, created_at, updated_at";

pub struct SqlRequestRepository {
    pool: DbPool,
}

impl SqlRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(
        &self,
        id: &RequestId,
    ) -> Result<Option<ApprovalRequest>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM approval_request WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref row) => Ok(Some(row_to_request(row)?)),
            None => Ok(None),
        }
    }

    /// Oldest first. `None` lists every state.
    pub async fn list_by_state(
        &self,
        state: Option<RequestState>,
        limit: u32,
    ) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        let rows = match state {
            Some(state) => {
                sqlx::query(&format!(
                    "SELECT {REQUEST_COLUMNS} FROM approval_request
                     WHERE state = ?
                     ORDER BY created_at ASC, id ASC
                     LIMIT ?"
                ))
                .bind(state.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {REQUEST_COLUMNS} FROM approval_request
                     ORDER BY created_at ASC, id ASC
                     LIMIT ?"
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(row_to_request).collect::<Result<Vec<_>, _>>()
    }
}

fn slot_columns(slot: &Option<ApproverSlot>) -> (Option<&str>, Option<&'static str>, Option<String>) {
    match slot {
        Some(slot) => (
            Some(slot.actor.0.as_str()),
            Some(slot.capacity.as_str()),
            Some(slot.recorded_at.to_rfc3339()),
        ),
        None => (None, None, None),
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)).map_err(decode_error)
}

fn row_to_slot(
    row: &sqlx::sqlite::SqliteRow,
    prefix: &str,
) -> Result<Option<ApproverSlot>, RepositoryError> {
    let actor: Option<String> = row.try_get(format!("{prefix}_approver").as_str()).map_err(decode_error)?;
    let capacity: Option<String> =
        row.try_get(format!("{prefix}_capacity").as_str()).map_err(decode_error)?;
    let recorded_at: Option<String> =
        row.try_get(format!("{prefix}_recorded_at").as_str()).map_err(decode_error)?;

    match (actor, capacity, recorded_at) {
        (Some(actor), Some(capacity), Some(recorded_at)) => Ok(Some(ApproverSlot {
            actor: ActorId(actor),
            capacity: capacity.parse::<ApproverCapacity>().map_err(decode_error)?,
            recorded_at: parse_timestamp(&recorded_at)?,
        })),
        (None, None, None) => Ok(None),
        _ => Err(RepositoryError::Decode(format!("{prefix} approver slot is partially populated"))),
    }
}

fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalRequest, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let kind: String = row.try_get("kind").map_err(decode_error)?;
    let subject: String = row.try_get("subject").map_err(decode_error)?;
    let designated_approver: Option<String> =
        row.try_get("designated_approver").map_err(decode_error)?;
    let state: String = row.try_get("state").map_err(decode_error)?;
    let refusal_reason: Option<String> = row.try_get("refusal_reason").map_err(decode_error)?;
    let starts_on: Option<String> = row.try_get("starts_on").map_err(decode_error)?;
    let created_at: String = row.try_get("created_at").map_err(decode_error)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_error)?;

    let starts_on = starts_on
        .map(|raw| raw.parse::<NaiveDate>().map_err(decode_error))
        .transpose()?;

    Ok(ApprovalRequest {
        id: RequestId(id),
        kind: kind.parse::<RequestKind>().map_err(decode_error)?,
        subject: ActorId(subject),
        designated_approver: designated_approver.map(ActorId),
        state: state.parse::<RequestState>().map_err(decode_error)?,
        first_approver: row_to_slot(row, "first")?,
        second_approver: row_to_slot(row, "second")?,
        refusal_reason,
        starts_on,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[async_trait]
impl RequestStore for SqlRequestRepository {
    async fn load(&self, id: &RequestId) -> Result<Option<ApprovalRequest>, ApplicationError> {
        Ok(self.find_by_id(id).await?)
    }

    async fn insert(
        &self,
        request: &ApprovalRequest,
        note: &AuditEvent,
    ) -> Result<(), ApplicationError> {
        let (first_actor, first_capacity, first_at) = slot_columns(&request.first_approver);
        let (second_actor, second_capacity, second_at) = slot_columns(&request.second_approver);

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let result = sqlx::query(
            "INSERT INTO approval_request (id, kind, subject, designated_approver, state,
                 first_approver, first_capacity, first_recorded_at,
                 second_approver, second_capacity, second_recorded_at,
                 refusal_reason, starts_on, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(request.kind.as_str())
        .bind(&request.subject.0)
        .bind(request.designated_approver.as_ref().map(|actor| actor.0.as_str()))
        .bind(request.state.as_str())
        .bind(first_actor)
        .bind(first_capacity)
        .bind(first_at)
        .bind(second_actor)
        .bind(second_capacity)
        .bind(second_at)
        .bind(request.refusal_reason.as_deref())
        .bind(request.starts_on.map(|date| date.to_string()))
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
                return Err(ApplicationError::Persistence(format!(
                    "request `{}` already exists",
                    request.id
                )));
            }
            Err(error) => return Err(RepositoryError::from(error).into()),
        }

        insert_event(&mut *tx, note).await?;
        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(())
    }

    /// The guarded update and the note commit together. A dropped transaction
    /// rolls back, so a failed note leaves the prior state in place.
    async fn save_transition(
        &self,
        request: &ApprovalRequest,
        expected: RequestState,
        note: &AuditEvent,
    ) -> Result<(), ApplicationError> {
        let (first_actor, first_capacity, first_at) = slot_columns(&request.first_approver);
        let (second_actor, second_capacity, second_at) = slot_columns(&request.second_approver);

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let result = sqlx::query(
            "UPDATE approval_request SET
                 state = ?,
                 first_approver = ?, first_capacity = ?, first_recorded_at = ?,
                 second_approver = ?, second_capacity = ?, second_recorded_at = ?,
                 refusal_reason = ?,
                 updated_at = ?
             WHERE id = ? AND state = ?",
        )
        .bind(request.state.as_str())
        .bind(first_actor)
        .bind(first_capacity)
        .bind(first_at)
        .bind(second_actor)
        .bind(second_capacity)
        .bind(second_at)
        .bind(request.refusal_reason.as_deref())
        .bind(request.updated_at.to_rfc3339())
        .bind(&request.id.0)
        .bind(expected.as_str())
        .execute(&mut *tx)
        .await
        .map_err(RepositoryError::from)?;

        if result.rows_affected() == 1 {
            insert_event(&mut *tx, note).await?;
            tx.commit().await.map_err(RepositoryError::from)?;
            return Ok(());
        }

        let exists = sqlx::query("SELECT 1 FROM approval_request WHERE id = ?")
            .bind(&request.id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(RepositoryError::from)?
            .is_some();

        if exists {
            Err(ApplicationError::Conflict {
                request_id: request.id.0.clone(),
                expected: expected.as_str().to_owned(),
            })
        } else {
            Err(ApplicationError::NotFound(request.id.0.clone()))
        }
    }
}
