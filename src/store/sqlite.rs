use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{migrate::MigrateDatabase, Row};
use tracing::info;

use super::{sort_history, sort_newest_first, RequestStore, StorageError};
use crate::workflow::types::{
    GutScores, HistoryAction, HistoryEntry, MaintenanceRequest, NewHistoryEntry, PrincipalId,
    RequestDraft, RequestFilter, RequestId, RequestStatus, RequestType,
};

const REQUEST_COLUMNS: &str =
    "id, title, problem_description, process, equipment, gravity, urgency, \
     tendency, photo, status, request_type, assigned_to, requester, execution_description, \
     execution_photo, pm04_order, created_at, updated_at";

/// SQLite-backed store. Timestamps are kept as fixed-width RFC 3339 text
/// so that text order matches time order.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str, auto_migrate: bool) -> Result<Self, StorageError> {
        if !sqlx::Sqlite::database_exists(database_url).await? {
            info!("Creating database at {}", database_url);
            sqlx::Sqlite::create_database(database_url).await?;
        }

        let pool = SqlitePool::connect(database_url).await?;

        if auto_migrate {
            info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|e| StorageError::Unavailable(format!("migration failed: {e}")))?;
            info!("Database migrations completed");
        }

        Ok(Self { pool })
    }

    pub async fn shutdown(&self) {
        info!("Shutting down database connections...");
        self.pool.close().await;
    }
}

fn encode_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_time(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("bad timestamp '{raw}': {e}")))
}

fn decode<T>(raw: &str) -> Result<T, StorageError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| StorageError::Corrupt(e.to_string()))
}

fn score(raw: i64) -> Result<u8, StorageError> {
    u8::try_from(raw).map_err(|_| StorageError::Corrupt(format!("score {raw} out of range")))
}

fn request_from_row(row: &SqliteRow) -> Result<MaintenanceRequest, StorageError> {
    let status: String = row.try_get("status")?;
    let request_type: Option<String> = row.try_get("request_type")?;
    let assigned_to: Option<i64> = row.try_get("assigned_to")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(MaintenanceRequest {
        id: RequestId(row.try_get::<i64, _>("id")? as u64),
        title: row.try_get("title")?,
        problem_description: row.try_get("problem_description")?,
        process: row.try_get("process")?,
        equipment: row.try_get("equipment")?,
        gut: GutScores {
            gravity: score(row.try_get("gravity")?)?,
            urgency: score(row.try_get("urgency")?)?,
            tendency: score(row.try_get("tendency")?)?,
        },
        photo: row.try_get("photo")?,
        status: decode::<RequestStatus>(&status)?,
        request_type: request_type
            .as_deref()
            .map(decode::<RequestType>)
            .transpose()?,
        assigned_to: assigned_to.map(|id| PrincipalId(id as u64)),
        requester: PrincipalId(row.try_get::<i64, _>("requester")? as u64),
        execution_description: row.try_get("execution_description")?,
        execution_photo: row.try_get("execution_photo")?,
        pm04_order: row.try_get("pm04_order")?,
        created_at: decode_time(&created_at)?,
        updated_at: decode_time(&updated_at)?,
    })
}

fn history_from_row(row: &SqliteRow) -> Result<HistoryEntry, StorageError> {
    let action: String = row.try_get("action")?;
    let actor: Option<i64> = row.try_get("actor")?;
    let timestamp: String = row.try_get("timestamp")?;

    Ok(HistoryEntry {
        id: row.try_get::<i64, _>("id")? as u64,
        request_id: RequestId(row.try_get::<i64, _>("request_id")? as u64),
        action: decode::<HistoryAction>(&action)?,
        actor: actor.map(|id| PrincipalId(id as u64)),
        comment: row.try_get("comment")?,
        timestamp: decode_time(&timestamp)?,
    })
}

#[async_trait]
impl RequestStore for SqliteStore {
    async fn insert(
        &self,
        draft: RequestDraft,
        created: NewHistoryEntry,
    ) -> Result<(MaintenanceRequest, HistoryEntry), StorageError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO maintenance_requests
                (title, problem_description, process, equipment, gravity, urgency, tendency,
                 photo, status, requester, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
            "#,
        )
        .bind(&draft.title)
        .bind(&draft.problem_description)
        .bind(&draft.process)
        .bind(&draft.equipment)
        .bind(i64::from(draft.gut.gravity))
        .bind(i64::from(draft.gut.urgency))
        .bind(i64::from(draft.gut.tendency))
        .bind(&draft.photo)
        .bind(RequestStatus::Open.as_str())
        .bind(draft.requester.0 as i64)
        .bind(encode_time(draft.created_at))
        .execute(&mut *tx)
        .await?;
        let id = RequestId(inserted.last_insert_rowid() as u64);

        let history_id = insert_history(&mut tx, id, &created).await?;
        tx.commit().await?;

        Ok((
            draft.into_request(id),
            HistoryEntry::from_new(history_id, id, created),
        ))
    }

    async fn load(&self, id: RequestId) -> Result<MaintenanceRequest, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM maintenance_requests WHERE id = ?1"
        ))
        .bind(id.0 as i64)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StorageError::NotFound(id))?;

        request_from_row(&row)
    }

    async fn commit_transition(
        &self,
        expected_status: RequestStatus,
        request: &MaintenanceRequest,
        entry: NewHistoryEntry,
    ) -> Result<HistoryEntry, StorageError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE maintenance_requests
            SET status = ?1, request_type = ?2, assigned_to = ?3, execution_description = ?4,
                execution_photo = ?5, pm04_order = ?6, updated_at = ?7
            WHERE id = ?8 AND status = ?9
            "#,
        )
        .bind(request.status.as_str())
        .bind(request.request_type.map(|t| t.as_str()))
        .bind(request.assigned_to.map(|id| id.0 as i64))
        .bind(&request.execution_description)
        .bind(&request.execution_photo)
        .bind(&request.pm04_order)
        .bind(encode_time(request.updated_at))
        .bind(request.id.0 as i64)
        .bind(expected_status.as_str())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let actual: Option<String> =
                sqlx::query_scalar("SELECT status FROM maintenance_requests WHERE id = ?1")
                    .bind(request.id.0 as i64)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;
            return match actual {
                None => Err(StorageError::NotFound(request.id)),
                Some(actual) => Err(StorageError::Conflict {
                    id: request.id,
                    expected: expected_status,
                    actual: decode(&actual)?,
                }),
            };
        }

        let history_id = insert_history(&mut tx, request.id, &entry).await?;
        tx.commit().await?;

        Ok(HistoryEntry::from_new(history_id, request.id, entry))
    }

    async fn history(&self, id: RequestId) -> Result<Vec<HistoryEntry>, StorageError> {
        // Distinguish "no such request" from "no entries".
        self.load(id).await?;

        let rows = sqlx::query(
            r#"
            SELECT id, request_id, action, actor, comment, timestamp
            FROM request_history
            WHERE request_id = ?1
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(id.0 as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = rows
            .iter()
            .map(history_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        sort_history(&mut entries);
        Ok(entries)
    }

    async fn list(&self, filter: &RequestFilter) -> Result<Vec<MaintenanceRequest>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM maintenance_requests ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut requests = Vec::new();
        for row in &rows {
            let request = request_from_row(row)?;
            if filter.matches(&request) {
                requests.push(request);
            }
        }
        sort_newest_first(&mut requests);
        Ok(requests)
    }
}

async fn insert_history(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    request_id: RequestId,
    entry: &NewHistoryEntry,
) -> Result<u64, StorageError> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO request_history (request_id, action, actor, comment, timestamp)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(request_id.0 as i64)
    .bind(entry.action.as_str())
    .bind(entry.actor.map(|id| id.0 as i64))
    .bind(&entry.comment)
    .bind(encode_time(entry.timestamp))
    .execute(&mut **tx)
    .await?;

    Ok(inserted.last_insert_rowid() as u64)
}
