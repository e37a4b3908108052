//! Repository for the `process_records` table.
//!
//! "Visible" records are active and not archived; list, stream and
//! hierarchy reads only return visible rows. Writes that rewrite embedded
//! documents are compare-and-swap on `version`.

use futures::stream::BoxStream;
use futures::TryStreamExt;
use qms_core::process_record::{
    Attachment, ChecklistItem, RecordComment, RecordState, StateHistoryEntry,
};
use qms_core::types::{DbId, Percent, Timestamp};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::process_record::{
    CreateProcessRecord, ProcessRecord, RecordOrder, RecordStateCount, UpdateProcessRecord,
};

/// Column list as a literal so it can be spliced into `'static` SQL for the
/// streaming queries.
macro_rules! record_columns {
    () => {
        "id, tenant_id, code, title, description, process_definition_id, state, \
         state_history, parent_id, level, responsible_id, assigned_to, start_date, \
         due_date, completed_date, priority, progress, attachments, checklist, comments, \
         tags, is_active, is_archived, created_by, updated_by, version, created_at, \
         updated_at"
    };
}

const COLUMNS: &str = record_columns!();

const ORDER_NEWEST: &str = "created_at DESC, id DESC";

const SELECT_BY_TENANT_NEWEST: &str = concat!(
    "SELECT ",
    record_columns!(),
    " FROM process_records \
     WHERE tenant_id = $1 AND is_active = true AND is_archived = false \
     ORDER BY created_at DESC, id DESC"
);

/// Undated records last; ties broken by urgency.
const SELECT_BY_TENANT_DUE: &str = concat!(
    "SELECT ",
    record_columns!(),
    " FROM process_records \
     WHERE tenant_id = $1 AND is_active = true AND is_archived = false \
     ORDER BY due_date ASC NULLS LAST, \
     CASE priority WHEN 'critical' THEN 4 WHEN 'high' THEN 3 WHEN 'medium' THEN 2 ELSE 1 END DESC, \
     id ASC"
);

const SELECT_BY_STATE_NEWEST: &str = concat!(
    "SELECT ",
    record_columns!(),
    " FROM process_records \
     WHERE tenant_id = $1 AND state = $2 AND is_active = true AND is_archived = false \
     ORDER BY created_at DESC, id DESC"
);

const SELECT_BY_STATE_DUE: &str = concat!(
    "SELECT ",
    record_columns!(),
    " FROM process_records \
     WHERE tenant_id = $1 AND state = $2 AND is_active = true AND is_archived = false \
     ORDER BY due_date ASC NULLS LAST, \
     CASE priority WHEN 'critical' THEN 4 WHEN 'high' THEN 3 WHEN 'medium' THEN 2 ELSE 1 END DESC, \
     id ASC"
);

/// Fields written by [`ProcessRecordRepo::insert`] that the caller computed.
#[derive(Debug, Clone)]
pub struct NewRecordRow<'a> {
    pub code: &'a str,
    pub level: i16,
    pub history: &'a [StateHistoryEntry],
    pub input: &'a CreateProcessRecord,
}

/// Provides persistence operations for hierarchical process records.
pub struct ProcessRecordRepo;

impl ProcessRecordRepo {
    /// Share-lock the parent row for the rest of the transaction and return
    /// its level.
    ///
    /// Returns `None` if the parent does not exist in `tenant_id` or is not
    /// visible.
    pub async fn lock_parent_level(
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: DbId,
        parent_id: DbId,
    ) -> Result<Option<i16>, sqlx::Error> {
        sqlx::query_scalar::<_, i16>(
            "SELECT level FROM process_records
             WHERE id = $1 AND tenant_id = $2 AND is_active = true AND is_archived = false
             FOR SHARE",
        )
        .bind(parent_id)
        .bind(tenant_id)
        .fetch_optional(&mut **tx)
        .await
    }

    /// Insert a record inside the caller's transaction.
    pub async fn insert(
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: DbId,
        created_by: DbId,
        row: NewRecordRow<'_>,
    ) -> Result<ProcessRecord, sqlx::Error> {
        let input = row.input;
        let query = format!(
            "INSERT INTO process_records
                (tenant_id, code, title, description, process_definition_id, state,
                 state_history, parent_id, level, responsible_id, assigned_to,
                 start_date, due_date, priority, progress, tags, created_by)
             VALUES ($1, $2, $3, $4, $5, 'started', $6, $7, $8, $9, $10, $11, $12,
                     $13, $14, $15, $16)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProcessRecord>(&query)
            .bind(tenant_id)
            .bind(row.code)
            .bind(&input.title)
            .bind(&input.description)
            .bind(input.process_definition_id)
            .bind(Json(row.history))
            .bind(input.parent_id)
            .bind(row.level)
            .bind(input.responsible_id)
            .bind(&input.assigned_to)
            .bind(input.start_date)
            .bind(input.due_date)
            .bind(input.priority.unwrap_or_default().as_str())
            .bind(input.progress.unwrap_or(0))
            .bind(&input.tags)
            .bind(created_by)
            .fetch_one(&mut **tx)
            .await
    }

    /// Find a non-archived record by id within a tenant.
    pub async fn find_by_id(
        pool: &PgPool,
        tenant_id: DbId,
        id: DbId,
    ) -> Result<Option<ProcessRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM process_records
             WHERE id = $1 AND tenant_id = $2 AND is_archived = false"
        );
        sqlx::query_as::<_, ProcessRecord>(&query)
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(pool)
            .await
    }

    /// Lazily stream a tenant's visible records.
    ///
    /// Each call issues a fresh query, so a consumer may restart by calling
    /// again.
    pub fn stream_by_organization(
        pool: &PgPool,
        tenant_id: DbId,
        order: RecordOrder,
    ) -> BoxStream<'_, Result<ProcessRecord, sqlx::Error>> {
        let sql = match order {
            RecordOrder::Newest => SELECT_BY_TENANT_NEWEST,
            RecordOrder::DueDate => SELECT_BY_TENANT_DUE,
        };
        sqlx::query_as::<_, ProcessRecord>(sql)
            .bind(tenant_id)
            .fetch(pool)
    }

    /// Lazily stream a tenant's visible records in `state`.
    pub fn stream_by_state(
        pool: &PgPool,
        tenant_id: DbId,
        state: RecordState,
        order: RecordOrder,
    ) -> BoxStream<'_, Result<ProcessRecord, sqlx::Error>> {
        let sql = match order {
            RecordOrder::Newest => SELECT_BY_STATE_NEWEST,
            RecordOrder::DueDate => SELECT_BY_STATE_DUE,
        };
        sqlx::query_as::<_, ProcessRecord>(sql)
            .bind(tenant_id)
            .bind(state.as_str())
            .fetch(pool)
    }

    /// Collected form of [`Self::stream_by_organization`].
    pub async fn list_by_organization(
        pool: &PgPool,
        tenant_id: DbId,
        order: RecordOrder,
    ) -> Result<Vec<ProcessRecord>, sqlx::Error> {
        Self::stream_by_organization(pool, tenant_id, order)
            .try_collect()
            .await
    }

    /// Collected form of [`Self::stream_by_state`].
    pub async fn list_by_state(
        pool: &PgPool,
        tenant_id: DbId,
        state: RecordState,
        order: RecordOrder,
    ) -> Result<Vec<ProcessRecord>, sqlx::Error> {
        Self::stream_by_state(pool, tenant_id, state, order)
            .try_collect()
            .await
    }

    /// Direct visible children of `parent_id`, newest first.
    pub async fn find_sub_records(
        pool: &PgPool,
        tenant_id: DbId,
        parent_id: DbId,
    ) -> Result<Vec<ProcessRecord>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM process_records
             WHERE tenant_id = $1 AND parent_id = $2
               AND is_active = true AND is_archived = false
             ORDER BY {ORDER_NEWEST}"
        );
        sqlx::query_as::<_, ProcessRecord>(&query)
            .bind(tenant_id)
            .bind(parent_id)
            .fetch_all(pool)
            .await
    }

    /// Every visible descendant of `root_id`, at any depth.
    ///
    /// Descent stops at hidden records, so their subtrees are not returned.
    pub async fn find_descendants(
        pool: &PgPool,
        tenant_id: DbId,
        root_id: DbId,
    ) -> Result<Vec<ProcessRecord>, sqlx::Error> {
        let query = format!(
            "WITH RECURSIVE subtree AS (
                SELECT {COLUMNS} FROM process_records
                WHERE tenant_id = $1 AND parent_id = $2
                  AND is_active = true AND is_archived = false
                UNION ALL
                SELECT pr.id, pr.tenant_id, pr.code, pr.title, pr.description,
                       pr.process_definition_id, pr.state, pr.state_history, pr.parent_id,
                       pr.level, pr.responsible_id, pr.assigned_to, pr.start_date,
                       pr.due_date, pr.completed_date, pr.priority, pr.progress,
                       pr.attachments, pr.checklist, pr.comments, pr.tags, pr.is_active,
                       pr.is_archived, pr.created_by, pr.updated_by, pr.version,
                       pr.created_at, pr.updated_at
                FROM process_records pr
                INNER JOIN subtree s ON pr.parent_id = s.id
                WHERE pr.tenant_id = $1 AND pr.is_active = true AND pr.is_archived = false
            )
            SELECT * FROM subtree ORDER BY level, {ORDER_NEWEST}"
        );
        sqlx::query_as::<_, ProcessRecord>(&query)
            .bind(tenant_id)
            .bind(root_id)
            .fetch_all(pool)
            .await
    }

    /// Persist a state change if the record is still at `expected_version`.
    #[allow(clippy::too_many_arguments)]
    pub async fn save_state_change(
        pool: &PgPool,
        tenant_id: DbId,
        id: DbId,
        expected_version: i32,
        state: RecordState,
        history: &[StateHistoryEntry],
        progress: Percent,
        completed_date: Option<Timestamp>,
        updated_by: DbId,
    ) -> Result<Option<ProcessRecord>, sqlx::Error> {
        let query = format!(
            "UPDATE process_records SET
                state = $4,
                state_history = $5,
                progress = $6,
                completed_date = $7,
                updated_by = $8,
                version = version + 1
             WHERE id = $1 AND tenant_id = $2 AND version = $3 AND is_archived = false
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProcessRecord>(&query)
            .bind(id)
            .bind(tenant_id)
            .bind(expected_version)
            .bind(state.as_str())
            .bind(Json(history))
            .bind(progress)
            .bind(completed_date)
            .bind(updated_by)
            .fetch_optional(pool)
            .await
    }

    /// Update plain fields. Only non-`None` fields in `input` are applied.
    pub async fn update(
        pool: &PgPool,
        tenant_id: DbId,
        id: DbId,
        updated_by: DbId,
        input: &UpdateProcessRecord,
    ) -> Result<Option<ProcessRecord>, sqlx::Error> {
        let query = format!(
            "UPDATE process_records SET
                title = COALESCE($3, title),
                description = COALESCE($4, description),
                responsible_id = COALESCE($5, responsible_id),
                assigned_to = COALESCE($6, assigned_to),
                start_date = COALESCE($7, start_date),
                due_date = COALESCE($8, due_date),
                priority = COALESCE($9, priority),
                progress = COALESCE($10, progress),
                tags = COALESCE($11, tags),
                is_active = COALESCE($12, is_active),
                updated_by = $13,
                version = version + 1
             WHERE id = $1 AND tenant_id = $2 AND is_archived = false
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProcessRecord>(&query)
            .bind(id)
            .bind(tenant_id)
            .bind(&input.title)
            .bind(&input.description)
            .bind(input.responsible_id)
            .bind(&input.assigned_to)
            .bind(input.start_date)
            .bind(input.due_date)
            .bind(input.priority.map(|p| p.as_str()))
            .bind(input.progress)
            .bind(&input.tags)
            .bind(input.is_active)
            .bind(updated_by)
            .fetch_optional(pool)
            .await
    }

    /// Rewrite the comment, checklist and attachment documents if the record
    /// is still at `expected_version`.
    #[allow(clippy::too_many_arguments)]
    pub async fn save_documents(
        pool: &PgPool,
        tenant_id: DbId,
        id: DbId,
        expected_version: i32,
        comments: &[RecordComment],
        checklist: &[ChecklistItem],
        attachments: &[Attachment],
        updated_by: DbId,
    ) -> Result<Option<ProcessRecord>, sqlx::Error> {
        let query = format!(
            "UPDATE process_records SET
                comments = $4,
                checklist = $5,
                attachments = $6,
                updated_by = $7,
                version = version + 1
             WHERE id = $1 AND tenant_id = $2 AND version = $3 AND is_archived = false
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProcessRecord>(&query)
            .bind(id)
            .bind(tenant_id)
            .bind(expected_version)
            .bind(Json(comments))
            .bind(Json(checklist))
            .bind(Json(attachments))
            .bind(updated_by)
            .fetch_optional(pool)
            .await
    }

    /// Archive a record. Returns `true` if a row was archived.
    pub async fn archive(
        pool: &PgPool,
        tenant_id: DbId,
        id: DbId,
        updated_by: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE process_records SET
                is_archived = true, is_active = false, updated_by = $3,
                version = version + 1
             WHERE id = $1 AND tenant_id = $2 AND is_archived = false",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(updated_by)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Visible record counts per state. Every state is present.
    pub async fn stats(
        pool: &PgPool,
        tenant_id: DbId,
    ) -> Result<Vec<RecordStateCount>, sqlx::Error> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT state, COUNT(*) FROM process_records
             WHERE tenant_id = $1 AND is_active = true AND is_archived = false
             GROUP BY state",
        )
        .bind(tenant_id)
        .fetch_all(pool)
        .await?;

        Ok(RecordState::ALL
            .iter()
            .map(|&state| RecordStateCount {
                state,
                count: rows
                    .iter()
                    .find(|(s, _)| s == state.as_str())
                    .map_or(0, |(_, c)| *c),
            })
            .collect())
    }
}
