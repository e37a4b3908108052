//! Repository for the `process_definitions` table.
//!
//! Embedded records and stages are stored in JSONB columns and always
//! written together with the row. Document saves are compare-and-swap on
//! `version`: a save based on a stale read affects no row and returns
//! `None`.

use qms_core::embedded_record::EmbeddedRecord;
use qms_core::process::{ProcessCategory, ProcessStatus};
use qms_core::stage_graph::Stage;
use qms_core::types::DbId;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::process_definition::{
    CreateProcessDefinition, ProcessDefinition, ProcessDefinitionFilter, UpdateProcessDefinition,
};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, tenant_id, name, code, category, status, stages, records, \
    allows_records, content, diagram, is_archived, created_by, updated_by, version, \
    created_at, updated_at";

/// Provides CRUD and document-save operations for process definitions.
pub struct ProcessDefinitionRepo;

impl ProcessDefinitionRepo {
    /// Insert a new definition. Stages must already be validated.
    pub async fn create(
        pool: &PgPool,
        tenant_id: DbId,
        created_by: DbId,
        input: &CreateProcessDefinition,
    ) -> Result<ProcessDefinition, sqlx::Error> {
        let query = format!(
            "INSERT INTO process_definitions
                (tenant_id, name, code, category, status, stages, allows_records,
                 content, diagram, created_by)
             VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, true), $8, $9, $10)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProcessDefinition>(&query)
            .bind(tenant_id)
            .bind(&input.name)
            .bind(&input.code)
            .bind(input.category.unwrap_or(ProcessCategory::Operational).as_str())
            .bind(input.status.unwrap_or(ProcessStatus::Active).as_str())
            .bind(Json(&input.stages))
            .bind(input.allows_records)
            .bind(&input.content)
            .bind(&input.diagram)
            .bind(created_by)
            .fetch_one(pool)
            .await
    }

    /// Find a non-archived definition by id within a tenant.
    pub async fn find_by_id(
        pool: &PgPool,
        tenant_id: DbId,
        id: DbId,
    ) -> Result<Option<ProcessDefinition>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM process_definitions
             WHERE id = $1 AND tenant_id = $2 AND is_archived = false"
        );
        sqlx::query_as::<_, ProcessDefinition>(&query)
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(pool)
            .await
    }

    /// List a tenant's non-archived definitions, ordered by code.
    pub async fn list(
        pool: &PgPool,
        tenant_id: DbId,
        filter: &ProcessDefinitionFilter,
    ) -> Result<Vec<ProcessDefinition>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM process_definitions
             WHERE tenant_id = $1 AND is_archived = false
               AND ($2::TEXT IS NULL OR status = $2)
               AND ($3::TEXT IS NULL OR category = $3)
             ORDER BY code"
        );
        sqlx::query_as::<_, ProcessDefinition>(&query)
            .bind(tenant_id)
            .bind(filter.status.map(ProcessStatus::as_str))
            .bind(filter.category.map(ProcessCategory::as_str))
            .fetch_all(pool)
            .await
    }

    /// Update metadata. Only non-`None` fields in `input` are applied.
    pub async fn update(
        pool: &PgPool,
        tenant_id: DbId,
        id: DbId,
        updated_by: DbId,
        input: &UpdateProcessDefinition,
    ) -> Result<Option<ProcessDefinition>, sqlx::Error> {
        let query = format!(
            "UPDATE process_definitions SET
                name = COALESCE($3, name),
                category = COALESCE($4, category),
                status = COALESCE($5, status),
                allows_records = COALESCE($6, allows_records),
                content = COALESCE($7, content),
                diagram = COALESCE($8, diagram),
                updated_by = $9,
                version = version + 1
             WHERE id = $1 AND tenant_id = $2 AND is_archived = false
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProcessDefinition>(&query)
            .bind(id)
            .bind(tenant_id)
            .bind(&input.name)
            .bind(input.category.map(ProcessCategory::as_str))
            .bind(input.status.map(ProcessStatus::as_str))
            .bind(input.allows_records)
            .bind(&input.content)
            .bind(&input.diagram)
            .bind(updated_by)
            .fetch_optional(pool)
            .await
    }

    /// Persist the whole document (stages and embedded records) if nobody
    /// saved it since `expected_version` was read.
    ///
    /// Returns `None` when the version moved on or the definition vanished.
    pub async fn save_document(
        pool: &PgPool,
        tenant_id: DbId,
        id: DbId,
        expected_version: i32,
        stages: &[Stage],
        records: &[EmbeddedRecord],
        updated_by: DbId,
    ) -> Result<Option<ProcessDefinition>, sqlx::Error> {
        let query = format!(
            "UPDATE process_definitions SET
                stages = $4,
                records = $5,
                updated_by = $6,
                version = version + 1
             WHERE id = $1 AND tenant_id = $2 AND version = $3 AND is_archived = false
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProcessDefinition>(&query)
            .bind(id)
            .bind(tenant_id)
            .bind(expected_version)
            .bind(Json(stages))
            .bind(Json(records))
            .bind(updated_by)
            .fetch_optional(pool)
            .await
    }

    /// Archive a definition: status `inactive`, hidden from reads.
    /// Returns `true` if a row was archived.
    pub async fn archive(
        pool: &PgPool,
        tenant_id: DbId,
        id: DbId,
        updated_by: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE process_definitions SET
                is_archived = true, status = 'inactive', updated_by = $3,
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
}
