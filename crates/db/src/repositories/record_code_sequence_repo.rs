//! Per-tenant, per-year counters behind generated record codes.

use qms_core::types::DbId;
use sqlx::{Postgres, Transaction};

pub struct RecordCodeSequenceRepo;

impl RecordCodeSequenceRepo {
    /// Increment the `(tenant_id, year)` counter and return the new value.
    ///
    /// The first call for a pair returns 1. The row stays locked until the
    /// transaction ends, so concurrent creators never share a value.
    pub async fn next_value(
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: DbId,
        year: i32,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO record_code_sequences (tenant_id, year, last_value)
             VALUES ($1, $2, 1)
             ON CONFLICT (tenant_id, year)
             DO UPDATE SET last_value = record_code_sequences.last_value + 1
             RETURNING last_value",
        )
        .bind(tenant_id)
        .bind(year)
        .fetch_one(&mut **tx)
        .await
    }
}
