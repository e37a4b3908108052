//! Integration tests for hierarchical record persistence: parent locking,
//! code counters, ordered streams, state-change CAS and visibility.

use chrono::{NaiveDate, Utc};
use futures::TryStreamExt;
use qms_core::codes::{code_year, format_record_code};
use qms_core::process_record::{apply_state_change, initial_history, Priority, RecordState};
use qms_db::models::process_record::{
    CreateProcessRecord, ProcessRecord, RecordOrder, UpdateProcessRecord,
};
use qms_db::repositories::{NewRecordRow, ProcessRecordRepo, RecordCodeSequenceRepo};
use sqlx::PgPool;

const TENANT: i64 = 1;
const ACTOR: i64 = 7;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_record(title: &str, parent_id: Option<i64>) -> CreateProcessRecord {
    CreateProcessRecord {
        title: title.to_string(),
        parent_id,
        ..Default::default()
    }
}

/// Insert the way the record engine does: lock parent, compute level, take
/// the next code, insert, all in one transaction.
async fn insert(pool: &PgPool, tenant_id: i64, input: CreateProcessRecord) -> ProcessRecord {
    let now = Utc::now();
    let mut tx = pool.begin().await.unwrap();
    let level = match input.parent_id {
        Some(parent) => {
            ProcessRecordRepo::lock_parent_level(&mut tx, tenant_id, parent)
                .await
                .unwrap()
                .expect("parent should be visible")
                + 1
        }
        None => 0,
    };
    let seq = RecordCodeSequenceRepo::next_value(&mut tx, tenant_id, code_year(now))
        .await
        .unwrap();
    let code = format_record_code(code_year(now), seq);
    let history = initial_history(ACTOR, now);
    let record = ProcessRecordRepo::insert(
        &mut tx,
        tenant_id,
        ACTOR,
        NewRecordRow {
            code: &code,
            level,
            history: &history,
            input: &input,
        },
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();
    record
}

fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, d)
}

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn codes_are_sequential_per_tenant(pool: PgPool) {
    let year = code_year(Utc::now());
    let a = insert(&pool, TENANT, new_record("A", None)).await;
    let b = insert(&pool, TENANT, new_record("B", None)).await;
    let other = insert(&pool, TENANT + 1, new_record("C", None)).await;

    assert_eq!(a.code, format!("REG-{year}-001"));
    assert_eq!(b.code, format!("REG-{year}-002"));
    assert_eq!(other.code, format!("REG-{year}-001"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn new_record_starts_with_history(pool: PgPool) {
    let record = insert(&pool, TENANT, new_record("A", None)).await;
    assert_eq!(record.state, RecordState::Started);
    assert_eq!(record.priority, Priority::Medium);
    assert_eq!(record.progress, 0);
    assert_eq!(record.level, 0);
    assert_eq!(record.state_history.0.len(), 1);
    assert_eq!(record.state_history.0[0].changed_by, ACTOR);
    assert_eq!(record.version, 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn parent_level_is_visible_only_within_tenant(pool: PgPool) {
    let root = insert(&pool, TENANT, new_record("Root", None)).await;
    let mut tx = pool.begin().await.unwrap();
    let level = ProcessRecordRepo::lock_parent_level(&mut tx, TENANT + 1, root.id)
        .await
        .unwrap();
    assert!(level.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn level_column_rejects_depth_beyond_five(pool: PgPool) {
    let record = insert(&pool, TENANT, new_record("Root", None)).await;
    let result = sqlx::query("UPDATE process_records SET level = 6 WHERE id = $1")
        .bind(record.id)
        .execute(&pool)
        .await;
    assert!(result.is_err());
}

// ---------------------------------------------------------------------------
// Hierarchy
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn descendants_cover_every_depth(pool: PgPool) {
    let root = insert(&pool, TENANT, new_record("Root", None)).await;
    let child = insert(&pool, TENANT, new_record("Child", Some(root.id))).await;
    let grandchild = insert(&pool, TENANT, new_record("Grandchild", Some(child.id))).await;
    let sibling = insert(&pool, TENANT, new_record("Sibling", Some(root.id))).await;

    assert_eq!(child.level, 1);
    assert_eq!(grandchild.level, 2);

    let subs = ProcessRecordRepo::find_sub_records(&pool, TENANT, root.id)
        .await
        .unwrap();
    let ids: Vec<i64> = subs.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![sibling.id, child.id], "newest first");

    let descendants = ProcessRecordRepo::find_descendants(&pool, TENANT, root.id)
        .await
        .unwrap();
    assert_eq!(descendants.len(), 3);
    assert!(descendants.iter().any(|r| r.id == grandchild.id));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn archived_subtree_is_pruned(pool: PgPool) {
    let root = insert(&pool, TENANT, new_record("Root", None)).await;
    let child = insert(&pool, TENANT, new_record("Child", Some(root.id))).await;
    insert(&pool, TENANT, new_record("Grandchild", Some(child.id))).await;

    assert!(ProcessRecordRepo::archive(&pool, TENANT, child.id, ACTOR).await.unwrap());

    let descendants = ProcessRecordRepo::find_descendants(&pool, TENANT, root.id)
        .await
        .unwrap();
    assert!(descendants.is_empty());
    assert!(ProcessRecordRepo::find_by_id(&pool, TENANT, child.id)
        .await
        .unwrap()
        .is_none());
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn due_date_order_puts_undated_last_and_urgent_first(pool: PgPool) {
    let mut late = new_record("Late", None);
    late.due_date = date(2026, 12, 1);
    let mut soon_low = new_record("Soon low", None);
    soon_low.due_date = date(2026, 6, 1);
    soon_low.priority = Some(Priority::Low);
    let mut soon_critical = new_record("Soon critical", None);
    soon_critical.due_date = date(2026, 6, 1);
    soon_critical.priority = Some(Priority::Critical);
    let undated = new_record("Undated", None);

    for input in [late, soon_low, soon_critical, undated] {
        insert(&pool, TENANT, input).await;
    }

    let titles: Vec<String> =
        ProcessRecordRepo::list_by_organization(&pool, TENANT, RecordOrder::DueDate)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.title)
            .collect();
    assert_eq!(titles, vec!["Soon critical", "Soon low", "Late", "Undated"]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn stream_is_restartable(pool: PgPool) {
    insert(&pool, TENANT, new_record("A", None)).await;
    insert(&pool, TENANT, new_record("B", None)).await;

    let first: Vec<ProcessRecord> =
        ProcessRecordRepo::stream_by_organization(&pool, TENANT, RecordOrder::Newest)
            .try_collect()
            .await
            .unwrap();
    let second: Vec<ProcessRecord> =
        ProcessRecordRepo::stream_by_organization(&pool, TENANT, RecordOrder::Newest)
            .try_collect()
            .await
            .unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].title, "B");
    assert_eq!(
        first.iter().map(|r| r.id).collect::<Vec<_>>(),
        second.iter().map(|r| r.id).collect::<Vec<_>>()
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn inactive_records_are_excluded_from_lists(pool: PgPool) {
    let a = insert(&pool, TENANT, new_record("A", None)).await;
    insert(&pool, TENANT, new_record("B", None)).await;
    ProcessRecordRepo::update(
        &pool,
        TENANT,
        a.id,
        ACTOR,
        &UpdateProcessRecord {
            is_active: Some(false),
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .unwrap();

    let listed = ProcessRecordRepo::list_by_state(
        &pool,
        TENANT,
        RecordState::Started,
        RecordOrder::Newest,
    )
    .await
    .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title, "B");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn stats_are_zero_filled(pool: PgPool) {
    insert(&pool, TENANT, new_record("A", None)).await;
    insert(&pool, TENANT, new_record("B", None)).await;

    let stats = ProcessRecordRepo::stats(&pool, TENANT).await.unwrap();
    assert_eq!(stats.len(), RecordState::ALL.len());
    for entry in &stats {
        let expected = if entry.state == RecordState::Started { 2 } else { 0 };
        assert_eq!(entry.count, expected, "{}", entry.state);
    }
}

// ---------------------------------------------------------------------------
// State changes
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn completing_persists_progress_and_date(pool: PgPool) {
    let record = insert(&pool, TENANT, new_record("A", None)).await;
    let change = apply_state_change(
        record.progress,
        record.completed_date,
        RecordState::Completed,
        ACTOR,
        Some("done".into()),
        Utc::now(),
    );
    let mut history = record.state_history.0.clone();
    history.push(change.entry);

    let saved = ProcessRecordRepo::save_state_change(
        &pool,
        TENANT,
        record.id,
        record.version,
        RecordState::Completed,
        &history,
        change.progress,
        change.completed_date,
        ACTOR,
    )
    .await
    .unwrap()
    .expect("save should succeed");

    assert_eq!(saved.state, RecordState::Completed);
    assert_eq!(saved.progress, 100);
    assert!(saved.completed_date.is_some());
    assert_eq!(saved.state_history.0.len(), 2);
    assert_eq!(saved.updated_by, Some(ACTOR));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn concurrent_state_change_is_detected(pool: PgPool) {
    let record = insert(&pool, TENANT, new_record("A", None)).await;
    let history = record.state_history.0.clone();

    let first = ProcessRecordRepo::save_state_change(
        &pool,
        TENANT,
        record.id,
        record.version,
        RecordState::Review,
        &history,
        0,
        None,
        ACTOR,
    )
    .await
    .unwrap();
    assert!(first.is_some());

    let second = ProcessRecordRepo::save_state_change(
        &pool,
        TENANT,
        record.id,
        record.version,
        RecordState::Approved,
        &history,
        0,
        None,
        ACTOR,
    )
    .await
    .unwrap();
    assert!(second.is_none());
}
