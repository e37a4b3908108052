//! Integration tests for process definition persistence: JSONB documents,
//! compare-and-swap saves, unique codes and archiving.

use chrono::Utc;
use qms_core::embedded_record::{self, NewEmbeddedRecord};
use qms_core::process::ProcessStatus;
use qms_core::stage_graph::{Stage, DEFAULT_STAGE_COLOR};
use qms_db::models::process_definition::{
    CreateProcessDefinition, ProcessDefinitionFilter, UpdateProcessDefinition,
};
use qms_db::repositories::ProcessDefinitionRepo;
use sqlx::PgPool;

const TENANT: i64 = 1;
const ACTOR: i64 = 42;

fn stage(id: &str, order: i32, is_initial: bool, is_terminal: bool) -> Stage {
    Stage {
        id: id.to_string(),
        name: id.to_uppercase(),
        color: DEFAULT_STAGE_COLOR.to_string(),
        order,
        is_initial,
        is_terminal,
    }
}

fn new_definition(code: &str) -> CreateProcessDefinition {
    CreateProcessDefinition {
        name: format!("Process {code}"),
        code: code.to_string(),
        category: None,
        status: None,
        stages: vec![stage("draft", 0, true, false), stage("done", 1, false, true)],
        allows_records: None,
        content: None,
        diagram: None,
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn create_and_find_round_trips_stages(pool: PgPool) {
    let created = ProcessDefinitionRepo::create(&pool, TENANT, ACTOR, &new_definition("P-01"))
        .await
        .unwrap();
    assert_eq!(created.version, 1);
    assert!(created.allows_records);
    assert_eq!(created.status, ProcessStatus::Active);

    let found = ProcessDefinitionRepo::find_by_id(&pool, TENANT, created.id)
        .await
        .unwrap()
        .expect("definition should exist");
    assert_eq!(found.stages.0.len(), 2);
    assert_eq!(found.stages.0[0].id, "draft");
    assert!(found.records.0.is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn other_tenant_cannot_read(pool: PgPool) {
    let created = ProcessDefinitionRepo::create(&pool, TENANT, ACTOR, &new_definition("P-01"))
        .await
        .unwrap();
    let found = ProcessDefinitionRepo::find_by_id(&pool, TENANT + 1, created.id)
        .await
        .unwrap();
    assert!(found.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn duplicate_code_violates_unique_constraint(pool: PgPool) {
    ProcessDefinitionRepo::create(&pool, TENANT, ACTOR, &new_definition("P-01"))
        .await
        .unwrap();
    let err = ProcessDefinitionRepo::create(&pool, TENANT, ACTOR, &new_definition("P-01"))
        .await
        .unwrap_err();
    match err {
        sqlx::Error::Database(db) => {
            assert_eq!(db.constraint(), Some("uq_process_definitions_tenant_code"));
        }
        other => panic!("expected a database error, got {other:?}"),
    }

    // Same code in another tenant is fine.
    ProcessDefinitionRepo::create(&pool, TENANT + 1, ACTOR, &new_definition("P-01"))
        .await
        .unwrap();
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn embedded_record_moves_are_persisted(pool: PgPool) {
    let def = ProcessDefinitionRepo::create(&pool, TENANT, ACTOR, &new_definition("P-01"))
        .await
        .unwrap();

    let mut records = def.records.0.clone();
    let record = embedded_record::create_record(
        &def.stages.0,
        &mut records,
        def.allows_records,
        NewEmbeddedRecord {
            title: "Audit".into(),
            ..Default::default()
        },
        Utc::now(),
    )
    .unwrap();
    let saved = ProcessDefinitionRepo::save_document(
        &pool, TENANT, def.id, def.version, &def.stages.0, &records, ACTOR,
    )
    .await
    .unwrap()
    .expect("save should succeed");
    assert_eq!(saved.version, 2);

    let mut records = saved.records.0.clone();
    embedded_record::move_record(&saved.stages.0, &mut records, record.id, "done", Utc::now())
        .unwrap();
    let saved = ProcessDefinitionRepo::save_document(
        &pool, TENANT, def.id, saved.version, &saved.stages.0, &records, ACTOR,
    )
    .await
    .unwrap()
    .expect("save should succeed");

    let reloaded = ProcessDefinitionRepo::find_by_id(&pool, TENANT, def.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.version, saved.version);
    assert_eq!(reloaded.records.0.len(), 1);
    assert_eq!(reloaded.records.0[0].stage_id, "done");
    assert_eq!(reloaded.records.0[0].progress, 100);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn stale_save_is_rejected(pool: PgPool) {
    let def = ProcessDefinitionRepo::create(&pool, TENANT, ACTOR, &new_definition("P-01"))
        .await
        .unwrap();

    let first = ProcessDefinitionRepo::save_document(
        &pool, TENANT, def.id, def.version, &def.stages.0, &[], ACTOR,
    )
    .await
    .unwrap();
    assert!(first.is_some());

    // A second writer still holding version 1 must not overwrite.
    let second = ProcessDefinitionRepo::save_document(
        &pool, TENANT, def.id, def.version, &def.stages.0, &[], ACTOR,
    )
    .await
    .unwrap();
    assert!(second.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn update_applies_only_given_fields(pool: PgPool) {
    let def = ProcessDefinitionRepo::create(&pool, TENANT, ACTOR, &new_definition("P-01"))
        .await
        .unwrap();
    let updated = ProcessDefinitionRepo::update(
        &pool,
        TENANT,
        def.id,
        ACTOR,
        &UpdateProcessDefinition {
            status: Some(ProcessStatus::InReview),
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(updated.status, ProcessStatus::InReview);
    assert_eq!(updated.name, def.name);
    assert_eq!(updated.version, def.version + 1);
    assert_eq!(updated.updated_by, Some(ACTOR));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn archived_definitions_are_hidden(pool: PgPool) {
    let def = ProcessDefinitionRepo::create(&pool, TENANT, ACTOR, &new_definition("P-01"))
        .await
        .unwrap();
    ProcessDefinitionRepo::create(&pool, TENANT, ACTOR, &new_definition("P-02"))
        .await
        .unwrap();

    assert!(ProcessDefinitionRepo::archive(&pool, TENANT, def.id, ACTOR).await.unwrap());
    assert!(!ProcessDefinitionRepo::archive(&pool, TENANT, def.id, ACTOR).await.unwrap());

    assert!(ProcessDefinitionRepo::find_by_id(&pool, TENANT, def.id)
        .await
        .unwrap()
        .is_none());
    let listed = ProcessDefinitionRepo::list(&pool, TENANT, &ProcessDefinitionFilter::default())
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].code, "P-02");

    let status: String =
        sqlx::query_scalar("SELECT status FROM process_definitions WHERE id = $1")
            .bind(def.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(status, "inactive");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn list_filters_by_status(pool: PgPool) {
    let mut input = new_definition("P-01");
    input.status = Some(ProcessStatus::InReview);
    ProcessDefinitionRepo::create(&pool, TENANT, ACTOR, &input).await.unwrap();
    ProcessDefinitionRepo::create(&pool, TENANT, ACTOR, &new_definition("P-02"))
        .await
        .unwrap();

    let filter = ProcessDefinitionFilter {
        status: Some(ProcessStatus::InReview),
        category: None,
    };
    let listed = ProcessDefinitionRepo::list(&pool, TENANT, &filter).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].code, "P-01");
}
