//! End-to-end runs over the bundled demo fixture: fixture file → composer
//! → SQLite, the same path `promptloom compose --save` takes.

use chrono::{TimeZone, Utc};
use promptloom_composer::{Composer, RunConfig};
use promptloom_config::AppConfig;
use promptloom_core::{CallerId, CompositionStatus, CompositionStore};
use promptloom_store::{Fixture, InMemoryStore, SqliteCompositionStore};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

fn demo_fixture() -> Fixture {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../demos/tutor.json");
    Fixture::from_file(&path).unwrap()
}

fn run() -> RunConfig {
    RunConfig::at(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap())
}

fn composer() -> Composer {
    Composer::new(
        AppConfig::default(),
        Arc::new(InMemoryStore::from_fixture(demo_fixture())),
    )
    .unwrap()
}

#[tokio::test]
async fn demo_caller_gets_a_full_document() {
    let result = composer()
        .compose(&CallerId::from("caller-ada"), &run())
        .await
        .unwrap();
    let doc = &result.document;

    assert_eq!(doc["identity"]["name"], "GCSE Maths Tutor");
    assert_eq!(doc["identity"]["archetype"], "spec-tutor");
    assert_eq!(doc["voice"]["name"], "Friendly Voice");

    // Last session four days ago, first module mastered
    assert_eq!(doc["session_plan"]["session_type"], "returning");
    assert_eq!(doc["session_plan"]["review"]["type"], "application");
    assert_eq!(doc["session_plan"]["review"]["module"]["id"], "m1");
    assert_eq!(doc["session_plan"]["new_material"]["id"], "m2");

    assert_eq!(doc["memories"]["total"], 4);
    assert_eq!(doc["behavior_targets"]["merged_count"], 3);
    assert_eq!(doc["goals"]["count"], 2);
    assert_eq!(doc["goals"]["goals"][0]["id"], "g1");
    assert_eq!(doc["onboarding"]["next_phase"], "goals");
    assert_eq!(doc["pending_actions"]["overdue_count"], 1);
    assert_eq!(doc["trust"]["primary"], "AQA specification");

    assert!(result.metadata.failed_loaders.is_empty());
    assert_eq!(result.metadata.merged_target_count, 3);
    assert!(result.summary.starts_with("[Caller]"));
}

#[tokio::test]
async fn saved_compositions_supersede_in_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("promptloom.db");
    let store = SqliteCompositionStore::new(&format!("sqlite://{}", db.display()))
        .await
        .unwrap();
    let composer = composer();
    let caller = CallerId::from("caller-ada");

    for trigger in ["session_end", "manual", "session_end"] {
        composer
            .compose_and_store(&caller, &run(), trigger, &store)
            .await
            .unwrap();
    }

    let history = store.history(&caller).await.unwrap();
    let statuses: Vec<_> = history.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![
            CompositionStatus::Superseded,
            CompositionStatus::Superseded,
            CompositionStatus::Active
        ]
    );

    let active = store.active_for(&caller).await.unwrap().unwrap();
    assert_eq!(active.id, history[2].id);
    assert_eq!(active.metadata["caller_id"], json!("caller-ada"));
}

#[tokio::test]
async fn unknown_caller_is_rejected() {
    let err = composer()
        .compose(&CallerId::from("nobody"), &run())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("nobody"));
}
