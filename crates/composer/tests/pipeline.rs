//! End-to-end composition runs over in-memory fixtures.

use chrono::{DateTime, TimeZone, Utc};
use promptloom_composer::{
    Composer, ConditionRegistry, FallbackPolicy, LoaderKind, LoaderRegistry, ReviewType,
    RunConfig, SectionDefinition, TransformRegistry, default_sections,
};
use promptloom_config::AppConfig;
use promptloom_core::{
    CallerId, CompositionStatus, CompositionStore, SpecRole, TransformError,
};
use promptloom_store::{Fixture, InMemoryStore, SqliteCompositionStore};
use serde_json::{Value, json};
use std::sync::Arc;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn run() -> RunConfig {
    RunConfig::at(now())
}

fn spec(slug: &str, name: &str, role: &str, config: Value) -> Value {
    json!({
        "id": slug,
        "slug": slug,
        "name": name,
        "description": format!("{name} specification"),
        "role": role,
        "config": config,
    })
}

fn tutor() -> Value {
    spec(
        "spec-maths-tutor",
        "Maths Tutor",
        "identity",
        json!({
            "tone": "encouraging",
            "constraints": ["Never give the final answer outright"]
        }),
    )
}

/// A caller with a three-module curriculum and everything else empty.
fn caller(id: &str) -> Value {
    json!({
        "profile": {"id": id, "name": "Sam", "domain_id": "maths", "domain_name": "Maths"},
        "playbooks": [
            {"id": "pb-main", "name": "Main", "priority": 1, "items": [{"spec": tutor()}]}
        ],
        "subject_sources": {
            "sources": [
                {"id": "src-1", "name": "Class notes", "trust_level": "community"},
                {"id": "src-2", "name": "Exam board specification", "trust_level": "authoritative"}
            ],
            "curriculum": {
                "id": "fractions",
                "name": "Fractions",
                "modules": [
                    {"id": "m1", "name": "Halves"},
                    {"id": "m2", "name": "Quarters"},
                    {"id": "m3", "name": "Eighths"}
                ]
            }
        }
    })
}

fn fixture(callers: Vec<Value>) -> Fixture {
    serde_json::from_value(json!({
        "callers": callers,
        "system_specs": [
            spec("spec-fractions", "Fractions Course", "content", json!({
                "constraints": ["Use worked examples"]
            }))
        ],
        "spec_library": [
            spec("spec-voice-calm", "Calm Voice", "voice", json!({"rules": ["Speak slowly"]}))
        ]
    }))
    .unwrap()
}

fn composer(store: InMemoryStore) -> Composer {
    Composer::new(AppConfig::default(), Arc::new(store)).unwrap()
}

#[tokio::test]
async fn first_call_starts_with_first_module() {
    let composer = composer(InMemoryStore::from_fixture(fixture(vec![caller("c1")])));
    let result = composer.compose(&CallerId::from("c1"), &run()).await.unwrap();

    let plan = &result.document["session_plan"];
    assert_eq!(plan["session_type"], "first_call");
    assert!(plan["review"].is_null());
    assert_eq!(plan["new_material"]["id"], "m1");
    assert!(result.state.review.is_none());

    assert_eq!(result.document["caller_info"]["name"], "Sam");
    assert_eq!(result.document["identity"]["name"], "Maths Tutor");
    assert_eq!(result.document["voice"]["name"], "Calm Voice");
    assert_eq!(result.document["trust"]["primary"], "Exam board specification");
    assert!(result.summary.contains("[Session Plan]"));
}

#[tokio::test]
async fn long_gap_schedules_reintroduction() {
    let mut c = caller("c1");
    c["sessions"] = json!([
        {"id": "s1", "started_at": "2026-01-20T10:00:00Z", "domain_id": "maths"},
        {"id": "s2", "started_at": "2026-02-09T12:00:00Z", "domain_id": "maths"}
    ]);
    c["attributes"] = json!([{"key": "mastery:m1", "value": true}]);
    let composer = composer(InMemoryStore::from_fixture(fixture(vec![c])));
    let result = composer.compose(&CallerId::from("c1"), &run()).await.unwrap();

    let review = result.state.review.as_ref().unwrap();
    assert_eq!(review.kind, ReviewType::Reintroduce);
    assert_eq!(review.days_since_last_call, 20);
    assert!(review.reason.contains("20"));

    let plan = &result.document["session_plan"];
    assert_eq!(plan["session_type"], "returning");
    assert_eq!(plan["review"]["type"], "reintroduce");
    assert_eq!(plan["review"]["module"]["id"], "m1");
    assert_eq!(plan["new_material"]["id"], "m2");
}

#[tokio::test]
async fn duplicate_memories_keep_the_most_confident() {
    let mut c = caller("c1");
    c["memories"] = json!([
        {"id": "f1", "category": "FACT", "key": "Location", "value": "Leeds", "confidence": 0.6},
        {"id": "f2", "category": "FACT", "key": "location", "value": "York", "confidence": 0.9}
    ]);
    let composer = composer(InMemoryStore::from_fixture(fixture(vec![c])));
    let result = composer.compose(&CallerId::from("c1"), &run()).await.unwrap();

    let memories = &result.document["memories"];
    assert_eq!(memories["total"], 1);
    assert_eq!(memories["all"][0]["value"], "York");
    assert_eq!(memories["all"][0]["confidence"], 0.9);
}

#[tokio::test]
async fn highest_priority_playbook_supplies_identity() {
    let mut c = caller("c1");
    c["playbooks"] = json!([
        {"id": "pb-backup", "name": "Backup", "priority": 2, "items": [
            {"spec": spec("spec-backup-tutor", "Backup Tutor", "identity", json!({}))}
        ]},
        {"id": "pb-main", "name": "Main", "priority": 1, "items": [{"spec": tutor()}]}
    ]);
    let composer = composer(InMemoryStore::from_fixture(fixture(vec![c])));
    let result = composer.compose(&CallerId::from("c1"), &run()).await.unwrap();

    let identity = result.specs.get(SpecRole::Identity).unwrap();
    assert_eq!(identity.name, "Maths Tutor");
    assert_eq!(result.document["identity"]["name"], "Maths Tutor");
}

#[tokio::test]
async fn missing_archetype_leaves_overlay_unchanged() {
    let mut overlay = tutor();
    overlay["extends"] = json!("Nonexistent Base");
    let mut c = caller("c1");
    c["playbooks"] = json!([
        {"id": "pb-main", "name": "Main", "priority": 1, "items": [{"spec": overlay.clone()}]}
    ]);
    let composer = composer(InMemoryStore::from_fixture(fixture(vec![c])));
    let result = composer.compose(&CallerId::from("c1"), &run()).await.unwrap();

    let identity = result.specs.identity.as_ref().unwrap();
    assert_eq!(identity.config, overlay["config"]);
    assert!(result.specs.identity_base.is_none());
    assert!(result.document["identity"].get("archetype").is_none());
}

#[tokio::test]
async fn archetype_merge_flows_into_identity_section() {
    let mut overlay = tutor();
    overlay["extends"] = json!("Base Tutor");
    overlay["config"]["parameters"] = json!([{"id": "patience", "config": {"level": "high"}}]);
    let mut c = caller("c1");
    c["playbooks"] = json!([
        {"id": "pb-main", "name": "Main", "priority": 1, "items": [{"spec": overlay}]}
    ]);
    let mut fx = fixture(vec![c]);
    fx.spec_library.push(
        serde_json::from_value(spec(
            "spec-base-tutor",
            "Base Tutor",
            "identity",
            json!({
                "parameters": [
                    {"id": "patience", "config": {"level": "low"}},
                    {"id": "humour", "config": {"style": "dry"}}
                ],
                "constraints": ["Stay on the curriculum"],
                "greeting": "Hello"
            }),
        ))
        .unwrap(),
    );
    let composer = composer(InMemoryStore::from_fixture(fx));
    let result = composer.compose(&CallerId::from("c1"), &run()).await.unwrap();

    let identity = &result.document["identity"];
    assert_eq!(identity["archetype"], "spec-base-tutor");
    assert_eq!(identity["name"], "Maths Tutor");
    assert_eq!(identity["settings"]["greeting"], "Hello");
    assert_eq!(identity["settings"]["tone"], "encouraging");

    let rules = &result.document["critical_rules"]["rules"];
    assert_eq!(
        rules,
        &json!([
            "Stay on the curriculum",
            "Never give the final answer outright",
            "Use worked examples"
        ])
    );
}

#[tokio::test]
async fn repeated_runs_are_identical() {
    let mut c = caller("c1");
    c["memories"] = json!([
        {"category": "FACT", "key": "pet", "value": "dog", "confidence": 0.8},
        {"category": "PREFERENCE", "key": "music", "value": "jazz", "confidence": 0.8}
    ]);
    c["behavior_targets"] = json!([
        {"parameter_id": "warmth", "scope": "system", "target_value": 0.7, "domain_group": "voice"},
        {"parameter_id": "warmth", "scope": "domain", "target_value": 0.9, "domain_group": "voice"}
    ]);
    let composer = composer(InMemoryStore::from_fixture(fixture(vec![c])));
    let caller_id = CallerId::from("c1");

    let first = composer.compose(&caller_id, &run()).await.unwrap();
    let second = composer.compose(&caller_id, &run()).await.unwrap();

    assert_eq!(
        serde_json::to_string(&first.document).unwrap(),
        serde_json::to_string(&second.document).unwrap()
    );
    assert_eq!(first.summary, second.summary);
    assert_eq!(first.metadata.activated, second.metadata.activated);
    assert_eq!(first.metadata.skipped, second.metadata.skipped);
    assert_eq!(first.metadata.execution_order, second.metadata.execution_order);
    assert_eq!(first.metadata.merged_target_count, 1);
}

#[tokio::test]
async fn failing_loader_degrades_only_its_sections() {
    let mut c = caller("c1");
    c["memories"] = json!([{"category": "FACT", "key": "pet", "value": "dog", "confidence": 0.8}]);
    let store = InMemoryStore::from_fixture(fixture(vec![c]));
    store.fail_on("memories").await;
    let composer = composer(store);

    let result = composer.compose(&CallerId::from("c1"), &run()).await.unwrap();
    assert_eq!(result.metadata.failed_loaders, vec!["memories"]);
    assert_eq!(result.document["memories"], json!({}));
    assert!(result.metadata.skipped.iter().any(|s| s.id == "memories"));
    assert_eq!(result.document["identity"]["name"], "Maths Tutor");
}

#[tokio::test]
async fn failing_transform_falls_back_without_aborting() {
    let store = Arc::new(InMemoryStore::from_fixture(fixture(vec![caller("c1")])));
    let mut transforms = TransformRegistry::builtin();
    transforms.register_fn("always_fails", |_input, _ctx, _section| {
        Err(TransformError::failed("always_fails", "backend unavailable"))
    });

    let mut sections = default_sections();
    sections.push(
        SectionDefinition::new("broken", "Broken")
            .priority(1)
            .source(LoaderKind::Goals)
            .transform("always_fails")
            .fallback(FallbackPolicy::Null),
    );
    let composer = Composer::with_registries(
        AppConfig::default(),
        LoaderRegistry::with_store(store),
        transforms,
        ConditionRegistry::with_defaults(),
        sections,
    )
    .unwrap();

    let result = composer.compose(&CallerId::from("c1"), &run()).await.unwrap();
    assert_eq!(result.document["broken"], Value::Null);
    let skipped = result
        .metadata
        .skipped
        .iter()
        .find(|s| s.id == "broken")
        .unwrap();
    assert_eq!(skipped.reason, "transform 'always_fails' failed: backend unavailable");
    assert!(result.metadata.activated.contains(&"session_plan".to_string()));
}

#[tokio::test]
async fn custom_condition_and_assembled_section() {
    let store = Arc::new(InMemoryStore::from_fixture(fixture(vec![caller("c1")])));
    let mut conditions = ConditionRegistry::with_defaults();
    conditions.register("in_maths", |ctx| {
        ctx.dataset
            .profile
            .as_ref()
            .and_then(|p| p.domain_id.as_deref())
            == Some("maths")
    });
    let mut transforms = TransformRegistry::builtin();
    transforms.register_fn("section_ids", |input, _ctx, _section| {
        Ok(json!(input.as_object().map(|m| m.keys().cloned().collect::<Vec<_>>())))
    });

    let sections = vec![
        SectionDefinition::new("greeting", "Greeting")
            .source(LoaderKind::Profile)
            .condition(promptloom_composer::Condition::Custom("in_maths".into())),
        SectionDefinition::new("seen", "Seen")
            .assembled()
            .transform("section_ids")
            .depends_on(&["greeting"]),
    ];
    let composer = Composer::with_registries(
        AppConfig::default(),
        LoaderRegistry::with_store(store),
        transforms,
        conditions,
        sections,
    )
    .unwrap();

    let result = composer.compose(&CallerId::from("c1"), &run()).await.unwrap();
    assert_eq!(result.document["greeting"]["name"], "Sam");
    assert_eq!(result.document["seen"], json!(["greeting"]));
}

#[tokio::test]
async fn concurrent_saves_leave_one_active_composition() {
    let store = Arc::new(InMemoryStore::from_fixture(fixture(vec![caller("c1")])));
    let composer = Arc::new(Composer::new(AppConfig::default(), store.clone()).unwrap());
    let caller_id = CallerId::from("c1");

    let runs = (0..8).map(|i| {
        let composer = composer.clone();
        let store = store.clone();
        let caller_id = caller_id.clone();
        async move {
            composer
                .compose_and_store(&caller_id, &run(), &format!("run-{i}"), store.as_ref())
                .await
                .unwrap()
        }
    });
    futures::future::join_all(runs).await;

    let history = store.history(&caller_id).await.unwrap();
    assert_eq!(history.len(), 8);
    let active: Vec<_> = history
        .iter()
        .filter(|r| r.status == CompositionStatus::Active)
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, history.last().unwrap().id);

    let current = store.active_for(&caller_id).await.unwrap().unwrap();
    assert_eq!(current.id, active[0].id);
    assert!(current.summary.contains("[Caller]"));
}

#[tokio::test]
async fn sqlite_store_supersedes_previous_composition() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("compositions.db");
    let sqlite = SqliteCompositionStore::new(&format!("sqlite://{}", path.display()))
        .await
        .unwrap();

    let composer = composer(InMemoryStore::from_fixture(fixture(vec![caller("c1")])));
    let caller_id = CallerId::from("c1");

    let (_, first) = composer
        .compose_and_store(&caller_id, &run(), "session_end", &sqlite)
        .await
        .unwrap();
    let (result, second) = composer
        .compose_and_store(&caller_id, &run(), "manual", &sqlite)
        .await
        .unwrap();

    let history = sqlite.history(&caller_id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, first.id);
    assert_eq!(history[0].status, CompositionStatus::Superseded);
    assert_eq!(history[1].status, CompositionStatus::Active);

    let active = sqlite.active_for(&caller_id).await.unwrap().unwrap();
    assert_eq!(active.id, second.id);
    assert_eq!(active.trigger, "manual");
    assert_eq!(active.summary, result.summary);
    assert_eq!(active.document["caller_info"]["name"], "Sam");
}

#[tokio::test]
async fn concurrent_sqlite_saves_leave_one_active_composition() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("compositions.db");
    let sqlite = Arc::new(
        SqliteCompositionStore::new(&format!("sqlite://{}", path.display()))
            .await
            .unwrap(),
    );

    let composer = Arc::new(composer(InMemoryStore::from_fixture(fixture(vec![
        caller("c1"),
    ]))));
    let caller_id = CallerId::from("c1");

    let runs = (0..8).map(|i| {
        let composer = composer.clone();
        let sqlite = sqlite.clone();
        let caller_id = caller_id.clone();
        async move {
            composer
                .compose_and_store(&caller_id, &run(), &format!("run-{i}"), sqlite.as_ref())
                .await
                .unwrap()
        }
    });
    let saved = futures::future::join_all(runs).await;
    assert_eq!(saved.len(), 8);

    let history = sqlite.history(&caller_id).await.unwrap();
    assert_eq!(history.len(), 8);
    let active: Vec<_> = history
        .iter()
        .filter(|r| r.status == CompositionStatus::Active)
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, history.last().unwrap().id);

    let current = sqlite.active_for(&caller_id).await.unwrap().unwrap();
    assert_eq!(current.id, active[0].id);
}
