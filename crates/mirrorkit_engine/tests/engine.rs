//! End-to-end synchronization runs against a mock remote and the
//! in-memory store: pagination, idempotence, reference graphs, recursion
//! bounds, translation merging and per-run pipeline overrides.

use mirrorkit_engine::{
    builtin_registry, ContentStore, EngineConfig, EngineError, EngineResult, ImportContext,
    ImportEngine, LocalId, MemoryStore, MockRemote, PipelineConfig, Processor, ProcessorSettings,
    RemoteConfig, ResolvedLocal, Stage, StageOutcome, SyncStatus,
};
use mirrorkit_protocol::RemoteItem;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

const META: &str = "https://remote.example/meta";
const FEED: &str = "https://remote.example/articles";

fn metadata(page_limit: u64, field_mappings: Value) -> Value {
    json!({
        "channels": {
            "articles": {
                "label": "Articles",
                "url": FEED,
                "url_uuid": FEED,
                "entity_type": "node",
                "bundle": "article",
                "search_configuration": {"page_limit": page_limit},
            },
        },
        "field_mappings": field_mappings,
    })
}

fn page_url(offset: u64, limit: u64) -> String {
    format!("{FEED}?page[offset]={offset}&page[limit]={limit}")
}

fn filter_url(id: Uuid) -> String {
    format!("{FEED}?filter[id][operator]=IN&filter[id][value][0]={id}")
}

fn article(id: Uuid, language: &str, title: &str) -> Value {
    json!({
        "type": "node--article",
        "id": id.to_string(),
        "attributes": {
            "langcode": language,
            "title": title,
            "changed": 1700000000,
        },
    })
}

fn with_reference(mut item: Value, name: &str, target: Uuid) -> Value {
    item["relationships"] = json!({
        name: {"data": {"type": "node--article", "id": target.to_string()}},
    });
    item
}

fn page(items: Vec<Value>, count: u64) -> Value {
    json!({"data": items, "meta": {"count": count}})
}

/// Base pipeline: veto synchronized items, resolve references without a
/// depth bound.
fn pipeline() -> PipelineConfig {
    PipelineConfig::new("default")
        .with_processor("skip_synchronized", ProcessorSettings::new())
        .with_processor(
            "entity_reference",
            ProcessorSettings::new().with("max_recursion_depth", json!(-1)),
        )
}

fn build_engine(
    remote: Arc<MockRemote>,
    store: Arc<MemoryStore>,
    pipeline: PipelineConfig,
) -> ImportEngine<Arc<MockRemote>, MemoryStore, MemoryStore> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    ImportEngine::new(
        remote,
        Arc::clone(&store),
        store,
        builtin_registry(),
        EngineConfig::new(),
    )
    .with_remote(RemoteConfig::new("site_a", META))
    .with_pipeline(pipeline)
}

#[test]
fn pagination_covers_every_window() {
    let remote = Arc::new(MockRemote::new());
    remote.set_response(META, metadata(2, json!({})));

    let ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
    remote.set_response(page_url(0, 1), page(vec![], 5));
    remote.set_response(
        page_url(0, 2),
        page(vec![article(ids[0], "en", "0"), article(ids[1], "en", "1")], 5),
    );
    remote.set_response(
        page_url(2, 2),
        page(vec![article(ids[2], "en", "2"), article(ids[3], "en", "3")], 5),
    );
    remote.set_response(page_url(4, 2), page(vec![article(ids[4], "en", "4")], 5));

    let store = Arc::new(MemoryStore::new().with_known_type("node"));
    let engine = build_engine(remote, Arc::clone(&store), pipeline());

    let session = engine.prepare_run("site_a", "articles", "default").unwrap();
    let summary = engine.import_channel(&session).unwrap();

    assert_eq!(summary.imported, 5);
    assert_eq!(summary.pages, 3);
    assert_eq!(summary.failed_pages, 0);
    assert_eq!(store.item_count(), 5);
}

#[test]
fn next_links_are_followed_when_count_is_missing() {
    let remote = Arc::new(MockRemote::new());
    remote.set_response(META, metadata(2, json!({})));

    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    remote.set_response(page_url(0, 1), json!({"data": []}));
    remote.set_response(
        page_url(0, 2),
        json!({
            "data": [article(first, "en", "first")],
            "links": {"next": {"href": format!("{FEED}?cursor=abc")}},
        }),
    );
    remote.set_response(
        format!("{FEED}?cursor=abc"),
        json!({"data": [article(second, "en", "second")]}),
    );

    let store = Arc::new(MemoryStore::new().with_known_type("node"));
    let engine = build_engine(remote, Arc::clone(&store), pipeline());

    let session = engine.prepare_run("site_a", "articles", "default").unwrap();
    let summary = engine.import_channel(&session).unwrap();

    assert_eq!(summary.imported, 2);
    assert_eq!(summary.pages, 2);
    assert_eq!(store.item_count(), 2);
}

#[test]
fn failed_page_does_not_abort_the_run() {
    let remote = Arc::new(MockRemote::new());
    remote.set_response(META, metadata(2, json!({})));

    let survivor = Uuid::new_v4();
    remote.set_response(page_url(0, 1), page(vec![], 3));
    remote.set_failure(page_url(0, 2), "gateway timeout");
    remote.set_response(page_url(2, 2), page(vec![article(survivor, "en", "ok")], 3));

    let store = Arc::new(MemoryStore::new().with_known_type("node"));
    let engine = build_engine(remote, Arc::clone(&store), pipeline());

    let session = engine.prepare_run("site_a", "articles", "default").unwrap();
    let summary = engine.import_channel(&session).unwrap();

    assert_eq!(summary.pages, 2);
    assert_eq!(summary.failed_pages, 1);
    assert_eq!(summary.imported, 1);
    assert_eq!(store.item_count(), 1);
}

#[test]
fn second_run_imports_nothing() {
    let remote = Arc::new(MockRemote::new());
    remote.set_response(META, metadata(10, json!({})));

    let id = Uuid::new_v4();
    remote.set_response(page_url(0, 1), page(vec![], 1));
    remote.set_response(page_url(0, 10), page(vec![article(id, "en", "stable")], 1));

    let store = Arc::new(MemoryStore::new().with_known_type("node"));
    let engine = build_engine(remote, Arc::clone(&store), pipeline());

    let session = engine.prepare_run("site_a", "articles", "default").unwrap();
    assert_eq!(engine.import_channel(&session).unwrap().imported, 1);

    // Unchanged remote data classifies as synchronized and is vetoed.
    let session = engine.prepare_run("site_a", "articles", "default").unwrap();
    assert_eq!(engine.import_channel(&session).unwrap().imported, 0);

    assert_eq!(store.item_count(), 1);
    let handle = store.find_by_uuid("node", id).unwrap().unwrap();
    assert_eq!(store.field_value(handle, "en", "title"), Some(json!("stable")));
}

#[test]
fn mutual_references_terminate() {
    let remote = Arc::new(MockRemote::new());
    remote.set_response(META, metadata(10, json!({})));

    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    remote.set_response(page_url(0, 1), page(vec![], 1));
    remote.set_response(
        page_url(0, 10),
        page(vec![with_reference(article(a, "en", "A"), "partner", b)], 1),
    );
    remote.set_response(
        filter_url(b),
        page(vec![with_reference(article(b, "en", "B"), "partner", a)], 1),
    );

    let store = Arc::new(MemoryStore::new().with_known_type("node"));
    let engine = build_engine(Arc::clone(&remote), Arc::clone(&store), pipeline());

    let session = engine.prepare_run("site_a", "articles", "default").unwrap();
    let summary = engine.import_channel(&session).unwrap();

    assert_eq!(summary.imported, 1); // one top-level item on the page
    assert_eq!(store.item_count(), 2);
    // B's back-reference to A resolved from the run registry, no refetch.
    assert!(!remote.requests().contains(&filter_url(a)));
}

#[test]
fn recursion_depth_bounds_the_chain() {
    let remote = Arc::new(MockRemote::new());
    remote.set_response(META, metadata(10, json!({})));

    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let c = Uuid::new_v4();
    remote.set_response(page_url(0, 1), page(vec![], 1));
    remote.set_response(
        page_url(0, 10),
        page(vec![with_reference(article(a, "en", "A"), "next", b)], 1),
    );
    remote.set_response(
        filter_url(b),
        page(vec![with_reference(article(b, "en", "B"), "next", c)], 1),
    );
    remote.set_response(filter_url(c), page(vec![article(c, "en", "C")], 1));

    let bounded = PipelineConfig::new("default").with_processor(
        "entity_reference",
        ProcessorSettings::new().with("max_recursion_depth", json!(1)),
    );

    let store = Arc::new(MemoryStore::new().with_known_type("node"));
    let engine = build_engine(Arc::clone(&remote), Arc::clone(&store), bounded);

    let session = engine.prepare_run("site_a", "articles", "default").unwrap();
    engine.import_channel(&session).unwrap();

    // One hop: A and B land, C is never fetched.
    assert_eq!(store.item_count(), 2);
    assert!(!remote.requests().contains(&filter_url(c)));
}

#[test]
fn zero_depth_disables_reference_resolution() {
    let remote = Arc::new(MockRemote::new());
    remote.set_response(META, metadata(10, json!({})));

    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    remote.set_response(page_url(0, 1), page(vec![], 1));
    remote.set_response(
        page_url(0, 10),
        page(vec![with_reference(article(a, "en", "A"), "next", b)], 1),
    );

    let disabled = PipelineConfig::new("default").with_processor(
        "entity_reference",
        ProcessorSettings::new().with("max_recursion_depth", json!(0)),
    );

    let store = Arc::new(MemoryStore::new().with_known_type("node"));
    let engine = build_engine(Arc::clone(&remote), Arc::clone(&store), disabled);

    let session = engine.prepare_run("site_a", "articles", "default").unwrap();
    engine.import_channel(&session).unwrap();

    assert_eq!(store.item_count(), 1);
    assert!(!remote.requests().contains(&filter_url(b)));
}

#[test]
fn translations_merge_into_one_local_item() {
    let remote = Arc::new(MockRemote::new());
    remote.set_response(META, metadata(10, json!({})));

    let id = Uuid::new_v4();
    remote.set_response(page_url(0, 1), page(vec![], 2));
    remote.set_response(
        page_url(0, 10),
        page(vec![article(id, "en", "Hello"), article(id, "fr", "Bonjour")], 2),
    );

    let store = Arc::new(MemoryStore::new().with_known_type("node"));
    let engine = build_engine(remote, Arc::clone(&store), pipeline());

    let session = engine.prepare_run("site_a", "articles", "default").unwrap();
    engine.import_channel(&session).unwrap();

    assert_eq!(store.item_count(), 1);
    let handle = store.find_by_uuid("node", id).unwrap().unwrap();
    assert_eq!(store.translation_languages(handle), vec!["en", "fr"]);
    assert_eq!(store.field_value(handle, "en", "title"), Some(json!("Hello")));
    assert_eq!(store.field_value(handle, "fr", "title"), Some(json!("Bonjour")));
}

#[test]
fn item_without_language_gets_the_sentinel() {
    let remote = Arc::new(MockRemote::new());
    remote.set_response(META, metadata(10, json!({})));

    let id = Uuid::new_v4();
    let unlabeled = json!({
        "type": "node--article",
        "id": id.to_string(),
        "attributes": {"title": "No language", "changed": 1700000000},
    });
    remote.set_response(page_url(0, 1), page(vec![], 1));
    remote.set_response(page_url(0, 10), page(vec![unlabeled], 1));

    let store = Arc::new(MemoryStore::new().with_known_type("node"));
    let engine = build_engine(remote, Arc::clone(&store), pipeline());

    let session = engine.prepare_run("site_a", "articles", "default").unwrap();
    engine.import_channel(&session).unwrap();

    let handle = store.find_by_uuid("node", id).unwrap().unwrap();
    assert_eq!(store.translation_languages(handle), vec!["und"]);
}

#[test]
fn unmapped_attributes_are_dropped_not_fatal() {
    let remote = Arc::new(MockRemote::new());
    let mappings = json!({
        "node": {
            "article": {
                "langcode": "langcode",
                "changed": "changed",
                "title": "title",
            },
        },
    });
    remote.set_response(META, metadata(10, mappings));

    let id = Uuid::new_v4();
    let mut item = article(id, "en", "Mapped");
    item["attributes"]["mystery"] = json!("dropped");
    remote.set_response(page_url(0, 1), page(vec![], 1));
    remote.set_response(page_url(0, 10), page(vec![item], 1));

    let store = Arc::new(MemoryStore::new().with_known_type("node"));
    let engine = build_engine(remote, Arc::clone(&store), pipeline());

    let session = engine.prepare_run("site_a", "articles", "default").unwrap();
    let summary = engine.import_channel(&session).unwrap();

    assert_eq!(summary.imported, 1);
    let handle = store.find_by_uuid("node", id).unwrap().unwrap();
    assert_eq!(store.field_value(handle, "en", "title"), Some(json!("Mapped")));
    assert_eq!(store.field_value(handle, "en", "mystery"), None);
}

#[test]
fn unknown_entity_type_is_skipped() {
    let remote = Arc::new(MockRemote::new());
    remote.set_response(META, metadata(10, json!({})));

    let known = Uuid::new_v4();
    let alien = json!({
        "type": "widget--gadget",
        "id": Uuid::new_v4().to_string(),
        "attributes": {"langcode": "en", "changed": 1700000000},
    });
    remote.set_response(page_url(0, 1), page(vec![], 2));
    remote.set_response(
        page_url(0, 10),
        page(vec![alien, article(known, "en", "known")], 2),
    );

    let store = Arc::new(MemoryStore::new().with_known_type("node"));
    let engine = build_engine(remote, Arc::clone(&store), pipeline());

    let session = engine.prepare_run("site_a", "articles", "default").unwrap();
    let summary = engine.import_channel(&session).unwrap();

    assert_eq!(summary.imported, 1);
    assert_eq!(store.item_count(), 1);
}

#[test]
fn classification_tracks_the_run() {
    let remote = Arc::new(MockRemote::new());
    remote.set_response(META, metadata(10, json!({})));

    let id = Uuid::new_v4();
    remote.set_response(page_url(0, 1), page(vec![], 1));
    remote.set_response(page_url(0, 10), page(vec![article(id, "en", "A")], 1));

    let store = Arc::new(MemoryStore::new().with_known_type("node"));
    let engine = build_engine(remote, Arc::clone(&store), pipeline());
    let session = engine.prepare_run("site_a", "articles", "default").unwrap();

    let item = RemoteItem::from_value(&article(id, "en", "A")).unwrap();
    assert_eq!(
        engine.classify_item(&session, &item).unwrap().status,
        SyncStatus::New
    );

    engine.import_channel(&session).unwrap();

    let classification = engine.classify_item(&session, &item).unwrap();
    assert_eq!(classification.status, SyncStatus::Synchronized);
    assert_eq!(classification.policy.as_deref(), Some("default"));

    let french = RemoteItem::from_value(&article(id, "fr", "A")).unwrap();
    assert_eq!(
        engine.classify_item(&session, &french).unwrap().status,
        SyncStatus::NewTranslation
    );
}

/// Cancels its own session after every save, simulating an external
/// abort arriving while a page is being processed.
struct HaltAfterSave;

impl HaltAfterSave {
    const ID: &'static str = "halt_after_save";
    const STAGES: [Stage; 1] = [Stage::PostEntitySave];
}

impl Processor for HaltAfterSave {
    fn id(&self) -> &str {
        Self::ID
    }

    fn stages(&self) -> &[Stage] {
        &Self::STAGES
    }

    fn post_entity_save(
        &self,
        _item: &RemoteItem,
        _local: &ResolvedLocal,
        _local_id: LocalId,
        ctx: &ImportContext<'_>,
    ) -> EngineResult<StageOutcome> {
        ctx.session.cancel();
        Ok(StageOutcome::Proceed)
    }
}

#[test]
fn cancel_during_a_run_stops_between_pages() {
    let remote = Arc::new(MockRemote::new());
    remote.set_response(META, metadata(1, json!({})));

    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    remote.set_response(page_url(0, 1), page(vec![article(first, "en", "first")], 2));
    remote.set_response(page_url(1, 1), page(vec![article(second, "en", "second")], 2));

    let mut registry = builtin_registry();
    registry.register(HaltAfterSave::ID, |_| Box::new(HaltAfterSave));

    let store = Arc::new(MemoryStore::new().with_known_type("node"));
    let engine = ImportEngine::new(
        Arc::clone(&remote),
        Arc::clone(&store),
        Arc::clone(&store),
        registry,
        EngineConfig::new(),
    )
    .with_remote(RemoteConfig::new("site_a", META))
    .with_pipeline(pipeline().with_processor(HaltAfterSave::ID, ProcessorSettings::new()));

    let session = engine.prepare_run("site_a", "articles", "default").unwrap();
    let result = engine.import_channel(&session);

    // The first page completes; the run aborts before the second fetch.
    assert!(matches!(result, Err(EngineError::Cancelled)));
    assert_eq!(store.item_count(), 1);
    assert!(!remote.requests().contains(&page_url(1, 1)));
}

#[test]
fn cancelling_one_session_leaves_others_running() {
    let remote = Arc::new(MockRemote::new());
    remote.set_response(META, metadata(10, json!({})));

    let id = Uuid::new_v4();
    remote.set_response(page_url(0, 1), page(vec![], 1));
    remote.set_response(page_url(0, 10), page(vec![article(id, "en", "A")], 1));

    let store = Arc::new(MemoryStore::new().with_known_type("node"));
    let engine = build_engine(remote, Arc::clone(&store), pipeline());

    let doomed = engine.prepare_run("site_a", "articles", "default").unwrap();
    doomed.cancel();

    // The pending cancel on one session must not touch a different run.
    let healthy = engine.prepare_run("site_a", "articles", "default").unwrap();
    let summary = engine.import_channel(&healthy).unwrap();
    assert_eq!(summary.imported, 1);

    // And the cancelled session stays cancelled.
    assert!(matches!(
        engine.import_channel(&doomed),
        Err(EngineError::Cancelled)
    ));
}

#[test]
fn run_overrides_do_not_leak_into_later_runs() {
    let remote = Arc::new(MockRemote::new());
    remote.set_response(META, metadata(10, json!({})));

    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    remote.set_response(page_url(0, 1), page(vec![], 1));
    remote.set_response(
        page_url(0, 10),
        page(vec![with_reference(article(a, "en", "A"), "next", b)], 1),
    );
    remote.set_response(filter_url(b), page(vec![article(b, "en", "B")], 1));

    // No skip-synchronized here so the second run walks A again.
    let unbounded = PipelineConfig::new("default").with_processor(
        "entity_reference",
        ProcessorSettings::new().with("max_recursion_depth", json!(-1)),
    );

    let store = Arc::new(MemoryStore::new().with_known_type("node"));
    let engine = build_engine(Arc::clone(&remote), Arc::clone(&store), unbounded);

    let mut overrides = BTreeMap::new();
    overrides.insert(
        "entity_reference".to_string(),
        ProcessorSettings::new().with("max_recursion_depth", json!(0)),
    );
    let session = engine
        .prepare_run("site_a", "articles", "default")
        .unwrap()
        .with_overrides(overrides);
    engine.import_channel(&session).unwrap();
    assert_eq!(store.item_count(), 1);

    // A fresh session without overrides resolves references again.
    let session = engine.prepare_run("site_a", "articles", "default").unwrap();
    engine.import_channel(&session).unwrap();
    assert_eq!(store.item_count(), 2);
}
