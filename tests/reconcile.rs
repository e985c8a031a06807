use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use searchsync::error::SyncError;
use searchsync::indexer::{Indexer, IndexerOptions, RunState, SettingsOutcome, SyncStrategy};
use searchsync::models::{Hierarchy, Record, RecordType, Weight};
use searchsync::settings::{local_settings, merge_settings, setting_id};
use searchsync::store::memory::{InMemoryRemoteStore, StoreCall};

fn record(id: &str) -> Record {
    Record {
        object_id: id.to_string(),
        url: format!("/{}.html", id),
        record_type: RecordType::Page,
        title: Some(id.to_string()),
        slug: None,
        date: None,
        tags: vec![],
        hierarchy: Hierarchy::default(),
        anchor: None,
        weight: Weight {
            heading: 100,
            position: 0,
        },
        tag_name: "p".to_string(),
        html: format!("{} body", id),
        text: format!("{} body", id),
        excerpt_html: None,
        excerpt_text: None,
        extra: BTreeMap::new(),
    }
}

fn records(ids: &[&str]) -> Vec<Record> {
    ids.iter().map(|id| record(id)).collect()
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn settings(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("settings must be an object"),
    }
}

/// Remote settings as a previous run with default configuration left them.
fn synced_settings() -> Map<String, Value> {
    let local = local_settings(&Map::new());
    merge_settings(None, &local, &setting_id(&local), "0.1.0")
}

async fn indexer(store: &Arc<InMemoryRemoteStore>, options: IndexerOptions) -> Indexer {
    Indexer::init(store.clone(), options).await.unwrap()
}

#[tokio::test]
async fn diff_deletes_stale_and_uploads_new() {
    let store = Arc::new(InMemoryRemoteStore::new());
    store.seed_object_ids("docs", &["foo", "bar"]);
    store.seed_settings("docs", synced_settings());

    let mut indexer = indexer(&store, IndexerOptions::new("docs")).await;
    let report = indexer.run(&records(&["bar", "baz"])).await.unwrap();

    assert_eq!(
        store.calls(),
        vec![
            StoreCall::Delete {
                index: "docs".to_string(),
                object_ids: strings(&["foo"]),
            },
            StoreCall::Upsert {
                index: "docs".to_string(),
                object_ids: strings(&["baz"]),
            },
        ]
    );
    assert_eq!(store.object_ids("docs"), strings(&["bar", "baz"]));
    assert_eq!(report.deleted, 1);
    assert_eq!(report.uploaded, 1);
    assert_eq!(indexer.state(), RunState::Done);
}

#[tokio::test]
async fn identical_id_sets_write_nothing() {
    let store = Arc::new(InMemoryRemoteStore::new());
    store.seed_object_ids("docs", &["a", "b", "c"]);
    store.seed_settings("docs", synced_settings());

    let mut indexer = indexer(&store, IndexerOptions::new("docs")).await;
    let report = indexer.run(&records(&["c", "a", "b"])).await.unwrap();

    assert!(store.calls().is_empty());
    assert_eq!(report.uploaded, 0);
    assert_eq!(report.deleted, 0);
    assert_eq!(
        report.settings,
        SettingsOutcome::UpToDate {
            drifted_keys: vec![]
        }
    );
}

#[tokio::test]
async fn second_run_is_idempotent() {
    let store = Arc::new(InMemoryRemoteStore::new());
    let local = records(&["one", "two", "three"]);

    let mut first = indexer(&store, IndexerOptions::new("docs")).await;
    first.run(&local).await.unwrap();
    assert!(store
        .calls()
        .contains(&StoreCall::SetSettings {
            index: "docs".to_string()
        }));

    store.clear_calls();
    let mut second = indexer(&store, IndexerOptions::new("docs")).await;
    second.run(&local).await.unwrap();
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn remote_ids_are_paginated_and_sorted() {
    let store = Arc::new(InMemoryRemoteStore::with_page_size(2));
    store.seed_object_ids("docs", &["e", "c", "a", "d", "b"]);

    let mut indexer = indexer(&store, IndexerOptions::new("docs")).await;
    assert_eq!(
        indexer.remote_object_ids("docs").await.unwrap(),
        strings(&["a", "b", "c", "d", "e"])
    );
    assert!(indexer.remote_object_ids("missing").await.unwrap().is_empty());
    assert_eq!(
        Indexer::local_object_ids(&records(&["z", "x", "y"])),
        strings(&["x", "y", "z"])
    );
}

#[tokio::test]
async fn atomic_mode_only_touches_live_index_in_the_move() {
    let store = Arc::new(InMemoryRemoteStore::new());
    store.seed_object_ids("docs", &["old"]);
    store.seed_settings(
        "docs",
        settings(json!({
            "replicas": ["docs_by_date"],
            "userData": {"settingID": "foo"}
        })),
    );
    store.seed_object_ids("docs_tmp", &["leftover"]);

    let options = IndexerOptions {
        strategy: SyncStrategy::Atomic,
        batch_size: 2,
        ..IndexerOptions::new("docs")
    };
    let mut indexer = indexer(&store, options).await;
    let report = indexer.run(&records(&["a", "b", "c"])).await.unwrap();

    let calls = store.calls();
    let move_at = calls
        .iter()
        .position(|call| matches!(call, StoreCall::MoveIndex { .. }))
        .unwrap();
    assert_eq!(move_at, calls.len() - 1);
    for call in &calls[..move_at] {
        let index = match call {
            StoreCall::Upsert { index, .. }
            | StoreCall::Delete { index, .. }
            | StoreCall::SetSettings { index }
            | StoreCall::DeleteIndex { index } => index,
            StoreCall::MoveIndex { .. } => unreachable!(),
        };
        assert_eq!(index, "docs_tmp");
    }
    assert_eq!(calls[0], StoreCall::DeleteIndex { index: "docs_tmp".to_string() });

    assert_eq!(store.object_ids("docs"), strings(&["a", "b", "c"]));
    assert!(!store.index_exists("docs_tmp"));

    let live = store.settings("docs").unwrap();
    assert_eq!(live["replicas"], json!(["docs_by_date"]));
    let local_id = setting_id(&local_settings(&Map::new()));
    assert_eq!(live["userData"]["settingID"], json!(local_id));
    assert_eq!(report.batches, 2);
    assert_eq!(
        report.settings,
        SettingsOutcome::Pushed {
            setting_id: local_id
        }
    );
}

#[tokio::test]
async fn stale_settings_fingerprint_is_replaced() {
    let store = Arc::new(InMemoryRemoteStore::new());
    store.seed_settings(
        "docs",
        settings(json!({"distinct": false, "userData": {"settingID": "foo"}})),
    );

    let mut indexer = indexer(&store, IndexerOptions::new("docs")).await;
    let outcome = indexer.update_settings("docs").await.unwrap();

    let local_id = setting_id(&local_settings(&Map::new()));
    assert_eq!(
        outcome,
        SettingsOutcome::Pushed {
            setting_id: local_id.clone()
        }
    );
    let remote = store.settings("docs").unwrap();
    assert_eq!(remote["userData"]["settingID"], json!(local_id));
    assert_eq!(remote["distinct"], json!(true));

    store.clear_calls();
    let again = indexer.update_settings("docs").await.unwrap();
    assert!(matches!(again, SettingsOutcome::UpToDate { .. }));
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn manual_edits_are_reported_not_reverted() {
    let store = Arc::new(InMemoryRemoteStore::new());
    let mut remote = synced_settings();
    remote.insert("customRanking".to_string(), json!(["desc(views)"]));
    remote.insert("replicas".to_string(), json!(["docs_by_title"]));
    store.seed_settings("docs", remote);

    let mut indexer = indexer(&store, IndexerOptions::new("docs")).await;
    let outcome = indexer.update_settings("docs").await.unwrap();

    assert_eq!(
        outcome,
        SettingsOutcome::UpToDate {
            drifted_keys: strings(&["customRanking"])
        }
    );
    assert!(store.calls().is_empty());
    assert_eq!(
        store.settings("docs").unwrap()["customRanking"],
        json!(["desc(views)"])
    );
}

#[tokio::test]
async fn user_overrides_change_the_fingerprint() {
    let store = Arc::new(InMemoryRemoteStore::new());
    store.seed_settings("docs", synced_settings());

    let options = IndexerOptions {
        settings: settings(json!({"typoTolerance": "min"})),
        ..IndexerOptions::new("docs")
    };
    let mut indexer = indexer(&store, options).await;
    let outcome = indexer.update_settings("docs").await.unwrap();

    assert!(matches!(outcome, SettingsOutcome::Pushed { .. }));
    assert_eq!(store.settings("docs").unwrap()["typoTolerance"], json!("min"));
}

#[tokio::test]
async fn dry_run_never_writes() {
    for strategy in [SyncStrategy::Diff, SyncStrategy::Atomic] {
        let store = Arc::new(InMemoryRemoteStore::new());
        store.seed_object_ids("docs", &["foo", "bar"]);

        let options = IndexerOptions {
            strategy,
            dry_run: true,
            batch_size: 1,
            ..IndexerOptions::new("docs")
        };
        let mut indexer = indexer(&store, options).await;
        let report = indexer.run(&records(&["bar", "baz"])).await.unwrap();

        assert!(store.calls().is_empty(), "{:?} wrote in dry run", strategy);
        assert_eq!(store.object_ids("docs"), strings(&["bar", "foo"]));
        assert!(report.dry_run);
        assert!(matches!(report.settings, SettingsOutcome::WouldPush { .. }));
        match strategy {
            SyncStrategy::Diff => {
                assert_eq!(report.deleted, 1);
                assert_eq!(report.uploaded, 1);
            }
            SyncStrategy::Atomic => {
                assert_eq!(report.uploaded, 2);
                assert_eq!(report.batches, 2);
            }
        }
    }
}

#[tokio::test]
async fn failed_batch_stops_further_uploads() {
    let store = Arc::new(InMemoryRemoteStore::new());
    store.fail_upserts_after(1);

    let options = IndexerOptions {
        batch_size: 1,
        max_in_flight: 1,
        ..IndexerOptions::new("docs")
    };
    let mut indexer = indexer(&store, options).await;
    let err = indexer.run(&records(&["a", "b", "c"])).await.unwrap_err();

    assert!(matches!(err, SyncError::Remote(_)));
    assert_eq!(indexer.state(), RunState::Failed);
    assert_eq!(
        store.calls(),
        vec![StoreCall::Upsert {
            index: "docs".to_string(),
            object_ids: strings(&["a"]),
        }]
    );
}

#[tokio::test]
async fn failed_batch_drains_in_flight_and_starts_no_more() {
    let store = Arc::new(InMemoryRemoteStore::new());
    store.fail_upserts_after(2);

    let options = IndexerOptions {
        batch_size: 1,
        max_in_flight: 3,
        ..IndexerOptions::new("docs")
    };
    let mut indexer = indexer(&store, options).await;
    let err = indexer
        .run(&records(&["a", "b", "c", "d", "e", "f", "g", "h"]))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Remote(_)));
    assert_eq!(indexer.state(), RunState::Failed);
    let upserts = store
        .calls()
        .into_iter()
        .filter(|call| matches!(call, StoreCall::Upsert { .. }))
        .count();
    assert!(upserts <= 2, "{upserts} upserts after the failure");
    assert!(store.object_ids("docs").len() <= 2);
}

#[tokio::test]
async fn concurrent_batches_upload_everything() {
    let store = Arc::new(InMemoryRemoteStore::new());
    let options = IndexerOptions {
        batch_size: 2,
        max_in_flight: 3,
        ..IndexerOptions::new("docs")
    };
    let local = records(&["a", "b", "c", "d", "e", "f", "g"]);

    let mut indexer = indexer(&store, options).await;
    let summary = indexer.update_records("docs", &local).await.unwrap();

    assert_eq!(summary.batches, 4);
    assert_eq!(summary.records, 7);
    let upserts = store
        .calls()
        .iter()
        .filter(|call| matches!(call, StoreCall::Upsert { .. }))
        .count();
    assert_eq!(upserts, 4);
    assert_eq!(store.object_ids("docs").len(), 7);
}

#[tokio::test]
async fn empty_deletion_is_a_no_op() {
    let store = Arc::new(InMemoryRemoteStore::new());
    let mut indexer = indexer(&store, IndexerOptions::new("docs")).await;
    assert_eq!(indexer.delete_records_by_id("docs", &[]).await.unwrap(), 0);
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn empty_record_set_is_refused() {
    let store = Arc::new(InMemoryRemoteStore::new());
    store.seed_object_ids("docs", &["keep"]);

    let mut indexer = indexer(&store, IndexerOptions::new("docs")).await;
    let err = indexer.run(&[]).await.unwrap_err();

    assert!(matches!(err, SyncError::NoRecords { .. }));
    assert!(err.remediation().is_some());
    assert_eq!(indexer.state(), RunState::Failed);
    assert_eq!(store.object_ids("docs"), strings(&["keep"]));
}

#[tokio::test]
async fn rejected_credentials_fail_init() {
    let store = Arc::new(InMemoryRemoteStore::new());
    store.deny_access();
    let err = Indexer::init(store.clone(), IndexerOptions::new("docs"))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, SyncError::Credentials(_)));

    let open = Arc::new(InMemoryRemoteStore::new());
    let err = Indexer::init(open, IndexerOptions::new("")).await.err().unwrap();
    assert!(matches!(err, SyncError::Credentials(_)));
}
