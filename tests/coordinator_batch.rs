mod common;

use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use clipscript::core::config::EngineConfig;
use clipscript::core::item::{ClipboardItem, ContentType};
use clipscript::core::script::{UserScript, trigger};
use clipscript::core::store::{MemoryStore, SqliteStore};
use clipscript::scripts::{
    BatchStatus, ExecutionCoordinator, ExecutionRequest, ScriptEvent, TriggerDispatcher,
};

use common::{Host, SeedDb, text_item};

fn config_with_timeout(timeout_ms: u64) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.execution.timeout_ms = timeout_ms;
    config
}

#[tokio::test(flavor = "multi_thread")]
async fn timed_out_script_does_not_block_the_next_one() {
    let host = Host::new();
    let store = Arc::new(
        MemoryStore::new()
            .with_item(text_item("i1", "hello"))
            .with_script(UserScript::new("spin", "Spin", "while true { }").with_sort_order(2))
            .with_script(
                UserScript::new(
                    "copy",
                    "Copy",
                    "import { csCopyText } from '@clipsave/api'\ncsCopyText(item.Content);",
                )
                .with_sort_order(1),
            ),
    );
    let coordinator = ExecutionCoordinator::from_config(
        store.clone(),
        store,
        host.capabilities(),
        &config_with_timeout(150),
    );

    let report = coordinator
        .handle(ExecutionRequest::new("i1", trigger::AFTER_SAVE))
        .await;

    assert_eq!(report.status, BatchStatus::Completed);
    assert_eq!(
        report.outcomes[0].result.error.as_deref(),
        Some("script execution timed out after 150 ms")
    );
    assert!(report.outcomes[1].result.is_ok());
    assert_eq!(host.clipboard.writes(), vec!["hello"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn listener_runs_every_request_and_reports_results() {
    let host = Host::new();
    let store = Arc::new(
        MemoryStore::new()
            .with_item(text_item("a", "alpha"))
            .with_item(text_item("b", "beta"))
            .with_script(UserScript::new("len", "Length", "item.Content.len()")),
    );
    let coordinator = Arc::new(ExecutionCoordinator::from_config(
        store.clone(),
        store,
        host.capabilities(),
        &EngineConfig::default(),
    ));
    let mut events = coordinator.events().subscribe();

    let (tx, rx) = mpsc::channel(8);
    let listener = coordinator.clone().listen(rx);
    tx.send(ExecutionRequest::new("a", trigger::AFTER_SAVE))
        .await
        .unwrap();
    tx.send(ExecutionRequest::new("b", trigger::AFTER_SAVE))
        .await
        .unwrap();
    tx.send(ExecutionRequest::new("missing", trigger::AFTER_SAVE))
        .await
        .unwrap();
    drop(tx);
    listener.await.unwrap();

    let mut lengths = HashMap::new();
    while let Ok(event) = events.try_recv() {
        if let ScriptEvent::Finished {
            item_id, result, ..
        } = event
        {
            lengths.insert(item_id, result.return_value);
        }
    }
    assert_eq!(lengths.len(), 2);
    assert_eq!(lengths["a"], Some(json!(5)));
    assert_eq!(lengths["b"], Some(json!(4)));
}

#[tokio::test(flavor = "multi_thread")]
async fn saved_image_flows_from_dispatcher_through_sqlite() {
    let tmpdir = tempfile::tempdir().unwrap();
    let path = tmpdir.path().join("clipboard.db");

    let mut image = ClipboardItem::from_text("", ContentType::Image);
    image.id = "img-1".to_string();
    image.image_data = Some(vec![0xff, 0xd8, 0xff]);

    SeedDb::create(&path)
        .item(&image)
        .script(
            &UserScript::new("size", "Size", "item.ImageData.len()")
                .with_content_types(["Image"])
                .with_sort_order(2),
        )
        .script(&UserScript::new("text-only", "Text", "1").with_content_types(["Text"]))
        .script(&UserScript::new("later", "Later", "item.ContentType").with_sort_order(1));

    let store = Arc::new(SqliteStore::open(&path).unwrap());

    let request = TriggerDispatcher::new(store.clone())
        .after_save(&image)
        .await
        .unwrap();
    assert_eq!(
        request.script_ids,
        Some(vec!["size".to_string(), "later".to_string()])
    );
    assert!(request.item.as_ref().unwrap().image_data.is_none());

    // The request crosses the channel as JSON, like the capture side sends it.
    let wire = serde_json::to_string(&request).unwrap();
    let request: ExecutionRequest = serde_json::from_str(&wire).unwrap();

    let host = Host::new();
    let coordinator = ExecutionCoordinator::from_config(
        store.clone(),
        store,
        host.capabilities(),
        &EngineConfig::default(),
    );
    let report = coordinator.handle(request).await;

    assert_eq!(report.script_ids(), vec!["size", "later"]);
    // base64 of three bytes is four characters
    assert_eq!(report.outcomes[0].result.return_value, Some(json!(4)));
    assert_eq!(report.outcomes[1].result.return_value, Some(json!("Image")));
}
