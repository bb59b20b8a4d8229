//! JSON 파일 레이아웃 저장소 테스트.

use std::sync::Arc;
use std::time::Duration;
use terminal_data::{DebouncedSaver, JsonFileLayoutStore, LayoutStore, TableLayout};

fn temp_store() -> JsonFileLayoutStore {
    let dir = std::env::temp_dir().join(format!("terminal-layout-{}", uuid::Uuid::new_v4()));
    JsonFileLayoutStore::new(dir)
}

#[tokio::test]
async fn missing_layout_loads_as_none() {
    let store = temp_store();
    assert_eq!(store.load("price_board:hose").await.unwrap(), None);
}

#[tokio::test]
async fn saved_layout_is_reloaded() {
    let store = temp_store();
    let mut layout = TableLayout::default();
    layout.pin("BBB");
    layout.record_display_order(["CCC", "AAA"]);

    store.save("price_board:hose", &layout).await.unwrap();
    let loaded = store.load("price_board:hose").await.unwrap();
    assert_eq!(loaded, Some(layout));

    // 다른 테이블 키와 섞이지 않음
    assert_eq!(store.load("portfolio").await.unwrap(), None);

    let _ = tokio::fs::remove_dir_all(store.dir()).await;
}

#[tokio::test]
async fn saver_flushes_pending_layout_on_shutdown() {
    let store = Arc::new(temp_store());
    let saver = DebouncedSaver::spawn(store.clone(), Duration::from_secs(60));

    let mut layout = TableLayout::default();
    layout.pin("AAA");
    saver.schedule("derivatives:vnf", layout.clone());
    saver.flush().await;

    assert_eq!(store.load("derivatives:vnf").await.unwrap(), Some(layout));
    let _ = tokio::fs::remove_dir_all(store.dir()).await;
}
