//! 테이블 레이아웃(고정 행, 사용자 정렬) 저장소.
//!
//! 레이아웃은 표시 순서에만 영향을 주며 행 데이터보다 우선하지 않습니다.
//! 저장은 디바운스되고 실패해도 데이터 흐름에 전파되지 않습니다.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{DataError, DataResult};

/// 테이블 하나의 사용자 표시 설정.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TableLayout {
    /// 고정 행 (등록 순서)
    pub pinned: Vec<String>,
    /// 사용자가 지정한 표시 순서
    pub moved: Vec<String>,
}

impl TableLayout {
    pub fn is_pinned(&self, symbol: &str) -> bool {
        self.pinned.iter().any(|s| s == symbol)
    }

    pub fn pin_position(&self, symbol: &str) -> Option<usize> {
        self.pinned.iter().position(|s| s == symbol)
    }

    pub fn moved_position(&self, symbol: &str) -> Option<usize> {
        self.moved.iter().position(|s| s == symbol)
    }

    /// 이미 고정된 종목이면 `false`.
    pub fn pin(&mut self, symbol: &str) -> bool {
        if self.is_pinned(symbol) {
            return false;
        }
        self.pinned.push(symbol.to_string());
        true
    }

    pub fn unpin(&mut self, symbol: &str) -> bool {
        let before = self.pinned.len();
        self.pinned.retain(|s| s != symbol);
        self.pinned.len() != before
    }

    /// 행 드래그가 끝나면 전체 표시 순서를 기록합니다.
    pub fn record_display_order<I, S>(&mut self, symbols: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.moved.clear();
        for symbol in symbols {
            let symbol = symbol.into();
            if !self.moved.contains(&symbol) {
                self.moved.push(symbol);
            }
        }
    }

    /// 고정을 모두 해제하고 스냅샷 순서로 되돌립니다.
    pub fn reset<I, S>(&mut self, snapshot_order: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pinned.clear();
        self.record_display_order(snapshot_order);
    }
}

/// 테이블 종류 식별자를 키로 하는 레이아웃 저장소.
#[async_trait]
pub trait LayoutStore: Send + Sync {
    async fn load(&self, table: &str) -> DataResult<Option<TableLayout>>;
    async fn save(&self, table: &str, layout: &TableLayout) -> DataResult<()>;
}

/// 디렉터리에 테이블별 JSON 파일로 저장.
#[derive(Debug, Clone)]
pub struct JsonFileLayoutStore {
    dir: PathBuf,
}

impl JsonFileLayoutStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, table: &str) -> PathBuf {
        let name: String = table
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

#[async_trait]
impl LayoutStore for JsonFileLayoutStore {
    async fn load(&self, table: &str) -> DataResult<Option<TableLayout>> {
        let path = self.file_for(table);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, table: &str, layout: &TableLayout) -> DataResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.file_for(table);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(layout)?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

/// 메모리 저장소 (테스트, 저장 비활성화 실행용).
#[derive(Debug, Default)]
pub struct MemoryLayoutStore {
    layouts: Mutex<HashMap<String, TableLayout>>,
    saves: Mutex<Vec<String>>,
    fail_saves: std::sync::atomic::AtomicBool,
}

impl MemoryLayoutStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, table: &str) -> Option<TableLayout> {
        self.layouts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(table)
            .cloned()
    }

    /// 지금까지 수행된 저장 호출의 테이블 키 목록.
    pub fn save_log(&self) -> Vec<String> {
        self.saves
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl LayoutStore for MemoryLayoutStore {
    async fn load(&self, table: &str) -> DataResult<Option<TableLayout>> {
        Ok(self.get(table))
    }

    async fn save(&self, table: &str, layout: &TableLayout) -> DataResult<()> {
        self.saves
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(table.to_string());
        if self.fail_saves.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(DataError::Io("layout store unavailable".to_string()));
        }
        self.layouts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(table.to_string(), layout.clone());
        Ok(())
    }
}

struct SaveRequest {
    table: String,
    layout: TableLayout,
}

/// 디바운스된 fire-and-forget 저장기.
///
/// 마지막 변경 후 `delay` 동안 추가 변경이 없으면 테이블별 최신 레이아웃을
/// 저장합니다. 저장 실패는 로그만 남깁니다.
pub struct DebouncedSaver {
    tx: mpsc::UnboundedSender<SaveRequest>,
    handle: JoinHandle<()>,
}

impl DebouncedSaver {
    pub fn spawn(store: Arc<dyn LayoutStore>, delay: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_saver(rx, store, delay));
        Self { tx, handle }
    }

    /// 저장 예약. 호출자는 완료를 기다리지 않습니다.
    pub fn schedule(&self, table: impl Into<String>, layout: TableLayout) {
        let request = SaveRequest {
            table: table.into(),
            layout,
        };
        if self.tx.send(request).is_err() {
            debug!("레이아웃 저장기가 이미 종료됨");
        }
    }

    /// 대기 중인 저장을 모두 처리하고 종료합니다.
    pub async fn flush(self) {
        drop(self.tx);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "레이아웃 저장기 종료 실패");
        }
    }
}

impl std::fmt::Debug for DebouncedSaver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebouncedSaver")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

async fn run_saver(
    mut rx: mpsc::UnboundedReceiver<SaveRequest>,
    store: Arc<dyn LayoutStore>,
    delay: Duration,
) {
    let mut pending: BTreeMap<String, TableLayout> = BTreeMap::new();
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            request = rx.recv() => match request {
                Some(SaveRequest { table, layout }) => {
                    pending.insert(table, layout);
                    deadline = Some(Instant::now() + delay);
                }
                None => {
                    flush_pending(store.as_ref(), &mut pending).await;
                    break;
                }
            },
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                flush_pending(store.as_ref(), &mut pending).await;
            }
        }
    }
}

async fn flush_pending(store: &dyn LayoutStore, pending: &mut BTreeMap<String, TableLayout>) {
    for (table, layout) in std::mem::take(pending) {
        match store.save(&table, &layout).await {
            Ok(()) => debug!(table = %table, "레이아웃 저장"),
            Err(e) => warn!(table = %table, error = %e, "레이아웃 저장 실패 (무시)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_unpin_keeps_registration_order() {
        let mut layout = TableLayout::default();
        assert!(layout.pin("CCC"));
        assert!(layout.pin("AAA"));
        assert!(!layout.pin("CCC"));
        assert_eq!(layout.pinned, vec!["CCC", "AAA"]);
        assert_eq!(layout.pin_position("AAA"), Some(1));

        assert!(layout.unpin("CCC"));
        assert!(!layout.unpin("CCC"));
        assert_eq!(layout.pinned, vec!["AAA"]);
    }

    #[test]
    fn test_reset_restores_snapshot_order() {
        let mut layout = TableLayout::default();
        layout.pin("BBB");
        layout.record_display_order(["CCC", "AAA", "BBB"]);
        assert_eq!(layout.moved_position("CCC"), Some(0));

        layout.reset(["AAA", "BBB", "CCC"]);
        assert!(layout.pinned.is_empty());
        assert_eq!(layout.moved, vec!["AAA", "BBB", "CCC"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_saver_coalesces_changes() {
        let store = Arc::new(MemoryLayoutStore::new());
        let saver = DebouncedSaver::spawn(store.clone(), Duration::from_millis(500));

        for symbol in ["AAA", "BBB", "CCC"] {
            let mut layout = TableLayout::default();
            layout.pin(symbol);
            saver.schedule("price_board:hose", layout);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(store.save_log().is_empty());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(store.save_log(), vec!["price_board:hose"]);
        assert_eq!(store.get("price_board:hose").unwrap().pinned, vec!["CCC"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_failure_is_swallowed() {
        let store = Arc::new(MemoryLayoutStore::new());
        store.fail_saves(true);
        let saver = DebouncedSaver::spawn(store.clone(), Duration::from_millis(500));

        saver.schedule("portfolio", TableLayout::default());
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(store.save_log().len(), 1);

        // 실패 후에도 저장기는 계속 동작
        store.fail_saves(false);
        let mut layout = TableLayout::default();
        layout.pin("AAA");
        saver.schedule("portfolio", layout);
        saver.flush().await;
        assert_eq!(store.get("portfolio").unwrap().pinned, vec!["AAA"]);
    }
}
