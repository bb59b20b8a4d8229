//! 워크스페이스: 마운트된 테이블과 연결 관리자를 소유하는 이벤트 루프.
//!
//! 모든 조정 로직은 하나의 태스크에서 도착 순서대로 실행됩니다. 대기 지점은
//! REST 응답과 다음 스트림 메시지뿐입니다.
//!
//! ```text
//!  LinkEvent ──► ConnectionManager ──► InboundFrame ──► Reconciler (테이블별)
//!  FetchOutcome ─────────────────────────────────────► Reconciler::load_snapshot
//!  WorkspaceCommand (마운트, 레이아웃, 필터, 네트워크 상태)
//!  타이머 (합계 throttle, 재조회 throttle)
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use terminal_core::{AppConfig, BoardConfig, CredentialProvider, TableKind};
use terminal_data::{
    DataError, DataResult, DebouncedSaver, FetchTicket, LayoutStore, Snapshot, SnapshotQuery,
    SnapshotSource, TableLayout,
};
use terminal_stream::{
    ConnectionManager, Connector, ControlFrame, InboundFrame, LinkEvent, StreamClass,
    StreamEvent, SESSION_ATC,
};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument};

use crate::error::{BoardError, BoardResult};
use crate::events::{BoardEvent, TableId};
use crate::projection::ProjectedView;
use crate::table::{BoardTable, FetchPurpose, TableSpec};

const COMMAND_BUFFER: usize = 64;

/// 외부 협력자 묶음.
#[derive(Clone)]
pub struct WorkspaceDeps {
    pub connector: Arc<dyn Connector>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub source: Arc<dyn SnapshotSource>,
    pub layouts: Arc<dyn LayoutStore>,
}

/// 완료된 스냅샷 조회.
#[derive(Debug)]
pub struct FetchOutcome {
    table: TableId,
    purpose: FetchPurpose,
    ticket: FetchTicket,
    result: DataResult<Snapshot>,
}

/// 이벤트 루프로 보내는 명령.
#[derive(Debug)]
pub enum WorkspaceCommand {
    Mount {
        spec: TableSpec,
        reply: oneshot::Sender<TableId>,
    },
    Unmount(TableId),
    Refresh(TableId),
    SetFilter {
        table: TableId,
        filter: Option<String>,
    },
    Pin {
        table: TableId,
        symbol: String,
    },
    Unpin {
        table: TableId,
        symbol: String,
    },
    RecordDisplayOrder {
        table: TableId,
        symbols: Vec<String>,
    },
    ResetLayout(TableId),
    Project {
        table: TableId,
        reply: oneshot::Sender<Option<ProjectedView>>,
    },
    Online,
    Offline,
    Visibility(bool),
    CredentialsChanged,
    Shutdown,
}

pub struct Workspace {
    config: BoardConfig,
    manager: ConnectionManager,
    link_rx: mpsc::Receiver<LinkEvent>,
    source: Arc<dyn SnapshotSource>,
    layouts: Arc<dyn LayoutStore>,
    saver: DebouncedSaver,
    tables: BTreeMap<TableId, BoardTable>,
    fetch_tx: mpsc::UnboundedSender<FetchOutcome>,
    fetch_rx: mpsc::UnboundedReceiver<FetchOutcome>,
    events: broadcast::Sender<BoardEvent>,
    /// 시장별 현재 세션
    sessions: HashMap<String, String>,
    next_table: u64,
}

impl Workspace {
    /// 워크스페이스를 생성합니다. tokio 런타임 안에서 호출해야 합니다.
    pub fn new(config: &AppConfig, deps: WorkspaceDeps) -> Self {
        let (manager, link_rx) =
            ConnectionManager::new(&config.stream, deps.connector, deps.credentials);
        let (fetch_tx, fetch_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(config.board.event_buffer.max(1));
        let saver = DebouncedSaver::spawn(deps.layouts.clone(), config.persistence.save_debounce());

        Self {
            config: config.board.clone(),
            manager,
            link_rx,
            source: deps.source,
            layouts: deps.layouts,
            saver,
            tables: BTreeMap::new(),
            fetch_tx,
            fetch_rx,
            events,
            sessions: HashMap::new(),
            next_table: 0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.events.subscribe()
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn table(&self, id: TableId) -> Option<&BoardTable> {
        self.tables.get(&id)
    }

    pub fn project(&self, id: TableId) -> Option<ProjectedView> {
        self.tables.get(&id).map(BoardTable::project)
    }

    pub fn sessions(&self) -> &HashMap<String, String> {
        &self.sessions
    }

    // ==================== 마운트 ====================

    /// 테이블을 마운트합니다.
    ///
    /// 저장된 레이아웃을 읽고, 필요한 스트림의 소비자로 등록한 뒤 스냅샷 조회를 시작합니다.
    pub async fn mount(&mut self, spec: TableSpec) -> TableId {
        self.next_table += 1;
        let id = TableId(self.next_table);

        let layout_key = spec.layout_key();
        let layout = match self.layouts.load(&layout_key).await {
            Ok(layout) => layout.unwrap_or_default(),
            Err(e) => {
                warn!(table = %id, layout = %layout_key, error = %e, "레이아웃 로드 실패, 기본값 사용");
                TableLayout::default()
            }
        };

        let mut table = BoardTable::new(id, spec, layout, &self.config, self.events.clone());
        table.reconciler.update_sessions(&self.sessions, Instant::now());
        for class in table.spec.stream_classes() {
            let consumer = self.manager.acquire(class);
            table.consumers.push((class, consumer));
        }

        info!(table = %id, kind = %table.spec.kind(), layout = %layout_key, "테이블 마운트");
        self.tables.insert(id, table);
        self.start_fetch(id, FetchPurpose::Snapshot);
        id
    }

    /// 테이블을 언마운트합니다. 진행 중인 조회는 취소되고 관심은 해제됩니다.
    pub fn unmount(&mut self, id: TableId) -> BoardResult<()> {
        let mut table = self.tables.remove(&id).ok_or(BoardError::TableNotFound(id))?;
        table.snapshot_gate.cancel();
        table.enrich_gate.cancel();
        for interest in &table.interests {
            self.manager.remove_interest(StreamClass::MarketData, interest);
        }
        for (class, consumer) in table.consumers.drain(..) {
            self.manager.release(class, consumer);
        }
        info!(table = %id, "테이블 언마운트");
        Ok(())
    }

    /// 스냅샷을 다시 조회합니다. 진행 중인 이전 조회는 취소됩니다.
    pub fn refresh(&mut self, id: TableId) -> BoardResult<()> {
        if !self.tables.contains_key(&id) {
            return Err(BoardError::TableNotFound(id));
        }
        self.start_fetch(id, FetchPurpose::Snapshot);
        Ok(())
    }

    fn start_fetch(&mut self, id: TableId, purpose: FetchPurpose) {
        let Some(table) = self.tables.get_mut(&id) else {
            return;
        };

        let (query, ticket) = match purpose {
            FetchPurpose::Snapshot => {
                // 새 스냅샷이 오면 이전 보강 결과는 의미가 없음
                table.enrich_gate.cancel();
                (table.spec.snapshot_query(), table.snapshot_gate.begin())
            }
            FetchPurpose::Enrich => (
                SnapshotQuery::symbols(table.reconciler.interesting().iter().cloned()),
                table.enrich_gate.begin(),
            ),
        };

        debug!(table = %id, ?purpose, query = %query, seq = ticket.seq(), "스냅샷 조회 시작");
        let source = self.source.clone();
        let tx = self.fetch_tx.clone();
        let span = terminal_core::table_span!("snapshot_fetch", id, table.spec.kind());
        tokio::spawn(
            async move {
                let result = ticket.run(source.fetch(&query)).await;
                let _ = tx.send(FetchOutcome {
                    table: id,
                    purpose,
                    ticket,
                    result,
                });
            }
            .instrument(span),
        );
    }

    /// 완료된 조회를 반영합니다. 대체되었거나 취소된 조회의 결과는 버립니다.
    pub fn handle_fetch(&mut self, outcome: FetchOutcome) {
        let FetchOutcome {
            table: id,
            purpose,
            ticket,
            result,
        } = outcome;

        let Some(table) = self.tables.get_mut(&id) else {
            debug!(table = %id, "언마운트된 테이블의 조회 결과 폐기");
            return;
        };
        let gate = match purpose {
            FetchPurpose::Snapshot => &mut table.snapshot_gate,
            FetchPurpose::Enrich => &mut table.enrich_gate,
        };
        if !gate.accept(&ticket) {
            debug!(table = %id, seq = ticket.seq(), "대체된 조회 결과 폐기");
            return;
        }

        match (purpose, result) {
            (FetchPurpose::Snapshot, Ok(snapshot)) => self.commit_snapshot(id, snapshot),
            (FetchPurpose::Enrich, Ok(snapshot)) => {
                let changed = table.reconciler.apply_records(snapshot.rows, Instant::now());
                debug!(table = %id, rows = changed.len(), "잔고 시세 보강");
            }
            (_, Err(DataError::Cancelled)) => {}
            (purpose, Err(e)) => {
                let transient = e.is_transient();
                let error = BoardError::from(e);
                if purpose == FetchPurpose::Snapshot && error.is_user_visible() {
                    warn!(table = %id, error = %error, "스냅샷 조회 실패");
                    let _ = self.events.send(BoardEvent::FetchFailed {
                        table: id,
                        message: error.to_string(),
                    });
                } else if transient {
                    // 일시적 전송 오류: 기존 상태 유지
                    debug!(table = %id, ?purpose, error = %error, "조회 실패 (무시)");
                } else {
                    warn!(table = %id, ?purpose, error = %error, "조회 응답 처리 실패, 기존 상태 유지");
                }
            }
        }
    }

    fn commit_snapshot(&mut self, id: TableId, snapshot: Snapshot) {
        let Some(table) = self.tables.get_mut(&id) else {
            return;
        };
        table
            .reconciler
            .load_snapshot(snapshot.rows, snapshot.loaded_at);

        // 새 관심을 먼저 등록해야 겹치는 종목이 해제 후 재구독되지 않음
        let interests = table.spec.interests(table.reconciler.interesting());
        let previous = std::mem::replace(&mut table.interests, interests.clone());
        for interest in interests {
            self.manager.add_interest(StreamClass::MarketData, interest);
        }
        for interest in &previous {
            self.manager.remove_interest(StreamClass::MarketData, interest);
        }

        let enrich = table.spec.kind() == TableKind::Portfolio
            && !table.reconciler.interesting().is_empty();
        if enrich {
            self.start_fetch(id, FetchPurpose::Enrich);
        }
    }

    // ==================== 스트림 ====================

    /// 연결 이벤트를 처리하고 수신 프레임을 테이블에 분배합니다.
    pub fn handle_link_event(&mut self, event: LinkEvent) {
        if let Some(StreamEvent::Frame { class, frame }) = self.manager.handle_link_event(event) {
            self.dispatch_frame(class, frame, Instant::now());
        }
    }

    fn dispatch_frame(&mut self, class: StreamClass, frame: InboundFrame, now: Instant) {
        match frame {
            InboundFrame::Board(delta) => {
                if class != StreamClass::MarketData {
                    return;
                }
                // 도착 순서대로 즉시 반영 (묶지 않음)
                for table in self.tables.values_mut() {
                    table.reconciler.apply_delta(&delta, now);
                }
            }
            InboundFrame::Index(tick) => {
                for table in self.tables.values_mut() {
                    if table.spec.underlying_index() == Some(tick.index.as_str()) {
                        table.reconciler.apply_index(tick.value, now);
                    }
                }
            }
            InboundFrame::Control(control) => self.handle_control(control, now),
            InboundFrame::Unknown(tag) => debug!(%class, tag = %tag, "처리하지 않는 프레임"),
        }
    }

    fn handle_control(&mut self, control: ControlFrame, now: Instant) {
        if control.is_refresh_request() {
            let boards: Vec<TableId> = self
                .tables
                .values()
                .filter(|t| t.spec.kind() != TableKind::Portfolio)
                .map(BoardTable::id)
                .collect();
            info!(tables = boards.len(), "시스템 상태 변경, 시세판 재조회");
            for id in boards {
                self.start_fetch(id, FetchPurpose::Snapshot);
            }
            return;
        }

        match control {
            ControlFrame::SessionNotice { market, session } => {
                debug!(market = %market, session = %session, "세션 알림");
                let update = HashMap::from([(market.clone(), session.clone())]);
                self.sessions.extend(update.clone());
                for table in self.tables.values_mut() {
                    table.reconciler.update_sessions(&update, now);
                    if session == SESSION_ATC && table.spec.is_market(&market) {
                        let cleared = table.reconciler.clear_matched(now);
                        info!(table = %table.id, market = %market, rows = cleared.len(), "동시호가 진입, 체결 정보 초기화");
                    }
                }
            }
            ControlFrame::OrderUpdate { account_id, .. } => {
                let targets: Vec<TableId> = self
                    .tables
                    .values()
                    .filter(|t| t.spec.account_id() == Some(account_id.as_str()))
                    .map(BoardTable::id)
                    .collect();
                for id in targets {
                    self.request_refetch(id, now);
                }
            }
            _ => {}
        }
    }

    /// 주문 알림에 의한 재조회 (초당 1회, trailing 포함).
    fn request_refetch(&mut self, id: TableId, now: Instant) {
        let Some(table) = self.tables.get_mut(&id) else {
            return;
        };
        if table.refetch_throttle.request(now) {
            self.start_fetch(id, FetchPurpose::Snapshot);
        } else {
            debug!(table = %id, "재조회 예약 (throttle)");
        }
    }

    // ==================== 타이머 ====================

    /// 가장 가까운 타이머 만료 시각.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.tables.values().filter_map(BoardTable::next_deadline).min()
    }

    /// 만료된 합계 재계산과 예약된 재조회를 실행합니다.
    pub fn poll_timers(&mut self, now: Instant) {
        let mut refetch = Vec::new();
        for (id, table) in self.tables.iter_mut() {
            table.reconciler.poll_footer(now);
            if table.refetch_throttle.poll_trailing(now) {
                refetch.push(*id);
            }
        }
        for id in refetch {
            self.start_fetch(id, FetchPurpose::Snapshot);
        }
    }

    // ==================== 레이아웃 / 필터 ====================

    pub fn pin(&mut self, id: TableId, symbol: &str) -> BoardResult<bool> {
        self.edit_layout(id, |layout| layout.pin(symbol))
    }

    pub fn unpin(&mut self, id: TableId, symbol: &str) -> BoardResult<bool> {
        self.edit_layout(id, |layout| layout.unpin(symbol))
    }

    /// 행 드래그 종료: 현재 표시 순서 전체를 저장합니다.
    pub fn record_display_order(&mut self, id: TableId, symbols: Vec<String>) -> BoardResult<bool> {
        self.edit_layout(id, |layout| {
            let before = layout.moved.clone();
            layout.record_display_order(symbols);
            layout.moved != before
        })
    }

    /// 고정을 해제하고 스냅샷 순서로 되돌립니다.
    pub fn reset_layout(&mut self, id: TableId) -> BoardResult<bool> {
        let order = self
            .tables
            .get(&id)
            .map(BoardTable::snapshot_order)
            .ok_or(BoardError::TableNotFound(id))?;
        self.edit_layout(id, |layout| {
            let before = layout.clone();
            layout.reset(order);
            *layout != before
        })
    }

    fn edit_layout<F>(&mut self, id: TableId, edit: F) -> BoardResult<bool>
    where
        F: FnOnce(&mut TableLayout) -> bool,
    {
        let table = self.tables.get_mut(&id).ok_or(BoardError::TableNotFound(id))?;
        if !edit(&mut table.layout) {
            return Ok(false);
        }
        // 저장 완료를 기다리지 않고 뷰부터 갱신
        self.saver
            .schedule(table.spec.layout_key(), table.layout.clone());
        let _ = self.events.send(BoardEvent::LayoutChanged { table: id });
        Ok(true)
    }

    /// 단일 종목 필터. `None`이나 빈 문자열이면 해제합니다.
    pub fn set_filter(&mut self, id: TableId, filter: Option<String>) -> BoardResult<()> {
        let table = self.tables.get_mut(&id).ok_or(BoardError::TableNotFound(id))?;
        if table.filter != filter {
            table.filter = filter;
            let _ = self.events.send(BoardEvent::LayoutChanged { table: id });
        }
        Ok(())
    }

    // ==================== 네트워크 / 화면 상태 ====================

    pub fn on_online(&mut self) {
        self.manager.on_online();
    }

    pub fn on_offline(&mut self) {
        self.manager.on_offline();
    }

    pub fn on_visibility(&mut self, visible: bool) {
        self.manager.on_visibility(visible, Instant::now());
    }

    pub fn on_credentials_changed(&mut self) {
        self.manager.on_credentials_changed();
    }

    // ==================== 이벤트 루프 ====================

    /// 도착해 있는 연결 이벤트를 모두 처리합니다.
    pub fn drain_link_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.link_rx.try_recv() {
            self.handle_link_event(event);
            handled += 1;
        }
        handled
    }

    /// 다음 조회 결과 하나를 기다려 반영합니다.
    pub async fn next_fetch(&mut self) {
        if let Some(outcome) = self.fetch_rx.recv().await {
            self.handle_fetch(outcome);
        }
    }

    async fn handle_command(&mut self, command: WorkspaceCommand) {
        let result = match command {
            WorkspaceCommand::Mount { spec, reply } => {
                let id = self.mount(spec).await;
                let _ = reply.send(id);
                Ok(())
            }
            WorkspaceCommand::Unmount(id) => self.unmount(id),
            WorkspaceCommand::Refresh(id) => self.refresh(id),
            WorkspaceCommand::SetFilter { table, filter } => self.set_filter(table, filter),
            WorkspaceCommand::Pin { table, symbol } => self.pin(table, &symbol).map(drop),
            WorkspaceCommand::Unpin { table, symbol } => self.unpin(table, &symbol).map(drop),
            WorkspaceCommand::RecordDisplayOrder { table, symbols } => {
                self.record_display_order(table, symbols).map(drop)
            }
            WorkspaceCommand::ResetLayout(id) => self.reset_layout(id).map(drop),
            WorkspaceCommand::Project { table, reply } => {
                let _ = reply.send(self.project(table));
                Ok(())
            }
            WorkspaceCommand::Online => {
                self.on_online();
                Ok(())
            }
            WorkspaceCommand::Offline => {
                self.on_offline();
                Ok(())
            }
            WorkspaceCommand::Visibility(visible) => {
                self.on_visibility(visible);
                Ok(())
            }
            WorkspaceCommand::CredentialsChanged => {
                self.on_credentials_changed();
                Ok(())
            }
            WorkspaceCommand::Shutdown => Ok(()),
        };
        if let Err(e) = result {
            warn!(error = %e, "명령 처리 실패");
        }
    }

    /// 명령 채널이 닫히거나 `Shutdown`을 받을 때까지 실행합니다.
    pub async fn run(mut self, mut commands: mpsc::Receiver<WorkspaceCommand>) {
        info!("워크스페이스 시작");
        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                Some(event) = self.link_rx.recv() => self.handle_link_event(event),
                Some(outcome) = self.fetch_rx.recv() => self.handle_fetch(outcome),
                command = commands.recv() => match command {
                    None | Some(WorkspaceCommand::Shutdown) => break,
                    Some(command) => self.handle_command(command).await,
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.poll_timers(Instant::now());
                }
            }
        }
        self.shutdown().await;
    }

    /// 이벤트 루프를 별도 태스크로 실행하고 핸들을 반환합니다.
    pub fn spawn(self) -> (WorkspaceHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = WorkspaceHandle {
            tx,
            events: self.events.clone(),
        };
        let task = tokio::spawn(self.run(rx));
        (handle, task)
    }

    /// 모든 테이블을 언마운트하고 연결을 닫은 뒤 대기 중인 레이아웃을 저장합니다.
    pub async fn shutdown(mut self) {
        let ids: Vec<TableId> = self.tables.keys().copied().collect();
        for id in ids {
            let _ = self.unmount(id);
        }
        self.manager.shutdown();
        self.saver.flush().await;
        info!("워크스페이스 종료");
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("tables", &self.tables.keys().collect::<Vec<_>>())
            .field("manager", &self.manager)
            .finish()
    }
}

/// 실행 중인 워크스페이스에 명령을 보내는 핸들.
#[derive(Debug, Clone)]
pub struct WorkspaceHandle {
    tx: mpsc::Sender<WorkspaceCommand>,
    events: broadcast::Sender<BoardEvent>,
}

impl WorkspaceHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.events.subscribe()
    }

    pub async fn send(&self, command: WorkspaceCommand) -> BoardResult<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| BoardError::WorkspaceClosed)
    }

    pub async fn mount(&self, spec: TableSpec) -> BoardResult<TableId> {
        let (reply, rx) = oneshot::channel();
        self.send(WorkspaceCommand::Mount { spec, reply }).await?;
        rx.await.map_err(|_| BoardError::WorkspaceClosed)
    }

    pub async fn project(&self, table: TableId) -> BoardResult<Option<ProjectedView>> {
        let (reply, rx) = oneshot::channel();
        self.send(WorkspaceCommand::Project { table, reply }).await?;
        rx.await.map_err(|_| BoardError::WorkspaceClosed)
    }

    pub async fn shutdown(&self) -> BoardResult<()> {
        self.send(WorkspaceCommand::Shutdown).await
    }
}
