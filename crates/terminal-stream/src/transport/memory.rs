//! 프로세스 내부 연결.
//!
//! 실제 네트워크 없이 연결 관리자를 구동할 때 사용합니다. 연결 요청마다
//! 상대편 역할을 하는 [`MemoryPeer`]가 만들어지며, 호출자가 열기/수신/종료를
//! 직접 일으킵니다.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::{ConnectRequest, Connector, LinkEvent, LinkEventKind, LinkHandle, LinkId, ReadyState};
use crate::manager::StreamClass;

const MEMORY_BUFFER: usize = 1024;

/// 연결의 상대편.
#[derive(Debug)]
pub struct MemoryPeer {
    request: ConnectRequest,
    outbound: mpsc::Receiver<String>,
    ready: watch::Sender<ReadyState>,
    cancel: CancellationToken,
}

impl MemoryPeer {
    pub fn class(&self) -> StreamClass {
        self.request.class
    }

    pub fn link(&self) -> LinkId {
        self.request.link
    }

    pub fn url(&self) -> &str {
        &self.request.url
    }

    /// 로컬에서 연결을 닫았는지 여부.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    async fn emit(&self, kind: LinkEventKind) {
        let _ = self
            .request
            .events
            .send(LinkEvent {
                class: self.request.class,
                link: self.request.link,
                kind,
            })
            .await;
    }

    /// 연결 성립.
    pub async fn open(&self) {
        let _ = self.ready.send(ReadyState::Open);
        self.emit(LinkEventKind::Open).await;
    }

    /// 서버 메시지 도착.
    pub async fn push(&self, text: impl Into<String>) {
        self.emit(LinkEventKind::Message(text.into())).await;
    }

    /// 연결 에러.
    pub async fn fail(&self, error: impl Into<String>) {
        let _ = self.ready.send(ReadyState::Closed);
        self.emit(LinkEventKind::Error(error.into())).await;
    }

    /// 연결 종료.
    pub async fn close(&self) {
        let _ = self.ready.send(ReadyState::Closed);
        self.emit(LinkEventKind::Closed { reason: None }).await;
    }

    /// 이벤트 없이 상태만 죽은 연결로 만듭니다 (백그라운드에서 조용히 끊긴 경우).
    pub fn go_silent(&self) {
        let _ = self.ready.send(ReadyState::Closed);
    }

    /// 지금까지 클라이언트가 보낸 프레임.
    pub fn drain_sent(&mut self) -> Vec<String> {
        let mut sent = Vec::new();
        while let Ok(text) = self.outbound.try_recv() {
            sent.push(text);
        }
        sent
    }
}

/// 프로세스 내부 연결 생성기.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    peers: Arc<Mutex<Vec<MemoryPeer>>>,
    connects: Arc<AtomicUsize>,
    /// 연결당 송신 큐 크기
    buffer: usize,
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::with_buffer(MEMORY_BUFFER)
    }
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 송신 큐 크기를 지정합니다 (상대편이 읽지 않을 때의 적체 재현용).
    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            peers: Arc::default(),
            connects: Arc::default(),
            buffer: buffer.max(1),
        }
    }

    /// 지금까지 만들어진 연결 수.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// 가장 최근에 만들어진 해당 종류의 연결을 꺼냅니다.
    pub fn take_peer(&self, class: StreamClass) -> Option<MemoryPeer> {
        let mut peers = self.peers.lock().unwrap_or_else(PoisonError::into_inner);
        let position = peers.iter().rposition(|peer| peer.class() == class)?;
        Some(peers.remove(position))
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, request: ConnectRequest) -> LinkHandle {
        let (outbound_tx, outbound_rx) = mpsc::channel(self.buffer);
        let (ready_tx, ready_rx) = watch::channel(ReadyState::Connecting);
        let cancel = CancellationToken::new();

        let handle = LinkHandle::new(request.link, outbound_tx, ready_rx, cancel.clone());
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MemoryPeer {
                request,
                outbound: outbound_rx,
                ready: ready_tx,
                cancel,
            });
        handle
    }
}
