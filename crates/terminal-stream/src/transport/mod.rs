//! 물리 연결 계층.
//!
//! [`Connector`]는 연결 하나를 백그라운드 태스크로 띄우고 즉시 [`LinkHandle`]을
//! 돌려줍니다. 연결에서 일어난 일은 모두 [`LinkEvent`]로 연결 관리자의 이벤트
//! 채널에 도착 순서대로 전달됩니다.

mod memory;
mod ws;

pub use memory::{MemoryConnector, MemoryPeer};
pub use ws::WsConnector;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{StreamError, StreamResult};
use crate::manager::StreamClass;

/// 연결 식별자. 연결을 새로 만들 때마다 증가합니다.
pub type LinkId = u64;

/// 전송 계층이 보고하는 연결 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// 연결 이벤트 종류.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEventKind {
    Open,
    Message(String),
    Error(String),
    Closed { reason: Option<String> },
}

/// 연결 이벤트.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkEvent {
    pub class: StreamClass,
    pub link: LinkId,
    pub kind: LinkEventKind,
}

/// 연결 요청.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub class: StreamClass,
    pub link: LinkId,
    /// 접속 주소 (토큰이 포함될 수 있으므로 로그에 남기지 않음)
    pub url: String,
    /// 이벤트를 보낼 채널
    pub events: mpsc::Sender<LinkEvent>,
}

/// 연결 생성기.
pub trait Connector: Send + Sync {
    /// 연결을 시작하고 핸들을 반환합니다. 연결 완료를 기다리지 않습니다.
    fn connect(&self, request: ConnectRequest) -> LinkHandle;
}

/// 살아 있는 연결 하나에 대한 핸들.
#[derive(Debug)]
pub struct LinkHandle {
    id: LinkId,
    outbound: mpsc::Sender<String>,
    ready: watch::Receiver<ReadyState>,
    cancel: CancellationToken,
}

impl LinkHandle {
    pub fn new(
        id: LinkId,
        outbound: mpsc::Sender<String>,
        ready: watch::Receiver<ReadyState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            outbound,
            ready,
            cancel,
        }
    }

    pub fn id(&self) -> LinkId {
        self.id
    }

    /// 전송 계층이 보고한 현재 상태.
    pub fn ready_state(&self) -> ReadyState {
        *self.ready.borrow()
    }

    /// 텍스트 프레임을 송신 큐에 넣습니다.
    pub fn send(&self, text: String) -> StreamResult<()> {
        self.outbound.try_send(text).map_err(|e| {
            warn!(link = self.id, "송신 큐에 넣지 못함: {}", e);
            StreamError::Disconnected(e.to_string())
        })
    }

    /// 연결을 닫습니다.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}
