//! tokio-tungstenite 기반 WebSocket 연결.

use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::interval;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{ConnectRequest, Connector, LinkEvent, LinkEventKind, LinkHandle, ReadyState};

/// Ping 간격 (초).
const PING_INTERVAL_SECS: u64 = 30;

/// WebSocket 연결 생성기.
#[derive(Debug, Clone)]
pub struct WsConnector {
    outbound_buffer: usize,
    ping_interval: Duration,
}

impl WsConnector {
    pub fn new(outbound_buffer: usize) -> Self {
        Self {
            outbound_buffer: outbound_buffer.max(1),
            ping_interval: Duration::from_secs(PING_INTERVAL_SECS),
        }
    }

    pub fn with_ping_interval(mut self, ping_interval: Duration) -> Self {
        self.ping_interval = ping_interval;
        self
    }
}

impl Connector for WsConnector {
    fn connect(&self, request: ConnectRequest) -> LinkHandle {
        let (outbound_tx, outbound_rx) = mpsc::channel(self.outbound_buffer);
        let (ready_tx, ready_rx) = watch::channel(ReadyState::Connecting);
        let cancel = CancellationToken::new();

        let handle = LinkHandle::new(request.link, outbound_tx, ready_rx, cancel.clone());
        tokio::spawn(run_link(
            request,
            outbound_rx,
            ready_tx,
            cancel,
            self.ping_interval,
        ));
        handle
    }
}

async fn emit(request: &ConnectRequest, kind: LinkEventKind) {
    let event = LinkEvent {
        class: request.class,
        link: request.link,
        kind,
    };
    if request.events.send(event).await.is_err() {
        debug!(class = %request.class, link = request.link, "이벤트 수신자가 없음");
    }
}

/// 연결 태스크 본체.
async fn run_link(
    request: ConnectRequest,
    mut outbound: mpsc::Receiver<String>,
    ready: watch::Sender<ReadyState>,
    cancel: CancellationToken,
    ping_every: Duration,
) {
    info!(class = %request.class, link = request.link, "WebSocket 연결 중");

    let connected = tokio::select! {
        _ = cancel.cancelled() => {
            let _ = ready.send(ReadyState::Closed);
            return;
        }
        result = connect_async(request.url.as_str()) => result,
    };

    let (ws_stream, _) = match connected {
        Ok(pair) => pair,
        Err(e) => {
            warn!(class = %request.class, link = request.link, "WebSocket 연결 실패: {}", e);
            let _ = ready.send(ReadyState::Closed);
            emit(&request, LinkEventKind::Error(e.to_string())).await;
            emit(&request, LinkEventKind::Closed { reason: Some(e.to_string()) }).await;
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();
    let _ = ready.send(ReadyState::Open);
    info!(class = %request.class, link = request.link, "WebSocket 연결 성공");
    emit(&request, LinkEventKind::Open).await;

    let mut ping = interval(ping_every);
    // 첫 tick은 즉시 완료됨
    ping.tick().await;

    let reason = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = ready.send(ReadyState::Closing);
                let _ = write.send(Message::Close(None)).await;
                break Some("로컬에서 종료".to_string());
            }
            Some(text) = outbound.recv() => {
                if let Err(e) = write.send(Message::Text(text)).await {
                    error!(class = %request.class, "송신 실패: {}", e);
                    break Some(e.to_string());
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        emit(&request, LinkEventKind::Message(text)).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        warn!(class = %request.class, "서버에서 연결 종료 요청");
                        break Some("서버 종료".to_string());
                    }
                    Some(Err(e)) => {
                        error!(class = %request.class, "WebSocket 수신 에러: {}", e);
                        emit(&request, LinkEventKind::Error(e.to_string())).await;
                        break Some(e.to_string());
                    }
                    None => {
                        warn!(class = %request.class, "WebSocket 스트림 종료");
                        break None;
                    }
                    _ => {}
                }
            }
            _ = ping.tick() => {
                if let Err(e) = write.send(Message::Ping(Vec::new())).await {
                    error!(class = %request.class, "Ping 전송 실패: {}", e);
                    break Some(e.to_string());
                }
            }
        }
    };

    let _ = ready.send(ReadyState::Closed);
    emit(&request, LinkEventKind::Closed { reason }).await;
}
