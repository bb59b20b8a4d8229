//! 연결 관리자 수명 주기 테스트 (프로세스 내부 연결 사용).

use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use terminal_core::StreamConfig;
use terminal_stream::{
    ConnectionManager, ConnectionState, ControlFrame, ControlKind, ControlMessage, InboundFrame,
    Interest, LinkEvent, MemoryConnector, MemoryPeer, StaticCredentials, StreamClass, StreamEvent,
    Topic, Variables,
};
use tokio::sync::mpsc;
use tokio::time::Instant;

struct Harness {
    manager: ConnectionManager,
    link_rx: mpsc::Receiver<LinkEvent>,
    connector: MemoryConnector,
    credentials: Arc<StaticCredentials>,
}

impl Harness {
    fn new(logged_in: bool) -> Self {
        Self::with_connector(logged_in, MemoryConnector::new())
    }

    fn with_connector(logged_in: bool, connector: MemoryConnector) -> Self {
        let credentials = Arc::new(if logged_in {
            StaticCredentials::new(SecretString::new("tok-123".into()), "user-9")
        } else {
            StaticCredentials::anonymous()
        });
        let config = StreamConfig {
            market_data_url: "ws://quotes.test/ws".to_string(),
            order_stream_url: "ws://orders.test/".to_string(),
            ..Default::default()
        };
        let (manager, link_rx) =
            ConnectionManager::new(&config, Arc::new(connector.clone()), credentials.clone());
        Self {
            manager,
            link_rx,
            connector,
            credentials,
        }
    }

    /// 도착한 연결 이벤트를 모두 처리합니다.
    fn pump(&mut self) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.link_rx.try_recv() {
            if let Some(event) = self.manager.handle_link_event(event) {
                out.push(event);
            }
        }
        out
    }

    fn peer(&self, class: StreamClass) -> MemoryPeer {
        self.connector
            .take_peer(class)
            .expect("연결이 만들어져 있어야 함")
    }
}

fn board(items: &[&str]) -> Interest {
    Interest::new(Topic::STOCK_REALTIME_BY_LIST, Variables::list(items.iter().copied()))
}

fn sent(peer: &mut MemoryPeer) -> Vec<ControlMessage> {
    peer.drain_sent()
        .iter()
        .map(|text| serde_json::from_str(text).unwrap())
        .collect()
}

#[tokio::test]
async fn no_credential_suppresses_connection() {
    let mut h = Harness::new(false);
    let consumer = h.manager.acquire(StreamClass::MarketData);
    h.manager.add_interest(StreamClass::MarketData, board(&["SSI"]));

    assert_eq!(h.connector.connect_count(), 0);
    assert_eq!(h.manager.state(StreamClass::MarketData), ConnectionState::Disconnected);

    // 로그인 후 연결
    h.credentials.set(SecretString::new("tok".into()), "user-1");
    h.manager.on_credentials_changed();
    assert_eq!(h.connector.connect_count(), 1);
    assert_eq!(h.manager.state(StreamClass::MarketData), ConnectionState::Connecting);

    h.manager.release(StreamClass::MarketData, consumer);
}

#[tokio::test]
async fn full_send_queue_reconnects_and_replays_union() {
    let mut h = Harness::with_connector(true, MemoryConnector::with_buffer(1));
    h.manager.acquire(StreamClass::MarketData);
    h.manager.add_interest(StreamClass::MarketData, board(&["AAA"]));

    let first = h.peer(StreamClass::MarketData);
    first.open().await;
    h.pump();
    // 상대편이 읽지 않아 큐가 가득 찬 상태에서 새 관심 등록
    h.manager.add_interest(StreamClass::MarketData, board(&["BBB"]));

    assert!(first.is_cancelled());
    assert_eq!(h.connector.connect_count(), 2);
    assert_eq!(h.manager.state(StreamClass::MarketData), ConnectionState::Reconnecting);

    let mut second = h.peer(StreamClass::MarketData);
    second.open().await;
    h.pump();
    assert!(h.manager.is_connected(StreamClass::MarketData));
    assert_eq!(
        sent(&mut second),
        vec![ControlMessage::subscribe(
            Topic::STOCK_REALTIME_BY_LIST,
            Variables::list(["AAA", "BBB"])
        )]
    );
}

#[tokio::test]
async fn interest_is_replayed_on_open_and_diffed_after() {
    let mut h = Harness::new(true);
    h.manager.acquire(StreamClass::MarketData);
    h.manager.add_interest(StreamClass::MarketData, board(&["X", "Y"]));
    h.manager.add_interest(StreamClass::MarketData, board(&["Y", "Z"]));

    let mut peer = h.peer(StreamClass::MarketData);
    assert_eq!(peer.url(), "ws://quotes.test/ws");
    // 연결 전에는 아무것도 보내지 않음
    assert!(peer.drain_sent().is_empty());

    peer.open().await;
    h.pump();
    assert!(h.manager.is_connected(StreamClass::MarketData));
    assert_eq!(
        sent(&mut peer),
        vec![ControlMessage::subscribe(
            Topic::STOCK_REALTIME_BY_LIST,
            Variables::list(["X", "Y", "Z"])
        )]
    );

    h.manager.remove_interest(StreamClass::MarketData, &board(&["X", "Y"]));
    let messages = sent(&mut peer);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].kind, ControlKind::Unsubscribe);
    assert_eq!(messages[0].variables, Variables::list(["X"]));

    h.manager.add_interest(StreamClass::MarketData, board(&["Z", "W"]));
    assert_eq!(
        sent(&mut peer),
        vec![ControlMessage::subscribe(Topic::STOCK_REALTIME_BY_LIST, Variables::list(["W"]))]
    );
}

#[tokio::test]
async fn one_connection_per_class_with_reference_counting() {
    let mut h = Harness::new(true);
    let a = h.manager.acquire(StreamClass::MarketData);
    let b = h.manager.acquire(StreamClass::MarketData);
    assert_eq!(h.connector.connect_count(), 1);

    let peer = h.peer(StreamClass::MarketData);
    peer.open().await;
    h.pump();

    h.manager.release(StreamClass::MarketData, a);
    assert!(!peer.is_cancelled());
    assert_eq!(h.manager.consumer_count(StreamClass::MarketData), 1);

    h.manager.release(StreamClass::MarketData, b);
    assert!(peer.is_cancelled());
    assert_eq!(h.manager.state(StreamClass::MarketData), ConnectionState::Disconnected);
}

#[tokio::test]
async fn established_link_drop_reconnects_once() {
    let mut h = Harness::new(true);
    h.manager.acquire(StreamClass::MarketData);
    h.manager.add_interest(StreamClass::MarketData, board(&["SSI"]));

    let first = h.peer(StreamClass::MarketData);
    first.open().await;
    h.pump();

    first.close().await;
    h.pump();
    assert_eq!(h.manager.state(StreamClass::MarketData), ConnectionState::Reconnecting);
    assert_eq!(h.connector.connect_count(), 2);

    // 새 연결이 열리기 전에 실패하면 더 이상 재시도하지 않음
    let second = h.peer(StreamClass::MarketData);
    second.fail("refused").await;
    second.close().await;
    h.pump();
    assert_eq!(h.manager.state(StreamClass::MarketData), ConnectionState::Disconnected);
    assert_eq!(h.connector.connect_count(), 2);

    // 다음 관심 등록 시 다시 시도
    h.manager.add_interest(StreamClass::MarketData, board(&["VNM"]));
    assert_eq!(h.connector.connect_count(), 3);

    let mut third = h.peer(StreamClass::MarketData);
    third.open().await;
    h.pump();
    assert_eq!(
        sent(&mut third),
        vec![ControlMessage::subscribe(
            Topic::STOCK_REALTIME_BY_LIST,
            Variables::list(["SSI", "VNM"])
        )]
    );
}

#[tokio::test]
async fn events_from_replaced_link_are_ignored() {
    let mut h = Harness::new(true);
    h.manager.acquire(StreamClass::MarketData);
    let old = h.peer(StreamClass::MarketData);
    old.open().await;
    h.pump();

    // 오프라인 → 온라인: 전송 계층이 죽었으므로 교체
    old.go_silent();
    h.manager.on_online();
    assert_eq!(h.connector.connect_count(), 2);

    old.push(r#"{"serverName":"stale"}"#).await;
    old.close().await;
    assert!(h.pump().is_empty());
    assert_eq!(h.manager.state(StreamClass::MarketData), ConnectionState::Connecting);
}

#[tokio::test]
async fn offline_suppresses_connection_until_online() {
    let mut h = Harness::new(true);
    h.manager.on_offline();
    h.manager.acquire(StreamClass::MarketData);
    assert_eq!(h.connector.connect_count(), 0);

    h.manager.on_online();
    assert_eq!(h.connector.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn long_background_forces_liveness_check() {
    let mut h = Harness::new(true);
    h.manager.acquire(StreamClass::MarketData);
    let peer = h.peer(StreamClass::MarketData);
    peer.open().await;
    h.pump();

    // 짧은 백그라운드: 점검하지 않음
    h.manager.on_visibility(false, Instant::now());
    peer.go_silent();
    tokio::time::advance(Duration::from_secs(60)).await;
    h.manager.on_visibility(true, Instant::now());
    assert_eq!(h.connector.connect_count(), 1);

    // 5분 이상 백그라운드: 조용히 죽은 연결을 교체
    h.manager.on_visibility(false, Instant::now());
    tokio::time::advance(Duration::from_secs(301)).await;
    h.manager.on_visibility(true, Instant::now());
    assert!(peer.is_cancelled());
    assert_eq!(h.connector.connect_count(), 2);
    assert_eq!(h.manager.state(StreamClass::MarketData), ConnectionState::Connecting);
}

#[tokio::test]
async fn healthy_link_survives_liveness_check() {
    let mut h = Harness::new(true);
    h.manager.acquire(StreamClass::MarketData);
    let peer = h.peer(StreamClass::MarketData);
    peer.open().await;
    h.pump();

    h.manager.on_online();
    assert!(!peer.is_cancelled());
    assert!(h.manager.is_connected(StreamClass::MarketData));
}

#[tokio::test]
async fn order_stream_url_and_server_name() {
    let mut h = Harness::new(true);
    h.manager.acquire(StreamClass::OrderUpdates);
    let peer = h.peer(StreamClass::OrderUpdates);
    assert_eq!(
        peer.url(),
        "ws://orders.test/trade-stream/order-update?access_token=tok-123&userId=user-9"
    );

    peer.open().await;
    peer.push(r#"{"serverName":"trade-02"}"#).await;
    peer.push(r#"{"accountId":"0001C","status":"FILLED"}"#).await;
    let events = h.pump();

    assert_eq!(h.manager.server_name(StreamClass::OrderUpdates), Some("trade-02"));
    assert!(events.iter().any(|event| matches!(
        event,
        StreamEvent::Frame {
            class: StreamClass::OrderUpdates,
            frame: InboundFrame::Control(ControlFrame::OrderUpdate { account_id, .. }),
        } if account_id == "0001C"
    )));
}

#[tokio::test]
async fn credential_loss_disconnects_everything() {
    let mut h = Harness::new(true);
    h.manager.acquire(StreamClass::MarketData);
    h.manager.acquire(StreamClass::PortfolioUpdates);
    let market = h.peer(StreamClass::MarketData);
    market.open().await;
    h.pump();

    h.credentials.clear();
    h.manager.on_credentials_changed();
    assert!(market.is_cancelled());
    assert_eq!(h.manager.state(StreamClass::MarketData), ConnectionState::Disconnected);
    assert_eq!(h.manager.state(StreamClass::PortfolioUpdates), ConnectionState::Disconnected);
}

#[tokio::test]
async fn malformed_frames_are_dropped() {
    let mut h = Harness::new(true);
    h.manager.acquire(StreamClass::MarketData);
    let peer = h.peer(StreamClass::MarketData);
    peer.open().await;
    peer.push("B#SSI|HOSE|only-three").await;
    peer.push("{broken").await;
    assert!(h.pump().is_empty());
    assert!(h.manager.is_connected(StreamClass::MarketData));
}
