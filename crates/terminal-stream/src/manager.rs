//! 연결 관리자.
//!
//! 스트림 종류마다 물리 연결을 하나만 두고 모든 위젯이 공유합니다. 연결은 첫
//! 소비자가 나타날 때 만들어지고 마지막 소비자가 떠나면 닫힙니다 (참조 계수).
//! 공유 연결로 나가는 SUBSCRIBE / UNSUBSCRIBE는 모두 [`SubscriptionMultiplexer`]를
//! 거칩니다.
//!
//! # 상태 전이
//!
//! ```text
//! Disconnected ──(소비자/관심 등록, 토큰 있음)──▶ Connecting ──(open)──▶ Connected
//!      ▲                                               │                      │
//!      └──────────────(close / error / 토큰 없음)──────┴──────────────────────┘
//!                                                               │ (소비자 남음)
//!                                                               ▼
//!                                                          Reconnecting ──(open)──▶ Connected
//! ```
//!
//! 실패한 연결을 타이머로 재시도하지 않습니다. 다음 관심 등록, `online` 이벤트,
//! 포그라운드 복귀 점검이 재연결 시점입니다.

use secrecy::ExposeSecret;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use terminal_core::{CredentialProvider, StreamConfig};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::multiplexer::{Interest, SubscriptionMultiplexer};
use crate::protocol::{ControlFrame, ControlMessage, InboundFrame, Topic};
use crate::transport::{ConnectRequest, Connector, LinkEvent, LinkEventKind, LinkHandle, LinkId, ReadyState};

/// 연결 이벤트 채널 크기.
const LINK_EVENT_BUFFER: usize = 4096;

/// 관찰자용 이벤트 채널 크기.
const STREAM_EVENT_BUFFER: usize = 1024;

/// 스트림 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StreamClass {
    /// 시세
    MarketData,
    /// 주식 주문 체결
    OrderUpdates,
    /// 파생상품 주문 체결
    DerivativesOrderUpdates,
    /// 잔고 변경
    PortfolioUpdates,
}

impl StreamClass {
    pub const ALL: [StreamClass; 4] = [
        StreamClass::MarketData,
        StreamClass::OrderUpdates,
        StreamClass::DerivativesOrderUpdates,
        StreamClass::PortfolioUpdates,
    ];

    /// 주문 스트림 경로 (시세는 None).
    pub fn trade_stream_path(&self) -> Option<&'static str> {
        match self {
            StreamClass::MarketData => None,
            StreamClass::OrderUpdates => Some("order-update"),
            StreamClass::DerivativesOrderUpdates => Some("derivative-order-update"),
            StreamClass::PortfolioUpdates => Some("portfolios"),
        }
    }
}

impl fmt::Display for StreamClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamClass::MarketData => write!(f, "market-data"),
            StreamClass::OrderUpdates => write!(f, "order-updates"),
            StreamClass::DerivativesOrderUpdates => write!(f, "derivatives-order-updates"),
            StreamClass::PortfolioUpdates => write!(f, "portfolio-updates"),
        }
    }
}

/// 연결 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// 열려 있던 연결이 끊긴 뒤 한 번 다시 연결 중
    Reconnecting,
}

/// 소비자(위젯) 식별자.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId(u64);

/// 연결 관리자가 내보내는 이벤트.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    StateChanged {
        class: StreamClass,
        state: ConnectionState,
    },
    Frame {
        class: StreamClass,
        frame: InboundFrame,
    },
}

/// 스트림 하나의 연결 슬롯.
#[derive(Debug)]
struct StreamSlot {
    state: ConnectionState,
    consumers: BTreeSet<ConsumerId>,
    link: Option<LinkHandle>,
    mux: SubscriptionMultiplexer,
    server_name: Option<String>,
}

impl StreamSlot {
    fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            consumers: BTreeSet::new(),
            link: None,
            mux: SubscriptionMultiplexer::new(),
            server_name: None,
        }
    }

    fn is_wanted(&self) -> bool {
        !self.consumers.is_empty() || !self.mux.is_empty()
    }

    fn is_current(&self, link: LinkId) -> bool {
        self.link.as_ref().map(LinkHandle::id) == Some(link)
    }
}

/// 연결 관리자.
///
/// 애플리케이션 루트가 소유하며 위젯에 빌려줍니다.
pub struct ConnectionManager {
    market_data_url: String,
    order_stream_url: String,
    stale_after_hidden: Duration,
    connector: Arc<dyn Connector>,
    credentials: Arc<dyn CredentialProvider>,
    link_events: mpsc::Sender<LinkEvent>,
    events: broadcast::Sender<StreamEvent>,
    slots: HashMap<StreamClass, StreamSlot>,
    next_link: LinkId,
    next_consumer: u64,
    online: bool,
    hidden_since: Option<Instant>,
}

impl ConnectionManager {
    /// 연결 관리자를 생성합니다.
    ///
    /// 반환되는 수신자로 연결 이벤트를 받아 [`ConnectionManager::handle_link_event`]에
    /// 넘겨야 합니다.
    pub fn new(
        config: &StreamConfig,
        connector: Arc<dyn Connector>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> (Self, mpsc::Receiver<LinkEvent>) {
        let (link_events, link_rx) = mpsc::channel(LINK_EVENT_BUFFER);
        let (events, _) = broadcast::channel(STREAM_EVENT_BUFFER);

        let manager = Self {
            market_data_url: config.market_data_url.clone(),
            order_stream_url: config.order_stream_url.clone(),
            stale_after_hidden: config.stale_after_hidden(),
            connector,
            credentials,
            link_events,
            events,
            slots: StreamClass::ALL
                .iter()
                .map(|class| (*class, StreamSlot::new()))
                .collect(),
            next_link: 0,
            next_consumer: 0,
            online: true,
            hidden_since: None,
        };
        (manager, link_rx)
    }

    /// 상태 변경과 수신 프레임을 관찰합니다.
    pub fn subscribe_events(&self) -> broadcast::Receiver<StreamEvent> {
        self.events.subscribe()
    }

    pub fn state(&self, class: StreamClass) -> ConnectionState {
        self.slots
            .get(&class)
            .map(|slot| slot.state)
            .unwrap_or(ConnectionState::Disconnected)
    }

    pub fn is_connected(&self, class: StreamClass) -> bool {
        self.state(class) == ConnectionState::Connected
    }

    /// 주문 스트림 서버가 알려준 서버 이름.
    pub fn server_name(&self, class: StreamClass) -> Option<&str> {
        self.slots.get(&class)?.server_name.as_deref()
    }

    /// 현재 소비자 수.
    pub fn consumer_count(&self, class: StreamClass) -> usize {
        self.slots.get(&class).map(|s| s.consumers.len()).unwrap_or(0)
    }

    /// 스트림의 와이어 구독 합집합.
    pub fn subscribed(&self, class: StreamClass, topic: &Topic) -> BTreeSet<String> {
        self.slots
            .get(&class)
            .map(|slot| slot.mux.union(topic))
            .unwrap_or_default()
    }

    // ==================== 소비자 / 관심 ====================

    /// 소비자를 등록합니다. 필요하면 연결을 시작합니다.
    pub fn acquire(&mut self, class: StreamClass) -> ConsumerId {
        self.next_consumer += 1;
        let consumer = ConsumerId(self.next_consumer);
        if let Some(slot) = self.slots.get_mut(&class) {
            slot.consumers.insert(consumer);
            debug!(%class, consumers = slot.consumers.len(), "소비자 등록");
        }
        self.ensure_connected(class, false);
        consumer
    }

    /// 소비자를 해제합니다. 마지막 소비자가 떠나면 연결을 닫습니다.
    pub fn release(&mut self, class: StreamClass, consumer: ConsumerId) {
        let Some(slot) = self.slots.get_mut(&class) else {
            return;
        };
        if !slot.consumers.remove(&consumer) {
            return;
        }
        debug!(%class, consumers = slot.consumers.len(), "소비자 해제");
        if !slot.is_wanted() {
            info!(%class, "마지막 소비자 해제, 연결 종료");
            self.teardown(class);
        }
    }

    /// 관심을 등록합니다.
    ///
    /// 연결되어 있으면 변화분만 즉시 구독하고, 아니면 연결을 시도합니다.
    /// 연결이 열리면 등록된 관심 전체가 복원됩니다.
    pub fn add_interest(&mut self, class: StreamClass, interest: Interest) {
        let message = match self.slots.get_mut(&class) {
            Some(slot) => slot.mux.add_interest(interest),
            None => return,
        };
        if let Some(message) = message {
            self.send_control(class, &message);
        }
        self.ensure_connected(class, false);
    }

    /// 관심을 해제합니다.
    pub fn remove_interest(&mut self, class: StreamClass, interest: &Interest) {
        let message = match self.slots.get_mut(&class) {
            Some(slot) => slot.mux.remove_interest(interest),
            None => return,
        };
        if let Some(message) = message {
            self.send_control(class, &message);
        }
        let wanted = self.slots.get(&class).map(StreamSlot::is_wanted).unwrap_or(false);
        if !wanted {
            self.teardown(class);
        }
    }

    /// 다중화기를 거친 제어 메시지만 연결로 나갑니다.
    ///
    /// 송신 큐에 넣지 못하면 다중화기가 기록한 구독이 서버에 없는 것이므로
    /// 연결을 다시 맺어 관심 전체를 복원합니다.
    fn send_control(&mut self, class: StreamClass, message: &ControlMessage) {
        let Some(slot) = self.slots.get(&class) else {
            return;
        };
        if slot.state != ConnectionState::Connected {
            // 열릴 때 replay로 복원됨
            return;
        }
        let Some(link) = &slot.link else {
            return;
        };
        let text = match message.to_text() {
            Ok(text) => text,
            Err(e) => {
                warn!(%class, "제어 메시지 직렬화 실패: {}", e);
                return;
            }
        };
        debug!(%class, topic = %message.topic, kind = ?message.kind, "제어 메시지 전송");
        if let Err(e) = link.send(text) {
            if e.is_retryable() {
                warn!(%class, "제어 메시지 전송 실패, 재연결: {}", e);
                self.drop_link(class);
            } else {
                warn!(%class, "제어 메시지 전송 실패: {}", e);
            }
        }
    }

    // ==================== 연결 수명 ====================

    fn url_for(&self, class: StreamClass) -> Option<String> {
        let token = self.credentials.access_token()?;
        match class.trade_stream_path() {
            None => Some(self.market_data_url.clone()),
            Some(path) => {
                let user_id = self.credentials.user_id()?;
                Some(format!(
                    "{}/trade-stream/{}?access_token={}&userId={}",
                    self.order_stream_url.trim_end_matches('/'),
                    path,
                    token.expose_secret(),
                    user_id
                ))
            }
        }
    }

    fn set_state(&mut self, class: StreamClass, state: ConnectionState) {
        if let Some(slot) = self.slots.get_mut(&class) {
            if slot.state == state {
                return;
            }
            slot.state = state;
        }
        info!(%class, ?state, "연결 상태 변경");
        let _ = self.events.send(StreamEvent::StateChanged { class, state });
    }

    /// 필요하고 가능하면 연결을 시작합니다.
    fn ensure_connected(&mut self, class: StreamClass, reconnecting: bool) {
        if !self.online {
            debug!(%class, "오프라인 상태, 연결 보류");
            return;
        }
        match self.slots.get(&class) {
            Some(slot) if slot.state == ConnectionState::Disconnected && slot.is_wanted() => {}
            _ => return,
        }
        let Some(url) = self.url_for(class) else {
            debug!(%class, "접속 토큰 없음, 연결 보류");
            return;
        };

        self.next_link += 1;
        let link = self.next_link;
        let handle = self.connector.connect(ConnectRequest {
            class,
            link,
            url,
            events: self.link_events.clone(),
        });
        if let Some(slot) = self.slots.get_mut(&class) {
            slot.link = Some(handle);
        }
        let state = if reconnecting {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Connecting
        };
        self.set_state(class, state);
    }

    /// 연결을 닫고 `Disconnected`로 돌아갑니다. 관심 등록은 유지됩니다.
    fn teardown(&mut self, class: StreamClass) -> ConnectionState {
        let previous = self.state(class);
        if let Some(slot) = self.slots.get_mut(&class) {
            if let Some(link) = slot.link.take() {
                link.close();
            }
            slot.server_name = None;
        }
        self.set_state(class, ConnectionState::Disconnected);
        previous
    }

    /// 연결 이벤트를 처리합니다.
    ///
    /// 이미 교체된 연결에서 온 이벤트는 무시합니다. 수신 프레임은 파싱하여
    /// 반환하며, 파싱에 실패한 프레임은 버립니다.
    pub fn handle_link_event(&mut self, event: LinkEvent) -> Option<StreamEvent> {
        let LinkEvent { class, link, kind } = event;
        let current = self
            .slots
            .get(&class)
            .map(|slot| slot.is_current(link))
            .unwrap_or(false);
        if !current {
            debug!(%class, link, "이전 연결의 이벤트 무시");
            return None;
        }

        match kind {
            LinkEventKind::Open => {
                self.set_state(class, ConnectionState::Connected);
                self.replay(class);
                None
            }
            LinkEventKind::Message(text) => self.handle_message(class, &text),
            LinkEventKind::Error(error) => {
                warn!(%class, "연결 에러: {}", error);
                self.drop_link(class);
                None
            }
            LinkEventKind::Closed { reason } => {
                info!(%class, reason = reason.as_deref().unwrap_or("-"), "연결 종료");
                self.drop_link(class);
                None
            }
        }
    }

    fn replay(&mut self, class: StreamClass) {
        let messages = match self.slots.get(&class) {
            Some(slot) => slot.mux.replay(),
            None => return,
        };
        if !messages.is_empty() {
            info!(%class, count = messages.len(), "구독 복원");
        }
        for message in &messages {
            self.send_control(class, message);
        }
    }

    fn handle_message(&mut self, class: StreamClass, text: &str) -> Option<StreamEvent> {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(%class, "프레임 무시: {}", e);
                return None;
            }
        };

        if let InboundFrame::Control(ControlFrame::ServerName(name)) = &frame {
            if let Some(slot) = self.slots.get_mut(&class) {
                slot.server_name = Some(name.clone());
            }
        }

        let event = StreamEvent::Frame { class, frame };
        let _ = self.events.send(event.clone());
        Some(event)
    }

    /// 전송 계층이 연결을 잃었을 때.
    ///
    /// 열려 있던 연결이고 소비자가 남아 있으면 한 번 다시 연결합니다.
    fn drop_link(&mut self, class: StreamClass) {
        let previous = self.teardown(class);
        if previous == ConnectionState::Connected {
            self.ensure_connected(class, true);
        }
    }

    // ==================== 생존 점검 ====================

    /// 전송 계층 상태가 열림이 아니면 연결을 버리고 새로 시작합니다.
    fn liveness_check(&mut self, class: StreamClass) {
        let ready = self
            .slots
            .get(&class)
            .and_then(|slot| slot.link.as_ref())
            .map(LinkHandle::ready_state);

        if let Some(ready) = ready {
            if ready == ReadyState::Open {
                return;
            }
            info!(%class, ?ready, "연결 상태 불일치, 재연결");
            self.teardown(class);
        }
        self.ensure_connected(class, false);
    }

    /// 네트워크 복구.
    pub fn on_online(&mut self) {
        self.online = true;
        for class in StreamClass::ALL {
            self.liveness_check(class);
        }
    }

    /// 네트워크 단절. 이후 `online`까지 연결을 시도하지 않습니다.
    pub fn on_offline(&mut self) {
        info!("네트워크 오프라인");
        self.online = false;
    }

    /// 화면 표시 상태 변경.
    ///
    /// 오래 숨겨져 있다가 다시 보이면 close/error 없이 조용히 죽은 연결이 있을 수
    /// 있으므로 생존 점검을 합니다.
    pub fn on_visibility(&mut self, visible: bool, now: Instant) {
        if !visible {
            self.hidden_since.get_or_insert(now);
            return;
        }
        let Some(since) = self.hidden_since.take() else {
            return;
        };
        if now.saturating_duration_since(since) >= self.stale_after_hidden {
            info!(hidden_secs = now.saturating_duration_since(since).as_secs(), "장시간 백그라운드 후 복귀, 연결 점검");
            for class in StreamClass::ALL {
                self.liveness_check(class);
            }
        }
    }

    /// 인증 정보 변경 (로그인/로그아웃/토큰 갱신).
    ///
    /// 토큰이 없어졌으면 모든 연결을 닫습니다.
    pub fn on_credentials_changed(&mut self) {
        if self.credentials.access_token().is_none() {
            for class in StreamClass::ALL {
                if self.state(class) != ConnectionState::Disconnected {
                    self.teardown(class);
                }
            }
            return;
        }
        for class in StreamClass::ALL {
            self.ensure_connected(class, false);
        }
    }

    /// 모든 연결을 닫습니다.
    pub fn shutdown(&mut self) {
        for class in StreamClass::ALL {
            if self.state(class) != ConnectionState::Disconnected {
                self.teardown(class);
            }
        }
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("slots", &self.slots)
            .field("online", &self.online)
            .finish()
    }
}
