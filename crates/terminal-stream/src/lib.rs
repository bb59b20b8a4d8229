//! # Terminal Stream
//!
//! 실시간 스트림 연결 계층입니다.
//!
//! - 와이어 프로토콜: 송신 제어 메시지, 수신 프레임 분류, 위치 기반 틱 스키마
//! - 구독 다중화: 위젯별 관심을 합쳐 변화분만 구독/해제
//! - 연결 관리자: 스트림 종류별 공유 연결, 참조 계수, 생존 점검
//! - 전송 계층: tokio-tungstenite WebSocket, 프로세스 내부 연결

pub mod error;
pub mod manager;
pub mod multiplexer;
pub mod protocol;
pub mod transport;

pub use terminal_core::{CredentialProvider, StaticCredentials};
pub use error::{StreamError, StreamResult};
pub use manager::{ConnectionManager, ConnectionState, ConsumerId, StreamClass, StreamEvent};
pub use multiplexer::{Interest, SubscriptionMultiplexer};
pub use protocol::*;
pub use transport::{
    ConnectRequest, Connector, LinkEvent, LinkEventKind, LinkHandle, LinkId, MemoryConnector,
    MemoryPeer, ReadyState, WsConnector,
};
