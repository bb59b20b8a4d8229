//! 스트림 계층 에러 타입.

use thiserror::Error;

/// 실시간 스트림 관련 에러.
#[derive(Debug, Error)]
pub enum StreamError {
    /// 연결 끊김
    #[error("연결 끊김: {0}")]
    Disconnected(String),

    /// 접속 토큰 없음
    #[error("접속 토큰이 없어 연결하지 않습니다")]
    NoCredential,

    /// 네트워크 오프라인
    #[error("네트워크 오프라인")]
    Offline,

    /// WebSocket 에러
    #[error("WebSocket 에러: {0}")]
    WebSocket(String),

    /// 수신 프레임 파싱 에러
    #[error("파싱 에러: {0}")]
    Parse(String),

    /// 직렬화 에러
    #[error("직렬화 에러: {0}")]
    Serialization(String),
}

impl StreamError {
    /// 재시도 가능한 에러인지 확인.
    ///
    /// 재시도는 타이머가 아니라 다음 관심 등록 시점에 이루어집니다.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StreamError::Disconnected(_) | StreamError::WebSocket(_) | StreamError::Offline
        )
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Serialization(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for StreamError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        StreamError::WebSocket(err.to_string())
    }
}

/// 스트림 작업을 위한 Result 타입.
pub type StreamResult<T> = Result<T, StreamError>;
