//! 데이터 모듈 오류 타입.

use thiserror::Error;

/// 스냅샷 조회와 레이아웃 저장 오류.
#[derive(Debug, Error)]
pub enum DataError {
    /// 네트워크 연결 오류
    #[error("Network error: {0}")]
    Network(String),

    /// 요청 시간 초과
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// 성공이 아닌 HTTP 상태
    #[error("HTTP error [{status}]: {body}")]
    Http { status: u16, body: String },

    /// 응답 봉투의 업무 코드가 실패
    #[error("API error [{code}]: {message}")]
    Envelope { code: String, message: String },

    /// 리소스를 찾을 수 없음
    #[error("Not found: {0}")]
    NotFound(String),

    /// 인증 정보 없음
    #[error("Missing credential: {0}")]
    MissingCredential(&'static str),

    /// 더 새로운 요청에 의해 취소됨
    #[error("Request superseded")]
    Cancelled,

    /// 파싱 오류
    #[error("Parse error: {0}")]
    Parse(String),

    /// 파일 입출력 오류
    #[error("IO error: {0}")]
    Io(String),
}

impl DataError {
    /// 서버가 정상 응답했으나 업무적으로 거절한 경우.
    pub fn is_business_error(&self) -> bool {
        matches!(self, DataError::Envelope { .. } | DataError::NotFound(_))
    }

    /// 재시도해 볼 만한 일시적 오류인지 확인.
    pub fn is_transient(&self) -> bool {
        match self {
            DataError::Network(_) | DataError::Timeout(_) => true,
            DataError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for DataError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DataError::Timeout(err.to_string())
        } else if err.is_decode() {
            DataError::Parse(err.to_string())
        } else {
            DataError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        DataError::Parse(err.to_string())
    }
}

impl From<std::io::Error> for DataError {
    fn from(err: std::io::Error) -> Self {
        DataError::Io(err.to_string())
    }
}

/// 데이터 작업 결과 타입.
pub type DataResult<T> = Result<T, DataError>;
