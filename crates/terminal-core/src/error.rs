//! 터미널 공통 에러 타입.

use thiserror::Error;

/// 핵심 계층 에러.
#[derive(Debug, Error)]
pub enum TerminalError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 파싱 에러
    #[error("파싱 에러: {0}")]
    Parse(String),

    /// 직렬화 에러
    #[error("직렬화 에러: {0}")]
    Serialization(String),

    /// 잘못된 입력
    #[error("잘못된 입력: {0}")]
    InvalidInput(String),
}

/// 핵심 계층 작업을 위한 Result 타입.
pub type TerminalResult<T> = Result<T, TerminalError>;

impl From<serde_json::Error> for TerminalError {
    fn from(err: serde_json::Error) -> Self {
        TerminalError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for TerminalError {
    fn from(err: config::ConfigError) -> Self {
        TerminalError::Config(err.to_string())
    }
}
