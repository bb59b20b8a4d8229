//! 테이블 계층 에러 타입.

use terminal_core::TerminalError;
use terminal_data::DataError;
use terminal_stream::StreamError;
use thiserror::Error;

use crate::events::TableId;

/// 테이블 위젯 단위로 보고되는 에러.
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("데이터 에러: {0}")]
    Data(#[from] DataError),

    #[error("스트림 에러: {0}")]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Core(#[from] TerminalError),

    /// 존재하지 않는 테이블
    #[error("테이블을 찾을 수 없음: {0}")]
    TableNotFound(TableId),

    /// 워크스페이스 이벤트 루프가 종료됨
    #[error("워크스페이스가 종료됨")]
    WorkspaceClosed,

    /// 이전 스냅샷 세대를 대상으로 계산된 갱신
    #[error("스냅샷 세대 불일치: 기대 {expected}, 현재 {current}")]
    StaleGeneration { expected: u64, current: u64 },
}

impl BoardError {
    /// 사용자에게 인라인 메시지로 보여줘야 하는 에러인지 여부.
    ///
    /// 전송 계층의 일시적 오류와 세대 불일치는 조용히 처리합니다.
    pub fn is_user_visible(&self) -> bool {
        match self {
            BoardError::Data(e) => e.is_business_error(),
            BoardError::TableNotFound(_) => true,
            _ => false,
        }
    }
}

/// 테이블 작업 결과 타입.
pub type BoardResult<T> = Result<T, BoardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_classification() {
        let business = BoardError::from(DataError::Envelope {
            code: "E01".to_string(),
            message: "account not found".to_string(),
        });
        assert!(business.is_user_visible());

        let network = BoardError::from(DataError::Network("reset".to_string()));
        assert!(!network.is_user_visible());

        let stale = BoardError::StaleGeneration {
            expected: 1,
            current: 2,
        };
        assert!(!stale.is_user_visible());
    }
}
