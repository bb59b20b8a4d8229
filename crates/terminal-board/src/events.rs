//! 테이블 관찰 이벤트.
//!
//! 뷰와 합계 계산기는 이 이벤트를 구독해 바뀐 키만 다시 그립니다.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use terminal_core::{Footer, RowKey};

/// 마운트된 테이블 식별자.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TableId(pub(crate) u64);

impl TableId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table-{}", self.0)
    }
}

/// 테이블 이벤트.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BoardEvent {
    /// 스냅샷 반영 완료
    SnapshotLoaded {
        table: TableId,
        rows: usize,
        loaded_at: DateTime<Utc>,
    },
    /// 행 내용 변경
    RowsChanged { table: TableId, keys: Vec<RowKey> },
    /// 합계 재계산
    FooterChanged { table: TableId, footer: Footer },
    /// 고정/정렬/필터 변경
    LayoutChanged { table: TableId },
    /// 사용자에게 보여줄 조회 실패
    FetchFailed { table: TableId, message: String },
}

impl BoardEvent {
    pub fn table(&self) -> TableId {
        match self {
            BoardEvent::SnapshotLoaded { table, .. }
            | BoardEvent::RowsChanged { table, .. }
            | BoardEvent::FooterChanged { table, .. }
            | BoardEvent::LayoutChanged { table }
            | BoardEvent::FetchFailed { table, .. } => *table,
        }
    }
}
