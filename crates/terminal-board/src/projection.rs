//! 뷰 투영.
//!
//! 저장소 + 고정 목록 + 사용자 정렬 + 종목 필터로부터 그리드가 그릴 행 순서를
//! 만듭니다. 같은 입력이면 항상 같은 결과를 냅니다.

use serde::Serialize;
use std::cmp::Ordering;
use terminal_core::{aggregate, BoardRow, Footer, RowKey};
use terminal_data::TableLayout;

use crate::store::RowStore;

/// 투영 결과.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedView {
    /// 상단 고정 행 (고정 등록 순서)
    pub pinned: Vec<BoardRow>,
    /// 일반 행
    pub rows: Vec<BoardRow>,
    /// 합계 의사 행. 표시할 행이 없으면 생략
    pub footer: Option<Footer>,
}

impl ProjectedView {
    pub fn is_empty(&self) -> bool {
        self.pinned.is_empty() && self.rows.is_empty()
    }

    /// 그려지는 순서 그대로의 행 ID 목록 (합계 포함).
    pub fn row_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .pinned
            .iter()
            .chain(self.rows.iter())
            .map(|row| row.key.to_string())
            .collect();
        if let Some(footer) = &self.footer {
            ids.push(footer.id().to_string());
        }
        ids
    }

    pub fn keys(&self) -> Vec<RowKey> {
        self.pinned
            .iter()
            .chain(self.rows.iter())
            .map(|row| row.key.clone())
            .collect()
    }
}

/// 종목 필터. 빈 문자열은 필터 없음과 같습니다.
pub fn normalize_filter(filter: Option<&str>) -> Option<&str> {
    filter.map(str::trim).filter(|s| !s.is_empty())
}

/// 행 순서를 계산합니다.
///
/// `table_footer`는 필터가 없을 때 사용할 테이블 전체 합계입니다. 필터가 있으면
/// 걸러진 행만으로 합계를 다시 냅니다.
pub fn project(
    store: &RowStore,
    layout: &TableLayout,
    filter: Option<&str>,
    table_footer: &Footer,
) -> ProjectedView {
    let filter = normalize_filter(filter);

    let mut visible: Vec<&BoardRow> = store
        .rows()
        .filter(|row| filter.map_or(true, |symbol| row.symbol == symbol))
        .collect();
    visible.sort_by(|a, b| display_order(layout, a, b));

    let (mut pinned, rows): (Vec<&BoardRow>, Vec<&BoardRow>) = visible
        .into_iter()
        .partition(|row| layout.is_pinned(&row.symbol));
    // 안정 정렬이므로 같은 종목의 여러 행은 표시 순서를 유지
    pinned.sort_by_key(|row| layout.pin_position(&row.symbol));

    let footer = if pinned.is_empty() && rows.is_empty() {
        None
    } else if filter.is_some() {
        Some(aggregate(pinned.iter().chain(rows.iter()).copied()))
    } else {
        Some(table_footer.clone())
    };

    ProjectedView {
        pinned: pinned.into_iter().cloned().collect(),
        rows: rows.into_iter().cloned().collect(),
        footer,
    }
}

/// 사용자 지정 위치가 있으면 그 위치, 없으면 스냅샷 도착 순서.
fn display_order(layout: &TableLayout, a: &BoardRow, b: &BoardRow) -> Ordering {
    let rank = |row: &BoardRow| layout.moved_position(&row.symbol).unwrap_or(row.arrival);
    rank(a)
        .cmp(&rank(b))
        .then_with(|| a.arrival.cmp(&b.arrival))
        .then_with(|| a.key.cmp(&b.key))
}
