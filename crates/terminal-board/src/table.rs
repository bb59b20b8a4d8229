//! 테이블 위젯 정의와 마운트 상태.

use chrono::{DateTime, Utc};
use terminal_core::{BoardConfig, Footer, TableKind, Throttle};
use terminal_data::{FetchGate, SnapshotQuery, TableLayout};
use terminal_stream::{ConsumerId, Interest, StreamClass, Topic, Variables};
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::events::{BoardEvent, TableId};
use crate::projection::{normalize_filter, project, ProjectedView};
use crate::reconciler::Reconciler;

/// 파생상품 테이블의 기본 기초지수.
pub const DEFAULT_UNDERLYING_INDEX: &str = "VN30";

/// 테이블이 표시하는 행 집합의 출처.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableSource {
    /// 거래소 전체 (hose, hnx, upcom ...)
    Exchange(String),
    /// 관심종목/업종 구성 종목
    Symbols(Vec<String>),
    /// 종목 그룹 (VN30 등)
    Group(String),
    Etf,
    /// 파생상품 보드와 연동 지수
    Derivatives {
        board: String,
        index: Option<String>,
    },
    /// 계좌 잔고
    Portfolio { account_id: String },
}

/// 테이블 마운트 요청.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub source: TableSource,
    /// 세션 알림을 받을 시장 코드
    pub market: Option<String>,
}

impl TableSpec {
    pub fn exchange(exchange: impl Into<String>) -> Self {
        let exchange = exchange.into();
        Self {
            market: Some(exchange.to_uppercase()),
            source: TableSource::Exchange(exchange),
        }
    }

    pub fn symbols<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            source: TableSource::Symbols(symbols.into_iter().map(Into::into).collect()),
            market: None,
        }
    }

    pub fn group(code: impl Into<String>) -> Self {
        Self {
            source: TableSource::Group(code.into()),
            market: None,
        }
    }

    pub fn etf() -> Self {
        Self {
            source: TableSource::Etf,
            market: None,
        }
    }

    /// 파생상품 보드. `fu`/`vnf` 보드는 VN30 지수와 연동합니다.
    pub fn derivatives(board: impl Into<String>) -> Self {
        let board = board.into();
        let index = matches!(board.to_lowercase().as_str(), "fu" | "vnf")
            .then(|| DEFAULT_UNDERLYING_INDEX.to_string());
        Self {
            source: TableSource::Derivatives { board, index },
            market: None,
        }
    }

    pub fn portfolio(account_id: impl Into<String>) -> Self {
        Self {
            source: TableSource::Portfolio {
                account_id: account_id.into(),
            },
            market: None,
        }
    }

    pub fn with_market(mut self, market: impl Into<String>) -> Self {
        self.market = Some(market.into());
        self
    }

    pub fn kind(&self) -> TableKind {
        match self.source {
            TableSource::Portfolio { .. } => TableKind::Portfolio,
            TableSource::Derivatives { .. } => TableKind::Derivatives,
            _ => TableKind::PriceBoard,
        }
    }

    pub fn snapshot_query(&self) -> SnapshotQuery {
        match &self.source {
            TableSource::Exchange(exchange) => SnapshotQuery::exchange(exchange.clone()),
            TableSource::Symbols(symbols) => SnapshotQuery::symbols(symbols.clone()),
            TableSource::Group(code) => SnapshotQuery::group(code.clone()),
            TableSource::Etf => SnapshotQuery::Etf,
            TableSource::Derivatives { board, .. } => SnapshotQuery::derivatives(board.clone()),
            TableSource::Portfolio { account_id } => SnapshotQuery::portfolio(account_id.clone()),
        }
    }

    /// 레이아웃 저장 키 (테이블 종류 식별자).
    pub fn layout_key(&self) -> String {
        match &self.source {
            TableSource::Exchange(exchange) => format!("price_board:exchange:{exchange}"),
            TableSource::Symbols(_) => "price_board:watchlist".to_string(),
            TableSource::Group(code) => format!("price_board:group:{code}"),
            TableSource::Etf => "price_board:etf".to_string(),
            TableSource::Derivatives { board, .. } => format!("derivatives:{board}"),
            TableSource::Portfolio { .. } => "portfolio".to_string(),
        }
    }

    pub fn account_id(&self) -> Option<&str> {
        match &self.source {
            TableSource::Portfolio { account_id } => Some(account_id),
            _ => None,
        }
    }

    pub fn underlying_index(&self) -> Option<&str> {
        match &self.source {
            TableSource::Derivatives { index, .. } => index.as_deref(),
            _ => None,
        }
    }

    /// 사용하는 스트림 종류.
    pub fn stream_classes(&self) -> Vec<StreamClass> {
        match self.kind() {
            TableKind::Portfolio => vec![
                StreamClass::MarketData,
                StreamClass::PortfolioUpdates,
                StreamClass::OrderUpdates,
            ],
            _ => vec![StreamClass::MarketData],
        }
    }

    /// 세션 알림이 이 테이블의 시장에 해당하는지.
    pub fn is_market(&self, market: &str) -> bool {
        self.market
            .as_deref()
            .is_some_and(|m| m.eq_ignore_ascii_case(market))
    }

    /// 스냅샷 종목 집합에 대한 실시간 관심.
    pub fn interests<'a, I>(&self, symbols: I) -> Vec<Interest>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut interests = vec![Interest::new(
            Topic::STOCK_REALTIME_BY_LIST,
            Variables::list(symbols.into_iter().cloned()),
        )];
        if let Some(index) = self.underlying_index() {
            interests.push(Interest::new(
                Topic::INDEX_REALTIME,
                Variables::scalar(index.to_string()),
            ));
        }
        interests
    }
}

/// 스냅샷 조회 목적.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPurpose {
    /// 테이블 행 집합
    Snapshot,
    /// 잔고 종목 시세 보강
    Enrich,
}

/// 마운트된 테이블.
#[derive(Debug)]
pub struct BoardTable {
    pub(crate) id: TableId,
    pub(crate) spec: TableSpec,
    pub(crate) reconciler: Reconciler,
    pub(crate) layout: TableLayout,
    pub(crate) filter: Option<String>,
    pub(crate) snapshot_gate: FetchGate,
    pub(crate) enrich_gate: FetchGate,
    pub(crate) refetch_throttle: Throttle,
    pub(crate) consumers: Vec<(StreamClass, ConsumerId)>,
    pub(crate) interests: Vec<Interest>,
}

impl BoardTable {
    pub(crate) fn new(
        id: TableId,
        spec: TableSpec,
        layout: TableLayout,
        config: &BoardConfig,
        events: broadcast::Sender<BoardEvent>,
    ) -> Self {
        let reconciler = Reconciler::new(id, spec.kind(), config.footer_throttle(), events);
        Self {
            id,
            spec,
            reconciler,
            layout,
            filter: None,
            snapshot_gate: FetchGate::new(),
            enrich_gate: FetchGate::new(),
            refetch_throttle: Throttle::new(config.refetch_throttle()),
            consumers: Vec::new(),
            interests: Vec::new(),
        }
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn spec(&self) -> &TableSpec {
        &self.spec
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn layout(&self) -> &TableLayout {
        &self.layout
    }

    pub fn filter(&self) -> Option<&str> {
        normalize_filter(self.filter.as_deref())
    }

    pub fn footer(&self) -> &Footer {
        self.reconciler.footer()
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.reconciler.loaded_at()
    }

    pub fn is_loading(&self) -> bool {
        self.snapshot_gate.is_in_flight()
    }

    pub fn project(&self) -> ProjectedView {
        project(
            self.reconciler.store(),
            &self.layout,
            self.filter(),
            self.reconciler.footer(),
        )
    }

    /// 스냅샷 순서 그대로의 종목 목록 (레이아웃 초기화용).
    pub fn snapshot_order(&self) -> Vec<String> {
        let mut symbols: Vec<String> = Vec::new();
        for row in self.reconciler.store().rows_in_arrival_order() {
            if !symbols.contains(&row.symbol) {
                symbols.push(row.symbol.clone());
            }
        }
        symbols
    }

    /// 가장 가까운 타이머 만료 시각.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        [
            self.reconciler.footer_deadline(),
            self.refetch_throttle.deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_kinds_and_keys() {
        let hose = TableSpec::exchange("hose");
        assert_eq!(hose.kind(), TableKind::PriceBoard);
        assert!(hose.is_market("HOSE"));
        assert_eq!(hose.layout_key(), "price_board:exchange:hose");

        let vnf = TableSpec::derivatives("vnf");
        assert_eq!(vnf.kind(), TableKind::Derivatives);
        assert_eq!(vnf.underlying_index(), Some("VN30"));
        assert_eq!(TableSpec::derivatives("cw").underlying_index(), None);

        let portfolio = TableSpec::portfolio("0001");
        assert_eq!(portfolio.account_id(), Some("0001"));
        assert_eq!(portfolio.stream_classes().len(), 3);
    }

    #[test]
    fn test_interests_include_index_scalar() {
        let spec = TableSpec::derivatives("vnf");
        let symbols = vec!["VN30F2412".to_string()];
        let interests = spec.interests(&symbols);
        assert_eq!(interests.len(), 2);
        assert_eq!(interests[1].topic, Topic::INDEX_REALTIME);
    }
}
