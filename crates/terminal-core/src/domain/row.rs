//! 테이블 행(row) 모델.
//!
//! 한 행은 하나의 거래 가능 종목에 대한 현재 뷰 상태이며 다음으로 구성됩니다:
//! - 정적/저빈도 필드: 거래소, 종목 유형, 세션, 거래 상태, 상한가/하한가/기준가
//! - 스트리밍 필드: 체결가, 체결량, 10단계 매수/매도 호가, 고가/저가, 외국인 매수/매도
//! - 파생 필드: 대비, 등락률, 평가금액, 평가손익, 손익률, 비중 (스트리밍되지 않음)
//! - 잔고 전용 필드: 평균 매입가, 매도 가능 수량, 보유 수량, 매입 금액

use serde::{Deserialize, Serialize};

use crate::types::{Price, RowKey, Volume};

/// 호가 단계 수.
pub const BOOK_DEPTH: usize = 10;

/// 테이블 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    /// 시세판 (거래소/관심종목/업종/ETF)
    PriceBoard,
    /// 파생상품 시세판
    Derivatives,
    /// 보유 잔고
    Portfolio,
}

impl TableKind {
    /// 같은 종목이 여러 행으로 나타날 수 있는 테이블인지 여부.
    pub fn allows_duplicate_symbols(&self) -> bool {
        matches!(self, TableKind::Portfolio)
    }
}

impl std::fmt::Display for TableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableKind::PriceBoard => write!(f, "price_board"),
            TableKind::Derivatives => write!(f, "derivatives"),
            TableKind::Portfolio => write!(f, "portfolio"),
        }
    }
}

/// 호가 한 단계.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Option<Price>,
    pub volume: Option<Volume>,
}

impl PriceLevel {
    pub fn new(price: Option<Price>, volume: Option<Volume>) -> Self {
        Self { price, volume }
    }
}

/// 보유 잔고 정보 (잔고 테이블 전용).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    /// 평균 매입가
    pub avg_price: Option<Price>,
    /// 매도 가능 수량
    pub sellable_qty: Volume,
    /// 총 보유 수량
    pub volume: Volume,
    /// 매입 금액 (평균 매입가 × 보유 수량)
    pub cost_value: Price,
}

/// 계산으로만 채워지는 파생 필드.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedFields {
    /// 기준가 대비
    pub price_change: Option<Price>,
    /// 기준가 대비 등락률 (%)
    pub price_change_percent: Option<Price>,
    /// 평가금액
    pub market_value: Option<Price>,
    /// 평가손익
    pub gain_loss: Option<Price>,
    /// 손익률 (%)
    pub gain_loss_percent: Option<Price>,
    /// 테이블 총 평가금액 대비 비중 (%)
    pub weight: Option<Price>,
    /// 지수 대비 괴리 (파생상품: 체결가 − 기초지수)
    pub index_difference: Option<Price>,
}

/// 한 종목의 현재 뷰 상태.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardRow {
    pub key: RowKey,
    pub symbol: String,
    /// 스냅샷 내 도착 순서
    pub arrival: usize,

    pub exchange: Option<String>,
    pub stock_type: Option<String>,
    pub session: Option<String>,
    pub trading_status: Option<String>,
    pub ceiling: Option<Price>,
    pub floor: Option<Price>,
    pub ref_price: Option<Price>,

    pub matched_price: Option<Price>,
    pub matched_volume: Option<Volume>,
    pub highest: Option<Price>,
    pub lowest: Option<Price>,
    pub foreign_buy_qty: Option<Volume>,
    pub foreign_sell_qty: Option<Volume>,
    /// 매수 호가 1~10단계
    pub bids: [PriceLevel; BOOK_DEPTH],
    /// 매도 호가 1~10단계
    pub offers: [PriceLevel; BOOK_DEPTH],

    pub holding: Option<Holding>,
    pub derived: DerivedFields,
}

impl BoardRow {
    /// 빈 행을 생성합니다.
    pub fn new(key: RowKey, arrival: usize) -> Self {
        Self {
            symbol: key.as_symbol().to_string(),
            key,
            arrival,
            exchange: None,
            stock_type: None,
            session: None,
            trading_status: None,
            ceiling: None,
            floor: None,
            ref_price: None,
            matched_price: None,
            matched_volume: None,
            highest: None,
            lowest: None,
            foreign_buy_qty: None,
            foreign_sell_qty: None,
            bids: [PriceLevel::default(); BOOK_DEPTH],
            offers: [PriceLevel::default(); BOOK_DEPTH],
            holding: None,
            derived: DerivedFields::default(),
        }
    }

    /// 평가에 사용할 시장가.
    ///
    /// 체결가가 없으면 기준가로 대체합니다. 둘 다 없으면 평가할 수 없습니다.
    pub fn market_price(&self) -> Option<Price> {
        self.matched_price.or(self.ref_price)
    }

    /// 체결 관련 필드를 비웁니다 (ATC 세션 진입 시).
    pub fn clear_matched(&mut self) {
        self.matched_price = None;
        self.matched_volume = None;
        self.derived.price_change = None;
        self.derived.price_change_percent = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_market_price_falls_back_to_ref_price() {
        let mut row = BoardRow::new(RowKey::symbol("VNM"), 0);
        assert_eq!(row.market_price(), None);

        row.ref_price = Some(dec!(70000));
        assert_eq!(row.market_price(), Some(dec!(70000)));

        row.matched_price = Some(dec!(71000));
        assert_eq!(row.market_price(), Some(dec!(71000)));
    }

    #[test]
    fn test_clear_matched() {
        let mut row = BoardRow::new(RowKey::symbol("VNM"), 0);
        row.matched_price = Some(dec!(71000));
        row.matched_volume = Some(100);
        row.derived.price_change = Some(dec!(1000));
        row.clear_matched();

        assert_eq!(row.matched_price, None);
        assert_eq!(row.matched_volume, None);
        assert_eq!(row.derived.price_change, None);
    }

    #[test]
    fn test_table_kind_duplicates() {
        assert!(TableKind::Portfolio.allows_duplicate_symbols());
        assert!(!TableKind::PriceBoard.allows_duplicate_symbols());
    }
}
