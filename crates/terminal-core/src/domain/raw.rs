//! REST 스냅샷 원시 레코드.
//!
//! 시세판 API는 `stockSymbol`, 잔고 API는 `instrumentID`로 종목을 내려주므로
//! 두 형식을 모두 받아들입니다. 호가는 `best{n}Bid`/`best{n}BidVol`,
//! `best{n}Offer`/`best{n}OfferVol` 형태의 평평한 필드로 내려옵니다.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashMap;

use super::row::{BoardRow, Holding, PriceLevel, TableKind, BOOK_DEPTH};
use crate::types::{decimal_from_value, volume_from_value, Price, RowKey, Volume};

/// 호가 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookSide {
    Bid,
    Offer,
}

impl BookSide {
    fn field_name(&self) -> &'static str {
        match self {
            BookSide::Bid => "Bid",
            BookSide::Offer => "Offer",
        }
    }
}

/// 숫자, 숫자 문자열, 빈 문자열, null을 모두 받아들입니다.
fn lenient_price<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Price>, D::Error> {
    Ok(decimal_from_value(&Value::deserialize(deserializer)?))
}

fn lenient_volume<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Volume>, D::Error> {
    Ok(volume_from_value(&Value::deserialize(deserializer)?))
}

/// 스냅샷 API가 내려주는 종목/포지션 레코드.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawRow {
    #[serde(alias = "stockSymbol", alias = "instrumentID", alias = "instrumentId")]
    pub symbol: String,
    pub exchange: Option<String>,
    pub stock_type: Option<String>,
    pub session: Option<String>,
    pub trading_status: Option<String>,
    #[serde(deserialize_with = "lenient_price")]
    pub ceiling: Option<Price>,
    #[serde(deserialize_with = "lenient_price")]
    pub floor: Option<Price>,
    #[serde(deserialize_with = "lenient_price")]
    pub ref_price: Option<Price>,
    #[serde(deserialize_with = "lenient_price")]
    pub matched_price: Option<Price>,
    #[serde(alias = "matchedVol")]
    #[serde(deserialize_with = "lenient_volume")]
    pub matched_volume: Option<Volume>,
    #[serde(deserialize_with = "lenient_price")]
    pub highest: Option<Price>,
    #[serde(deserialize_with = "lenient_price")]
    pub lowest: Option<Price>,
    #[serde(alias = "buyForeignQtty")]
    #[serde(deserialize_with = "lenient_volume")]
    pub foreign_buy_qty: Option<Volume>,
    #[serde(alias = "sellForeignQtty")]
    #[serde(deserialize_with = "lenient_volume")]
    pub foreign_sell_qty: Option<Volume>,

    /// 파생상품 기초지수 값
    #[serde(alias = "vn30Value")]
    #[serde(deserialize_with = "lenient_price")]
    pub index_value: Option<Price>,

    #[serde(deserialize_with = "lenient_price")]
    pub avg_price: Option<Price>,
    #[serde(deserialize_with = "lenient_volume")]
    pub sellable_qty: Option<Volume>,
    #[serde(alias = "totalVol", alias = "vol")]
    #[serde(deserialize_with = "lenient_volume")]
    pub volume: Option<Volume>,

    /// 호가 등 평평하게 내려오는 나머지 필드
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl RawRow {
    /// 종목코드만 가진 레코드를 생성합니다.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Default::default()
        }
    }

    /// n단계(1부터) 호가를 읽습니다.
    pub fn level(&self, side: BookSide, n: usize) -> PriceLevel {
        let name = side.field_name();
        let price = self
            .extra
            .get(&format!("best{}{}", n, name))
            .and_then(decimal_from_value);
        let volume = self
            .extra
            .get(&format!("best{}{}Vol", n, name))
            .and_then(volume_from_value);
        PriceLevel::new(price, volume)
    }

    /// 뷰 행으로 변환합니다. 파생 필드는 비어 있는 상태입니다.
    pub fn into_row(self, key: RowKey, arrival: usize, kind: TableKind) -> BoardRow {
        let mut row = BoardRow::new(key, arrival);

        for n in 1..=BOOK_DEPTH {
            row.bids[n - 1] = self.level(BookSide::Bid, n);
            row.offers[n - 1] = self.level(BookSide::Offer, n);
        }

        if kind == TableKind::Portfolio {
            let volume = self.volume.unwrap_or(0);
            row.holding = Some(Holding {
                avg_price: self.avg_price,
                sellable_qty: self.sellable_qty.unwrap_or(0),
                volume,
                cost_value: super::cost_value(self.avg_price, volume),
            });
        }

        row.exchange = self.exchange;
        row.stock_type = self.stock_type;
        row.session = self.session;
        row.trading_status = self.trading_status;
        row.ceiling = self.ceiling;
        row.floor = self.floor;
        row.ref_price = self.ref_price;
        row.matched_price = self.matched_price;
        row.matched_volume = self.matched_volume;
        row.highest = self.highest;
        row.lowest = self.lowest;
        row.foreign_buy_qty = self.foreign_buy_qty;
        row.foreign_sell_qty = self.foreign_sell_qty;
        if kind == TableKind::Derivatives {
            row.derived.index_difference =
                super::index_difference(row.matched_price, self.index_value);
        }
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_deserialize_board_record() {
        let json = r#"{
            "stockSymbol": "SSI",
            "exchange": "hose",
            "ceiling": 35000,
            "floor": 30500,
            "refPrice": 32750,
            "matchedPrice": 33000,
            "best1Bid": 32950,
            "best1BidVol": 1200,
            "best2Offer": "33100",
            "best2OfferVol": "300",
            "companyNameVi": "Chung khoan SSI"
        }"#;

        let raw: RawRow = serde_json::from_str(json).unwrap();
        assert_eq!(raw.symbol, "SSI");
        assert_eq!(raw.ref_price, Some(dec!(32750)));
        assert_eq!(
            raw.level(BookSide::Bid, 1),
            PriceLevel::new(Some(dec!(32950)), Some(1200))
        );
        assert_eq!(
            raw.level(BookSide::Offer, 2),
            PriceLevel::new(Some(dec!(33100)), Some(300))
        );
        assert_eq!(raw.level(BookSide::Offer, 10), PriceLevel::default());
    }

    #[test]
    fn test_deserialize_position_record() {
        let json = r#"{"instrumentID": "HPG", "avgPrice": 25000, "sellableQty": 100, "totalVol": 150}"#;
        let raw: RawRow = serde_json::from_str(json).unwrap();

        let row = raw.into_row(RowKey::slot("HPG", 0), 0, TableKind::Portfolio);
        let holding = row.holding.unwrap();
        assert_eq!(holding.volume, 150);
        assert_eq!(holding.sellable_qty, 100);
        assert_eq!(holding.cost_value, dec!(3750000));
        assert_eq!(row.matched_price, None);
    }

    #[test]
    fn test_empty_strings_are_absent() {
        let json = r#"{"stockSymbol": "SSI", "matchedPrice": "", "refPrice": null, "ceiling": "35000"}"#;
        let raw: RawRow = serde_json::from_str(json).unwrap();
        assert_eq!(raw.matched_price, None);
        assert_eq!(raw.ref_price, None);
        assert_eq!(raw.ceiling, Some(dec!(35000)));
    }

    #[test]
    fn test_derivatives_initial_index_difference() {
        let json = r#"{"stockSymbol": "VN30F2412", "matchedPrice": 1305.5, "vn30Value": "1300"}"#;
        let raw: RawRow = serde_json::from_str(json).unwrap();
        let row = raw.into_row(RowKey::symbol("VN30F2412"), 0, TableKind::Derivatives);
        assert_eq!(row.derived.index_difference, Some(dec!(5.5)));
    }

    #[test]
    fn test_board_row_has_no_holding() {
        let row = RawRow::new("FPT").into_row(RowKey::symbol("FPT"), 4, TableKind::PriceBoard);
        assert!(row.holding.is_none());
        assert_eq!(row.arrival, 4);
        assert_eq!(row.symbol, "FPT");
    }
}
