//! 스트리밍 틱으로 받은 부분 갱신.

use serde::{Deserialize, Serialize};

use super::row::{BoardRow, PriceLevel, BOOK_DEPTH};
use crate::types::{Price, Volume};

/// 한 종목에 대한 부분 갱신.
///
/// `None`인 필드는 "이번 틱에 없음"을 뜻하며 행의 기존 값을 유지합니다.
/// `Some(0)`은 값 0으로 덮어씁니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowDelta {
    pub symbol: String,
    pub exchange: Option<String>,
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
    pub bids: [PriceLevel; BOOK_DEPTH],
    pub offers: [PriceLevel; BOOK_DEPTH],
}

fn overwrite<T: Clone + PartialEq>(slot: &mut Option<T>, incoming: &Option<T>) -> bool {
    match incoming {
        Some(value) if slot.as_ref() != Some(value) => {
            *slot = Some(value.clone());
            true
        }
        _ => false,
    }
}

fn overwrite_level(slot: &mut PriceLevel, incoming: &PriceLevel) -> bool {
    let price = overwrite(&mut slot.price, &incoming.price);
    let volume = overwrite(&mut slot.volume, &incoming.volume);
    price || volume
}

impl RowDelta {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Default::default()
        }
    }

    /// 행의 현재 스트리밍 필드를 그대로 담은 갱신을 만듭니다.
    pub fn from_row(row: &BoardRow) -> Self {
        Self {
            symbol: row.symbol.clone(),
            exchange: row.exchange.clone(),
            session: row.session.clone(),
            trading_status: row.trading_status.clone(),
            ceiling: row.ceiling,
            floor: row.floor,
            ref_price: row.ref_price,
            matched_price: row.matched_price,
            matched_volume: row.matched_volume,
            highest: row.highest,
            lowest: row.lowest,
            foreign_buy_qty: row.foreign_buy_qty,
            foreign_sell_qty: row.foreign_sell_qty,
            bids: row.bids,
            offers: row.offers,
        }
    }

    /// 행에 갱신을 적용합니다. 실제로 바뀐 필드가 있으면 `true`.
    pub fn apply_to(&self, row: &mut BoardRow) -> bool {
        let mut changed = false;
        changed |= overwrite(&mut row.exchange, &self.exchange);
        changed |= overwrite(&mut row.session, &self.session);
        changed |= overwrite(&mut row.trading_status, &self.trading_status);
        changed |= overwrite(&mut row.ceiling, &self.ceiling);
        changed |= overwrite(&mut row.floor, &self.floor);
        changed |= overwrite(&mut row.ref_price, &self.ref_price);
        changed |= overwrite(&mut row.matched_price, &self.matched_price);
        changed |= overwrite(&mut row.matched_volume, &self.matched_volume);
        changed |= overwrite(&mut row.highest, &self.highest);
        changed |= overwrite(&mut row.lowest, &self.lowest);
        changed |= overwrite(&mut row.foreign_buy_qty, &self.foreign_buy_qty);
        changed |= overwrite(&mut row.foreign_sell_qty, &self.foreign_sell_qty);
        for (slot, incoming) in row.bids.iter_mut().zip(self.bids.iter()) {
            changed |= overwrite_level(slot, incoming);
        }
        for (slot, incoming) in row.offers.iter_mut().zip(self.offers.iter()) {
            changed |= overwrite_level(slot, incoming);
        }
        changed
    }
}
