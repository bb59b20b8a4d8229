//! 파이프(`|`) 구분 위치 기반 틱 스키마.
//!
//! 필드 순서가 의미를 결정하므로 이름이 붙은 고정 스키마로 정의하고,
//! 필드 수가 맞지 않거나 숫자 변환에 실패하면 프레임 전체를 버립니다.
//! 빈 필드는 "이번 틱에 없음"이며 `0`은 값입니다.
//!
//! # 시세판 틱 (`B#`)
//!
//! ```text
//! B#SSI|HOSE|LO|N|35000|30500|32750|33000|1200|33100|32500|1000|500|<매수 1~10>|<매도 1~10>
//! ```
//!
//! 호가 한 단계는 `가격|수량` 두 필드입니다.
//!
//! # 지수 틱 (`I#`)
//!
//! ```text
//! I#VN30|1250.35|4.12|0.33|152000000|3800000000000
//! ```

use rust_decimal::Decimal;
use std::str::FromStr;
use terminal_core::{Price, PriceLevel, RowDelta, Volume, BOOK_DEPTH};

use crate::error::{StreamError, StreamResult};

/// 시세판 틱 태그.
pub const BOARD_TICK_TAG: &str = "B#";

/// 지수 틱 태그.
pub const INDEX_TICK_TAG: &str = "I#";

/// 시세판 틱 고정 필드 (호가 앞부분).
pub const BOARD_TICK_HEAD: [&str; 13] = [
    "tag_symbol",
    "exchange",
    "session",
    "trading_status",
    "ceiling",
    "floor",
    "ref_price",
    "matched_price",
    "matched_volume",
    "highest",
    "lowest",
    "foreign_buy_qty",
    "foreign_sell_qty",
];

/// 시세판 틱 전체 필드 수 (고정 필드 + 매수/매도 10단계 × 가격·수량).
pub const BOARD_TICK_ARITY: usize = BOARD_TICK_HEAD.len() + BOOK_DEPTH * 4;

/// 지수 틱 필드.
pub const INDEX_TICK_FIELDS: [&str; 6] = [
    "tag_index",
    "value",
    "change",
    "change_percent",
    "total_volume",
    "total_value",
];

const BID_OFFSET: usize = BOARD_TICK_HEAD.len();
const OFFER_OFFSET: usize = BID_OFFSET + BOOK_DEPTH * 2;

/// 지수 틱.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexTick {
    /// 지수 코드 (예: VN30)
    pub index: String,
    pub value: Option<Price>,
    pub change: Option<Price>,
    pub change_percent: Option<Price>,
    pub total_volume: Option<Volume>,
    pub total_value: Option<Price>,
}

fn text(field: &str) -> Option<String> {
    let field = field.trim();
    (!field.is_empty()).then(|| field.to_string())
}

fn price(field: &str, name: &str) -> StreamResult<Option<Price>> {
    let field = field.trim();
    if field.is_empty() {
        return Ok(None);
    }
    Decimal::from_str(field)
        .map(Some)
        .map_err(|e| StreamError::Parse(format!("{}={:?}: {}", name, field, e)))
}

fn volume(field: &str, name: &str) -> StreamResult<Option<Volume>> {
    let field = field.trim();
    if field.is_empty() {
        return Ok(None);
    }
    field
        .parse::<Volume>()
        .map(Some)
        .map_err(|e| StreamError::Parse(format!("{}={:?}: {}", name, field, e)))
}

fn tagged<'a>(field: &'a str, tag: &str) -> StreamResult<&'a str> {
    let rest = field
        .strip_prefix(tag)
        .ok_or_else(|| StreamError::Parse(format!("태그 불일치: {:?}", field)))?;
    let rest = rest.trim();
    if rest.is_empty() {
        return Err(StreamError::Parse("종목코드 없음".to_string()));
    }
    Ok(rest)
}

fn levels(fields: &[&str], offset: usize, side: &str) -> StreamResult<[PriceLevel; BOOK_DEPTH]> {
    let mut book = [PriceLevel::default(); BOOK_DEPTH];
    for (n, level) in book.iter_mut().enumerate() {
        let at = offset + n * 2;
        level.price = price(fields[at], side)?;
        level.volume = volume(fields[at + 1], side)?;
    }
    Ok(book)
}

/// 시세판 틱을 파싱합니다.
///
/// `fields`는 `|`로 나눈 전체 필드입니다.
pub fn parse_board_tick(fields: &[&str]) -> StreamResult<RowDelta> {
    if fields.len() != BOARD_TICK_ARITY {
        return Err(StreamError::Parse(format!(
            "시세판 틱 필드 수 불일치: {} (기대값 {})",
            fields.len(),
            BOARD_TICK_ARITY
        )));
    }

    Ok(RowDelta {
        symbol: tagged(fields[0], BOARD_TICK_TAG)?.to_string(),
        exchange: text(fields[1]),
        session: text(fields[2]),
        trading_status: text(fields[3]),
        ceiling: price(fields[4], "ceiling")?,
        floor: price(fields[5], "floor")?,
        ref_price: price(fields[6], "ref_price")?,
        matched_price: price(fields[7], "matched_price")?,
        matched_volume: volume(fields[8], "matched_volume")?,
        highest: price(fields[9], "highest")?,
        lowest: price(fields[10], "lowest")?,
        foreign_buy_qty: volume(fields[11], "foreign_buy_qty")?,
        foreign_sell_qty: volume(fields[12], "foreign_sell_qty")?,
        bids: levels(fields, BID_OFFSET, "bid")?,
        offers: levels(fields, OFFER_OFFSET, "offer")?,
    })
}

/// 지수 틱을 파싱합니다.
pub fn parse_index_tick(fields: &[&str]) -> StreamResult<IndexTick> {
    if fields.len() != INDEX_TICK_FIELDS.len() {
        return Err(StreamError::Parse(format!(
            "지수 틱 필드 수 불일치: {}",
            fields.len()
        )));
    }

    Ok(IndexTick {
        index: tagged(fields[0], INDEX_TICK_TAG)?.to_string(),
        value: price(fields[1], "value")?,
        change: price(fields[2], "change")?,
        change_percent: price(fields[3], "change_percent")?,
        total_volume: volume(fields[4], "total_volume")?,
        total_value: price(fields[5], "total_value")?,
    })
}

fn push<T: ToString>(out: &mut Vec<String>, value: &Option<T>) {
    out.push(value.as_ref().map(ToString::to_string).unwrap_or_default());
}

/// 부분 갱신을 시세판 틱 문자열로 인코딩합니다.
pub fn encode_board_tick(delta: &RowDelta) -> String {
    let mut out = Vec::with_capacity(BOARD_TICK_ARITY);
    out.push(format!("{}{}", BOARD_TICK_TAG, delta.symbol));
    push(&mut out, &delta.exchange);
    push(&mut out, &delta.session);
    push(&mut out, &delta.trading_status);
    push(&mut out, &delta.ceiling);
    push(&mut out, &delta.floor);
    push(&mut out, &delta.ref_price);
    push(&mut out, &delta.matched_price);
    push(&mut out, &delta.matched_volume);
    push(&mut out, &delta.highest);
    push(&mut out, &delta.lowest);
    push(&mut out, &delta.foreign_buy_qty);
    push(&mut out, &delta.foreign_sell_qty);
    for level in delta.bids.iter().chain(delta.offers.iter()) {
        push(&mut out, &level.price);
        push(&mut out, &level.volume);
    }
    out.join("|")
}

/// 지수 틱 문자열로 인코딩합니다.
pub fn encode_index_tick(tick: &IndexTick) -> String {
    let mut out = vec![format!("{}{}", INDEX_TICK_TAG, tick.index)];
    push(&mut out, &tick.value);
    push(&mut out, &tick.change);
    push(&mut out, &tick.change_percent);
    push(&mut out, &tick.total_volume);
    push(&mut out, &tick.total_value);
    out.join("|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn split(text: &str) -> Vec<&str> {
        text.split('|').collect()
    }

    #[test]
    fn test_board_tick_arity() {
        assert_eq!(BOARD_TICK_ARITY, 53);
    }

    #[test]
    fn test_parse_sparse_board_tick() {
        let mut delta = RowDelta::new("SSI");
        delta.matched_price = Some(dec!(33000));
        delta.matched_volume = Some(0);
        delta.offers[9] = PriceLevel::new(Some(dec!(33900)), Some(10));
        let text = encode_board_tick(&delta);

        let parsed = parse_board_tick(&split(&text)).unwrap();
        assert_eq!(parsed, delta);
        assert_eq!(parsed.ref_price, None);
        assert_eq!(parsed.matched_volume, Some(0));
    }

    #[test]
    fn test_arity_mismatch_fails_closed() {
        let text = encode_board_tick(&RowDelta::new("SSI"));
        let mut fields = split(&text);
        fields.pop();
        assert!(matches!(parse_board_tick(&fields), Err(StreamError::Parse(_))));

        let extended = format!("{}|extra", text);
        assert!(parse_board_tick(&split(&extended)).is_err());
    }

    #[test]
    fn test_bad_number_fails_closed() {
        let mut delta = RowDelta::new("SSI");
        delta.exchange = Some("HOSE".to_string());
        let text = encode_board_tick(&delta);
        let mut fields = split(&text);
        fields[7] = "12,5";
        assert!(parse_board_tick(&fields).is_err());
    }

    #[test]
    fn test_missing_symbol_fails_closed() {
        let text = encode_board_tick(&RowDelta::new(""));
        assert!(parse_board_tick(&split(&text)).is_err());
    }

    #[test]
    fn test_parse_index_tick() {
        let tick = parse_index_tick(&split("I#VN30|1250.35|4.12|0.33|152000000|")).unwrap();
        assert_eq!(tick.index, "VN30");
        assert_eq!(tick.value, Some(dec!(1250.35)));
        assert_eq!(tick.total_value, None);
        assert!(parse_index_tick(&split("I#VN30|1250.35")).is_err());
    }
}
