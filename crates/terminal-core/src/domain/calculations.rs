//! 파생 필드 계산 공통 로직.
//!
//! 시세판과 잔고 테이블이 공유하는 평가금액/손익/비중 계산 함수를 제공합니다.
//! 모든 함수는 순수 함수이며, 행 자신의 필드와 (비중의 경우) 테이블 총 평가금액만으로
//! 결과가 결정됩니다.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::footer::Footer;
use super::row::{BoardRow, DerivedFields};
use crate::types::{Price, Volume};

/// 매입 금액이 0(또는 알 수 없음)일 때 사용하는 손익률 값.
pub const GAIN_LOSS_PERCENT_SENTINEL: Decimal = dec!(100);

/// 평가금액 계산.
///
/// 보유 수량이 음수이면 가격과 무관하게 0입니다.
/// 평가할 가격이 없거나 곱이 표현 범위를 넘으면 `None`을 반환합니다.
///
/// # Examples
///
/// ```
/// use terminal_core::market_value;
/// use rust_decimal::Decimal;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(market_value(Some(dec!(12)), 100), Some(dec!(1200)));
/// assert_eq!(market_value(Some(dec!(12)), -5), Some(dec!(0)));
/// assert_eq!(market_value(Some(Decimal::MAX), 100), None);
/// ```
pub fn market_value(mark_price: Option<Price>, volume: Volume) -> Option<Price> {
    if volume < 0 {
        return Some(Decimal::ZERO);
    }
    mark_price?.checked_mul(Decimal::from(volume))
}

/// 매입 금액 계산 (평균 매입가 × 보유 수량).
///
/// 계산할 수 없으면 매입가를 모르는 것과 같이 0으로 둡니다.
pub fn cost_value(avg_price: Option<Price>, volume: Volume) -> Price {
    avg_price
        .and_then(|avg| avg.checked_mul(Decimal::from(volume)))
        .unwrap_or(Decimal::ZERO)
}

/// 평가손익 계산.
///
/// 평균 매입가가 없으면(0 포함) 평가금액 전체를 손익으로 봅니다.
pub fn gain_loss(market_value: Price, avg_price: Option<Price>, cost_value: Price) -> Option<Price> {
    match avg_price {
        Some(avg) if !avg.is_zero() => market_value.checked_sub(cost_value),
        _ => Some(market_value),
    }
}

/// 손익률 계산 (%).
///
/// 매입 금액이 0 이하이면 [`GAIN_LOSS_PERCENT_SENTINEL`]을 반환합니다.
pub fn gain_loss_percent(gain_loss: Price, cost_value: Price) -> Option<Price> {
    if cost_value > Decimal::ZERO {
        gain_loss.checked_div(cost_value)?.checked_mul(dec!(100))
    } else {
        Some(GAIN_LOSS_PERCENT_SENTINEL)
    }
}

/// 기준가 대비.
///
/// 체결이 없으면 `None`입니다 (0과 구분).
pub fn price_change(matched_price: Option<Price>, ref_price: Option<Price>) -> Option<Price> {
    matched_price?.checked_sub(ref_price?)
}

/// 기준가 대비 등락률 (%).
pub fn price_change_percent(matched_price: Option<Price>, ref_price: Option<Price>) -> Option<Price> {
    let reference = ref_price?;
    if reference.is_zero() {
        return None;
    }
    matched_price?
        .checked_sub(reference)?
        .checked_div(reference)?
        .checked_mul(dec!(100))
}

/// 테이블 총 평가금액 대비 비중 (%).
///
/// 총 평가금액이 0이면 비중을 정의할 수 없으므로 `None`입니다.
pub fn weight(market_value: Price, total_market_value: Price) -> Option<Price> {
    if total_market_value.is_zero() {
        return None;
    }
    market_value
        .checked_div(total_market_value)?
        .checked_mul(dec!(100))
}

/// 기초지수 대비 괴리 (체결가 − 지수).
pub fn index_difference(matched_price: Option<Price>, index_value: Option<Price>) -> Option<Price> {
    matched_price?.checked_sub(index_value?)
}

/// 행 하나의 파생 필드를 계산합니다.
///
/// 비중과 지수 괴리는 테이블/지수 상태에 의존하므로 기존 값을 그대로 유지합니다.
/// 표현 범위를 넘는 값은 빈 칸이 됩니다.
pub fn derive(row: &BoardRow) -> DerivedFields {
    let mut derived = DerivedFields {
        price_change: price_change(row.matched_price, row.ref_price),
        price_change_percent: price_change_percent(row.matched_price, row.ref_price),
        weight: row.derived.weight,
        index_difference: row.derived.index_difference,
        ..Default::default()
    };

    if let Some(holding) = &row.holding {
        if let Some(mv) = market_value(row.market_price(), holding.volume) {
            derived.market_value = Some(mv);
            derived.gain_loss = gain_loss(mv, holding.avg_price, holding.cost_value);
            derived.gain_loss_percent = derived
                .gain_loss
                .and_then(|gl| gain_loss_percent(gl, holding.cost_value));
        }
    }

    derived
}

/// 행 집합의 합계를 계산합니다.
///
/// 합계는 표현 범위의 끝에서 멈춥니다.
pub fn aggregate<'a, I>(rows: I) -> Footer
where
    I: IntoIterator<Item = &'a BoardRow>,
{
    let mut footer = Footer::default();
    for row in rows {
        footer.row_count += 1;
        footer.total_market_value = footer
            .total_market_value
            .saturating_add(row.derived.market_value.unwrap_or_default());
        footer.total_gain_loss = footer
            .total_gain_loss
            .saturating_add(row.derived.gain_loss.unwrap_or_default());
        if let Some(holding) = &row.holding {
            footer.total_cost = footer.total_cost.saturating_add(holding.cost_value);
        }
    }
    footer.gain_loss_percent = gain_loss_percent(footer.total_gain_loss, footer.total_cost)
        .unwrap_or(GAIN_LOSS_PERCENT_SENTINEL);
    footer
}
