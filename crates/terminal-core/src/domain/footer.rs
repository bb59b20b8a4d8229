//! 합계(footer) 의사 행.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::calculations::GAIN_LOSS_PERCENT_SENTINEL;
use crate::types::{Price, FOOTER_ID};

/// 테이블 합계.
///
/// 실제 행 전체에 대한 평가금액/매입금액/평가손익 합계입니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Footer {
    pub total_market_value: Price,
    pub total_cost: Price,
    pub total_gain_loss: Price,
    /// 총 손익률 (총 매입금액이 0이면 100)
    pub gain_loss_percent: Price,
    pub row_count: usize,
}

impl Footer {
    /// 의사 행 ID.
    pub fn id(&self) -> &'static str {
        FOOTER_ID
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }
}

impl Default for Footer {
    fn default() -> Self {
        Self {
            total_market_value: Decimal::ZERO,
            total_cost: Decimal::ZERO,
            total_gain_loss: Decimal::ZERO,
            gain_loss_percent: GAIN_LOSS_PERCENT_SENTINEL,
            row_count: 0,
        }
    }
}
