//! 시세/잔고 계산용 수치 타입.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

/// 가격 및 금액 타입.
pub type Price = Decimal;

/// 수량(주식 수) 타입.
pub type Volume = i64;

/// JSON 값을 Decimal로 변환합니다.
///
/// 숫자와 숫자 문자열을 모두 허용하며, 빈 문자열과 `null`은 값 없음으로 취급합니다.
pub fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Value::String(s) if !s.trim().is_empty() => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

/// JSON 값을 수량으로 변환합니다.
pub fn volume_from_value(value: &Value) -> Option<Volume> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) if !s.trim().is_empty() => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| Decimal::from_str(s).ok().and_then(|d| d.trunc().to_i64()))
        }
        _ => None,
    }
}
