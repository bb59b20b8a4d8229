//! 테이블 행 키.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 합계(footer) 의사 행의 ID.
pub const FOOTER_ID: &str = "footer";

/// 테이블 내에서 한 행을 유일하게 식별하는 키.
///
/// 대부분 종목코드 자체가 키가 되지만, 같은 종목이 여러 슬롯에 나타나는 경우
/// (예: 서로 다른 매입 단가로 보유한 동일 종목) 스냅샷 내 위치를 슬롯 번호로 붙입니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowKey {
    symbol: String,
    slot: Option<usize>,
}

impl RowKey {
    /// 종목코드 단독 키.
    pub fn symbol(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            slot: None,
        }
    }

    /// 종목코드 + 슬롯 번호 키.
    pub fn slot(symbol: impl Into<String>, slot: usize) -> Self {
        Self {
            symbol: symbol.into(),
            slot: Some(slot),
        }
    }

    /// 키가 가리키는 종목코드.
    pub fn as_symbol(&self) -> &str {
        &self.symbol
    }

    /// 슬롯 번호 (단일 인스턴스 키면 None).
    pub fn slot_index(&self) -> Option<usize> {
        self.slot
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot {
            Some(slot) => write!(f, "{}#{}", self.symbol, slot),
            None => write!(f, "{}", self.symbol),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_key_display() {
        assert_eq!(RowKey::symbol("SSI").to_string(), "SSI");
        assert_eq!(RowKey::slot("SSI", 3).to_string(), "SSI#3");
        assert_eq!(RowKey::slot("SSI", 3).as_symbol(), "SSI");
    }

    #[test]
    fn test_row_key_equality_includes_slot() {
        assert_ne!(RowKey::slot("SSI", 0), RowKey::slot("SSI", 1));
        assert_ne!(RowKey::symbol("SSI"), RowKey::slot("SSI", 0));
    }
}
