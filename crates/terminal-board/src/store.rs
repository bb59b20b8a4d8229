//! 테이블 하나의 행 저장소.
//!
//! 삽입 순서는 표시 순서가 아닙니다. 표시 순서는 [`crate::projection`]이 정합니다.
//! 변경은 `replace_all`/`patch_symbol`을 통해서만 이루어지며, 변경된 행의 파생 필드는
//! 그 자리에서 다시 계산됩니다.

use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use terminal_core::{derive, weight, BoardRow, RowDelta, RowKey};

#[derive(Debug, Default, Clone)]
pub struct RowStore {
    rows: HashMap<RowKey, BoardRow>,
    /// 종목코드 → 해당 종목의 모든 행 키 (도착 순서)
    by_symbol: HashMap<String, Vec<RowKey>>,
}

impl RowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, key: &RowKey) -> Option<&BoardRow> {
        self.rows.get(key)
    }

    /// 종목코드로 첫 번째 행을 찾습니다.
    pub fn get_symbol(&self, symbol: &str) -> Option<&BoardRow> {
        self.keys_for_symbol(symbol)
            .first()
            .and_then(|key| self.rows.get(key))
    }

    pub fn contains_symbol(&self, symbol: &str) -> bool {
        self.by_symbol.contains_key(symbol)
    }

    /// 한 종목에 묶인 모든 행 키.
    pub fn keys_for_symbol(&self, symbol: &str) -> &[RowKey] {
        self.by_symbol
            .get(symbol)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn symbols(&self) -> BTreeSet<String> {
        self.by_symbol.keys().cloned().collect()
    }

    /// 순서가 보장되지 않는 행 순회.
    pub fn rows(&self) -> impl Iterator<Item = &BoardRow> {
        self.rows.values()
    }

    /// 스냅샷 도착 순서로 정렬된 행.
    pub fn rows_in_arrival_order(&self) -> Vec<&BoardRow> {
        let mut rows: Vec<&BoardRow> = self.rows.values().collect();
        rows.sort_by(|a, b| a.arrival.cmp(&b.arrival).then_with(|| a.key.cmp(&b.key)));
        rows
    }

    /// 저장소 전체를 교체합니다. 새 키 목록을 도착 순서로 반환합니다.
    pub fn replace_all(&mut self, rows: Vec<BoardRow>) -> Vec<RowKey> {
        self.rows.clear();
        self.by_symbol.clear();

        let mut keys = Vec::with_capacity(rows.len());
        for mut row in rows {
            row.derived = derive(&row);
            let key = row.key.clone();
            let entry = self.by_symbol.entry(row.symbol.clone()).or_default();
            if !entry.contains(&key) {
                entry.push(key.clone());
                keys.push(key.clone());
            }
            self.rows.insert(key, row);
        }
        keys
    }

    /// 종목에 묶인 모든 행에 갱신을 적용하고 바뀐 키를 반환합니다.
    ///
    /// `adjust`는 갱신 직후 같은 행에 호출되어 테이블별 보정을 덧붙이며,
    /// 보정으로 값이 바뀌었으면 `true`를 반환합니다.
    pub fn patch_symbol<F>(&mut self, delta: &RowDelta, mut adjust: F) -> Vec<RowKey>
    where
        F: FnMut(&mut BoardRow) -> bool,
    {
        let keys = self.keys_for_symbol(&delta.symbol).to_vec();
        keys.into_iter()
            .filter(|key| {
                self.update(key, |row| {
                    let patched = delta.apply_to(row);
                    let adjusted = adjust(row);
                    patched || adjusted
                })
            })
            .collect()
    }

    /// 행을 변경하는 유일한 통로. `f`가 `true`를 반환하면 파생 필드를 다시 계산합니다.
    fn update<F>(&mut self, key: &RowKey, f: F) -> bool
    where
        F: FnOnce(&mut BoardRow) -> bool,
    {
        let Some(row) = self.rows.get_mut(key) else {
            return false;
        };
        if !f(row) {
            return false;
        }
        row.derived = derive(row);
        true
    }

    /// 모든 행에 같은 변경을 적용하고 바뀐 키를 도착 순서로 반환합니다.
    pub(crate) fn update_all<F>(&mut self, mut f: F) -> Vec<RowKey>
    where
        F: FnMut(&mut BoardRow) -> bool,
    {
        let keys: Vec<RowKey> = self
            .rows_in_arrival_order()
            .into_iter()
            .map(|row| row.key.clone())
            .collect();
        keys.into_iter()
            .filter(|key| self.update(key, &mut f))
            .collect()
    }

    /// 테이블 총 평가금액 기준으로 비중을 다시 매깁니다.
    pub fn apply_weights(&mut self, total_market_value: Decimal) -> Vec<RowKey> {
        let mut changed = Vec::new();
        for row in self.rows.values_mut() {
            let next = row
                .derived
                .market_value
                .and_then(|mv| weight(mv, total_market_value));
            if row.derived.weight != next {
                row.derived.weight = next;
                changed.push(row.key.clone());
            }
        }
        changed.sort();
        changed
    }
}
