//! 스냅샷/실시간 갱신 조정기.
//!
//! 테이블 하나의 [`RowStore`]를 단독으로 소유하며 다음을 보장합니다:
//! - 스냅샷은 저장소를 통째로 교체하고 세대 번호를 올립니다.
//! - 실시간 갱신은 관심 종목일 때만 반영되며, 같은 종목의 모든 행에 적용됩니다.
//! - 이전 세대를 대상으로 계산된 갱신은 버립니다.
//! - 합계와 비중 재계산은 초당 1회로 제한됩니다.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use terminal_core::{
    aggregate, index_difference, BoardRow, Footer, Price, RawRow, RowDelta, RowKey, TableKind,
    Throttle,
};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{BoardError, BoardResult};
use crate::events::{BoardEvent, TableId};
use crate::store::RowStore;

/// 갱신 계산을 시작한 시점의 스냅샷 세대.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaTicket {
    generation: u64,
}

impl DeltaTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug)]
pub struct Reconciler {
    table: TableId,
    kind: TableKind,
    store: RowStore,
    generation: u64,
    interesting: BTreeSet<String>,
    footer: Footer,
    footer_throttle: Throttle,
    /// 파생상품 기초지수 최신 값
    index_value: Option<Price>,
    /// 거래소별 현재 세션 (잔고 테이블)
    sessions: HashMap<String, String>,
    loaded_at: Option<DateTime<Utc>>,
    events: broadcast::Sender<BoardEvent>,
}

impl Reconciler {
    pub fn new(
        table: TableId,
        kind: TableKind,
        footer_interval: Duration,
        events: broadcast::Sender<BoardEvent>,
    ) -> Self {
        Self {
            table,
            kind,
            store: RowStore::new(),
            generation: 0,
            interesting: BTreeSet::new(),
            footer: Footer::default(),
            footer_throttle: Throttle::new(footer_interval),
            index_value: None,
            sessions: HashMap::new(),
            loaded_at: None,
            events,
        }
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn store(&self) -> &RowStore {
        &self.store
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 실시간 갱신을 받아들이는 종목 집합.
    pub fn interesting(&self) -> &BTreeSet<String> {
        &self.interesting
    }

    pub fn footer(&self) -> &Footer {
        &self.footer
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }

    pub fn index_value(&self) -> Option<Price> {
        self.index_value
    }

    // ==================== 스냅샷 ====================

    /// 스냅샷으로 저장소를 교체합니다.
    ///
    /// 같은 종목이 여러 번 나올 수 있는 테이블은 `SYMBOL#n`(n = 스냅샷 내 위치)
    /// 키를 씁니다. 합계와 비중은 즉시 계산됩니다.
    pub fn load_snapshot(&mut self, records: Vec<RawRow>, loaded_at: DateTime<Utc>) -> Vec<RowKey> {
        self.generation += 1;

        if self.kind == TableKind::Derivatives {
            if let Some(value) = records.iter().find_map(|r| r.index_value) {
                self.index_value = Some(value);
            }
        }

        let duplicates = self.kind.allows_duplicate_symbols();
        let rows: Vec<BoardRow> = records
            .into_iter()
            .enumerate()
            .map(|(arrival, raw)| {
                let key = if duplicates {
                    RowKey::slot(raw.symbol.clone(), arrival)
                } else {
                    RowKey::symbol(raw.symbol.clone())
                };
                let mut row = raw.into_row(key, arrival, self.kind);
                self.apply_session(&mut row);
                row
            })
            .collect();

        let keys = self.store.replace_all(rows);
        self.interesting = self.store.symbols();
        self.loaded_at = Some(loaded_at);
        self.footer_throttle.reset();
        self.recompute_footer();

        debug!(
            table = %self.table,
            generation = self.generation,
            rows = keys.len(),
            "스냅샷 반영"
        );
        self.emit(BoardEvent::SnapshotLoaded {
            table: self.table,
            rows: keys.len(),
            loaded_at,
        });
        keys
    }

    // ==================== 실시간 갱신 ====================

    /// 현재 세대에 대한 갱신 계산을 시작합니다.
    pub fn begin_delta(&self) -> DeltaTicket {
        DeltaTicket {
            generation: self.generation,
        }
    }

    /// 갱신을 반영합니다. 세대가 바뀌었으면 버리고 에러를 반환합니다.
    pub fn commit_delta(
        &mut self,
        ticket: DeltaTicket,
        delta: &RowDelta,
        now: Instant,
    ) -> BoardResult<Vec<RowKey>> {
        if ticket.generation != self.generation {
            debug!(
                table = %self.table,
                expected = ticket.generation,
                current = self.generation,
                "이전 세대 갱신 폐기"
            );
            return Err(BoardError::StaleGeneration {
                expected: ticket.generation,
                current: self.generation,
            });
        }

        if !self.interesting.contains(&delta.symbol) {
            return Ok(Vec::new());
        }

        let index_value = self.index_value;
        let kind = self.kind;
        let sessions = &self.sessions;
        let changed = self.store.patch_symbol(delta, |row| {
            let mut adjusted = false;
            if kind == TableKind::Portfolio {
                adjusted |= override_session(row, sessions);
            }
            if kind == TableKind::Derivatives && index_value.is_some() {
                let next = index_difference(row.matched_price, index_value);
                if row.derived.index_difference != next {
                    row.derived.index_difference = next;
                    adjusted = true;
                }
            }
            adjusted
        });

        if changed.is_empty() {
            debug!(table = %self.table, symbol = %delta.symbol, "변경 없는 갱신");
            return Ok(changed);
        }

        self.emit(BoardEvent::RowsChanged {
            table: self.table,
            keys: changed.clone(),
        });
        self.schedule_footer(now);
        Ok(changed)
    }

    /// 현재 세대로 즉시 반영합니다.
    pub fn apply_delta(&mut self, delta: &RowDelta, now: Instant) -> Vec<RowKey> {
        let ticket = self.begin_delta();
        self.commit_delta(ticket, delta, now).unwrap_or_default()
    }

    /// REST 시세 레코드를 갱신으로 반영합니다 (잔고 종목 시세 보강).
    pub fn apply_records(&mut self, records: Vec<RawRow>, now: Instant) -> Vec<RowKey> {
        let mut changed = BTreeSet::new();
        for raw in records {
            let symbol = raw.symbol.clone();
            let row = raw.into_row(RowKey::symbol(symbol), 0, TableKind::PriceBoard);
            let delta = RowDelta::from_row(&row);
            changed.extend(self.apply_delta(&delta, now));
        }
        changed.into_iter().collect()
    }

    /// 동시호가 진입: 체결 관련 필드를 비웁니다.
    pub fn clear_matched(&mut self, now: Instant) -> Vec<RowKey> {
        let changed = self.store.update_all(|row| {
            let had = row.matched_price.is_some() || row.matched_volume.is_some();
            row.clear_matched();
            had
        });
        self.after_bulk_change(changed, now)
    }

    /// 거래소별 세션을 갱신하고 잔고 행에 반영합니다.
    pub fn update_sessions(&mut self, sessions: &HashMap<String, String>, now: Instant) -> Vec<RowKey> {
        self.sessions.extend(sessions.iter().map(|(k, v)| (k.clone(), v.clone())));
        if self.kind != TableKind::Portfolio {
            return Vec::new();
        }
        let current = self.sessions.clone();
        let changed = self.store.update_all(|row| override_session(row, &current));
        self.after_bulk_change(changed, now)
    }

    /// 기초지수 틱: 모든 행의 지수 괴리를 다시 계산합니다.
    pub fn apply_index(&mut self, value: Option<Price>, now: Instant) -> Vec<RowKey> {
        let Some(value) = value else {
            return Vec::new();
        };
        if self.kind != TableKind::Derivatives {
            return Vec::new();
        }
        self.index_value = Some(value);
        let changed = self.store.update_all(|row| {
            let next = index_difference(row.matched_price, Some(value));
            if row.derived.index_difference == next {
                return false;
            }
            row.derived.index_difference = next;
            true
        });
        self.after_bulk_change(changed, now)
    }

    fn apply_session(&self, row: &mut BoardRow) {
        if self.kind == TableKind::Portfolio {
            override_session(row, &self.sessions);
        }
    }

    fn after_bulk_change(&mut self, changed: Vec<RowKey>, now: Instant) -> Vec<RowKey> {
        if !changed.is_empty() {
            self.emit(BoardEvent::RowsChanged {
                table: self.table,
                keys: changed.clone(),
            });
            self.schedule_footer(now);
        }
        changed
    }

    // ==================== 합계 ====================

    fn schedule_footer(&mut self, now: Instant) {
        if self.footer_throttle.request(now) {
            self.recompute_footer();
        }
    }

    /// 예약된 합계 재계산 시각.
    pub fn footer_deadline(&self) -> Option<Instant> {
        self.footer_throttle.deadline()
    }

    /// 예약된 합계 재계산을 실행할 때가 되었으면 실행합니다.
    pub fn poll_footer(&mut self, now: Instant) -> bool {
        if self.footer_throttle.poll_trailing(now) {
            self.recompute_footer();
            true
        } else {
            false
        }
    }

    fn recompute_footer(&mut self) {
        let footer = aggregate(self.store.rows());
        let reweighted = self.store.apply_weights(footer.total_market_value);
        if !reweighted.is_empty() {
            self.emit(BoardEvent::RowsChanged {
                table: self.table,
                keys: reweighted,
            });
        }
        if footer != self.footer {
            self.footer = footer.clone();
            self.emit(BoardEvent::FooterChanged {
                table: self.table,
                footer,
            });
        }
    }

    fn emit(&self, event: BoardEvent) {
        // 구독자가 없어도 무방
        let _ = self.events.send(event);
    }
}

fn override_session(row: &mut BoardRow, sessions: &HashMap<String, String>) -> bool {
    let Some(exchange) = row.exchange.as_deref() else {
        return false;
    };
    match sessions.get(exchange) {
        Some(session) if row.session.as_deref() != Some(session.as_str()) => {
            row.session = Some(session.clone());
            true
        }
        _ => false,
    }
}
