//! 스냅샷 요청 세대 관리.
//!
//! 테이블이 다시 마운트되거나 대상이 바뀌면 이전 요청은 취소되고,
//! 늦게 도착한 응답은 버려야 합니다.

use std::future::Future;
use tokio_util::sync::CancellationToken;

use crate::error::{DataError, DataResult};

/// 진행 중인 한 번의 조회.
#[derive(Debug, Clone)]
pub struct FetchTicket {
    seq: u64,
    cancel: CancellationToken,
}

impl FetchTicket {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 취소되면 `DataError::Cancelled`로 끝나도록 감쌉니다.
    pub async fn run<F, T>(&self, fut: F) -> DataResult<T>
    where
        F: Future<Output = DataResult<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(DataError::Cancelled),
            result = fut => result,
        }
    }
}

/// 테이블 하나의 조회 세대.
#[derive(Debug, Default)]
pub struct FetchGate {
    seq: u64,
    current: Option<CancellationToken>,
}

impl FetchGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// 새 조회를 시작합니다. 이전 조회는 취소됩니다.
    pub fn begin(&mut self) -> FetchTicket {
        self.cancel();
        self.seq += 1;
        let cancel = CancellationToken::new();
        self.current = Some(cancel.clone());
        FetchTicket {
            seq: self.seq,
            cancel,
        }
    }

    /// 응답을 반영해도 되는지 확인하고, 그렇다면 세대를 닫습니다.
    pub fn accept(&mut self, ticket: &FetchTicket) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.current = None;
        true
    }

    pub fn is_current(&self, ticket: &FetchTicket) -> bool {
        ticket.seq == self.seq && !ticket.is_cancelled() && self.current.is_some()
    }

    pub fn is_in_flight(&self) -> bool {
        self.current.is_some()
    }

    /// 진행 중인 조회를 취소 (언마운트).
    pub fn cancel(&mut self) {
        if let Some(token) = self.current.take() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newer_ticket_supersedes() {
        let mut gate = FetchGate::new();
        let first = gate.begin();
        let second = gate.begin();

        assert!(first.is_cancelled());
        assert!(!gate.accept(&first));
        assert!(gate.accept(&second));
        // 같은 응답을 두 번 반영하지 않음
        assert!(!gate.accept(&second));
    }

    #[test]
    fn test_cancel_on_unmount() {
        let mut gate = FetchGate::new();
        let ticket = gate.begin();
        gate.cancel();
        assert!(!gate.is_in_flight());
        assert!(!gate.accept(&ticket));
    }

    #[tokio::test]
    async fn test_run_resolves_cancelled() {
        let mut gate = FetchGate::new();
        let ticket = gate.begin();
        gate.cancel();

        let result: DataResult<u32> = ticket.run(std::future::pending()).await;
        assert!(matches!(result, Err(DataError::Cancelled)));
    }
}
