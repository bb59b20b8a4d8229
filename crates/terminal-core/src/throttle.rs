//! 호출 빈도 제한.
//!
//! 틱 폭주 시 합계 재계산과 스냅샷 재조회 요청을 초당 1회 수준으로 묶기 위한
//! leading + trailing 방식의 throttle입니다. 첫 요청은 즉시 통과하고, 간격 안에
//! 들어온 요청은 하나로 합쳐져 간격이 끝나는 시점에 한 번 더 실행됩니다.
//!
//! 타이머를 직접 소유하지 않습니다. 호출자는 [`Throttle::deadline`]으로 다음
//! 실행 시각을 얻어 자신의 이벤트 루프(`tokio::select!`)에서 대기한 뒤
//! [`Throttle::poll_trailing`]을 호출합니다.

use std::time::Duration;
use tokio::time::Instant;

/// leading + trailing throttle.
#[derive(Debug, Clone)]
pub struct Throttle {
    /// 최소 실행 간격
    interval: Duration,
    /// 마지막 실행 시각
    last_fired: Option<Instant>,
    /// 간격 종료 시 실행할 요청이 남아 있는지 여부
    pending: bool,
}

impl Throttle {
    /// 새 throttle 생성.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fired: None,
            pending: false,
        }
    }

    /// 초당 1회 throttle.
    pub fn per_second() -> Self {
        Self::new(Duration::from_secs(1))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 실행을 요청합니다.
    ///
    /// 지금 실행해도 되면 `true`를 반환하고 실행 시각을 기록합니다.
    /// 간격 안이면 trailing 실행을 예약하고 `false`를 반환합니다.
    pub fn request(&mut self, now: Instant) -> bool {
        if self.is_open(now) {
            self.fire(now);
            true
        } else {
            self.pending = true;
            false
        }
    }

    /// trailing 실행이 예약되어 있는지 여부.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// 예약된 trailing 실행 시각.
    pub fn deadline(&self) -> Option<Instant> {
        if !self.pending {
            return None;
        }
        Some(match self.last_fired {
            Some(at) => at + self.interval,
            None => Instant::now(),
        })
    }

    /// 예약된 trailing 실행 시각이 지났으면 실행 처리하고 `true`를 반환합니다.
    pub fn poll_trailing(&mut self, now: Instant) -> bool {
        if self.pending && self.is_open(now) {
            self.fire(now);
            true
        } else {
            false
        }
    }

    /// 예약된 trailing 실행을 취소합니다.
    pub fn cancel(&mut self) {
        self.pending = false;
    }

    /// 초기 상태로 되돌립니다.
    pub fn reset(&mut self) {
        self.last_fired = None;
        self.pending = false;
    }

    fn is_open(&self, now: Instant) -> bool {
        match self.last_fired {
            Some(at) => now.saturating_duration_since(at) >= self.interval,
            None => true,
        }
    }

    fn fire(&mut self, now: Instant) {
        self.last_fired = Some(now);
        self.pending = false;
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::per_second()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_leading_call_passes() {
        let mut throttle = Throttle::per_second();
        assert!(throttle.request(Instant::now()));
        assert!(!throttle.is_pending());
        assert_eq!(throttle.deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_into_one_trailing_call() {
        let mut throttle = Throttle::per_second();
        let start = Instant::now();
        assert!(throttle.request(start));

        for _ in 0..50 {
            tokio::time::advance(Duration::from_millis(10)).await;
            assert!(!throttle.request(Instant::now()));
        }
        assert_eq!(throttle.deadline(), Some(start + Duration::from_secs(1)));

        // 간격 전에는 실행되지 않음
        assert!(!throttle.poll_trailing(Instant::now()));

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(throttle.poll_trailing(Instant::now()));
        assert!(!throttle.poll_trailing(Instant::now()));
        assert_eq!(throttle.deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_after_interval_is_leading_again() {
        let mut throttle = Throttle::new(Duration::from_millis(200));
        assert!(throttle.request(Instant::now()));
        tokio::time::advance(Duration::from_millis(250)).await;
        assert!(throttle.request(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_trailing_call() {
        let mut throttle = Throttle::per_second();
        assert!(throttle.request(Instant::now()));
        assert!(!throttle.request(Instant::now()));
        throttle.cancel();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!throttle.poll_trailing(Instant::now()));
    }
}
