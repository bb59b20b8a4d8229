//! 터미널 CLI 도구 모음.
//!
//! - 시세판/잔고 테이블 실행 후 투영 결과 출력
//! - 주문 체결 알림 출력
//! - 수신 프레임 진단

pub mod commands;

pub use commands::*;
