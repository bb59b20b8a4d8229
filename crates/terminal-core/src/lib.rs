//! # Terminal Core
//!
//! 트레이딩 터미널 실시간 시세 계층의 핵심 도메인 모델과 공통 인프라를 제공합니다.
//!
//! - 행(row) 모델: 종목 단위 뷰 상태, 행 키, REST 원시 레코드
//! - 파생 필드 계산기: 평가금액, 평가손익, 손익률, 비중, 대비
//! - 합계(footer) 집계
//! - 호출 빈도 제한(`Throttle`)
//! - 접속 인증 정보 접근자
//! - 설정 관리
//! - 로깅 인프라

pub mod config;
pub mod credentials;
pub mod domain;
pub mod error;
pub mod logging;
pub mod throttle;
pub mod types;

pub use self::config::*;
pub use credentials::{CredentialProvider, StaticCredentials};
pub use domain::*;
pub use error::*;
pub use logging::*;
pub use throttle::Throttle;
pub use types::*;
