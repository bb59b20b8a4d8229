//! # Terminal Data
//!
//! 실시간 시세 계층의 REST/영속성 협력자를 제공합니다.
//!
//! - 스냅샷 소스: 공통 응답 봉투 `{ code, data, message }` 처리
//! - 조회 세대 관리: 늦게 도착한 응답 폐기
//! - 테이블 레이아웃 저장: JSON 파일 저장소와 디바운스 저장기

pub mod envelope;
pub mod error;
pub mod gate;
pub mod layout;
pub mod snapshot;

pub use envelope::Envelope;
pub use error::{DataError, DataResult};
pub use gate::{FetchGate, FetchTicket};
pub use layout::{DebouncedSaver, JsonFileLayoutStore, LayoutStore, MemoryLayoutStore, TableLayout};
pub use snapshot::{RestSnapshotClient, Snapshot, SnapshotQuery, SnapshotSource};
