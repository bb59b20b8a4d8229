//! # Terminal Board
//!
//! 마운트된 테이블 위젯의 행 상태를 관리합니다.
//!
//! - [`RowStore`]: 테이블 하나의 행 저장소
//! - [`Reconciler`]: 스냅샷 교체, 실시간 갱신 반영, 합계 throttle, 세대 보호
//! - [`projection`]: 고정/정렬/필터를 적용한 표시 순서
//! - [`Workspace`]: 연결 관리자와 테이블을 소유하는 단일 이벤트 루프

pub mod error;
pub mod events;
pub mod projection;
pub mod reconciler;
pub mod store;
pub mod table;
pub mod workspace;

pub use error::{BoardError, BoardResult};
pub use events::{BoardEvent, TableId};
pub use projection::{project, ProjectedView};
pub use reconciler::{DeltaTicket, Reconciler};
pub use store::RowStore;
pub use table::{BoardTable, FetchPurpose, TableSource, TableSpec, DEFAULT_UNDERLYING_INDEX};
pub use workspace::{FetchOutcome, Workspace, WorkspaceCommand, WorkspaceDeps, WorkspaceHandle};
