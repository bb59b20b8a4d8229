//! 시세판/잔고 테이블을 위한 도메인 모델.

mod calculations;
mod delta;
mod footer;
mod raw;
mod row;

pub use calculations::*;
pub use delta::*;
pub use footer::*;
pub use raw::*;
pub use row::*;
