//! 스트림 와이어 프로토콜.

mod control;
mod frame;
mod tick;

pub use control::*;
pub use frame::*;
pub use tick::*;
