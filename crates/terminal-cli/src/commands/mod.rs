//! CLI 명령어 구현 모듈.

pub mod decode;
pub mod orders;
pub mod render;
pub mod watch;
