//! 설정 관리.
//!
//! 기본값 → (선택) TOML 파일 → 환경 변수 순서로 설정을 겹쳐 읽습니다.
//! 환경 변수는 `TERMINAL__<섹션>__<키>` 형식입니다 (예: `TERMINAL__REST__BASE_URL`).
//!
//! 접속 토큰 같은 인증 정보는 설정 파일에 두지 않습니다.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{TerminalError, TerminalResult};

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// 실시간 스트림 설정
    pub stream: StreamConfig,
    /// REST 스냅샷 설정
    pub rest: RestConfig,
    /// 테이블 설정
    pub board: BoardConfig,
    /// 레이아웃 저장 설정
    pub persistence: PersistenceConfig,
    /// 로깅 설정
    pub logging: LoggingConfig,
}

/// 실시간 스트림 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    /// 시세 스트림 주소
    pub market_data_url: String,
    /// 주문/잔고 스트림 기본 주소 (`/trade-stream/...`이 뒤에 붙음)
    pub order_stream_url: String,
    /// 이 시간(초) 이상 백그라운드에 있었으면 복귀 시 연결 상태를 재점검
    pub stale_after_hidden_secs: u64,
    /// 연결당 송신 큐 크기
    pub outbound_buffer: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            market_data_url: "ws://localhost:8080/market-data".to_string(),
            order_stream_url: "ws://localhost:8080".to_string(),
            stale_after_hidden_secs: 300,
            outbound_buffer: 256,
        }
    }
}

impl StreamConfig {
    pub fn stale_after_hidden(&self) -> Duration {
        Duration::from_secs(self.stale_after_hidden_secs)
    }
}

/// REST 스냅샷 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RestConfig {
    /// API 기본 주소
    pub base_url: String,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
    /// 성공으로 간주하는 응답 코드
    pub success_codes: Vec<String>,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            timeout_secs: 10,
            success_codes: ["0", "00", "200", "SUCCESS"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl RestConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// 테이블 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BoardConfig {
    /// 합계 재계산 최소 간격 (밀리초)
    pub footer_throttle_ms: u64,
    /// 스냅샷 재조회 최소 간격 (밀리초)
    pub refetch_throttle_ms: u64,
    /// 행 변경 이벤트 채널 크기
    pub event_buffer: usize,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            footer_throttle_ms: 1000,
            refetch_throttle_ms: 1000,
            event_buffer: 1024,
        }
    }
}

impl BoardConfig {
    pub fn footer_throttle(&self) -> Duration {
        Duration::from_millis(self.footer_throttle_ms)
    }

    pub fn refetch_throttle(&self) -> Duration {
        Duration::from_millis(self.refetch_throttle_ms)
    }
}

/// 레이아웃(고정/이동) 저장 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// 레이아웃 파일 디렉터리
    pub layout_path: String,
    /// 저장 지연 (밀리초)
    pub save_debounce_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            layout_path: "data/layout".to_string(),
            save_debounce_ms: 500,
        }
    }
}

impl PersistenceConfig {
    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// 설정을 불러옵니다.
    ///
    /// `path`의 파일이 없으면 기본값과 환경 변수만 사용합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> TerminalResult<Self> {
        let builder = config::Config::builder()
            // 기본값으로 시작
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // 설정 파일
            .add_source(config::File::from(path.as_ref()).required(false))
            // 환경 변수로 오버라이드
            .add_source(
                config::Environment::with_prefix("TERMINAL")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("rest.success_codes")
                    .try_parsing(true),
            );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 기본 경로(`config/default.toml`)에서 설정을 불러옵니다.
    pub fn load_default() -> TerminalResult<Self> {
        Self::load("config/default.toml")
    }

    /// 설정 값의 유효성을 검사합니다.
    pub fn validate(&self) -> TerminalResult<()> {
        if self.stream.market_data_url.is_empty() {
            return Err(TerminalError::Config(
                "stream.market_data_url이 비어 있습니다".to_string(),
            ));
        }
        if self.stream.outbound_buffer == 0 || self.board.event_buffer == 0 {
            return Err(TerminalError::Config(
                "채널 크기는 1 이상이어야 합니다".to_string(),
            ));
        }
        if self.board.footer_throttle_ms == 0 {
            return Err(TerminalError::Config(
                "board.footer_throttle_ms는 0일 수 없습니다".to_string(),
            ));
        }
        Ok(())
    }
}
