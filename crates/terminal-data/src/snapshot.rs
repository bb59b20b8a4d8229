//! REST 스냅샷 소스.
//!
//! 테이블 마운트 시 한 번 전체 행 집합을 받아옵니다. 응답은 공통 봉투
//! `{ code, data, message }`로 감싸져 있고, `data` 배열(잔고는
//! `data.stockPositions`)만 사용합니다.
//!
//! # 사용 예제
//!
//! ```rust,ignore
//! use terminal_data::{RestSnapshotClient, SnapshotQuery, SnapshotSource};
//!
//! let client = RestSnapshotClient::new(&config.rest, credentials)?;
//! let snapshot = client.fetch(&SnapshotQuery::exchange("hose")).await?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use terminal_core::{CredentialProvider, RawRow, RestConfig};
use tracing::{debug, warn};

use crate::envelope::{records_at, Envelope};
use crate::error::{DataError, DataResult};

/// 기초지수 컬럼을 함께 받는 파생상품 보드 코드.
const INDEX_LINKED_BOARDS: [&str; 2] = ["fu", "vnf"];

/// 잔고 응답에서 포지션 배열이 들어 있는 필드.
const POSITIONS_FIELD: &str = "stockPositions";

/// 스냅샷 조회 대상.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotQuery {
    /// 거래소 전체 종목
    Exchange { exchange: String },
    /// 파생상품 보드
    Derivatives { board: String },
    /// 지정 종목 목록 (관심종목, 업종 구성 종목)
    Symbols { symbols: Vec<String> },
    /// 종목 그룹 (VN30 등)
    Group { code: String },
    /// ETF 전체
    Etf,
    /// 계좌 잔고
    Portfolio { account_id: String },
}

impl SnapshotQuery {
    pub fn exchange(exchange: impl Into<String>) -> Self {
        SnapshotQuery::Exchange {
            exchange: exchange.into(),
        }
    }

    pub fn derivatives(board: impl Into<String>) -> Self {
        SnapshotQuery::Derivatives {
            board: board.into(),
        }
    }

    pub fn symbols<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SnapshotQuery::Symbols {
            symbols: symbols.into_iter().map(Into::into).collect(),
        }
    }

    pub fn group(code: impl Into<String>) -> Self {
        SnapshotQuery::Group { code: code.into() }
    }

    pub fn portfolio(account_id: impl Into<String>) -> Self {
        SnapshotQuery::Portfolio {
            account_id: account_id.into(),
        }
    }

    /// 요청 경로 (base URL 기준 상대 경로).
    pub fn path(&self) -> String {
        match self {
            SnapshotQuery::Exchange { exchange } => format!("stock/exchange/{exchange}"),
            SnapshotQuery::Derivatives { board } => format!("stock/exchange/{board}"),
            SnapshotQuery::Symbols { .. } => "stock/multiple".to_string(),
            SnapshotQuery::Group { code } => format!("stock/group/{code}"),
            SnapshotQuery::Etf => "stock/etf".to_string(),
            SnapshotQuery::Portfolio { account_id } => format!("portfolio/{account_id}"),
        }
    }

    /// 쿼리 문자열 파라미터.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        match self {
            SnapshotQuery::Derivatives { board } => {
                let linked = INDEX_LINKED_BOARDS.contains(&board.to_lowercase().as_str());
                vec![
                    ("hasVN30", linked.to_string()),
                    ("hasVN100", linked.to_string()),
                ]
            }
            SnapshotQuery::Symbols { symbols } => vec![("symbols", symbols.join(","))],
            _ => Vec::new(),
        }
    }

    pub fn requires_auth(&self) -> bool {
        matches!(self, SnapshotQuery::Portfolio { .. })
    }

    /// 빈 종목 목록은 요청하지 않습니다.
    fn is_trivially_empty(&self) -> bool {
        matches!(self, SnapshotQuery::Symbols { symbols } if symbols.is_empty())
    }
}

impl fmt::Display for SnapshotQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotQuery::Symbols { symbols } => write!(f, "symbols[{}]", symbols.len()),
            other => write!(f, "{}", other.path()),
        }
    }
}

/// 스냅샷 조회 결과.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub rows: Vec<RawRow>,
    /// 조회 완료 시각 ("마지막 조회" 표시용)
    pub loaded_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(rows: Vec<RawRow>) -> Self {
        Self {
            rows,
            loaded_at: Utc::now(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

/// 스냅샷 소스 추상화.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self, query: &SnapshotQuery) -> DataResult<Snapshot>;
}

/// REST 스냅샷 클라이언트.
#[derive(Clone)]
pub struct RestSnapshotClient {
    client: reqwest::Client,
    base_url: String,
    success_codes: Vec<String>,
    credentials: Arc<dyn CredentialProvider>,
}

impl RestSnapshotClient {
    pub fn new(config: &RestConfig, credentials: Arc<dyn CredentialProvider>) -> DataResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| DataError::Network(format!("HTTP 클라이언트 생성 실패: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            success_codes: config.success_codes.clone(),
            credentials,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request(&self, query: &SnapshotQuery) -> DataResult<Value> {
        let url = format!("{}/{}", self.base_url, query.path());
        let mut builder = self
            .client
            .get(&url)
            .query(&query.params())
            .header("Accept", "application/json");

        if query.requires_auth() {
            let token = self
                .credentials
                .access_token()
                .ok_or(DataError::MissingCredential("access token"))?;
            let user_id = self
                .credentials
                .user_id()
                .ok_or(DataError::MissingCredential("user id"))?;
            builder = builder
                .bearer_auth(token.expose_secret())
                .query(&[("userId", user_id)]);
        }

        debug!(url = %url, query = %query, "스냅샷 요청");

        let response = builder.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(DataError::NotFound(query.path()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DataError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let envelope = Envelope::parse(&body)?;
        envelope.into_data(&self.success_codes)
    }
}

impl fmt::Debug for RestSnapshotClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestSnapshotClient")
            .field("base_url", &self.base_url)
            .field("success_codes", &self.success_codes)
            .finish()
    }
}

#[async_trait]
impl SnapshotSource for RestSnapshotClient {
    async fn fetch(&self, query: &SnapshotQuery) -> DataResult<Snapshot> {
        if query.is_trivially_empty() {
            return Ok(Snapshot::empty());
        }

        let data = self.request(query).await?;
        let field = query.requires_auth().then_some(POSITIONS_FIELD);

        let mut rows = Vec::new();
        for record in records_at(data, field) {
            match serde_json::from_value::<RawRow>(record) {
                Ok(row) if !row.symbol.is_empty() => rows.push(row),
                Ok(_) => warn!(query = %query, "종목 코드 없는 레코드 무시"),
                Err(e) => warn!(query = %query, error = %e, "레코드 파싱 실패"),
            }
        }

        debug!(query = %query, count = rows.len(), "스냅샷 수신");
        Ok(Snapshot::new(rows))
    }
}
