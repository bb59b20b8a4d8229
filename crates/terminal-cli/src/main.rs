//! 트레이딩 터미널 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # HOSE 시세판을 30초간 실시간으로 유지한 뒤 출력
//! terminal board --exchange hose --watch 30
//!
//! # 관심종목
//! terminal board --symbols SSI,VNM,FPT --format json
//!
//! # VN30 선물 보드 (기초지수 괴리 포함)
//! terminal board --derivatives vnf
//!
//! # 계좌 잔고 (TERMINAL_ACCESS_TOKEN, TERMINAL_USER_ID 필요)
//! terminal portfolio 0001C12345
//!
//! # 파생상품 주문 체결 알림 (계좌 필터)
//! terminal orders --derivatives --account 0001D --watch 60
//!
//! # 수신 프레임 진단
//! echo 'S#SSI|HOSE|LO|...' | terminal decode
//! ```

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::time::Duration;
use terminal_board::TableSpec;
use terminal_cli::commands::decode::decode_frames;
use terminal_cli::commands::orders::{watch_orders, OrderWatchOptions};
use terminal_cli::commands::render::OutputFormat;
use terminal_cli::commands::watch::{watch_table, WatchOptions};
use terminal_core::{init_logging, AppConfig, LogConfig};
use tracing::info;

#[derive(Parser)]
#[command(name = "terminal")]
#[command(about = "Trading terminal CLI - 실시간 시세판/잔고 테이블", long_about = None)]
#[command(version)]
struct Cli {
    /// 설정 파일
    #[arg(short, long, global = true, default_value = "config/default.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

/// 테이블 실행 공통 옵션.
#[derive(Args, Debug, Clone)]
struct WatchArgs {
    /// 단일 종목 필터
    #[arg(long)]
    filter: Option<String>,

    /// 실시간 갱신을 받는 시간 (초)
    #[arg(short, long, default_value = "10")]
    watch: u64,

    /// 출력 형식 (table, json)
    #[arg(short, long, default_value = "table")]
    format: String,

    /// 스냅샷이 들어올 때마다 출력
    #[arg(long, default_value = "false")]
    print_snapshots: bool,
}

impl WatchArgs {
    fn options(&self) -> Result<WatchOptions> {
        Ok(WatchOptions {
            filter: self.filter.clone(),
            duration: Duration::from_secs(self.watch),
            format: OutputFormat::parse(&self.format)?,
            print_snapshots: self.print_snapshots,
        })
    }
}

/// 시세판 행 집합 (하나만 지정).
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
struct BoardSource {
    /// 거래소 전체 (hose, hnx, upcom)
    #[arg(short, long)]
    exchange: Option<String>,

    /// 종목 목록 (쉼표로 구분)
    #[arg(short, long, value_delimiter = ',')]
    symbols: Option<Vec<String>>,

    /// 종목 그룹 (예: VN30)
    #[arg(short, long)]
    group: Option<String>,

    /// ETF 전체
    #[arg(long)]
    etf: bool,

    /// 파생상품 보드 (예: vnf, cw)
    #[arg(short, long)]
    derivatives: Option<String>,
}

impl BoardSource {
    fn spec(&self) -> Result<TableSpec> {
        if let Some(exchange) = &self.exchange {
            return Ok(TableSpec::exchange(exchange.to_lowercase()));
        }
        if let Some(symbols) = &self.symbols {
            let symbols: Vec<String> = symbols
                .iter()
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
            if symbols.is_empty() {
                return Err(anyhow!("Symbol list is empty"));
            }
            return Ok(TableSpec::symbols(symbols));
        }
        if let Some(code) = &self.group {
            return Ok(TableSpec::group(code.clone()));
        }
        if self.etf {
            return Ok(TableSpec::etf());
        }
        if let Some(board) = &self.derivatives {
            return Ok(TableSpec::derivatives(board.to_lowercase()));
        }
        Err(anyhow!("One of --exchange, --symbols, --group, --etf, --derivatives is required"))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// 시세판 실행
    Board {
        #[command(flatten)]
        source: BoardSource,

        #[command(flatten)]
        watch: WatchArgs,
    },

    /// 계좌 잔고 실행
    Portfolio {
        /// 계좌번호
        account: String,

        #[command(flatten)]
        watch: WatchArgs,
    },

    /// 주문 체결 알림 출력
    Orders {
        /// 이 계좌의 알림만 출력
        #[arg(short, long)]
        account: Option<String>,

        /// 파생상품 주문 스트림
        #[arg(long)]
        derivatives: bool,

        /// 수신 시간 (초)
        #[arg(short, long, default_value = "60")]
        watch: u64,
    },

    /// 수신 프레임 해석 (인자가 없으면 표준 입력)
    Decode {
        /// 원본 프레임
        frames: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config: {}", cli.config))?;
    init_logging(LogConfig::from_settings(&config.logging))
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    match cli.command {
        Commands::Board { source, watch } => {
            let spec = source.spec()?;
            watch_table(&config, spec, watch.options()?).await?;
        }

        Commands::Portfolio { account, watch } => {
            watch_table(&config, TableSpec::portfolio(account), watch.options()?).await?;
        }

        Commands::Orders {
            account,
            derivatives,
            watch,
        } => {
            let options = OrderWatchOptions {
                account,
                derivatives,
                duration: Duration::from_secs(watch),
            };
            watch_orders(&config, options).await?;
        }

        Commands::Decode { frames } => {
            let count = decode_frames(frames)?;
            info!(count, "프레임 해석 완료");
        }
    }

    Ok(())
}
