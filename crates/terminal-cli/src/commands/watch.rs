//! 테이블 하나를 마운트해 실시간으로 유지하다가 투영 결과를 출력합니다.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use terminal_board::{BoardEvent, TableSpec, Workspace, WorkspaceCommand, WorkspaceDeps};
use terminal_core::{AppConfig, StaticCredentials};
use terminal_data::{JsonFileLayoutStore, RestSnapshotClient};
use terminal_stream::WsConnector;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use super::render::{render, OutputFormat};

/// 실행 옵션.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// 단일 종목 필터
    pub filter: Option<String>,
    /// 실시간 갱신을 받는 시간
    pub duration: Duration,
    pub format: OutputFormat,
    /// 스냅샷이 들어올 때마다 출력
    pub print_snapshots: bool,
}

/// 설정된 엔드포인트로 워크스페이스를 띄우고 테이블을 실행합니다.
pub async fn watch_table(config: &AppConfig, spec: TableSpec, options: WatchOptions) -> Result<()> {
    let credentials = Arc::new(StaticCredentials::from_env());
    let source = RestSnapshotClient::new(&config.rest, credentials.clone())
        .context("Failed to build REST client")?;
    let deps = WorkspaceDeps {
        connector: Arc::new(WsConnector::new(config.stream.outbound_buffer)),
        credentials,
        source: Arc::new(source),
        layouts: Arc::new(JsonFileLayoutStore::new(
            config.persistence.layout_path.clone(),
        )),
    };

    let kind = spec.kind();
    let (handle, task) = Workspace::new(config, deps).spawn();
    let mut events = handle.subscribe();
    let table = handle.mount(spec).await?;
    info!(%table, %kind, "테이블 실행");

    if let Some(filter) = options.filter.clone() {
        handle
            .send(WorkspaceCommand::SetFilter {
                table,
                filter: Some(filter),
            })
            .await?;
    }

    let deadline = tokio::time::sleep(options.duration);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                info!("중단 요청");
                break;
            }
            event = events.recv() => match event {
                Ok(BoardEvent::SnapshotLoaded { table: id, rows, loaded_at }) if id == table => {
                    info!(rows, loaded_at = %loaded_at, "스냅샷 수신");
                    if options.print_snapshots {
                        if let Some(view) = handle.project(table).await? {
                            println!("{}", render(&view, kind, options.format)?);
                        }
                    }
                }
                Ok(BoardEvent::FetchFailed { table: id, message }) if id == table => {
                    eprintln!("조회 실패: {}", message);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "이벤트 수신 지연"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    if let Some(view) = handle.project(table).await? {
        println!("{}", render(&view, kind, options.format)?);
    }

    handle.shutdown().await?;
    task.await.context("Workspace task panicked")?;
    Ok(())
}
