//! 주문 체결 알림 실시간 출력.

use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Duration;
use terminal_core::{AppConfig, CredentialProvider, StaticCredentials};
use terminal_stream::{
    ConnectionManager, ControlFrame, InboundFrame, LinkEvent, StreamClass, StreamEvent, WsConnector,
};
use tokio::sync::mpsc;
use tracing::info;

/// 주문 스트림 실행 옵션.
#[derive(Debug, Clone)]
pub struct OrderWatchOptions {
    /// 이 계좌의 알림만 출력
    pub account: Option<String>,
    /// 파생상품 주문 스트림 사용
    pub derivatives: bool,
    pub duration: Duration,
}

impl OrderWatchOptions {
    pub fn stream_class(&self) -> StreamClass {
        if self.derivatives {
            StreamClass::DerivativesOrderUpdates
        } else {
            StreamClass::OrderUpdates
        }
    }
}

/// 출력할 주문 알림이면 한 줄로 만듭니다.
pub fn order_line(frame: &InboundFrame, account: Option<&str>) -> Option<String> {
    let InboundFrame::Control(ControlFrame::OrderUpdate {
        account_id,
        payload,
    }) = frame
    else {
        return None;
    };
    if account.is_some_and(|wanted| wanted != account_id.as_str()) {
        return None;
    }
    Some(format!("{} {}", account_id, payload))
}

/// 환경 변수의 인증 정보로 주문 스트림에 접속해 알림을 출력합니다.
pub async fn watch_orders(config: &AppConfig, options: OrderWatchOptions) -> Result<usize> {
    let credentials = Arc::new(StaticCredentials::from_env());
    if credentials.access_token().is_none() || credentials.user_id().is_none() {
        bail!("TERMINAL_ACCESS_TOKEN and TERMINAL_USER_ID are required for order streams");
    }
    let connector = Arc::new(WsConnector::new(config.stream.outbound_buffer));
    let (mut manager, mut link_rx) = ConnectionManager::new(&config.stream, connector, credentials);

    let count = follow_orders(&mut manager, &mut link_rx, &options, |line| println!("{}", line)).await;
    info!(count, "주문 알림 수신 종료");
    Ok(count)
}

/// 주문 스트림 소비자로 등록하고 기간이 끝날 때까지 알림을 `emit`으로 넘깁니다.
pub async fn follow_orders<F>(
    manager: &mut ConnectionManager,
    link_rx: &mut mpsc::Receiver<LinkEvent>,
    options: &OrderWatchOptions,
    mut emit: F,
) -> usize
where
    F: FnMut(&str),
{
    let class = options.stream_class();
    let consumer = manager.acquire(class);
    let mut count = 0;

    let deadline = tokio::time::sleep(options.duration);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                info!("중단 요청");
                break;
            }
            event = link_rx.recv() => {
                let Some(event) = event else { break };
                let Some(StreamEvent::Frame { frame, .. }) = manager.handle_link_event(event) else {
                    continue;
                };
                if let InboundFrame::Control(ControlFrame::ServerName(name)) = &frame {
                    info!(%class, server = %name, "주문 서버 접속");
                }
                if let Some(line) = order_line(&frame, options.account.as_deref()) {
                    emit(&line);
                    count += 1;
                }
            }
        }
    }

    manager.release(class, consumer);
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use terminal_core::StreamConfig;
    use terminal_stream::MemoryConnector;

    fn options(account: Option<&str>, derivatives: bool) -> OrderWatchOptions {
        OrderWatchOptions {
            account: account.map(str::to_string),
            derivatives,
            duration: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_order_line_filters_account() {
        let frame = InboundFrame::parse(r#"{"accountId":"0001","orderStatus":"FILLED"}"#).unwrap();
        assert!(order_line(&frame, None).unwrap().starts_with("0001 "));
        assert!(order_line(&frame, Some("0001")).is_some());
        assert!(order_line(&frame, Some("0002")).is_none());

        let status = InboundFrame::parse(r#"{"serverName":"node-1"}"#).unwrap();
        assert!(order_line(&status, None).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_derivatives_orders() {
        let connector = MemoryConnector::new();
        let credentials = Arc::new(StaticCredentials::new(SecretString::new("tok".into()), "user-1"));
        let (mut manager, mut link_rx) = ConnectionManager::new(
            &StreamConfig::default(),
            Arc::new(connector.clone()),
            credentials,
        );
        let options = options(Some("0001D"), true);

        let mut lines = Vec::new();
        let driver = async {
            let peer = loop {
                if let Some(peer) = connector.take_peer(StreamClass::DerivativesOrderUpdates) {
                    break peer;
                }
                tokio::task::yield_now().await;
            };
            assert!(peer.url().contains("/trade-stream/derivative-order-update?"));
            peer.open().await;
            peer.push(r#"{"serverName":"node-2"}"#).await;
            peer.push(r#"{"accountId":"0001D","orderStatus":"FILLED"}"#).await;
            peer.push(r#"{"accountId":"0002D","orderStatus":"FILLED"}"#).await;
            peer
        };
        let (count, peer) = tokio::join!(
            follow_orders(&mut manager, &mut link_rx, &options, |line| lines.push(line.to_string())),
            driver
        );

        assert_eq!(count, 1);
        assert!(lines[0].starts_with("0001D "));
        // 소비자 해제 후 연결 종료
        assert!(peer.is_cancelled());
        assert_eq!(manager.consumer_count(StreamClass::DerivativesOrderUpdates), 0);
    }
}
