//! 수신 프레임 분류.
//!
//! 수신 메시지는 JSON 제어 프레임이거나, 앞 두 글자가 메시지 종류를 나타내는
//! 파이프 구분 문자열입니다. 위치 기반 파싱 전에 반드시 태그로 분기합니다.

use serde_json::Value;
use terminal_core::RowDelta;

use super::tick::{parse_board_tick, parse_index_tick, IndexTick, BOARD_TICK_TAG, INDEX_TICK_TAG};
use crate::error::{StreamError, StreamResult};

/// 체결 데이터를 비워야 하는 세션 (동시호가).
pub const SESSION_ATC: &str = "ATC";

/// 스냅샷 재조회를 요구하는 시스템 상태.
pub const STATUS_REFRESH_STOCK: &str = "REFRESH_STOCK";

/// JSON 제어 프레임.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlFrame {
    /// `{"systemStatusChangedV2":{"status":...}}`
    SystemStatus { status: String },
    /// `{"notifySessionByListV2":{"market":...,"session":...}}`
    SessionNotice { market: String, session: String },
    /// 주문 스트림 접속 시 서버가 알려주는 서버 이름
    ServerName(String),
    /// 주문/잔고 변경 알림
    OrderUpdate {
        account_id: String,
        payload: Value,
    },
    /// 그 밖의 JSON (구독 확인 등)
    Other(Value),
}

impl ControlFrame {
    fn from_value(value: Value) -> Self {
        if let Some(status) = value
            .pointer("/systemStatusChangedV2/status")
            .and_then(Value::as_str)
        {
            return ControlFrame::SystemStatus {
                status: status.to_string(),
            };
        }

        if let Some(notice) = value.get("notifySessionByListV2") {
            let market = notice.get("market").and_then(Value::as_str);
            let session = notice.get("session").and_then(Value::as_str);
            if let (Some(market), Some(session)) = (market, session) {
                return ControlFrame::SessionNotice {
                    market: market.to_string(),
                    session: session.to_string(),
                };
            }
        }

        if let Some(name) = value.get("serverName").and_then(Value::as_str) {
            return ControlFrame::ServerName(name.to_string());
        }

        if let Some(account_id) = value.get("accountId").and_then(Value::as_str) {
            return ControlFrame::OrderUpdate {
                account_id: account_id.to_string(),
                payload: value.clone(),
            };
        }

        ControlFrame::Other(value)
    }

    /// 스냅샷 재조회 요청인지 여부.
    pub fn is_refresh_request(&self) -> bool {
        matches!(self, ControlFrame::SystemStatus { status } if status == STATUS_REFRESH_STOCK)
    }
}

/// 분류된 수신 프레임.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Control(ControlFrame),
    /// 시세판 틱
    Board(RowDelta),
    /// 지수 틱
    Index(IndexTick),
    /// 처리하지 않는 태그
    Unknown(String),
}

impl InboundFrame {
    /// 수신 텍스트를 분류하고 파싱합니다.
    ///
    /// 실패하면 `Err`를 반환하며, 호출자는 프레임을 버리고 기존 상태를 유지합니다.
    pub fn parse(text: &str) -> StreamResult<Self> {
        let trimmed = text.trim();

        if trimmed.starts_with('{') {
            let value: Value = serde_json::from_str(trimmed)
                .map_err(|e| StreamError::Parse(format!("JSON 프레임: {}", e)))?;
            return Ok(InboundFrame::Control(ControlFrame::from_value(value)));
        }

        let tag = trimmed.get(..2).unwrap_or(trimmed);
        match tag {
            BOARD_TICK_TAG => {
                let fields: Vec<&str> = trimmed.split('|').collect();
                Ok(InboundFrame::Board(parse_board_tick(&fields)?))
            }
            INDEX_TICK_TAG => {
                let fields: Vec<&str> = trimmed.split('|').collect();
                Ok(InboundFrame::Index(parse_index_tick(&fields)?))
            }
            _ => Ok(InboundFrame::Unknown(tag.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::tick::encode_board_tick;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_refresh_status() {
        let frame =
            InboundFrame::parse(r#"{"systemStatusChangedV2":{"status":"REFRESH_STOCK"}}"#).unwrap();
        match frame {
            InboundFrame::Control(control) => assert!(control.is_refresh_request()),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_parse_session_notice() {
        let frame =
            InboundFrame::parse(r#"{"notifySessionByListV2":{"market":"HOSE","session":"ATC"}}"#)
                .unwrap();
        assert_eq!(
            frame,
            InboundFrame::Control(ControlFrame::SessionNotice {
                market: "HOSE".to_string(),
                session: SESSION_ATC.to_string(),
            })
        );
    }

    #[test]
    fn test_parse_server_name_and_order_update() {
        let frame = InboundFrame::parse(r#"{"serverName":"trade-02"}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Control(ControlFrame::ServerName("trade-02".to_string()))
        );

        let frame = InboundFrame::parse(r#"{"accountId":"0001","orderStatus":"FILLED"}"#).unwrap();
        assert!(matches!(
            frame,
            InboundFrame::Control(ControlFrame::OrderUpdate { ref account_id, .. }) if account_id == "0001"
        ));
    }

    #[test]
    fn test_parse_board_tick_frame() {
        let mut delta = RowDelta::new("VNM");
        delta.matched_price = Some(dec!(71000));
        let frame = InboundFrame::parse(&encode_board_tick(&delta)).unwrap();
        assert!(matches!(
            frame,
            InboundFrame::Board(ref parsed) if parsed.symbol == "VNM" && parsed.matched_price == Some(dec!(71000))
        ));
    }

    #[test]
    fn test_malformed_frames_are_errors() {
        assert!(InboundFrame::parse("{not json").is_err());
        assert!(InboundFrame::parse("B#VNM|HOSE").is_err());
    }

    #[test]
    fn test_unknown_tag() {
        assert_eq!(
            InboundFrame::parse("T#VNM|1|2").unwrap(),
            InboundFrame::Unknown("T#".to_string())
        );
        assert_eq!(InboundFrame::parse("").unwrap(), InboundFrame::Unknown(String::new()));
    }
}
