//! 송신 제어 메시지 (SUBSCRIBE / UNSUBSCRIBE).
//!
//! 형식: `{"type":"subscribe","topic":"STOCK_REALTIME_BY_LIST_V2","variables":["SSI","VNM"]}`
//!
//! `variables`는 종목 목록이거나 단일 값(예: 지수 코드 하나)입니다.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;

use crate::error::StreamResult;

/// 구독 토픽.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(Cow<'static, str>);

impl Topic {
    /// 종목 목록 단위 실시간 시세
    pub const STOCK_REALTIME_BY_LIST: Topic = Topic(Cow::Borrowed("STOCK_REALTIME_BY_LIST_V2"));
    /// 지수 실시간 시세 (단일 지수 코드)
    pub const INDEX_REALTIME: Topic = Topic(Cow::Borrowed("INDEX_REALTIME_V2"));

    pub fn new(name: impl Into<String>) -> Self {
        Topic(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 제어 메시지 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlKind {
    Subscribe,
    Unsubscribe,
}

/// 구독 변수.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Variables {
    /// 종목코드 목록 (집합 연산으로 비교)
    List(Vec<String>),
    /// 단일 값 (전체 구조 동등성으로 비교)
    Scalar(Value),
}

impl Variables {
    /// 정렬·중복 제거된 목록을 생성합니다.
    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut items: Vec<String> = items.into_iter().map(Into::into).collect();
        items.sort();
        items.dedup();
        Variables::List(items)
    }

    pub fn scalar(value: impl Into<Value>) -> Self {
        Variables::Scalar(value.into())
    }

    /// 목록이면 정렬·중복 제거합니다. 비교 전에 항상 호출합니다.
    pub fn normalized(self) -> Self {
        match self {
            Variables::List(items) => Variables::list(items),
            other => other,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Variables::List(items) => Some(items),
            Variables::Scalar(_) => None,
        }
    }
}

/// 송신 제어 메시지.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    #[serde(rename = "type")]
    pub kind: ControlKind,
    pub topic: Topic,
    pub variables: Variables,
}

impl ControlMessage {
    pub fn subscribe(topic: Topic, variables: Variables) -> Self {
        Self {
            kind: ControlKind::Subscribe,
            topic,
            variables,
        }
    }

    pub fn unsubscribe(topic: Topic, variables: Variables) -> Self {
        Self {
            kind: ControlKind::Unsubscribe,
            topic,
            variables,
        }
    }

    /// 전송용 JSON 문자열.
    pub fn to_text(&self) -> StreamResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subscribe_message_format() {
        let msg = ControlMessage::subscribe(
            Topic::STOCK_REALTIME_BY_LIST,
            Variables::list(["VNM", "SSI", "VNM"]),
        );
        let value: Value = serde_json::from_str(&msg.to_text().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "subscribe",
                "topic": "STOCK_REALTIME_BY_LIST_V2",
                "variables": ["SSI", "VNM"]
            })
        );
    }

    #[test]
    fn test_scalar_message_format() {
        let msg = ControlMessage::unsubscribe(Topic::INDEX_REALTIME, Variables::scalar("VN30"));
        let value: Value = serde_json::from_str(&msg.to_text().unwrap()).unwrap();
        assert_eq!(value["type"], "unsubscribe");
        assert_eq!(value["variables"], "VN30");
    }

    #[test]
    fn test_variables_deserialize() {
        let list: Variables = serde_json::from_value(json!(["A", "B"])).unwrap();
        assert_eq!(list.as_list(), Some(&["A".to_string(), "B".to_string()][..]));

        let scalar: Variables = serde_json::from_value(json!({"code": "VN30F1M"})).unwrap();
        assert!(scalar.as_list().is_none());
    }
}
