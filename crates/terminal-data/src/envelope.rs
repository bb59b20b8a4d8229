//! REST 응답 봉투 `{ code, data, message }`.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{DataError, DataResult};

/// 백엔드 공통 응답 형식.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    /// 업무 결과 코드. 숫자와 문자열 모두 내려옵니다.
    #[serde(deserialize_with = "code_as_string", default)]
    pub code: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub message: Option<String>,
}

fn code_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

impl Envelope {
    /// 본문 문자열을 봉투로 파싱.
    pub fn parse(body: &str) -> DataResult<Self> {
        Ok(serde_json::from_str(body)?)
    }

    /// 성공 코드 목록에 해당하는지 확인.
    pub fn is_success(&self, success_codes: &[String]) -> bool {
        success_codes.iter().any(|c| c == &self.code)
    }

    /// 성공이면 `data`를, 아니면 업무 오류를 반환.
    pub fn into_data(self, success_codes: &[String]) -> DataResult<Value> {
        if self.is_success(success_codes) {
            Ok(self.data)
        } else {
            Err(DataError::Envelope {
                code: self.code,
                message: self.message.unwrap_or_default(),
            })
        }
    }
}

/// `data`(또는 그 하위 필드)에서 레코드 배열을 꺼냅니다.
///
/// 배열이 아니면 빈 목록으로 취급합니다.
pub fn records_at(data: Value, field: Option<&str>) -> Vec<Value> {
    let target = match field {
        Some(name) => match data {
            Value::Object(mut map) => map.remove(name).unwrap_or(Value::Null),
            _ => Value::Null,
        },
        None => data,
    };
    match target {
        Value::Array(items) => items,
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn codes() -> Vec<String> {
        vec!["0".to_string(), "200".to_string()]
    }

    #[test]
    fn test_numeric_code_is_accepted() {
        let envelope = Envelope::parse(r#"{"code":200,"data":[1,2]}"#).unwrap();
        assert_eq!(envelope.code, "200");
        assert_eq!(envelope.into_data(&codes()).unwrap(), json!([1, 2]));
    }

    #[test]
    fn test_failure_code_becomes_error() {
        let envelope =
            Envelope::parse(r#"{"code":"E99","data":null,"message":"session expired"}"#).unwrap();
        match envelope.into_data(&codes()) {
            Err(DataError::Envelope { code, message }) => {
                assert_eq!(code, "E99");
                assert_eq!(message, "session expired");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_records_at() {
        assert_eq!(records_at(json!([{"a": 1}]), None).len(), 1);
        assert_eq!(
            records_at(json!({"stockPositions": [{"a": 1}, {"a": 2}]}), Some("stockPositions")).len(),
            2
        );
        assert!(records_at(json!({"other": []}), Some("stockPositions")).is_empty());
        assert!(records_at(Value::Null, None).is_empty());
    }
}
