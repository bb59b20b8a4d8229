//! 구독 다중화.
//!
//! 여러 위젯의 (토픽, 변수) 관심을 하나의 연결 위로 합칩니다. 와이어에는
//! 관심의 변화분만 SUBSCRIBE / UNSUBSCRIBE로 보내며, 토픽별 와이어 구독 집합은
//! 항상 현재 등록된 관심의 합집합과 같습니다.

use std::collections::BTreeSet;
use tracing::debug;

use crate::protocol::{ControlMessage, Topic, Variables};

/// 위젯 하나가 선언한 관심.
#[derive(Debug, Clone, PartialEq)]
pub struct Interest {
    pub topic: Topic,
    pub variables: Variables,
}

impl Interest {
    pub fn new(topic: Topic, variables: Variables) -> Self {
        Self {
            topic,
            variables: variables.normalized(),
        }
    }
}

/// 구독 다중화기.
#[derive(Debug, Default)]
pub struct SubscriptionMultiplexer {
    /// 등록 순서대로의 관심 목록 (같은 관심의 중복 등록 허용)
    entries: Vec<Interest>,
}

impl SubscriptionMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 등록된 관심 수.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 토픽의 목록형 변수 합집합.
    pub fn union(&self, topic: &Topic) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter(|entry| &entry.topic == topic)
            .filter_map(|entry| entry.variables.as_list())
            .flatten()
            .cloned()
            .collect()
    }

    fn holds(&self, interest: &Interest) -> bool {
        self.entries.iter().any(|entry| entry == interest)
    }

    /// 관심을 등록합니다.
    ///
    /// 새로 필요한 변수가 있으면 그 변수만 담은 SUBSCRIBE를 반환합니다.
    /// 변화가 없어도 관심은 기록되어 이후 해제 시 비교에 사용됩니다.
    pub fn add_interest(&mut self, interest: Interest) -> Option<ControlMessage> {
        let message = match &interest.variables {
            Variables::List(items) => {
                let union = self.union(&interest.topic);
                let fresh: Vec<String> = items
                    .iter()
                    .filter(|item| !union.contains(*item))
                    .cloned()
                    .collect();
                (!fresh.is_empty()).then(|| {
                    ControlMessage::subscribe(interest.topic.clone(), Variables::List(fresh))
                })
            }
            Variables::Scalar(_) => (!self.holds(&interest)).then(|| {
                ControlMessage::subscribe(interest.topic.clone(), interest.variables.clone())
            }),
        };

        debug!(
            topic = %interest.topic,
            entries = self.entries.len() + 1,
            subscribe = message.is_some(),
            "관심 등록"
        );
        self.entries.push(interest);
        message
    }

    /// 관심을 해제합니다.
    ///
    /// 등록되지 않은 관심이면 아무것도 하지 않습니다. 더 이상 아무도 원하지 않는
    /// 변수가 생기면 그 변수만 담은 UNSUBSCRIBE를 반환합니다.
    pub fn remove_interest(&mut self, interest: &Interest) -> Option<ControlMessage> {
        let position = self.entries.iter().position(|entry| entry == interest)?;
        self.entries.remove(position);

        let message = match &interest.variables {
            Variables::List(items) => {
                let union = self.union(&interest.topic);
                let released: Vec<String> = items
                    .iter()
                    .filter(|item| !union.contains(*item))
                    .cloned()
                    .collect();
                (!released.is_empty()).then(|| {
                    ControlMessage::unsubscribe(interest.topic.clone(), Variables::List(released))
                })
            }
            Variables::Scalar(_) => (!self.holds(interest)).then(|| {
                ControlMessage::unsubscribe(interest.topic.clone(), interest.variables.clone())
            }),
        };

        debug!(
            topic = %interest.topic,
            entries = self.entries.len(),
            unsubscribe = message.is_some(),
            "관심 해제"
        );
        message
    }

    /// 새 연결에서 현재 관심 전체를 복원할 SUBSCRIBE 목록.
    ///
    /// 목록형 토픽은 합집합 하나로, 단일 값은 서로 다른 값마다 하나씩 보냅니다.
    /// 순서는 최초 등록 순서입니다.
    pub fn replay(&self) -> Vec<ControlMessage> {
        let mut messages: Vec<ControlMessage> = Vec::new();
        let mut seen_topics: Vec<&Topic> = Vec::new();

        for entry in &self.entries {
            match &entry.variables {
                Variables::List(_) => {
                    if seen_topics.contains(&&entry.topic) {
                        continue;
                    }
                    seen_topics.push(&entry.topic);
                    let union = self.union(&entry.topic);
                    if !union.is_empty() {
                        messages.push(ControlMessage::subscribe(
                            entry.topic.clone(),
                            Variables::List(union.into_iter().collect()),
                        ));
                    }
                }
                Variables::Scalar(_) => {
                    let message =
                        ControlMessage::subscribe(entry.topic.clone(), entry.variables.clone());
                    if !messages.contains(&message) {
                        messages.push(message);
                    }
                }
            }
        }

        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[&str]) -> Interest {
        Interest::new(Topic::STOCK_REALTIME_BY_LIST, Variables::list(items.iter().copied()))
    }

    fn sent(message: Option<ControlMessage>) -> Vec<String> {
        message
            .and_then(|m| m.variables.as_list().map(|v| v.to_vec()))
            .unwrap_or_default()
    }

    #[test]
    fn test_overlapping_consumers() {
        let mut mux = SubscriptionMultiplexer::new();
        assert_eq!(sent(mux.add_interest(list(&["X", "Y"]))), vec!["X", "Y"]);
        assert_eq!(sent(mux.add_interest(list(&["Y", "Z"]))), vec!["Z"]);

        let released = mux.remove_interest(&list(&["X", "Y"])).unwrap();
        assert_eq!(released.kind, crate::protocol::ControlKind::Unsubscribe);
        assert_eq!(sent(Some(released)), vec!["X"]);
    }

    #[test]
    fn test_order_does_not_matter() {
        let mut mux = SubscriptionMultiplexer::new();
        mux.add_interest(list(&["B", "A"]));
        // 같은 집합을 다른 순서로 해제
        assert!(mux.remove_interest(&list(&["A", "B"])).is_some());
        assert!(mux.is_empty());
    }

    #[test]
    fn test_fully_covered_interest_is_still_tracked() {
        let mut mux = SubscriptionMultiplexer::new();
        mux.add_interest(list(&["A", "B"]));
        assert!(mux.add_interest(list(&["A"])).is_none());
        assert_eq!(mux.len(), 2);

        // A는 아직 첫 관심이 필요로 함
        assert!(mux.remove_interest(&list(&["A"])).is_none());
        assert_eq!(sent(mux.remove_interest(&list(&["A", "B"]))), vec!["A", "B"]);
    }

    #[test]
    fn test_unknown_interest_is_noop() {
        let mut mux = SubscriptionMultiplexer::new();
        mux.add_interest(list(&["A"]));
        assert!(mux.remove_interest(&list(&["B"])).is_none());
        assert_eq!(mux.len(), 1);
    }

    #[test]
    fn test_scalar_entries_are_atomic() {
        let mut mux = SubscriptionMultiplexer::new();
        let vn30 = Interest::new(Topic::INDEX_REALTIME, Variables::scalar("VN30"));

        assert!(mux.add_interest(vn30.clone()).is_some());
        assert!(mux.add_interest(vn30.clone()).is_none());
        assert!(mux.remove_interest(&vn30).is_none());

        let last = mux.remove_interest(&vn30).unwrap();
        assert_eq!(last.variables, Variables::scalar("VN30"));
    }

    #[test]
    fn test_replay() {
        let mut mux = SubscriptionMultiplexer::new();
        mux.add_interest(list(&["X", "Y"]));
        mux.add_interest(Interest::new(Topic::INDEX_REALTIME, Variables::scalar("VN30")));
        mux.add_interest(list(&["Y", "Z"]));
        mux.add_interest(Interest::new(Topic::INDEX_REALTIME, Variables::scalar("VN30")));

        let replay = mux.replay();
        assert_eq!(replay.len(), 2);
        assert_eq!(
            replay[0],
            ControlMessage::subscribe(Topic::STOCK_REALTIME_BY_LIST, Variables::list(["X", "Y", "Z"]))
        );
        assert_eq!(
            replay[1],
            ControlMessage::subscribe(Topic::INDEX_REALTIME, Variables::scalar("VN30"))
        );
    }
}
