//! 구독 다중화 시나리오 및 속성 테스트.

use proptest::prelude::*;
use std::collections::BTreeSet;
use terminal_stream::{ControlKind, ControlMessage, Interest, SubscriptionMultiplexer, Topic, Variables};

fn interest(items: &[&str]) -> Interest {
    Interest::new(Topic::STOCK_REALTIME_BY_LIST, Variables::list(items.iter().copied()))
}

#[test]
fn two_consumers_share_one_topic() {
    let mut mux = SubscriptionMultiplexer::new();

    let a = mux.add_interest(interest(&["X", "Y"]));
    let b = mux.add_interest(interest(&["Y", "Z"]));
    assert_eq!(
        a,
        Some(ControlMessage::subscribe(Topic::STOCK_REALTIME_BY_LIST, Variables::list(["X", "Y"])))
    );
    assert_eq!(
        b,
        Some(ControlMessage::subscribe(Topic::STOCK_REALTIME_BY_LIST, Variables::list(["Z"])))
    );

    let a_gone = mux.remove_interest(&interest(&["X", "Y"]));
    assert_eq!(
        a_gone,
        Some(ControlMessage::unsubscribe(Topic::STOCK_REALTIME_BY_LIST, Variables::list(["X"])))
    );

    let b_gone = mux.remove_interest(&interest(&["Y", "Z"]));
    assert_eq!(
        b_gone,
        Some(ControlMessage::unsubscribe(Topic::STOCK_REALTIME_BY_LIST, Variables::list(["Y", "Z"])))
    );
    assert!(mux.is_empty());
}

#[derive(Debug, Clone)]
enum Op {
    Add(Vec<String>),
    /// 등록된 관심 중 n번째를 해제
    Remove(usize),
}

fn symbols() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(prop::sample::select(vec!["A", "B", "C", "D", "E", "F"]), 0..5)
        .prop_map(|v| v.into_iter().map(String::from).collect())
}

fn ops() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![
            symbols().prop_map(Op::Add),
            (0usize..8).prop_map(Op::Remove),
        ],
        0..40,
    )
}

proptest! {
    /// 와이어 구독 집합은 항상 등록된 관심의 합집합과 같고,
    /// 이미 구독된 변수를 다시 구독하거나 구독되지 않은 변수를 해제하지 않는다.
    #[test]
    fn wire_set_tracks_union(ops in ops()) {
        let mut mux = SubscriptionMultiplexer::new();
        let mut registered: Vec<Interest> = Vec::new();
        let mut wire: BTreeSet<String> = BTreeSet::new();

        for op in ops {
            let message = match op {
                Op::Add(items) => {
                    let entry = interest(&items.iter().map(String::as_str).collect::<Vec<_>>());
                    registered.push(entry.clone());
                    mux.add_interest(entry)
                }
                Op::Remove(n) => {
                    if registered.is_empty() {
                        continue;
                    }
                    let entry = registered.remove(n % registered.len());
                    mux.remove_interest(&entry)
                }
            };

            if let Some(message) = message {
                let vars = message.variables.as_list().unwrap_or_default().to_vec();
                prop_assert!(!vars.is_empty());
                match message.kind {
                    ControlKind::Subscribe => {
                        for v in vars {
                            prop_assert!(wire.insert(v), "중복 구독");
                        }
                    }
                    ControlKind::Unsubscribe => {
                        for v in vars {
                            prop_assert!(wire.remove(&v), "구독되지 않은 변수 해제");
                        }
                    }
                }
            }

            let expected: BTreeSet<String> = registered
                .iter()
                .filter_map(|i| i.variables.as_list())
                .flatten()
                .cloned()
                .collect();
            prop_assert_eq!(&wire, &expected);
            prop_assert_eq!(&mux.union(&Topic::STOCK_REALTIME_BY_LIST), &expected);
        }
    }
}
