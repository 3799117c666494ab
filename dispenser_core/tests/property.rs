//! Random command streams: every command carrying an id gets exactly one
//! response, in arrival order, and the relay bank ends fully released.

mod common;

use common::node;
use proptest::prelude::*;
use serde_json::{Value, json};

#[derive(Debug, Clone)]
enum Amount {
    Int(u8),
    Float(f64),
    Text(String),
    Junk,
}

impl Amount {
    fn to_json(&self) -> Value {
        match self {
            Self::Int(n) => json!(n),
            Self::Float(f) => json!(f),
            Self::Text(s) => json!(s),
            Self::Junk => json!({"x": 1}),
        }
    }
}

fn amount() -> impl Strategy<Value = Amount> {
    prop_oneof![
        (0u8..4).prop_map(Amount::Int),
        (-1.0f64..3.0).prop_map(Amount::Float),
        // At most "999" units: every hold stays under the default limit.
        "[0-9a-df-z.]{0,3}".prop_map(Amount::Text),
        Just(Amount::Junk),
    ]
}

prop_compose! {
    fn command()(
        has_id in prop::bool::weighted(0.9),
        fields in prop::collection::vec(
            (prop::sample::select(vec!["zinc", "melatonin", "magnesium", "magnesum", "electrolyte", "vitamin"]), amount()),
            0..5,
        ),
    ) -> (bool, Vec<(&'static str, Amount)>) {
        (has_id, fields)
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn one_response_per_identified_command(cmds in prop::collection::vec(command(), 1000)) {
        let mut n = node();
        let topic = n.command_topic();
        let mut expected_ids = Vec::new();

        for (i, (has_id, fields)) in cmds.iter().enumerate() {
            let mut body = serde_json::Map::new();
            for (k, v) in fields {
                body.insert((*k).to_string(), v.to_json());
            }
            if *has_id {
                let id = format!("cmd-{i}");
                body.insert("commandId".into(), json!(id));
                expected_ids.push(id);
            }
            n.router.handle(&topic, Value::Object(body).to_string().as_bytes());
        }

        let responses = n.command_responses();
        let ids: Vec<String> = responses
            .iter()
            .map(|r| r["commandId"].as_str().unwrap_or_default().to_string())
            .collect();
        prop_assert_eq!(ids, expected_ids);
        prop_assert!(responses.iter().all(|r| r["status"] == "SUCCESS"));
        prop_assert!(n.relays.energized().is_empty());

        let mut on = 0i32;
        for ev in n.relays.events() {
            on += if ev.on { 1 } else { -1 };
            prop_assert!((0..=1).contains(&on));
        }
    }

    #[test]
    fn normalizer_never_panics(body in prop::collection::vec(any::<u8>(), 0..256)) {
        let mut n = node();
        let topic = n.command_topic();
        let _ = n.router.handle(&topic, &body);
        let wash = n.wash_topic();
        let _ = n.router.handle(&wash, &body);
        prop_assert!(n.relays.energized().is_empty());
    }
}
