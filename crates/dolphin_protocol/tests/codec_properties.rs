//! Property tests for the JSON codec.

use dolphin_protocol::{ActionParam, Codec, Command, JsonCodec, Value};
use proptest::prelude::*;

fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        // Quarter steps are exactly representable, so they survive text form.
        (-4000i32..4000).prop_map(|n| Value::Float(f64::from(n) / 4.0 + 0.25)),
        "\\PC{0,16}".prop_map(Value::Text),
    ]
}

fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        4 => scalar_strategy(),
        1 => prop::collection::vec(scalar_strategy(), 0..5).prop_map(Value::List),
    ]
}

fn param_strategy() -> impl Strategy<Value = ActionParam> {
    ("[a-zA-Z0-9_]{1,12}", value_strategy()).prop_map(|(name, value)| ActionParam { name, value })
}

proptest! {
    #[test]
    fn call_action_round_trip(
        controller_id in "[a-f0-9-]{8,36}",
        action_name in "[a-zA-Z][a-zA-Z0-9]{0,15}",
        params in prop::collection::vec(param_strategy(), 0..6),
    ) {
        let command = Command::call_action(controller_id.clone(), action_name.clone(), params.clone());
        let body = JsonCodec.encode(&[command]).unwrap();
        let decoded = JsonCodec.decode(&body).unwrap();

        prop_assert_eq!(decoded.len(), 1);
        match &decoded[0] {
            Command::CallAction { controller_id: c, action_name: a, params: p } => {
                prop_assert_eq!(c, &controller_id);
                prop_assert_eq!(a, &action_name);
                prop_assert_eq!(p, &params);
            }
            other => prop_assert!(false, "unexpected command {}", other),
        }
    }

    #[test]
    fn value_changes_keep_batch_order(
        changes in prop::collection::vec(("[0-9]{1,4}S", value_strategy(), value_strategy()), 0..20),
    ) {
        let batch: Vec<Command> = changes
            .into_iter()
            .map(|(id, old, new)| Command::value_changed(id, old, new))
            .collect();
        let body = JsonCodec.encode(&batch).unwrap();
        prop_assert_eq!(JsonCodec.decode(&body).unwrap(), batch);
    }
}
