//! Property-based test generators using proptest.
//!
//! Strategies produce values that survive the JSON wire format unchanged:
//! floats are finite binary fractions and ids are non-empty.

use dolphin_protocol::{ActionParam, AttributeDto, Command, Value};
use proptest::prelude::*;

/// Strategy for model, attribute and controller ids.
pub fn id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[0-9]{1,6}[CS]|[a-z][a-z0-9-]{0,15}").expect("Invalid regex")
}

/// Strategy for property, action and type names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for scalar values.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        // Quarters are exact in binary and print exactly in decimal.
        (-4_000_000i32..4_000_000).prop_map(|q| Value::Float(f64::from(q) / 4.0 + 0.25)),
        ".{0,24}".prop_map(Value::Text),
    ]
}

/// Strategy for values, including nested lists.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_value_strategy().prop_recursive(3, 24, 6, |inner| {
        prop::collection::vec(inner, 0..6).prop_map(Value::List)
    })
}

/// Strategy for attribute descriptions.
pub fn attribute_strategy() -> impl Strategy<Value = AttributeDto> {
    (
        id_strategy(),
        name_strategy(),
        prop::option::of(name_strategy()),
        value_strategy(),
    )
        .prop_map(|(id, name, qualifier, value)| {
            let dto = AttributeDto::new(id, name, value);
            match qualifier {
                Some(q) => dto.with_qualifier(q),
                None => dto,
            }
        })
}

/// Strategy for action parameters.
pub fn action_param_strategy() -> impl Strategy<Value = ActionParam> {
    (name_strategy(), value_strategy()).prop_map(|(name, value)| ActionParam::new(name, value))
}

/// Strategy for the commands without payload.
pub fn signal_command_strategy() -> impl Strategy<Value = Command> {
    prop_oneof![
        Just(Command::CreateContext),
        Just(Command::DestroyContext),
        Just(Command::StartLongPoll),
        Just(Command::InterruptLongPoll),
        Just(Command::Empty),
    ]
}

/// Strategy for presentation-model commands.
pub fn model_command_strategy() -> impl Strategy<Value = Command> {
    prop_oneof![
        (id_strategy(), name_strategy(), prop::collection::vec(attribute_strategy(), 0..5)).prop_map(
            |(pm_id, pm_type, attributes)| Command::CreatePresentationModel {
                pm_id,
                pm_type,
                attributes,
            }
        ),
        id_strategy().prop_map(Command::delete_presentation_model),
        id_strategy().prop_map(|pm_id| Command::PresentationModelDeleted { pm_id }),
        (id_strategy(), value_strategy(), value_strategy())
            .prop_map(|(id, old, new)| Command::value_changed(id, old, new)),
        (id_strategy(), value_strategy()).prop_map(|(attribute_id, value)| {
            Command::ChangeAttributeMetadata {
                attribute_id,
                metadata_name: "qualifier".into(),
                value,
            }
        }),
        (id_strategy(), value_strategy()).prop_map(|(attribute_id, value)| {
            Command::AttributeMetadataChanged {
                attribute_id,
                metadata_name: "qualifier".into(),
                value,
            }
        }),
    ]
}

/// Strategy for controller commands.
pub fn controller_command_strategy() -> impl Strategy<Value = Command> {
    prop_oneof![
        (name_strategy(), prop::option::of(id_strategy())).prop_map(|(controller_name, parent)| {
            Command::CreateController {
                controller_name,
                parent_controller_id: parent,
            }
        }),
        id_strategy().prop_map(|controller_id| Command::DestroyController { controller_id }),
        (id_strategy(), name_strategy(), prop::collection::vec(action_param_strategy(), 0..4))
            .prop_map(|(controller_id, action, params)| Command::call_action(controller_id, action, params)),
    ]
}

/// Strategy for commands of every kind.
pub fn command_strategy() -> impl Strategy<Value = Command> {
    prop_oneof![
        1 => signal_command_strategy(),
        3 => model_command_strategy(),
        2 => controller_command_strategy(),
    ]
}

/// Strategy for command batches.
pub fn batch_strategy(max_len: usize) -> impl Strategy<Value = Vec<Command>> {
    prop::collection::vec(command_strategy(), 0..max_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dolphin_protocol::{Codec, JsonCodec};

    proptest! {
        #[test]
        fn codec_preserves_batches(batch in batch_strategy(16)) {
            let codec = JsonCodec::new();
            let body = codec.encode(&batch).unwrap();
            prop_assert_eq!(codec.decode(&body).unwrap(), batch);
        }

        #[test]
        fn unknown_commands_are_skipped(batch in batch_strategy(8), position in 0usize..8) {
            let codec = JsonCodec::new();
            let mut entries: Vec<serde_json::Value> =
                serde_json::from_str(&codec.encode(&batch).unwrap()).unwrap();
            let at = position.min(entries.len());
            entries.insert(at, serde_json::json!({ "id": "SomeFutureCommand", "x": 1 }));
            let body = serde_json::to_string(&entries).unwrap();
            prop_assert_eq!(codec.decode(&body).unwrap(), batch);
        }
    }
}
