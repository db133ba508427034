//! Wire-format test vectors.
//!
//! Each vector pairs the JSON a peer puts on the wire with the command it
//! must decode to. Other implementations of the protocol can be checked
//! against the same table.

use dolphin_protocol::{ActionParam, AttributeDto, Command, Value};

/// A command and its JSON wire form.
#[derive(Debug, Clone)]
pub struct WireVector {
    /// Unique identifier for this vector.
    pub id: &'static str,
    /// Human-readable description.
    pub description: &'static str,
    /// Wire JSON of a single-command batch.
    pub json: &'static str,
    /// The decoded command.
    pub command: Command,
}

/// Vectors covering every command kind.
pub fn command_vectors() -> Vec<WireVector> {
    vec![
        WireVector {
            id: "create_context",
            description: "session initialization",
            json: r#"[{"id":"CreateContext"}]"#,
            command: Command::CreateContext,
        },
        WireVector {
            id: "destroy_context",
            description: "session teardown",
            json: r#"[{"id":"DestroyContext"}]"#,
            command: Command::DestroyContext,
        },
        WireVector {
            id: "create_pm",
            description: "model with a plain and a qualified attribute",
            json: r#"[{"id":"CreatePresentationModel","p_id":"7S","t":"Person","a":[{"a_id":"8S","n":"name","v":"Ada"},{"a_id":"9S","n":"age","q":"person.age","v":36}]}]"#,
            command: Command::CreatePresentationModel {
                pm_id: "7S".into(),
                pm_type: "Person".into(),
                attributes: vec![
                    AttributeDto::new("8S", "name", Value::from("Ada")),
                    AttributeDto::new("9S", "age", Value::Integer(36)).with_qualifier("person.age"),
                ],
            },
        },
        WireVector {
            id: "delete_pm",
            description: "model deletion",
            json: r#"[{"id":"DeletePresentationModel","p_id":"7S"}]"#,
            command: Command::delete_presentation_model("7S"),
        },
        WireVector {
            id: "pm_deleted",
            description: "model deletion notice",
            json: r#"[{"id":"PresentationModelDeleted","p_id":"7S"}]"#,
            command: Command::PresentationModelDeleted { pm_id: "7S".into() },
        },
        WireVector {
            id: "value_changed",
            description: "value change from null to a list",
            json: r#"[{"id":"ValueChanged","a_id":"8S","o":null,"v":[1,2.5,"x",true]}]"#,
            command: Command::value_changed(
                "8S",
                Value::Null,
                Value::List(vec![
                    Value::Integer(1),
                    Value::Float(2.5),
                    Value::from("x"),
                    Value::Bool(true),
                ]),
            ),
        },
        WireVector {
            id: "change_metadata",
            description: "qualifier change request",
            json: r#"[{"id":"ChangeAttributeMetadata","a_id":"8S","n":"qualifier","v":"person.name"}]"#,
            command: Command::ChangeAttributeMetadata {
                attribute_id: "8S".into(),
                metadata_name: "qualifier".into(),
                value: Value::from("person.name"),
            },
        },
        WireVector {
            id: "metadata_changed",
            description: "qualifier change notice",
            json: r#"[{"id":"AttributeMetadataChanged","a_id":"8S","n":"qualifier","v":null}]"#,
            command: Command::AttributeMetadataChanged {
                attribute_id: "8S".into(),
                metadata_name: "qualifier".into(),
                value: Value::Null,
            },
        },
        WireVector {
            id: "create_controller",
            description: "root controller",
            json: r#"[{"id":"CreateController","n":"Counter"}]"#,
            command: Command::create_controller("Counter"),
        },
        WireVector {
            id: "create_child_controller",
            description: "controller with a parent",
            json: r#"[{"id":"CreateController","n":"Detail","p":"c-1"}]"#,
            command: Command::CreateController {
                controller_name: "Detail".into(),
                parent_controller_id: Some("c-1".into()),
            },
        },
        WireVector {
            id: "destroy_controller",
            description: "controller teardown",
            json: r#"[{"id":"DestroyController","c_id":"c-1"}]"#,
            command: Command::DestroyController {
                controller_id: "c-1".into(),
            },
        },
        WireVector {
            id: "call_action",
            description: "action with ordered parameters",
            json: r#"[{"id":"CallAction","c_id":"c-1","n":"save","p":[{"n":"force","v":true},{"n":"1","v":null}]}]"#,
            command: Command::call_action(
                "c-1",
                "save",
                vec![ActionParam::new("force", true), ActionParam::new("1", Value::Null)],
            ),
        },
        WireVector {
            id: "start_long_poll",
            description: "long poll",
            json: r#"[{"id":"StartLongPoll"}]"#,
            command: Command::StartLongPoll,
        },
        WireVector {
            id: "interrupt_long_poll",
            description: "long poll release",
            json: r#"[{"id":"InterruptLongPoll"}]"#,
            command: Command::InterruptLongPoll,
        },
        WireVector {
            id: "empty",
            description: "no-op",
            json: r#"[{"id":"Empty"}]"#,
            command: Command::Empty,
        },
    ]
}
