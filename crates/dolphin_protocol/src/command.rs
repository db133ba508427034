//! The command vocabulary exchanged between client and server.
//!
//! Every request and response body is an ordered JSON array of command
//! objects. Each object carries its command id under the `id` key and uses
//! short payload keys to keep long-polling traffic small:
//!
//! | Key    | Meaning                               |
//! |--------|---------------------------------------|
//! | `p_id` | presentation model id                 |
//! | `t`    | presentation model type               |
//! | `a`    | attribute list                        |
//! | `a_id` | attribute id                          |
//! | `c_id` | controller id                         |
//! | `n`    | name (property, metadata, controller, action, param) |
//! | `q`    | qualifier                             |
//! | `o`    | old value                             |
//! | `v`    | (new) value                           |
//! | `p`    | parameters, or parent controller id   |

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire form of an attribute inside a `CreatePresentationModel` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDto {
    /// Attribute id.
    #[serde(rename = "a_id")]
    pub id: String,
    /// Property name within the owning model.
    #[serde(rename = "n")]
    pub property_name: String,
    /// Optional qualifier.
    #[serde(rename = "q", default, skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<String>,
    /// Initial value.
    #[serde(rename = "v", default)]
    pub value: Value,
}

impl AttributeDto {
    /// Creates an attribute description without a qualifier.
    pub fn new(
        id: impl Into<String>,
        property_name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            id: id.into(),
            property_name: property_name.into(),
            qualifier: None,
            value: value.into(),
        }
    }

    /// Sets the qualifier.
    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }
}

/// A named parameter of a `CallAction` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionParam {
    /// Parameter name.
    #[serde(rename = "n")]
    pub name: String,
    /// Parameter value.
    #[serde(rename = "v", default)]
    pub value: Value,
}

impl ActionParam {
    /// Creates a parameter.
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A protocol command.
///
/// Commands are plain values: once built they are only cloned, compared,
/// encoded and dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "id")]
pub enum Command {
    /// Initializes the server-side session context.
    CreateContext,
    /// Tears down the server-side session context.
    DestroyContext,
    /// Creates a presentation model on the receiving side.
    CreatePresentationModel {
        /// Model id.
        #[serde(rename = "p_id")]
        pm_id: String,
        /// Model type.
        #[serde(rename = "t")]
        pm_type: String,
        /// Attributes in declaration order.
        #[serde(rename = "a", default)]
        attributes: Vec<AttributeDto>,
    },
    /// Deletes a presentation model on the receiving side.
    DeletePresentationModel {
        /// Model id.
        #[serde(rename = "p_id")]
        pm_id: String,
    },
    /// Notifies that a presentation model has been deleted.
    PresentationModelDeleted {
        /// Model id.
        #[serde(rename = "p_id")]
        pm_id: String,
    },
    /// An attribute value changed.
    ValueChanged {
        /// Attribute id.
        #[serde(rename = "a_id")]
        attribute_id: String,
        /// Value before the change.
        #[serde(rename = "o", default)]
        old_value: Value,
        /// Value after the change.
        #[serde(rename = "v", default)]
        new_value: Value,
    },
    /// Requests a change of attribute metadata.
    ChangeAttributeMetadata {
        /// Attribute id.
        #[serde(rename = "a_id")]
        attribute_id: String,
        /// Metadata name (for example `qualifier`).
        #[serde(rename = "n")]
        metadata_name: String,
        /// New metadata value.
        #[serde(rename = "v", default)]
        value: Value,
    },
    /// Notifies that attribute metadata changed.
    AttributeMetadataChanged {
        /// Attribute id.
        #[serde(rename = "a_id")]
        attribute_id: String,
        /// Metadata name (for example `qualifier`).
        #[serde(rename = "n")]
        metadata_name: String,
        /// New metadata value.
        #[serde(rename = "v", default)]
        value: Value,
    },
    /// Creates a controller instance.
    CreateController {
        /// Registered controller name.
        #[serde(rename = "n")]
        controller_name: String,
        /// Optional parent controller id.
        #[serde(rename = "p", default, skip_serializing_if = "Option::is_none")]
        parent_controller_id: Option<String>,
    },
    /// Destroys a controller instance.
    DestroyController {
        /// Controller id.
        #[serde(rename = "c_id")]
        controller_id: String,
    },
    /// Invokes an action on a controller.
    CallAction {
        /// Controller id.
        #[serde(rename = "c_id")]
        controller_id: String,
        /// Action name.
        #[serde(rename = "n")]
        action_name: String,
        /// Ordered parameters.
        #[serde(rename = "p", default)]
        params: Vec<ActionParam>,
    },
    /// Opens a long poll for server push.
    StartLongPoll,
    /// Releases an outstanding long poll.
    InterruptLongPoll,
    /// No-op command.
    Empty,
}

/// The id of a command, independent of its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// `CreateContext`
    CreateContext,
    /// `DestroyContext`
    DestroyContext,
    /// `CreatePresentationModel`
    CreatePresentationModel,
    /// `DeletePresentationModel`
    DeletePresentationModel,
    /// `PresentationModelDeleted`
    PresentationModelDeleted,
    /// `ValueChanged`
    ValueChanged,
    /// `ChangeAttributeMetadata`
    ChangeAttributeMetadata,
    /// `AttributeMetadataChanged`
    AttributeMetadataChanged,
    /// `CreateController`
    CreateController,
    /// `DestroyController`
    DestroyController,
    /// `CallAction`
    CallAction,
    /// `StartLongPoll`
    StartLongPoll,
    /// `InterruptLongPoll`
    InterruptLongPoll,
    /// `Empty`
    Empty,
}

impl CommandKind {
    /// All command kinds.
    pub const ALL: [CommandKind; 14] = [
        CommandKind::CreateContext,
        CommandKind::DestroyContext,
        CommandKind::CreatePresentationModel,
        CommandKind::DeletePresentationModel,
        CommandKind::PresentationModelDeleted,
        CommandKind::ValueChanged,
        CommandKind::ChangeAttributeMetadata,
        CommandKind::AttributeMetadataChanged,
        CommandKind::CreateController,
        CommandKind::DestroyController,
        CommandKind::CallAction,
        CommandKind::StartLongPoll,
        CommandKind::InterruptLongPoll,
        CommandKind::Empty,
    ];

    /// Returns the wire id.
    pub fn id(&self) -> &'static str {
        match self {
            CommandKind::CreateContext => "CreateContext",
            CommandKind::DestroyContext => "DestroyContext",
            CommandKind::CreatePresentationModel => "CreatePresentationModel",
            CommandKind::DeletePresentationModel => "DeletePresentationModel",
            CommandKind::PresentationModelDeleted => "PresentationModelDeleted",
            CommandKind::ValueChanged => "ValueChanged",
            CommandKind::ChangeAttributeMetadata => "ChangeAttributeMetadata",
            CommandKind::AttributeMetadataChanged => "AttributeMetadataChanged",
            CommandKind::CreateController => "CreateController",
            CommandKind::DestroyController => "DestroyController",
            CommandKind::CallAction => "CallAction",
            CommandKind::StartLongPoll => "StartLongPoll",
            CommandKind::InterruptLongPoll => "InterruptLongPoll",
            CommandKind::Empty => "Empty",
        }
    }

    /// Looks up a kind by wire id.
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.id() == id)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl Command {
    /// Returns the kind of this command.
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::CreateContext => CommandKind::CreateContext,
            Command::DestroyContext => CommandKind::DestroyContext,
            Command::CreatePresentationModel { .. } => CommandKind::CreatePresentationModel,
            Command::DeletePresentationModel { .. } => CommandKind::DeletePresentationModel,
            Command::PresentationModelDeleted { .. } => CommandKind::PresentationModelDeleted,
            Command::ValueChanged { .. } => CommandKind::ValueChanged,
            Command::ChangeAttributeMetadata { .. } => CommandKind::ChangeAttributeMetadata,
            Command::AttributeMetadataChanged { .. } => CommandKind::AttributeMetadataChanged,
            Command::CreateController { .. } => CommandKind::CreateController,
            Command::DestroyController { .. } => CommandKind::DestroyController,
            Command::CallAction { .. } => CommandKind::CallAction,
            Command::StartLongPoll => CommandKind::StartLongPoll,
            Command::InterruptLongPoll => CommandKind::InterruptLongPoll,
            Command::Empty => CommandKind::Empty,
        }
    }

    /// Returns true for signal commands.
    ///
    /// Signal commands are served outside the session's thread confinement
    /// and must never touch model state.
    pub fn is_signal(&self) -> bool {
        matches!(self, Command::InterruptLongPoll)
    }

    /// Builds a `ValueChanged` command.
    pub fn value_changed(
        attribute_id: impl Into<String>,
        old_value: impl Into<Value>,
        new_value: impl Into<Value>,
    ) -> Self {
        Command::ValueChanged {
            attribute_id: attribute_id.into(),
            old_value: old_value.into(),
            new_value: new_value.into(),
        }
    }

    /// Builds a `CallAction` command.
    pub fn call_action(
        controller_id: impl Into<String>,
        action_name: impl Into<String>,
        params: Vec<ActionParam>,
    ) -> Self {
        Command::CallAction {
            controller_id: controller_id.into(),
            action_name: action_name.into(),
            params,
        }
    }

    /// Builds a `CreateController` command without a parent.
    pub fn create_controller(controller_name: impl Into<String>) -> Self {
        Command::CreateController {
            controller_name: controller_name.into(),
            parent_controller_id: None,
        }
    }

    /// Builds a `DeletePresentationModel` command.
    pub fn delete_presentation_model(pm_id: impl Into<String>) -> Self {
        Command::DeletePresentationModel {
            pm_id: pm_id.into(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::CreatePresentationModel {
                pm_id,
                pm_type,
                attributes,
            } => write!(
                f,
                "CreatePresentationModel(p_id={pm_id}, t={pm_type}, {} attributes)",
                attributes.len()
            ),
            Command::DeletePresentationModel { pm_id } => {
                write!(f, "DeletePresentationModel(p_id={pm_id})")
            }
            Command::PresentationModelDeleted { pm_id } => {
                write!(f, "PresentationModelDeleted(p_id={pm_id})")
            }
            Command::ValueChanged {
                attribute_id,
                old_value,
                new_value,
            } => write!(
                f,
                "ValueChanged(a_id={attribute_id}, {old_value} -> {new_value})"
            ),
            Command::ChangeAttributeMetadata {
                attribute_id,
                metadata_name,
                value,
            }
            | Command::AttributeMetadataChanged {
                attribute_id,
                metadata_name,
                value,
            } => write!(
                f,
                "{}(a_id={attribute_id}, {metadata_name}={value})",
                self.kind()
            ),
            Command::CreateController {
                controller_name,
                parent_controller_id,
            } => match parent_controller_id {
                Some(parent) => write!(f, "CreateController({controller_name}, parent={parent})"),
                None => write!(f, "CreateController({controller_name})"),
            },
            Command::DestroyController { controller_id } => {
                write!(f, "DestroyController(c_id={controller_id})")
            }
            Command::CallAction {
                controller_id,
                action_name,
                params,
            } => write!(
                f,
                "CallAction(c_id={controller_id}, {action_name}, {} params)",
                params.len()
            ),
            other => f.write_str(other.kind().id()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_round_trip_through_ids() {
        for kind in CommandKind::ALL {
            assert_eq!(CommandKind::from_id(kind.id()), Some(kind));
        }
        assert_eq!(CommandKind::from_id("Teleport"), None);
    }

    #[test]
    fn serde_tag_matches_kind_id() {
        let commands = vec![
            Command::CreateContext,
            Command::StartLongPoll,
            Command::value_changed("1S", 1i64, 2i64),
            Command::create_controller("Counter"),
            Command::delete_presentation_model("pm-1"),
        ];
        for command in commands {
            let json = serde_json::to_value(&command).unwrap();
            assert_eq!(json["id"], command.kind().id());
        }
    }

    #[test]
    fn short_keys_on_the_wire() {
        let command = Command::value_changed("7C", "a", "b");
        let json = serde_json::to_value(&command).unwrap();
        assert_eq!(json["a_id"], "7C");
        assert_eq!(json["o"], "a");
        assert_eq!(json["v"], "b");
    }

    #[test]
    fn attribute_values_convert_from_plain_types() {
        assert_eq!(AttributeDto::new("1S", "done", false).value, Value::Bool(false));
        assert_eq!(AttributeDto::new("2S", "count", 0i64).value, Value::Integer(0));
        assert_eq!(AttributeDto::new("3S", "name", "Ada").value, Value::from("Ada"));
        assert_eq!(AttributeDto::new("4S", "note", Value::Null).value, Value::Null);
    }

    #[test]
    fn signal_commands() {
        assert!(Command::InterruptLongPoll.is_signal());
        assert!(!Command::StartLongPoll.is_signal());
    }

    #[test]
    fn display_is_compact() {
        let command = Command::call_action("c-1", "save", vec![ActionParam::new("x", 1i64)]);
        assert_eq!(command.to_string(), "CallAction(c_id=c-1, save, 1 params)");
        assert_eq!(Command::Empty.to_string(), "Empty");
    }
}
