//! Applies server commands to the client model store.

use crate::error::ClientResult;
use dolphin_model::{ModelStore, PresentationModel};
use dolphin_protocol::platform::QUALIFIER_METADATA;
use dolphin_protocol::{Command, Value};
use tracing::{debug, trace, warn};

/// Dispatches response commands into the client store.
///
/// Changes applied here originate from the server and are never sent back.
#[derive(Debug, Clone, Default)]
pub struct ClientResponseHandler {
    strict_mode: bool,
}

impl ClientResponseHandler {
    /// Creates a handler.
    ///
    /// In strict mode a value change whose old value does not match the
    /// local value is ignored.
    pub fn new(strict_mode: bool) -> Self {
        Self { strict_mode }
    }

    /// Applies one command. Returns the id of the touched model, if any.
    pub fn dispatch(&self, store: &mut ModelStore, command: &Command) -> ClientResult<Option<String>> {
        trace!(%command, "dispatching server command");
        match command {
            Command::CreatePresentationModel {
                pm_id,
                pm_type,
                attributes,
            } => {
                if store.contains(pm_id) {
                    warn!(model_id = %pm_id, "server re-created an existing model, ignoring");
                    return Ok(None);
                }
                let model = PresentationModel::from_dto(pm_id.clone(), pm_type.clone(), attributes.clone());
                store.add(model)?;
                Ok(Some(pm_id.clone()))
            }
            Command::DeletePresentationModel { pm_id }
            | Command::PresentationModelDeleted { pm_id } => {
                if store.contains(pm_id) {
                    store.remove(pm_id)?;
                } else {
                    debug!(model_id = %pm_id, "delete for unknown model");
                }
                Ok(None)
            }
            Command::ValueChanged {
                attribute_id,
                old_value,
                new_value,
            } => {
                let Some(attribute) = store.find_attribute_by_id(attribute_id) else {
                    warn!(attribute_id = %attribute_id, "value change for unknown attribute");
                    return Ok(None);
                };
                if self.strict_mode && attribute.value() != old_value {
                    warn!(
                        attribute_id = %attribute_id,
                        expected = %old_value,
                        actual = %attribute.value(),
                        "ignoring value change with stale old value"
                    );
                    return Ok(None);
                }
                let model_id = attribute.model_id().to_string();
                store.set_value(attribute_id, new_value.clone())?;
                Ok(Some(model_id))
            }
            Command::AttributeMetadataChanged {
                attribute_id,
                metadata_name,
                value,
            }
            | Command::ChangeAttributeMetadata {
                attribute_id,
                metadata_name,
                value,
            } => {
                if metadata_name != QUALIFIER_METADATA {
                    debug!(name = %metadata_name, "ignoring unsupported attribute metadata");
                    return Ok(None);
                }
                let qualifier = match value {
                    Value::Null => None,
                    Value::Text(q) => Some(q.clone()),
                    other => Some(other.to_string()),
                };
                store.set_qualifier(attribute_id, qualifier)?;
                Ok(None)
            }
            Command::Empty => Ok(None),
            other => {
                warn!(command = %other, "unexpected command from server");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dolphin_protocol::AttributeDto;

    fn create(pm_id: &str) -> Command {
        Command::CreatePresentationModel {
            pm_id: pm_id.into(),
            pm_type: "Person".into(),
            attributes: vec![AttributeDto::new(format!("{pm_id}-name"), "name", Value::from("Ada"))],
        }
    }

    #[test]
    fn create_and_delete() {
        let handler = ClientResponseHandler::default();
        let mut store = ModelStore::client();

        assert_eq!(
            handler.dispatch(&mut store, &create("p1")).unwrap(),
            Some("p1".into())
        );
        assert!(store.contains("p1"));
        assert_eq!(handler.dispatch(&mut store, &create("p1")).unwrap(), None);

        handler
            .dispatch(&mut store, &Command::delete_presentation_model("p1"))
            .unwrap();
        assert!(!store.contains("p1"));
        handler
            .dispatch(&mut store, &Command::delete_presentation_model("p1"))
            .unwrap();
    }

    #[test]
    fn value_changes_touch_their_model() {
        let handler = ClientResponseHandler::default();
        let mut store = ModelStore::client();
        handler.dispatch(&mut store, &create("p1")).unwrap();

        let touched = handler
            .dispatch(&mut store, &Command::value_changed("p1-name", "whatever", "Grace"))
            .unwrap();
        assert_eq!(touched.as_deref(), Some("p1"));
        assert_eq!(
            store.find_attribute_by_id("p1-name").unwrap().value(),
            &Value::from("Grace")
        );

        let unknown = handler
            .dispatch(&mut store, &Command::value_changed("nope", Value::Null, 1i64))
            .unwrap();
        assert_eq!(unknown, None);
    }

    #[test]
    fn strict_mode_ignores_stale_changes() {
        let handler = ClientResponseHandler::new(true);
        let mut store = ModelStore::client();
        handler.dispatch(&mut store, &create("p1")).unwrap();

        handler
            .dispatch(&mut store, &Command::value_changed("p1-name", "Bob", "Grace"))
            .unwrap();
        assert_eq!(
            store.find_attribute_by_id("p1-name").unwrap().value(),
            &Value::from("Ada")
        );

        handler
            .dispatch(&mut store, &Command::value_changed("p1-name", "Ada", "Grace"))
            .unwrap();
        assert_eq!(
            store.find_attribute_by_id("p1-name").unwrap().value(),
            &Value::from("Grace")
        );
    }

    #[test]
    fn qualifier_metadata() {
        let handler = ClientResponseHandler::default();
        let mut store = ModelStore::client();
        handler.dispatch(&mut store, &create("p1")).unwrap();

        handler
            .dispatch(
                &mut store,
                &Command::AttributeMetadataChanged {
                    attribute_id: "p1-name".into(),
                    metadata_name: QUALIFIER_METADATA.into(),
                    value: Value::from("person.name"),
                },
            )
            .unwrap();
        assert_eq!(store.find_all_attributes_by_qualifier("person.name").len(), 1);
    }
}
