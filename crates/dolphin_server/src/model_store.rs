//! Server model store with a response buffer.
//!
//! Every server-side mutation is mirrored as a command in the buffer and
//! sent to the client with the current response. Mutations requested by the
//! client are applied silently.

use dolphin_model::{IdGenerator, ModelResult, ModelStore, PresentationModel, ValueChange};
use dolphin_protocol::platform::QUALIFIER_METADATA;
use dolphin_protocol::{Command, Value};
use tracing::{debug, warn};

/// The server-side model store of one session.
#[derive(Debug)]
pub struct ServerModelStore {
    store: ModelStore,
    response: Vec<Command>,
}

impl ServerModelStore {
    /// Creates an empty store minting server-side ids.
    pub fn new() -> Self {
        Self {
            store: ModelStore::server(),
            response: Vec::new(),
        }
    }

    /// Returns the underlying store for reads.
    pub fn models(&self) -> &ModelStore {
        &self.store
    }

    /// Returns the id generator.
    pub fn ids(&self) -> &IdGenerator {
        self.store.ids()
    }

    /// Adds a model and announces it to the client.
    pub fn add(&mut self, model: PresentationModel) -> ModelResult<()> {
        let command = model.to_create_command();
        self.store.add(model)?;
        self.response.push(command);
        Ok(())
    }

    /// Removes a model and tells the client to delete it.
    pub fn remove(&mut self, model_id: &str) -> ModelResult<PresentationModel> {
        let model = self.store.remove(model_id)?;
        self.response
            .push(Command::delete_presentation_model(model_id));
        Ok(model)
    }

    /// Sets an attribute value, including qualifier peers, and sends every
    /// change to the client.
    pub fn set_value(&mut self, attribute_id: &str, value: Value) -> ModelResult<()> {
        let changes = self.store.set_value(attribute_id, value)?;
        self.push_changes(changes);
        Ok(())
    }

    /// Sets a property of a model by name.
    pub fn set_property(&mut self, model_id: &str, property: &str, value: Value) -> ModelResult<()> {
        let changes = self.store.set_property(model_id, property, value)?;
        self.push_changes(changes);
        Ok(())
    }

    /// Changes the qualifier of an attribute and tells the client.
    pub fn set_qualifier(&mut self, attribute_id: &str, qualifier: Option<String>) -> ModelResult<()> {
        self.store.set_qualifier(attribute_id, qualifier.clone())?;
        self.response.push(Command::AttributeMetadataChanged {
            attribute_id: attribute_id.to_string(),
            metadata_name: QUALIFIER_METADATA.to_string(),
            value: Value::from(qualifier),
        });
        Ok(())
    }

    /// Applies a model command sent by the client without echoing it.
    pub fn apply_client_command(&mut self, command: &Command) -> ModelResult<()> {
        match command {
            Command::CreatePresentationModel {
                pm_id,
                pm_type,
                attributes,
            } => {
                if self.store.contains(pm_id) {
                    warn!(model_id = %pm_id, "client re-created an existing model, ignoring");
                    return Ok(());
                }
                self.store.add(PresentationModel::from_dto(
                    pm_id.clone(),
                    pm_type.clone(),
                    attributes.clone(),
                ))
            }
            Command::DeletePresentationModel { pm_id } => {
                if self.store.contains(pm_id) {
                    self.store.remove(pm_id)?;
                } else {
                    debug!(model_id = %pm_id, "client deleted unknown model");
                }
                Ok(())
            }
            Command::ValueChanged {
                attribute_id,
                old_value,
                new_value,
            } => {
                let Some(attribute) = self.store.find_attribute_by_id(attribute_id) else {
                    warn!(attribute_id = %attribute_id, "client changed unknown attribute");
                    return Ok(());
                };
                if attribute.value() != old_value {
                    warn!(
                        attribute_id = %attribute_id,
                        server = %attribute.value(),
                        client_old = %old_value,
                        "client overrules server value"
                    );
                }
                self.store.set_value(attribute_id, new_value.clone())?;
                Ok(())
            }
            Command::ChangeAttributeMetadata {
                attribute_id,
                metadata_name,
                value,
            } if metadata_name == QUALIFIER_METADATA => {
                let qualifier = value.as_text().map(str::to_string);
                self.store.set_qualifier(attribute_id, qualifier)
            }
            other => {
                debug!(command = %other, "not a model command");
                Ok(())
            }
        }
    }

    /// Returns true if the response buffer holds commands.
    pub fn has_response(&self) -> bool {
        !self.response.is_empty()
    }

    /// Takes the buffered response commands.
    pub fn take_response(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.response)
    }

    fn push_changes(&mut self, changes: Vec<ValueChange>) {
        self.response
            .extend(changes.into_iter().map(|change| Command::ValueChanged {
                attribute_id: change.attribute_id,
                old_value: change.old_value,
                new_value: change.new_value,
            }));
    }
}

impl Default for ServerModelStore {
    fn default() -> Self {
        Self::new()
    }
}
