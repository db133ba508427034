//! Presentation models and their builder.

use crate::attribute::Attribute;
use crate::id::IdGenerator;
use dolphin_protocol::{AttributeDto, Command, Value};

/// A named, synchronized bag of attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct PresentationModel {
    id: String,
    pm_type: String,
    attributes: Vec<Attribute>,
}

impl PresentationModel {
    /// Mirrors a model described by a `CreatePresentationModel` command.
    ///
    /// Attribute ids are taken from the command as-is.
    pub fn from_dto(
        id: impl Into<String>,
        pm_type: impl Into<String>,
        attributes: Vec<AttributeDto>,
    ) -> Self {
        let id = id.into();
        let attributes = attributes
            .into_iter()
            .map(|dto| Attribute::new(dto.id, dto.property_name, dto.qualifier, dto.value, id.clone()))
            .collect();
        Self {
            id,
            pm_type: pm_type.into(),
            attributes,
        }
    }

    /// Returns the model id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the model type.
    pub fn pm_type(&self) -> &str {
        &self.pm_type
    }

    /// Returns the attributes in declaration order.
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Looks up an attribute by property name.
    pub fn attribute(&self, property_name: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|a| a.property_name() == property_name)
    }

    /// Returns the value of a property, if the property exists.
    pub fn value(&self, property_name: &str) -> Option<&Value> {
        self.attribute(property_name).map(Attribute::value)
    }

    pub(crate) fn attribute_by_id_mut(&mut self, attribute_id: &str) -> Option<&mut Attribute> {
        self.attributes.iter_mut().find(|a| a.id() == attribute_id)
    }

    /// Builds the command that mirrors this model on the other peer.
    pub fn to_create_command(&self) -> Command {
        Command::CreatePresentationModel {
            pm_id: self.id.clone(),
            pm_type: self.pm_type.clone(),
            attributes: self.attributes.iter().map(Attribute::to_dto).collect(),
        }
    }
}

/// Builder for locally created presentation models.
///
/// ```
/// use dolphin_model::{IdGenerator, PresentationModelBuilder};
///
/// let ids = IdGenerator::client();
/// let model = PresentationModelBuilder::new("Person")
///     .with_value("name", "Ada")
///     .with_qualified_value("age", 36i64, "person.age")
///     .build(&ids);
///
/// assert_eq!(model.pm_type(), "Person");
/// assert_eq!(model.attributes().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct PresentationModelBuilder {
    id: Option<String>,
    pm_type: String,
    attributes: Vec<(String, Value, Option<String>)>,
}

impl PresentationModelBuilder {
    /// Starts a model of the given type.
    pub fn new(pm_type: impl Into<String>) -> Self {
        Self {
            id: None,
            pm_type: pm_type.into(),
            attributes: Vec::new(),
        }
    }

    /// Uses a fixed model id instead of a generated one.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Adds an attribute with a null value.
    pub fn with_attribute(self, property_name: impl Into<String>) -> Self {
        self.with_value(property_name, Value::Null)
    }

    /// Adds an attribute with an initial value.
    pub fn with_value(mut self, property_name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes
            .push((property_name.into(), value.into(), None));
        self
    }

    /// Adds a qualified attribute with an initial value.
    pub fn with_qualified_value(
        mut self,
        property_name: impl Into<String>,
        value: impl Into<Value>,
        qualifier: impl Into<String>,
    ) -> Self {
        self.attributes
            .push((property_name.into(), value.into(), Some(qualifier.into())));
        self
    }

    /// Builds the model, minting ids from `ids`.
    pub fn build(self, ids: &IdGenerator) -> PresentationModel {
        let id = self.id.unwrap_or_else(|| ids.next_model_id());
        let attributes = self
            .attributes
            .into_iter()
            .map(|(name, value, qualifier)| {
                Attribute::new(ids.next_attribute_id(), name, qualifier, value, id.clone())
            })
            .collect();
        PresentationModel {
            id,
            pm_type: self.pm_type,
            attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_assigns_ids() {
        let ids = IdGenerator::server();
        let model = PresentationModelBuilder::new("Todo")
            .with_id("todo-1")
            .with_value("text", "write tests")
            .with_attribute("done")
            .build(&ids);

        assert_eq!(model.id(), "todo-1");
        assert_eq!(model.attributes()[0].id(), "1S");
        assert_eq!(model.attributes()[1].id(), "2S");
        assert_eq!(model.value("done"), Some(&Value::Null));
        assert!(model
            .attributes()
            .iter()
            .all(|a| a.model_id() == "todo-1"));
    }

    #[test]
    fn create_command_mirrors_model() {
        let ids = IdGenerator::client();
        let model = PresentationModelBuilder::new("Todo")
            .with_qualified_value("text", "x", "todo.text")
            .build(&ids);

        let command = model.to_create_command();
        let Command::CreatePresentationModel {
            pm_id,
            pm_type,
            attributes,
        } = command
        else {
            panic!("expected CreatePresentationModel");
        };
        let mirrored = PresentationModel::from_dto(pm_id, pm_type, attributes);
        assert_eq!(mirrored, model);
    }
}
