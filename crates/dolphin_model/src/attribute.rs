//! Attributes: the named value slots of a presentation model.

use dolphin_protocol::{AttributeDto, Value};

/// A single named value slot within a presentation model.
///
/// Attributes are owned by their model and mutated only through the
/// [`ModelStore`](crate::ModelStore), which keeps the qualifier index and the
/// change feed consistent.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    id: String,
    property_name: String,
    qualifier: Option<String>,
    value: Value,
    model_id: String,
}

impl Attribute {
    pub(crate) fn new(
        id: String,
        property_name: String,
        qualifier: Option<String>,
        value: Value,
        model_id: String,
    ) -> Self {
        Self {
            id,
            property_name,
            qualifier,
            value,
            model_id,
        }
    }

    /// Returns the attribute id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the property name.
    pub fn property_name(&self) -> &str {
        &self.property_name
    }

    /// Returns the qualifier, if any.
    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    /// Returns the current value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Returns the id of the owning model.
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Replaces the value, returning the previous one.
    pub(crate) fn replace_value(&mut self, value: Value) -> Value {
        std::mem::replace(&mut self.value, value)
    }

    pub(crate) fn set_qualifier(&mut self, qualifier: Option<String>) {
        self.qualifier = qualifier;
    }

    /// Returns the wire description of this attribute.
    pub fn to_dto(&self) -> AttributeDto {
        AttributeDto {
            id: self.id.clone(),
            property_name: self.property_name.clone(),
            qualifier: self.qualifier.clone(),
            value: self.value.clone(),
        }
    }
}
