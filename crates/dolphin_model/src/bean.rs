//! Bean schemas: explicit, flattened property tables per bean type.
//!
//! A bean is a typed view over a presentation model. Its schema lists every
//! property together with its kind, including the properties inherited from
//! a parent schema, so no hierarchy walk is needed at runtime.

use crate::error::{ModelError, ModelResult};
use crate::presentation_model::PresentationModelBuilder;
use dolphin_protocol::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// The kind of a bean property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKind {
    /// A plain value.
    Value,
    /// A reference to another bean of the given type, stored as its model id.
    Bean(String),
    /// A list of plain values.
    ValueList,
    /// A list of references to beans of the given type.
    BeanList(String),
}

impl PropertyKind {
    /// Returns true for reference-carrying kinds.
    pub fn is_reference(&self) -> bool {
        matches!(self, PropertyKind::Bean(_) | PropertyKind::BeanList(_))
    }

    /// Returns true for list kinds.
    pub fn is_list(&self) -> bool {
        matches!(self, PropertyKind::ValueList | PropertyKind::BeanList(_))
    }

    /// Returns the referenced bean type, if any.
    pub fn referenced_type(&self) -> Option<&str> {
        match self {
            PropertyKind::Bean(t) | PropertyKind::BeanList(t) => Some(t),
            _ => None,
        }
    }

    /// Returns the initial value of a property of this kind.
    pub fn initial_value(&self) -> Value {
        if self.is_list() {
            Value::List(Vec::new())
        } else {
            Value::Null
        }
    }

    /// Describes the kind for error messages.
    pub fn describe(&self) -> String {
        match self {
            PropertyKind::Value => "value".to_string(),
            PropertyKind::Bean(t) => format!("reference to {t}"),
            PropertyKind::ValueList => "value list".to_string(),
            PropertyKind::BeanList(t) => format!("list of {t}"),
        }
    }
}

/// A property of a bean schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySchema {
    /// Property name.
    pub name: String,
    /// Property kind.
    pub kind: PropertyKind,
}

/// The flattened property table of a bean type.
///
/// ```
/// use dolphin_model::{BeanSchema, PropertyKind};
///
/// let named = BeanSchema::new("Named").with_value("name");
/// let person = BeanSchema::extending("Person", &named)
///     .with_bean("address", "Address")
///     .with_bean_list("friends", "Person");
///
/// assert_eq!(person.properties().len(), 3);
/// assert_eq!(person.property("name").unwrap().kind, PropertyKind::Value);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeanSchema {
    bean_type: String,
    properties: Vec<PropertySchema>,
}

impl BeanSchema {
    /// Creates an empty schema.
    pub fn new(bean_type: impl Into<String>) -> Self {
        Self {
            bean_type: bean_type.into(),
            properties: Vec::new(),
        }
    }

    /// Creates a schema that starts with a copy of `parent`'s properties.
    pub fn extending(bean_type: impl Into<String>, parent: &BeanSchema) -> Self {
        Self {
            bean_type: bean_type.into(),
            properties: parent.properties.clone(),
        }
    }

    /// Adds (or redefines) a property.
    pub fn with_property(mut self, name: impl Into<String>, kind: PropertyKind) -> Self {
        let name = name.into();
        match self.properties.iter_mut().find(|p| p.name == name) {
            Some(existing) => existing.kind = kind,
            None => self.properties.push(PropertySchema { name, kind }),
        }
        self
    }

    /// Adds a plain value property.
    pub fn with_value(self, name: impl Into<String>) -> Self {
        self.with_property(name, PropertyKind::Value)
    }

    /// Adds a bean reference property.
    pub fn with_bean(self, name: impl Into<String>, bean_type: impl Into<String>) -> Self {
        self.with_property(name, PropertyKind::Bean(bean_type.into()))
    }

    /// Adds a value list property.
    pub fn with_list(self, name: impl Into<String>) -> Self {
        self.with_property(name, PropertyKind::ValueList)
    }

    /// Adds a bean list property.
    pub fn with_bean_list(self, name: impl Into<String>, bean_type: impl Into<String>) -> Self {
        self.with_property(name, PropertyKind::BeanList(bean_type.into()))
    }

    /// Returns the bean type.
    pub fn bean_type(&self) -> &str {
        &self.bean_type
    }

    /// Returns all properties, inherited ones first.
    pub fn properties(&self) -> &[PropertySchema] {
        &self.properties
    }

    /// Looks up a property.
    pub fn property(&self, name: &str) -> Option<&PropertySchema> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Looks up a property, failing with `PropertyNotFound` for `model_id`.
    pub fn require(&self, model_id: &str, name: &str) -> ModelResult<&PropertySchema> {
        self.property(name).ok_or_else(|| ModelError::PropertyNotFound {
            model_id: model_id.to_string(),
            property: name.to_string(),
        })
    }

    /// Iterates over reference-carrying properties.
    pub fn references(&self) -> impl Iterator<Item = &PropertySchema> {
        self.properties.iter().filter(|p| p.kind.is_reference())
    }

    /// Returns a model builder with one attribute per property.
    pub fn model_builder(&self) -> PresentationModelBuilder {
        self.properties.iter().fold(
            PresentationModelBuilder::new(self.bean_type.clone()),
            |builder, p| builder.with_value(p.name.clone(), p.kind.initial_value()),
        )
    }
}

/// Registered bean schemas, keyed by bean type.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<BeanSchema>>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema. Registering a type twice is an error.
    pub fn register(&mut self, schema: BeanSchema) -> ModelResult<()> {
        if self.schemas.contains_key(schema.bean_type()) {
            return Err(ModelError::DuplicateSchema {
                bean_type: schema.bean_type().to_string(),
            });
        }
        self.schemas
            .insert(schema.bean_type().to_string(), Arc::new(schema));
        Ok(())
    }

    /// Looks up a schema.
    pub fn get(&self, bean_type: &str) -> Option<Arc<BeanSchema>> {
        self.schemas.get(bean_type).cloned()
    }

    /// Looks up a schema, failing with `SchemaNotFound`.
    pub fn require(&self, bean_type: &str) -> ModelResult<Arc<BeanSchema>> {
        self.get(bean_type).ok_or_else(|| ModelError::SchemaNotFound {
            bean_type: bean_type.to_string(),
        })
    }

    /// Returns true if a schema is registered for the type.
    pub fn contains(&self, bean_type: &str) -> bool {
        self.schemas.contains_key(bean_type)
    }

    /// Returns the number of registered schemas.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Returns true if no schema is registered.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
