//! Error types for the model crate.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised by the model store and bean schemas.
///
/// All of these are internal consistency errors: they signal a programming
/// error or a protocol violation by the peer and are never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A model with this id is already in the store.
    #[error("a presentation model with id '{id}' already exists")]
    DuplicateModel {
        /// The conflicting model id.
        id: String,
    },

    /// An attribute with this id is already in the store.
    #[error("an attribute with id '{id}' already exists")]
    DuplicateAttribute {
        /// The conflicting attribute id.
        id: String,
    },

    /// No model with this id.
    #[error("presentation model '{id}' not found")]
    ModelNotFound {
        /// The missing model id.
        id: String,
    },

    /// No attribute with this id.
    #[error("attribute '{id}' not found")]
    AttributeNotFound {
        /// The missing attribute id.
        id: String,
    },

    /// The model has no attribute for this property.
    #[error("presentation model '{model_id}' has no property '{property}'")]
    PropertyNotFound {
        /// Model id.
        model_id: String,
        /// Property name.
        property: String,
    },

    /// A schema for this bean type is already registered.
    #[error("bean type '{bean_type}' is already registered")]
    DuplicateSchema {
        /// The conflicting bean type.
        bean_type: String,
    },

    /// No schema is registered for this bean type.
    #[error("no schema registered for bean type '{bean_type}'")]
    SchemaNotFound {
        /// The unknown bean type.
        bean_type: String,
    },

    /// A property was used with a value of the wrong kind.
    #[error("property '{property}' expects {expected}, found {found}")]
    TypeMismatch {
        /// Property name.
        property: String,
        /// Expected kind.
        expected: String,
        /// Kind actually supplied.
        found: String,
    },
}

impl ModelError {
    /// Creates a model not found error.
    pub fn model_not_found(id: impl Into<String>) -> Self {
        Self::ModelNotFound { id: id.into() }
    }

    /// Creates an attribute not found error.
    pub fn attribute_not_found(id: impl Into<String>) -> Self {
        Self::AttributeNotFound { id: id.into() }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(
        property: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            property: property.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ModelError::DuplicateModel { id: "pm-1".into() };
        assert_eq!(
            err.to_string(),
            "a presentation model with id 'pm-1' already exists"
        );

        let err = ModelError::type_mismatch("owner", "bean reference", "integer");
        assert_eq!(
            err.to_string(),
            "property 'owner' expects bean reference, found integer"
        );
    }
}
