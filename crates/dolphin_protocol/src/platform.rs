//! Names of the internal platform beans exchanged by both peers.

/// Model type of the internal attributes bean.
pub const INTERNAL_ATTRIBUTES_BEAN_TYPE: &str = "@@@ HIGHLANDER_BEAN @@@";

/// Model type of the action-call bean.
pub const CONTROLLER_ACTION_CALL_BEAN_TYPE: &str = "@@@ CONTROLLER_ACTION_CALL_BEAN @@@";

/// Attribute metadata name carrying the qualifier.
pub const QUALIFIER_METADATA: &str = "qualifier";

/// Property names of the internal attributes bean.
pub mod internal_attributes {
    /// Name of the controller being created.
    pub const CONTROLLER_NAME: &str = "controllerName";
    /// Id of the controller just created.
    pub const CONTROLLER_ID: &str = "controllerId";
    /// Model id of the controller just created.
    pub const MODEL: &str = "model";
}

/// Property names of the action-call bean.
pub mod action_call {
    /// Target controller id of the last action call.
    pub const CONTROLLER_ID: &str = "controllerId";
    /// Name of the last action called.
    pub const ACTION_NAME: &str = "actionName";
    /// Set when the last action call failed.
    pub const ERROR: &str = "error";
}
