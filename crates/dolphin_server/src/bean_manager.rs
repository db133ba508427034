//! Typed bean access over the server model store.
//!
//! A bean is a presentation model whose type has a registered schema.
//! Property writes are checked against the schema, and bean-typed
//! properties keep the garbage collector's reference graph current.

use crate::error::{ServerError, ServerResult};
use crate::gc::{GarbageCollector, GcStats, VetoHandler};
use crate::model_store::ServerModelStore;
use dolphin_model::{BeanSchema, ModelError, PropertyKind, SchemaRegistry};
use dolphin_protocol::{Command, Value};
use std::sync::Arc;
use tracing::{debug, trace};

/// Creates, reads, writes and removes the beans of one session.
#[derive(Debug)]
pub struct BeanManager {
    store: ServerModelStore,
    schemas: Arc<SchemaRegistry>,
    gc: GarbageCollector,
}

impl BeanManager {
    /// Creates a bean manager over an empty store.
    pub fn new(schemas: Arc<SchemaRegistry>, gc: GarbageCollector) -> Self {
        Self {
            store: ServerModelStore::new(),
            schemas,
            gc,
        }
    }

    /// Creates a bean manager with default garbage collection settings.
    pub fn with_schemas(schemas: Arc<SchemaRegistry>) -> Self {
        Self::new(schemas, GarbageCollector::default())
    }

    /// Returns the model store.
    pub fn store(&self) -> &ServerModelStore {
        &self.store
    }

    /// Returns the model store for direct, unmanaged mutations.
    pub fn store_mut(&mut self) -> &mut ServerModelStore {
        &mut self.store
    }

    /// Returns the registered schemas.
    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    /// Creates a garbage-collectable bean and returns its id.
    pub fn create(&mut self, bean_type: &str) -> ServerResult<String> {
        self.create_bean(bean_type, false)
    }

    /// Creates a root bean, kept alive until removed explicitly.
    pub fn create_root(&mut self, bean_type: &str) -> ServerResult<String> {
        self.create_bean(bean_type, true)
    }

    fn create_bean(&mut self, bean_type: &str, root: bool) -> ServerResult<String> {
        let schema = self.schemas.require(bean_type)?;
        let model = schema.model_builder().build(self.store.ids());
        let bean_id = model.id().to_string();
        self.store.add(model)?;
        self.gc.on_bean_created(&bean_id, bean_type, root)?;
        debug!(bean_id = %bean_id, bean_type, root, "bean created");
        Ok(bean_id)
    }

    /// Removes a bean immediately.
    ///
    /// Beans it referenced become garbage once nothing else references them.
    pub fn remove(&mut self, bean_id: &str) -> ServerResult<()> {
        self.gc.on_bean_removed(bean_id)?;
        self.store.remove(bean_id)?;
        debug!(bean_id, "bean removed");
        Ok(())
    }

    /// Returns true if the bean is managed by this session.
    pub fn is_managed(&self, bean_id: &str) -> bool {
        self.gc.is_managed(bean_id)
    }

    /// Returns the ids of all beans of a type.
    pub fn find_all(&self, bean_type: &str) -> Vec<String> {
        self.store
            .models()
            .find_all_by_type(bean_type)
            .into_iter()
            .filter(|m| self.gc.is_managed(m.id()))
            .map(|m| m.id().to_string())
            .collect()
    }

    /// Reads a bean property.
    pub fn get(&self, bean_id: &str, property: &str) -> ServerResult<Value> {
        self.schema_of(bean_id)?.require(bean_id, property)?;
        let model = self
            .store
            .models()
            .find_by_id(bean_id)
            .ok_or_else(|| ModelError::model_not_found(bean_id))?;
        Ok(model.value(property).cloned().unwrap_or_default())
    }

    /// Writes a bean property.
    ///
    /// The value must match the property kind. Bean references must name
    /// managed beans of the declared type and must not close a cycle.
    pub fn set(&mut self, bean_id: &str, property: &str, value: impl Into<Value>) -> ServerResult<()> {
        let value = value.into();
        let kind = self.property_kind(bean_id, property)?;
        self.check_kind(property, &kind, &value)?;
        if kind.is_reference() {
            let old = self.get(bean_id, property)?;
            self.relink(bean_id, &old, &value)?;
        }
        self.store.set_property(bean_id, property, value)?;
        Ok(())
    }

    /// Reads a list property.
    pub fn list(&self, bean_id: &str, property: &str) -> ServerResult<Vec<Value>> {
        match self.get(bean_id, property)? {
            Value::List(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => Err(ModelError::type_mismatch(property, "list", other.type_name()).into()),
        }
    }

    /// Appends an element to a list property.
    pub fn list_add(&mut self, bean_id: &str, property: &str, item: impl Into<Value>) -> ServerResult<()> {
        let mut items = self.list(bean_id, property)?;
        items.push(item.into());
        self.set(bean_id, property, Value::List(items))
    }

    /// Removes and returns the element at `index` of a list property.
    pub fn list_remove(&mut self, bean_id: &str, property: &str, index: usize) -> ServerResult<Value> {
        let mut items = self.list(bean_id, property)?;
        if index >= items.len() {
            return Err(ServerError::Internal(format!(
                "index {index} out of bounds for '{property}' of length {}",
                items.len()
            )));
        }
        let removed = items.remove(index);
        self.set(bean_id, property, Value::List(items))?;
        Ok(removed)
    }

    /// Applies a model command sent by the client.
    ///
    /// Value changes of bean-typed properties update the reference graph
    /// before they are applied.
    pub fn apply_client_command(&mut self, command: &Command) -> ServerResult<()> {
        if let Command::ValueChanged {
            attribute_id,
            new_value,
            ..
        } = command
        {
            if let Some((bean_id, property, old)) = self.managed_attribute(attribute_id) {
                let kind = self.property_kind(&bean_id, &property)?;
                if kind.is_reference() {
                    self.check_kind(&property, &kind, new_value)?;
                    self.relink(&bean_id, &old, new_value)?;
                }
            }
        }
        if let Command::DeletePresentationModel { pm_id } = command {
            if self.gc.is_managed(pm_id) {
                self.gc.on_bean_removed(pm_id)?;
            }
        }
        self.store.apply_client_command(command)?;
        Ok(())
    }

    /// Runs one garbage collection pass and deletes the collected beans.
    pub fn gc(&mut self) -> ServerResult<Vec<String>> {
        let collected = self.gc.gc();
        for bean_id in &collected {
            self.store.remove(bean_id)?;
        }
        Ok(collected)
    }

    /// Installs the garbage collection veto.
    pub fn set_gc_veto(&mut self, veto: Option<VetoHandler>) {
        self.gc.set_veto(veto);
    }

    /// Returns garbage collector statistics.
    pub fn gc_stats(&self) -> GcStats {
        self.gc.stats()
    }

    /// Returns true if commands are waiting to be sent.
    pub fn has_response(&self) -> bool {
        self.store.has_response()
    }

    /// Takes the commands waiting to be sent.
    pub fn take_response(&mut self) -> Vec<Command> {
        self.store.take_response()
    }

    fn schema_of(&self, bean_id: &str) -> ServerResult<Arc<BeanSchema>> {
        if !self.gc.is_managed(bean_id) {
            return Err(ServerError::BeanNotManaged {
                id: bean_id.to_string(),
            });
        }
        let model = self
            .store
            .models()
            .find_by_id(bean_id)
            .ok_or_else(|| ModelError::model_not_found(bean_id))?;
        Ok(self.schemas.require(model.pm_type())?)
    }

    fn property_kind(&self, bean_id: &str, property: &str) -> ServerResult<PropertyKind> {
        let schema = self.schema_of(bean_id)?;
        Ok(schema.require(bean_id, property)?.kind.clone())
    }

    fn managed_attribute(&self, attribute_id: &str) -> Option<(String, String, Value)> {
        let attribute = self.store.models().find_attribute_by_id(attribute_id)?;
        if !self.gc.is_managed(attribute.model_id()) {
            return None;
        }
        Some((
            attribute.model_id().to_string(),
            attribute.property_name().to_string(),
            attribute.value().clone(),
        ))
    }

    fn check_kind(&self, property: &str, kind: &PropertyKind, value: &Value) -> ServerResult<()> {
        let mismatch = || ModelError::type_mismatch(property, kind.describe(), value.type_name());
        match kind {
            PropertyKind::Value => {
                if value.as_list().is_some() {
                    return Err(mismatch().into());
                }
            }
            PropertyKind::ValueList => {
                if !value.is_null() && value.as_list().is_none() {
                    return Err(mismatch().into());
                }
            }
            PropertyKind::Bean(bean_type) => {
                if !value.is_null() {
                    let target = value.as_text().ok_or_else(mismatch)?;
                    self.check_reference(property, bean_type, target)?;
                }
            }
            PropertyKind::BeanList(bean_type) => {
                if !value.is_null() {
                    let items = value.as_list().ok_or_else(mismatch)?;
                    for item in items {
                        let target = item.as_text().ok_or_else(mismatch)?;
                        self.check_reference(property, bean_type, target)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn check_reference(&self, property: &str, bean_type: &str, target: &str) -> ServerResult<()> {
        if !self.gc.is_managed(target) {
            return Err(ServerError::BeanNotManaged {
                id: target.to_string(),
            });
        }
        let actual = self
            .store
            .models()
            .find_by_id(target)
            .map(|m| m.pm_type().to_string())
            .unwrap_or_default();
        if actual != bean_type {
            return Err(ModelError::type_mismatch(property, bean_type, actual).into());
        }
        Ok(())
    }

    /// Moves the outgoing edges of `bean_id` from the targets in `old` to
    /// the targets in `new`. New edges are added first so a rejected cycle
    /// leaves the graph unchanged.
    fn relink(&mut self, bean_id: &str, old: &Value, new: &Value) -> ServerResult<()> {
        let old_targets = reference_targets(old);
        let new_targets = reference_targets(new);

        for (added, target) in new_targets.iter().enumerate() {
            if let Err(err) = self.gc.add_reference(bean_id, target) {
                for undo in &new_targets[..added] {
                    self.gc.remove_reference(bean_id, undo)?;
                }
                return Err(err);
            }
        }
        for target in &old_targets {
            if self.gc.is_managed(target) {
                self.gc.remove_reference(bean_id, target)?;
            }
        }
        trace!(bean_id, old = old_targets.len(), new = new_targets.len(), "references updated");
        Ok(())
    }
}

fn reference_targets(value: &Value) -> Vec<String> {
    match value {
        Value::Text(id) => vec![id.clone()],
        Value::List(items) => items
            .iter()
            .filter_map(Value::as_text)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schemas() -> Arc<SchemaRegistry> {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                BeanSchema::new("Board")
                    .with_value("title")
                    .with_bean("pinned", "Card")
                    .with_bean_list("cards", "Card")
                    .with_list("tags"),
            )
            .unwrap();
        registry
            .register(
                BeanSchema::new("Card")
                    .with_value("text")
                    .with_bean("next", "Card"),
            )
            .unwrap();
        Arc::new(registry)
    }

    #[test]
    fn create_set_get() {
        let mut beans = BeanManager::with_schemas(schemas());
        let board = beans.create_root("Board").unwrap();
        beans.set(&board, "title", "Sprint").unwrap();

        assert_eq!(beans.get(&board, "title").unwrap(), Value::from("Sprint"));
        assert_eq!(beans.list(&board, "cards").unwrap(), Vec::<Value>::new());
        assert_eq!(beans.find_all("Board"), vec![board.clone()]);
        assert!(matches!(
            beans.get(&board, "missing"),
            Err(ServerError::Model(ModelError::PropertyNotFound { .. }))
        ));

        let response = beans.take_response();
        assert!(matches!(response[0], Command::CreatePresentationModel { .. }));
        assert!(matches!(response[1], Command::ValueChanged { .. }));
    }

    #[test]
    fn kinds_are_checked() {
        let mut beans = BeanManager::with_schemas(schemas());
        let board = beans.create_root("Board").unwrap();
        let other = beans.create_root("Board").unwrap();

        assert!(beans.set(&board, "title", Value::List(vec![])).is_err());
        assert!(beans.set(&board, "tags", 3i64).is_err());
        assert!(beans.set(&board, "pinned", 3i64).is_err());
        // Wrong bean type.
        assert!(beans.set(&board, "pinned", other.as_str()).is_err());
        assert!(matches!(
            beans.set(&board, "pinned", "nope"),
            Err(ServerError::BeanNotManaged { .. })
        ));
        beans
            .set(&board, "tags", Value::List(vec![Value::from("a")]))
            .unwrap();
    }

    #[test]
    fn references_drive_collection() {
        let mut beans = BeanManager::with_schemas(schemas());
        let board = beans.create_root("Board").unwrap();
        let first = beans.create("Card").unwrap();
        let second = beans.create("Card").unwrap();

        beans.set(&board, "pinned", first.as_str()).unwrap();
        beans.set(&first, "next", second.as_str()).unwrap();
        assert!(beans.gc().unwrap().is_empty());

        beans.set(&board, "pinned", Value::Null).unwrap();
        beans.take_response();
        let collected = beans.gc().unwrap();
        assert_eq!(collected, vec![first.clone(), second.clone()]);
        assert!(!beans.store().models().contains(&first));
        assert_eq!(
            beans.take_response(),
            vec![
                Command::delete_presentation_model(&first),
                Command::delete_presentation_model(&second),
            ]
        );
    }

    #[test]
    fn list_elements_are_references() {
        let mut beans = BeanManager::with_schemas(schemas());
        let board = beans.create_root("Board").unwrap();
        let card = beans.create("Card").unwrap();

        beans.list_add(&board, "cards", card.as_str()).unwrap();
        assert!(beans.gc().unwrap().is_empty());

        assert_eq!(
            beans.list_remove(&board, "cards", 0).unwrap(),
            Value::from(card.as_str())
        );
        assert!(beans.list_remove(&board, "cards", 0).is_err());
        assert_eq!(beans.gc().unwrap(), vec![card]);
    }

    #[test]
    fn cycle_leaves_state_unchanged() {
        let mut beans = BeanManager::with_schemas(schemas());
        let first = beans.create_root("Card").unwrap();
        let second = beans.create("Card").unwrap();
        beans.set(&first, "next", second.as_str()).unwrap();

        assert!(matches!(
            beans.set(&second, "next", first.as_str()),
            Err(ServerError::CircularDependency { .. })
        ));
        assert_eq!(beans.get(&second, "next").unwrap(), Value::Null);
    }

    #[test]
    fn client_reference_changes_update_graph() {
        let mut beans = BeanManager::with_schemas(schemas());
        let board = beans.create_root("Board").unwrap();
        let card = beans.create("Card").unwrap();
        beans.set(&board, "pinned", card.as_str()).unwrap();

        let attribute_id = beans
            .store()
            .models()
            .attribute_id_of(&board, "pinned")
            .unwrap();
        beans
            .apply_client_command(&Command::value_changed(
                attribute_id,
                card.as_str(),
                Value::Null,
            ))
            .unwrap();
        assert_eq!(beans.gc().unwrap(), vec![card]);
    }
}
