//! The per-session model store.

use crate::attribute::Attribute;
use crate::change_feed::{ChangeFeed, StoreChange, StoreEvent, ValueChange};
use crate::error::{ModelError, ModelResult};
use crate::id::IdGenerator;
use crate::presentation_model::PresentationModel;
use dolphin_protocol::Value;
use std::collections::{HashMap, HashSet};
use std::sync::mpsc::Receiver;
use tracing::trace;

/// Registry of presentation models for one session.
///
/// Indexes models by id and by type, and attributes by id and by qualifier.
/// The store is not synchronized itself; callers share it behind a mutex.
///
/// # Invariants
///
/// - Model ids and attribute ids are unique within a store.
/// - Every attribute with a qualifier is listed under that qualifier.
/// - Setting a value on a qualified attribute sets it on every attribute
///   sharing the qualifier.
#[derive(Debug)]
pub struct ModelStore {
    models: HashMap<String, PresentationModel>,
    /// Model ids in insertion order.
    order: Vec<String>,
    by_type: HashMap<String, Vec<String>>,
    /// Attribute id to owning model id.
    attributes: HashMap<String, String>,
    /// Qualifier to attribute ids.
    by_qualifier: HashMap<String, Vec<String>>,
    ids: IdGenerator,
    feed: ChangeFeed,
}

impl ModelStore {
    /// Creates an empty store minting ids from `ids`.
    pub fn new(ids: IdGenerator) -> Self {
        Self {
            models: HashMap::new(),
            order: Vec::new(),
            by_type: HashMap::new(),
            attributes: HashMap::new(),
            by_qualifier: HashMap::new(),
            ids,
            feed: ChangeFeed::new(),
        }
    }

    /// Creates a client-side store.
    pub fn client() -> Self {
        Self::new(IdGenerator::client())
    }

    /// Creates a server-side store.
    pub fn server() -> Self {
        Self::new(IdGenerator::server())
    }

    /// Returns the id generator of this store.
    pub fn ids(&self) -> &IdGenerator {
        &self.ids
    }

    /// Adds a model.
    ///
    /// Fails if the model id, or any of its attribute ids, already exists.
    pub fn add(&mut self, model: PresentationModel) -> ModelResult<()> {
        if self.models.contains_key(model.id()) {
            return Err(ModelError::DuplicateModel {
                id: model.id().to_string(),
            });
        }
        {
            let mut seen = HashSet::new();
            for attribute in model.attributes() {
                if self.attributes.contains_key(attribute.id()) || !seen.insert(attribute.id()) {
                    return Err(ModelError::DuplicateAttribute {
                        id: attribute.id().to_string(),
                    });
                }
            }
        }

        let model_id = model.id().to_string();
        let pm_type = model.pm_type().to_string();
        for attribute in model.attributes() {
            self.attributes
                .insert(attribute.id().to_string(), model_id.clone());
            if let Some(qualifier) = attribute.qualifier() {
                self.by_qualifier
                    .entry(qualifier.to_string())
                    .or_default()
                    .push(attribute.id().to_string());
            }
        }
        self.by_type
            .entry(pm_type.clone())
            .or_default()
            .push(model_id.clone());
        self.order.push(model_id.clone());
        self.models.insert(model_id.clone(), model);

        trace!(model_id = %model_id, pm_type = %pm_type, "model added");
        self.feed.emit(StoreChange::ModelAdded { model_id, pm_type });
        Ok(())
    }

    /// Removes a model and all of its attributes.
    pub fn remove(&mut self, model_id: &str) -> ModelResult<PresentationModel> {
        let model = self
            .models
            .remove(model_id)
            .ok_or_else(|| ModelError::model_not_found(model_id))?;

        for attribute in model.attributes() {
            self.attributes.remove(attribute.id());
            if let Some(qualifier) = attribute.qualifier() {
                self.unindex_qualifier(qualifier, attribute.id());
            }
        }
        if let Some(ids) = self.by_type.get_mut(model.pm_type()) {
            ids.retain(|id| id != model_id);
            if ids.is_empty() {
                self.by_type.remove(model.pm_type());
            }
        }
        self.order.retain(|id| id != model_id);

        trace!(model_id = %model_id, "model removed");
        self.feed.emit(StoreChange::ModelRemoved {
            model_id: model_id.to_string(),
            pm_type: model.pm_type().to_string(),
        });
        Ok(model)
    }

    /// Returns true if a model with this id exists.
    pub fn contains(&self, model_id: &str) -> bool {
        self.models.contains_key(model_id)
    }

    /// Looks up a model by id.
    pub fn find_by_id(&self, model_id: &str) -> Option<&PresentationModel> {
        self.models.get(model_id)
    }

    /// Returns all models of a type, in insertion order.
    pub fn find_all_by_type(&self, pm_type: &str) -> Vec<&PresentationModel> {
        self.by_type
            .get(pm_type)
            .map(|ids| ids.iter().filter_map(|id| self.models.get(id)).collect())
            .unwrap_or_default()
    }

    /// Looks up an attribute by id.
    pub fn find_attribute_by_id(&self, attribute_id: &str) -> Option<&Attribute> {
        let model_id = self.attributes.get(attribute_id)?;
        self.models
            .get(model_id)?
            .attributes()
            .iter()
            .find(|a| a.id() == attribute_id)
    }

    /// Returns all attributes sharing a qualifier.
    pub fn find_all_attributes_by_qualifier(&self, qualifier: &str) -> Vec<&Attribute> {
        self.by_qualifier
            .get(qualifier)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.find_attribute_by_id(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns all model ids in insertion order.
    pub fn model_ids(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Returns the number of models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Returns true if the store holds no models.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Sets an attribute value and fans it out to its qualifier peers.
    ///
    /// Returns the changes actually performed, the addressed attribute first.
    /// Attributes that already hold the value are not reported.
    pub fn set_value(&mut self, attribute_id: &str, value: Value) -> ModelResult<Vec<ValueChange>> {
        let qualifier = self
            .find_attribute_by_id(attribute_id)
            .ok_or_else(|| ModelError::attribute_not_found(attribute_id))?
            .qualifier()
            .map(str::to_string);

        let mut targets = vec![attribute_id.to_string()];
        if let Some(qualifier) = qualifier {
            if let Some(peers) = self.by_qualifier.get(&qualifier) {
                targets.extend(peers.iter().filter(|id| *id != attribute_id).cloned());
            }
        }

        let mut changes = Vec::new();
        for target in targets {
            if let Some(change) = self.replace_value(&target, value.clone()) {
                changes.push(change);
            }
        }
        for change in &changes {
            trace!(
                attribute_id = %change.attribute_id,
                old = %change.old_value,
                new = %change.new_value,
                "value changed"
            );
            self.feed.emit(StoreChange::ValueChanged(change.clone()));
        }
        Ok(changes)
    }

    /// Sets the value of a property of a model.
    pub fn set_property(
        &mut self,
        model_id: &str,
        property: &str,
        value: Value,
    ) -> ModelResult<Vec<ValueChange>> {
        let attribute_id = self.attribute_id_of(model_id, property)?;
        self.set_value(&attribute_id, value)
    }

    /// Returns the attribute id of a model property.
    pub fn attribute_id_of(&self, model_id: &str, property: &str) -> ModelResult<String> {
        let model = self
            .find_by_id(model_id)
            .ok_or_else(|| ModelError::model_not_found(model_id))?;
        model
            .attribute(property)
            .map(|a| a.id().to_string())
            .ok_or_else(|| ModelError::PropertyNotFound {
                model_id: model_id.to_string(),
                property: property.to_string(),
            })
    }

    /// Changes the qualifier of an attribute and re-indexes it.
    pub fn set_qualifier(&mut self, attribute_id: &str, qualifier: Option<String>) -> ModelResult<()> {
        let model_id = self
            .attributes
            .get(attribute_id)
            .cloned()
            .ok_or_else(|| ModelError::attribute_not_found(attribute_id))?;
        let attribute = self
            .models
            .get_mut(&model_id)
            .and_then(|m| m.attribute_by_id_mut(attribute_id))
            .ok_or_else(|| ModelError::attribute_not_found(attribute_id))?;

        let previous = attribute.qualifier().map(str::to_string);
        if previous == qualifier {
            return Ok(());
        }
        attribute.set_qualifier(qualifier.clone());

        if let Some(previous) = previous {
            self.unindex_qualifier(&previous, attribute_id);
        }
        if let Some(qualifier) = qualifier {
            self.by_qualifier
                .entry(qualifier)
                .or_default()
                .push(attribute_id.to_string());
        }
        Ok(())
    }

    /// Subscribes to the change feed of this store.
    pub fn subscribe(&self) -> Receiver<StoreEvent> {
        self.feed.subscribe()
    }

    fn replace_value(&mut self, attribute_id: &str, value: Value) -> Option<ValueChange> {
        let model_id = self.attributes.get(attribute_id)?;
        let attribute = self
            .models
            .get_mut(model_id)?
            .attribute_by_id_mut(attribute_id)?;
        if attribute.value() == &value {
            return None;
        }
        let old_value = attribute.replace_value(value.clone());
        Some(ValueChange {
            attribute_id: attribute_id.to_string(),
            model_id: model_id.clone(),
            old_value,
            new_value: value,
        })
    }

    fn unindex_qualifier(&mut self, qualifier: &str, attribute_id: &str) {
        if let Some(ids) = self.by_qualifier.get_mut(qualifier) {
            ids.retain(|id| id != attribute_id);
            if ids.is_empty() {
                self.by_qualifier.remove(qualifier);
            }
        }
    }
}

impl Default for ModelStore {
    fn default() -> Self {
        Self::client()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presentation_model::PresentationModelBuilder;

    fn person(store: &ModelStore, id: &str, name: &str) -> PresentationModel {
        PresentationModelBuilder::new("Person")
            .with_id(id)
            .with_qualified_value("name", name, "person.name")
            .with_value("age", 30i64)
            .build(store.ids())
    }

    #[test]
    fn add_and_find() {
        let mut store = ModelStore::server();
        let model = person(&store, "p1", "Ada");
        store.add(model.clone()).unwrap();

        assert!(store.contains("p1"));
        assert_eq!(store.find_by_id("p1"), Some(&model));
        assert_eq!(store.find_all_by_type("Person").len(), 1);
        assert!(store.find_all_by_type("Dog").is_empty());

        let name_id = model.attribute("name").unwrap().id();
        assert_eq!(
            store.find_attribute_by_id(name_id).unwrap().value(),
            &Value::from("Ada")
        );
    }

    #[test]
    fn duplicate_model_fails() {
        let mut store = ModelStore::server();
        store.add(person(&store, "p1", "Ada")).unwrap();
        let err = store.add(person(&store, "p1", "Bob")).unwrap_err();
        assert_eq!(err, ModelError::DuplicateModel { id: "p1".into() });
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn duplicate_attribute_fails() {
        let mut store = ModelStore::client();
        let first = person(&store, "p1", "Ada");
        store.add(first.clone()).unwrap();

        let clash = PresentationModel::from_dto(
            "p2",
            "Person",
            vec![first.attributes()[0].to_dto()],
        );
        assert!(matches!(
            store.add(clash),
            Err(ModelError::DuplicateAttribute { .. })
        ));
        assert!(!store.contains("p2"));
    }

    #[test]
    fn remove_cleans_indices() {
        let mut store = ModelStore::server();
        store.add(person(&store, "p1", "Ada")).unwrap();
        let removed = store.remove("p1").unwrap();

        assert!(store.is_empty());
        assert!(store.find_all_by_type("Person").is_empty());
        assert!(store.find_all_attributes_by_qualifier("person.name").is_empty());
        assert!(store
            .find_attribute_by_id(removed.attributes()[0].id())
            .is_none());
        assert_eq!(
            store.remove("p1").unwrap_err(),
            ModelError::model_not_found("p1")
        );
    }

    #[test]
    fn qualifier_fan_out() {
        let mut store = ModelStore::server();
        store.add(person(&store, "p1", "Ada")).unwrap();
        store.add(person(&store, "p2", "Ada")).unwrap();
        store.add(person(&store, "p3", "Bob")).unwrap();

        let changes = store
            .set_property("p1", "name", Value::from("Grace"))
            .unwrap();

        // p2 and p3 follow; p1 is reported first
        assert_eq!(changes.len(), 3);
        assert_eq!(changes[0].model_id, "p1");
        assert_eq!(changes[2].old_value, Value::from("Bob"));
        for attribute in store.find_all_attributes_by_qualifier("person.name") {
            assert_eq!(attribute.value(), &Value::from("Grace"));
        }
    }

    #[test]
    fn subscribers_see_every_qualified_change() {
        let mut store = ModelStore::client();
        store.add(person(&store, "p1", "Ada")).unwrap();
        store.add(person(&store, "p2", "Ada")).unwrap();
        store.add(person(&store, "p3", "Ada")).unwrap();
        let events = store.subscribe();

        store.set_property("p2", "name", Value::from("Grace")).unwrap();

        let changes: Vec<ValueChange> = events
            .try_iter()
            .map(|event| match event.change {
                StoreChange::ValueChanged(change) => change,
                other => panic!("unexpected change {other:?}"),
            })
            .collect();
        let models: Vec<&str> = changes.iter().map(|c| c.model_id.as_str()).collect();
        assert_eq!(models, ["p2", "p1", "p3"]);
        for change in &changes {
            assert_eq!(change.old_value, Value::from("Ada"));
            assert_eq!(change.new_value, Value::from("Grace"));
        }

        // Peers already holding the value produce no further events.
        store.set_property("p3", "name", Value::from("Grace")).unwrap();
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn unchanged_values_are_not_reported() {
        let mut store = ModelStore::server();
        store.add(person(&store, "p1", "Ada")).unwrap();
        store.add(person(&store, "p2", "Bob")).unwrap();

        let changes = store.set_property("p1", "name", Value::from("Bob")).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].model_id, "p1");
        assert!(store.set_property("p1", "age", Value::from(30i64)).unwrap().is_empty());
    }

    #[test]
    fn set_qualifier_reindexes() {
        let mut store = ModelStore::server();
        store.add(person(&store, "p1", "Ada")).unwrap();
        let age_id = store.attribute_id_of("p1", "age").unwrap();

        store
            .set_qualifier(&age_id, Some("person.name".into()))
            .unwrap();
        assert_eq!(store.find_all_attributes_by_qualifier("person.name").len(), 2);

        store.set_qualifier(&age_id, None).unwrap();
        assert_eq!(store.find_all_attributes_by_qualifier("person.name").len(), 1);
        assert!(store.set_qualifier("nope", None).is_err());
    }

    #[test]
    fn missing_lookups() {
        let mut store = ModelStore::client();
        assert!(store.set_value("42C", Value::Null).is_err());
        assert!(matches!(
            store.attribute_id_of("p1", "name"),
            Err(ModelError::ModelNotFound { .. })
        ));
        store.add(person(&store, "p1", "Ada")).unwrap();
        assert!(matches!(
            store.attribute_id_of("p1", "nickname"),
            Err(ModelError::PropertyNotFound { .. })
        ));
    }

    #[test]
    fn change_feed_follows_mutations() {
        let mut store = ModelStore::server();
        let events = store.subscribe();

        store.add(person(&store, "p1", "Ada")).unwrap();
        store.set_property("p1", "age", Value::from(31i64)).unwrap();
        store.remove("p1").unwrap();

        let changes: Vec<StoreChange> = events.try_iter().map(|e| e.change).collect();
        assert_eq!(changes.len(), 3);
        assert!(matches!(changes[0], StoreChange::ModelAdded { .. }));
        assert!(matches!(
            &changes[1],
            StoreChange::ValueChanged(ValueChange { new_value: Value::Integer(31), .. })
        ));
        assert!(matches!(changes[2], StoreChange::ModelRemoved { .. }));
    }

    #[test]
    fn model_ids_keep_insertion_order() {
        let mut store = ModelStore::server();
        for id in ["c", "a", "b"] {
            store.add(person(&store, id, "x")).unwrap();
        }
        store.remove("a").unwrap();
        assert_eq!(store.model_ids(), vec!["c".to_string(), "b".to_string()]);
    }
}
