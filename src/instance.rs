//! Model instances and their relation cache
//!
//! An instance owns its data (a JSON object) and an explicit relation cache
//! holding eager-loaded relation payloads. The cache is filled once, when the
//! instance is built from a remote payload, and is never written by relation
//! accessors.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::call::{CallHandle, CallResult};
use crate::error::{CallError, Result, TetherError};
use crate::proxy::{RemoteMethod, Target};
use crate::registry::{Model, ModelDef, Registry};
use crate::relation::RelationScope;

/// Eager-loaded payload for one relation
#[derive(Debug, Clone, PartialEq)]
pub enum CachedRelation {
    /// Singular relation payload (never JSON null)
    One(Value),

    /// Plural relation payloads in the order they were received
    Many(Vec<Value>),
}

impl CachedRelation {
    /// JSON form, as it appeared in the payload
    pub fn to_value(&self) -> Value {
        match self {
            CachedRelation::One(value) => value.clone(),
            CachedRelation::Many(values) => Value::Array(values.clone()),
        }
    }
}

/// Per-instance relation cache, keyed by relation name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationCache {
    entries: BTreeMap<String, CachedRelation>,
}

impl RelationCache {
    pub fn get(&self, relation: &str) -> Option<&CachedRelation> {
        self.entries.get(relation)
    }

    pub fn contains(&self, relation: &str) -> bool {
        self.entries.contains_key(relation)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CachedRelation)> {
        self.entries.iter()
    }

    fn insert(&mut self, relation: String, entry: CachedRelation) {
        self.entries.insert(relation, entry);
    }

    fn remove(&mut self, relation: &str) -> Option<CachedRelation> {
        self.entries.remove(relation)
    }
}

/// A local instance of a remote model
#[derive(Clone)]
pub struct Instance {
    registry: Registry,
    model: Arc<ModelDef>,
    data: Map<String, Value>,
    relations: RelationCache,
}

impl Instance {
    /// Empty instance with an empty relation cache
    pub(crate) fn new(registry: Registry, model: Arc<ModelDef>) -> Self {
        Self {
            registry,
            model,
            data: Map::new(),
            relations: RelationCache::default(),
        }
    }

    /// Build an instance from a raw payload
    ///
    /// Top-level keys naming a declared relation are moved out of the data and
    /// into the relation cache. A key whose value is null is dropped and gets
    /// no cache entry.
    pub(crate) fn from_payload(
        registry: &Registry,
        model: Arc<ModelDef>,
        payload: Value,
    ) -> std::result::Result<Self, CallError> {
        let mut data = match payload {
            Value::Object(data) => data,
            other => {
                return Err(CallError::Materialize {
                    model: model.name().to_string(),
                    reason: format!("expected an object, got {}", other),
                })
            }
        };

        let mut relations = RelationCache::default();
        for accessor in model.relations().iter() {
            let name = accessor.name();

            // A null relation field carries no embedded data
            let Some(payload) = data.remove(name).filter(|payload| !payload.is_null()) else {
                continue;
            };

            let entry = if accessor.descriptor().is_plural() {
                match payload {
                    Value::Array(items) => CachedRelation::Many(items),
                    other => {
                        return Err(CallError::Materialize {
                            model: model.name().to_string(),
                            reason: format!(
                                "relation {} expects an array of {}, got {}",
                                name,
                                accessor.descriptor().target,
                                other
                            ),
                        })
                    }
                }
            } else {
                CachedRelation::One(payload)
            };

            relations.insert(name.to_string(), entry);
        }

        Ok(Self {
            registry: registry.clone(),
            model,
            data,
            relations,
        })
    }

    /// Copy every cached relation payload into the data field of the same name
    pub(crate) fn fold_cached_relations(&mut self) {
        for (name, entry) in self.relations.iter() {
            self.data.insert(name.clone(), entry.to_value());
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Facade over this instance's model
    pub fn model(&self) -> Model {
        Model::new(self.registry.clone(), self.model.clone())
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.data.insert(field.into(), value);
    }

    /// Current identity value, if the model has an identity property and it is set
    pub fn id(&self) -> Option<&Value> {
        self.model
            .id_property()
            .and_then(|property| self.data.get(property))
            .filter(|id| !id.is_null())
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.data.clone())
    }

    pub fn relation_cache(&self) -> &RelationCache {
        &self.relations
    }

    pub fn cached_relation(&self, relation: &str) -> Option<&CachedRelation> {
        self.relations.get(relation)
    }

    /// Drop the cached payload for `relation`, forcing the next read to go remote
    pub fn invalidate_relation(&mut self, relation: &str) -> Option<CachedRelation> {
        self.relations.remove(relation)
    }

    /// Read a relation property
    ///
    /// A new scope is built on every read; all scopes of one instance share
    /// the same cache.
    pub fn relation(&self, name: &str) -> Result<RelationScope<'_>> {
        let accessor =
            self.model
                .relations()
                .get(name)
                .ok_or_else(|| TetherError::UnknownRelation {
                    model: self.model.name().to_string(),
                    relation: name.to_string(),
                })?;

        Ok(RelationScope::new(self, accessor))
    }

    /// Call an instance method by canonical name or alias
    pub fn call(&self, name: &str, args: Vec<Value>) -> Result<CallHandle> {
        if let Some(method) = self.model.prototype().get(name) {
            return self.invoke_method(method, args);
        }

        self.model.call_local(name, &args)
    }

    /// Call an instance method and register `callback` as a completion listener
    pub fn call_with<F>(&self, name: &str, args: Vec<Value>, callback: F) -> Result<CallHandle>
    where
        F: FnOnce(CallResult) + Send + 'static,
    {
        let handle = self.call(name, args)?;
        handle.on_complete(callback);
        Ok(handle)
    }

    /// Invoke `method` against this instance, reading the identity now
    pub(crate) fn invoke_method(&self, method: &RemoteMethod, args: Vec<Value>) -> Result<CallHandle> {
        let id = self.id().cloned().ok_or_else(|| TetherError::MissingIdentity {
            model: self.model.name().to_string(),
            property: self.model.id_property().unwrap_or("id").to_string(),
        })?;

        Ok(method.invoke(&self.registry, Target::Instance(id), args))
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("model", &self.model.name())
            .field("data", &self.data)
            .field("relations", &self.relations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ModelDescriptor, RelationDeclaration};
    use crate::registry::tests::registry_with;
    use serde_json::json;

    fn blog() -> Registry {
        registry_with(vec![
            ModelDescriptor::persisted("User")
                .with_relation(RelationDeclaration::new("posts", "hasMany", "Post"))
                .with_relation(RelationDeclaration::new("profile", "hasOne", "Profile")),
            ModelDescriptor::persisted("Post"),
            ModelDescriptor::persisted("Profile"),
        ])
    }

    #[test]
    fn test_payload_relations_move_into_cache() {
        let registry = blog();
        let user = registry.model("User").unwrap();
        let def = user.def().clone();

        let instance = Instance::from_payload(
            &registry,
            def,
            json!({ "id": 1, "name": "ada", "posts": [{"id": 10}, {"id": 11}], "profile": {"bio": "x"} }),
        )
        .unwrap();

        assert!(instance.get("posts").is_none());
        assert_eq!(
            instance.cached_relation("posts"),
            Some(&CachedRelation::Many(vec![json!({"id": 10}), json!({"id": 11})]))
        );
        assert_eq!(
            instance.cached_relation("profile"),
            Some(&CachedRelation::One(json!({"bio": "x"})))
        );
        assert_eq!(instance.get("name"), Some(&json!("ada")));
    }

    #[test]
    fn test_fold_restores_fields() {
        let registry = blog();
        let def = registry.model("User").unwrap().def().clone();

        let mut instance =
            Instance::from_payload(&registry, def, json!({ "id": 1, "posts": [{"id": 10}] })).unwrap();
        instance.fold_cached_relations();

        assert_eq!(instance.get("posts"), Some(&json!([{"id": 10}])));
        assert!(instance.relation_cache().contains("posts"));
    }

    #[test]
    fn test_null_relation_is_not_cached() {
        let registry = blog();
        let def = registry.model("User").unwrap().def().clone();

        let instance = Instance::from_payload(
            &registry,
            def,
            json!({ "id": 1, "posts": null, "profile": null }),
        )
        .unwrap();

        assert!(instance.relation_cache().is_empty());
        assert!(instance.get("posts").is_none());
        assert!(instance.get("profile").is_none());
    }

    #[test]
    fn test_plural_relation_requires_array() {
        let registry = blog();
        let def = registry.model("User").unwrap().def().clone();

        let err = Instance::from_payload(&registry, def, json!({ "id": 1, "posts": {"id": 10} }))
            .unwrap_err();
        assert!(matches!(err, CallError::Materialize { .. }));
    }

    #[test]
    fn test_non_object_payload_is_rejected() {
        let registry = blog();
        let def = registry.model("Post").unwrap().def().clone();

        let err = Instance::from_payload(&registry, def, json!([1, 2])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot materialize Post: expected an object, got [1,2]"
        );
    }

    #[test]
    fn test_identity_reads_current_value() {
        let registry = blog();
        let mut instance = registry.model("User").unwrap().new_instance();
        assert!(instance.id().is_none());

        instance.set("id", json!(5));
        assert_eq!(instance.id(), Some(&json!(5)));

        instance.set("id", Value::Null);
        assert!(instance.id().is_none());
    }

    #[test]
    fn test_invalidate_relation_removes_entry() {
        let registry = blog();
        let mut instance = registry
            .model("User")
            .unwrap()
            .build(json!({ "id": 1, "posts": [] }))
            .unwrap();

        assert_eq!(
            instance.invalidate_relation("posts"),
            Some(CachedRelation::Many(vec![]))
        );
        assert!(instance.cached_relation("posts").is_none());
        assert!(instance.invalidate_relation("posts").is_none());
    }

    #[test]
    fn test_unknown_relation() {
        let registry = blog();
        let instance = registry.model("Post").unwrap().new_instance();
        assert!(matches!(
            instance.relation("comments"),
            Err(TetherError::UnknownRelation { .. })
        ));
    }

    #[test]
    fn test_instance_call_without_identity_is_rejected() {
        let registry = blog();
        let instance = registry.model("User").unwrap().new_instance();

        let err = instance.call("updateAttributes", vec![json!({})]).unwrap_err();
        assert!(matches!(err, TetherError::MissingIdentity { ref property, .. } if property == "id"));
    }
}
