//! Type materializers: raw payload -> model instance
//!
//! One materializer is registered per model name when the registry is frozen.
//! Every typed remote result (`one` / `many`) is routed through it.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::call::{CallResult, CallValue};
use crate::descriptor::Returns;
use crate::error::CallError;
use crate::instance::Instance;
use crate::registry::{ModelDef, Registry};

/// Conversion function for one model
pub type Materializer =
    Arc<dyn Fn(&Registry, Value) -> std::result::Result<Instance, CallError> + Send + Sync>;

/// The materializer of a defined model
///
/// Builds the instance (which fills its relation cache) and then copies the
/// cached relation payloads back into the instance's fields.
pub fn model_materializer(model: Arc<ModelDef>) -> Materializer {
    Arc::new(move |registry: &Registry, payload: Value| {
        let mut instance = Instance::from_payload(registry, model.clone(), payload)?;
        instance.fold_cached_relations();
        Ok(instance)
    })
}

/// Materializers by model name
#[derive(Clone, Default)]
pub struct TypeRegistry {
    materializers: HashMap<String, Materializer>,
}

impl TypeRegistry {
    pub fn register(&mut self, model: impl Into<String>, materializer: Materializer) {
        self.materializers.insert(model.into(), materializer);
    }

    pub fn is_registered(&self, model: &str) -> bool {
        self.materializers.contains_key(model)
    }

    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.materializers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Convert one payload into an instance of `model`
    pub fn materialize(
        &self,
        registry: &Registry,
        model: &str,
        payload: Value,
    ) -> std::result::Result<Instance, CallError> {
        let materializer = self
            .materializers
            .get(model)
            .ok_or_else(|| CallError::Materialize {
                model: model.to_string(),
                reason: "no materializer registered".to_string(),
            })?;

        materializer(registry, payload)
    }

    /// Apply a method's result conversion to its raw payload
    pub fn convert(&self, registry: &Registry, returns: &Returns, raw: Value) -> CallResult {
        match (returns, raw) {
            (Returns::Raw, raw) => Ok(CallValue::from_json(raw)),
            (_, Value::Null) => Ok(CallValue::Null),
            (Returns::One(model), payload) => self
                .materialize(registry, model, payload)
                .map(CallValue::Instance),
            (Returns::Many(model), Value::Array(items)) => items
                .into_iter()
                .map(|payload| self.materialize(registry, model, payload))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(CallValue::Instances),
            (Returns::Many(model), other) => Err(CallError::Materialize {
                model: model.clone(),
                reason: format!("expected an array, got {}", other),
            }),
        }
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.type_names())
            .finish()
    }
}
