//! Model registry
//!
//! Models are defined one at a time into [`ModelDef`] records holding their
//! frozen method and relation tables. Freezing a set of definitions yields a
//! [`Registry`]: a cheap-clone handle shared by every model facade, instance
//! and in-flight call. Nothing in a registry changes after it is frozen.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tether_core_interface::Invoker;
use tracing::{debug, info};

use crate::call::{CallHandle, CallResult};
use crate::descriptor::{LocalMethod, ModelDescriptor, Returns};
use crate::error::{CallError, Result, TetherError};
use crate::instance::Instance;
use crate::materializer::{model_materializer, TypeRegistry};
use crate::proxy::{self, MethodTable, RemoteMethod, Scopes, Target};
use crate::relation::{self, RelationTable};

/// A defined model: its frozen method and relation tables
#[derive(Debug)]
pub struct ModelDef {
    name: String,
    id_property: Option<String>,
    statics: MethodTable,
    prototype: MethodTable,
    relations: RelationTable,
    local_methods: BTreeMap<String, LocalMethod>,
    excluded: Vec<String>,
}

impl ModelDef {
    /// Build the tables for `descriptor`
    ///
    /// Proxies are generated first, so relation operations supplied by the
    /// descriptor are reused by the relation builder.
    pub(crate) fn define(descriptor: ModelDescriptor, excluded: &[String]) -> Result<Self> {
        let methods = descriptor
            .resolved_methods()
            .ok_or_else(|| TetherError::MissingMethodSurface {
                model: descriptor.name.clone(),
            })?;

        let mut statics = MethodTable::default();
        let mut prototype = MethodTable::default();
        let mut scopes = Scopes {
            model: &descriptor.name,
            id_property: descriptor.id_property.as_deref(),
            statics: &mut statics,
            prototype: &mut prototype,
        };

        for method in &methods {
            proxy::generate(&mut scopes, method, excluded)?;
        }

        let mut relations = RelationTable::default();
        for declaration in &descriptor.relations {
            let accessor = relation::build(
                &descriptor.name,
                descriptor.id_property.as_deref(),
                declaration,
                &mut prototype,
            )?;
            relations.push(&descriptor.name, accessor)?;
        }

        info!(
            "Defined model {} ({} static, {} instance methods, {} relations)",
            descriptor.name,
            statics.len(),
            prototype.len(),
            relations.len()
        );

        Ok(Self {
            name: descriptor.name,
            id_property: descriptor.id_property,
            statics,
            prototype,
            relations,
            local_methods: descriptor.local_methods,
            excluded: excluded.to_vec(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id_property(&self) -> Option<&str> {
        self.id_property.as_deref()
    }

    pub fn statics(&self) -> &MethodTable {
        &self.statics
    }

    pub fn prototype(&self) -> &MethodTable {
        &self.prototype
    }

    pub fn relations(&self) -> &RelationTable {
        &self.relations
    }

    /// Dispatch a name with no remote proxy to its local implementation
    pub(crate) fn call_local(&self, name: &str, args: &[Value]) -> Result<CallHandle> {
        if let Some(local) = self.local_methods.get(name) {
            debug!("Calling local method {}.{}", self.name, name);
            return Ok(CallHandle::ready(local.call(args)));
        }

        if self.excluded.iter().any(|excluded| excluded == name) {
            return Err(TetherError::LocalOnly {
                model: self.name.clone(),
                method: name.to_string(),
            });
        }

        Err(TetherError::UnknownMethod {
            model: self.name.clone(),
            method: name.to_string(),
        })
    }

    /// Model names this definition refers to
    fn references(&self) -> impl Iterator<Item = &str> {
        let returns = self
            .statics
            .methods()
            .chain(self.prototype.methods())
            .filter_map(|method| method.returns().model());
        let targets = self
            .relations
            .iter()
            .map(|accessor| accessor.descriptor().target.as_str());

        returns.chain(targets)
    }
}

struct RegistryInner {
    invoker: Arc<dyn Invoker>,
    models: HashMap<String, Arc<ModelDef>>,
    types: TypeRegistry,
}

/// Frozen set of defined models bound to one invoker
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    /// Validate cross-model references and register one materializer per model
    pub(crate) fn freeze(invoker: Arc<dyn Invoker>, defs: Vec<ModelDef>) -> Result<Self> {
        let mut models = HashMap::with_capacity(defs.len());
        for def in defs {
            let name = def.name.clone();
            if models.insert(name.clone(), Arc::new(def)).is_some() {
                return Err(TetherError::Config(format!("Model {} is defined twice", name)));
            }
        }

        for def in models.values() {
            if let Some(missing) = def.references().find(|name| !models.contains_key(*name)) {
                return Err(TetherError::UnknownModel(missing.to_string()));
            }
        }

        let mut types = TypeRegistry::default();
        for (name, def) in &models {
            types.register(name.clone(), model_materializer(def.clone()));
        }

        Ok(Self {
            inner: Arc::new(RegistryInner {
                invoker,
                models,
                types,
            }),
        })
    }

    /// Facade over the named model
    pub fn model(&self, name: &str) -> Result<Model> {
        let def = self
            .inner
            .models
            .get(name)
            .ok_or_else(|| TetherError::UnknownModel(name.to_string()))?;

        Ok(Model::new(self.clone(), def.clone()))
    }

    /// Defined model names, sorted
    pub fn model_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.inner.models.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn invoker(&self) -> Arc<dyn Invoker> {
        self.inner.invoker.clone()
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.inner.types
    }

    pub(crate) fn materialize(
        &self,
        model: &str,
        payload: Value,
    ) -> std::result::Result<Instance, CallError> {
        self.inner.types.materialize(self, model, payload)
    }

    pub(crate) fn convert(&self, returns: &Returns, raw: Value) -> CallResult {
        self.inner.types.convert(self, returns, raw)
    }

    /// Resolves on the scheduler tick after initialization
    pub async fn ready(&self) {
        tokio::task::yield_now().await;
        info!(
            "Registry ready: {} models via {}",
            self.inner.models.len(),
            self.inner.invoker.name()
        );
    }

    /// Run `callback` once the registry is ready
    pub fn on_ready<F>(&self, callback: F)
    where
        F: FnOnce(Registry) + Send + 'static,
    {
        let registry = self.clone();
        tokio::spawn(async move {
            registry.ready().await;
            callback(registry);
        });
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("invoker", &self.inner.invoker.name())
            .field("models", &self.model_names())
            .finish()
    }
}

/// Facade over one defined model
#[derive(Debug, Clone)]
pub struct Model {
    registry: Registry,
    def: Arc<ModelDef>,
}

impl Model {
    pub(crate) fn new(registry: Registry, def: Arc<ModelDef>) -> Self {
        Self { registry, def }
    }

    pub fn name(&self) -> &str {
        self.def.name()
    }

    pub fn def(&self) -> &Arc<ModelDef> {
        &self.def
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Call a static method by canonical name or alias
    pub fn call(&self, name: &str, args: Vec<Value>) -> Result<CallHandle> {
        match self.def.statics().get(name) {
            Some(method) => Ok(method.invoke(&self.registry, Target::Static, args)),
            None => self.def.call_local(name, &args),
        }
    }

    /// Call a static method and register `callback` as a completion listener
    pub fn call_with<F>(&self, name: &str, args: Vec<Value>, callback: F) -> Result<CallHandle>
    where
        F: FnOnce(CallResult) + Send + 'static,
    {
        let handle = self.call(name, args)?;
        handle.on_complete(callback);
        Ok(handle)
    }

    /// The static proxy installed under `name`
    pub fn method(&self, name: &str) -> Option<Arc<RemoteMethod>> {
        self.def.statics().get(name).cloned()
    }

    /// The instance proxy installed under `name`
    pub fn instance_method(&self, name: &str) -> Option<Arc<RemoteMethod>> {
        self.def.prototype().get(name).cloned()
    }

    pub fn method_names(&self) -> Vec<&str> {
        self.def.statics().names()
    }

    pub fn relation_names(&self) -> Vec<&str> {
        self.def.relations().names()
    }

    /// Materialize `payload` as an instance of this model
    pub fn build(&self, payload: Value) -> std::result::Result<Instance, CallError> {
        self.registry.materialize(self.name(), payload)
    }

    /// Empty instance with an empty relation cache
    pub fn new_instance(&self) -> Instance {
        Instance::new(self.registry.clone(), self.def.clone())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::ConnectorConfig;
    use crate::descriptor::{MethodDescriptor, RelationDeclaration};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tether_core_interface::mock::MockInvoker;
    use tether_core_interface::RemoteError;

    /// Freeze `models` against `invoker` with the default exclusion list
    pub(crate) fn registry_on(invoker: MockInvoker, models: Vec<ModelDescriptor>) -> Registry {
        let excluded = ConnectorConfig::default().excluded_methods;
        let defs = models
            .into_iter()
            .map(|model| ModelDef::define(model, &excluded).unwrap())
            .collect();

        Registry::freeze(Arc::new(invoker), defs).unwrap()
    }

    pub(crate) fn registry_with(models: Vec<ModelDescriptor>) -> Registry {
        registry_on(MockInvoker::new(), models)
    }

    fn define(model: ModelDescriptor) -> Result<ModelDef> {
        ModelDef::define(model, &ConnectorConfig::default().excluded_methods)
    }

    #[test]
    fn test_bare_model_is_rejected() {
        let err = define(ModelDescriptor::bare("Ghost")).unwrap_err();
        assert!(matches!(err, TetherError::MissingMethodSurface { .. }));
    }

    #[test]
    fn test_relation_operations_land_on_prototype() {
        let def = define(
            ModelDescriptor::persisted("User")
                .with_relation(RelationDeclaration::new("posts", "hasMany", "Post")),
        )
        .unwrap();

        assert!(def.prototype().contains("updateAttributes"));
        assert!(def.prototype().contains("__get__posts"));
        assert!(def.prototype().contains("__destroyById__posts"));
        assert!(!def.statics().contains("__get__posts"));
    }

    #[test]
    fn test_unknown_relation_target() {
        let defs = vec![define(
            ModelDescriptor::persisted("User")
                .with_relation(RelationDeclaration::new("posts", "hasMany", "Post")),
        )
        .unwrap()];

        let err = Registry::freeze(Arc::new(MockInvoker::new()), defs).unwrap_err();
        assert!(matches!(err, TetherError::UnknownModel(ref name) if name == "Post"));
    }

    #[test]
    fn test_unknown_return_model() {
        let defs = vec![define(
            ModelDescriptor::new("Session")
                .with_method(MethodDescriptor::new_static("owner").returning(Returns::One("User".into()))),
        )
        .unwrap()];

        let err = Registry::freeze(Arc::new(MockInvoker::new()), defs).unwrap_err();
        assert!(matches!(err, TetherError::UnknownModel(ref name) if name == "User"));
    }

    #[test]
    fn test_duplicate_model_is_rejected() {
        let defs = vec![
            define(ModelDescriptor::new("User")).unwrap(),
            define(ModelDescriptor::new("User")).unwrap(),
        ];

        let err = Registry::freeze(Arc::new(MockInvoker::new()), defs).unwrap_err();
        assert!(matches!(err, TetherError::Config(_)));
    }

    #[test]
    fn test_model_lookup() {
        let registry = registry_with(vec![ModelDescriptor::persisted("User")]);
        assert_eq!(registry.model_names(), vec!["User"]);
        assert!(matches!(registry.model("Admin"), Err(TetherError::UnknownModel(_))));

        let user = registry.model("User").unwrap();
        assert!(Arc::ptr_eq(
            &user.method("upsert").unwrap(),
            &user.method("updateOrCreate").unwrap()
        ));
        assert!(user.method("updateAttributes").is_none());
        assert!(user.instance_method("patchAttributes").is_some());
    }

    #[test]
    fn test_excluded_without_local_implementation() {
        let registry = registry_with(vec![
            ModelDescriptor::new("Ledger").with_method(MethodDescriptor::new_static("Checkpoint"))
        ]);
        let ledger = registry.model("Ledger").unwrap();

        assert!(ledger.method("Checkpoint").is_none());
        assert!(matches!(
            ledger.call("Checkpoint", vec![]),
            Err(TetherError::LocalOnly { .. })
        ));
        assert!(matches!(
            ledger.call("rollback", vec![]),
            Err(TetherError::UnknownMethod { .. })
        ));
    }

    #[tokio::test]
    async fn test_local_method_is_served_locally() {
        let invoker = MockInvoker::new();
        let registry = registry_on(
            invoker.clone(),
            vec![ModelDescriptor::new("Ledger")
                .with_method(MethodDescriptor::new_static("Change"))
                .with_local_method("Change", LocalMethod::constant(json!({"rev": 4})))],
        );

        let value = registry
            .model("Ledger")
            .unwrap()
            .call("Change", vec![])
            .unwrap()
            .await
            .unwrap();

        assert_eq!(value.to_json(), json!({"rev": 4}));
        assert_eq!(invoker.call_count(), 0);
    }

    #[tokio::test]
    async fn test_static_call_materializes_result() {
        crate::logging::init_test_logging();
        let invoker = MockInvoker::new();
        invoker.respond("User.findById", json!({"id": 1, "name": "ada"}));
        let registry = registry_on(invoker.clone(), vec![ModelDescriptor::persisted("User")]);

        let user = registry
            .model("User")
            .unwrap()
            .call("findById", vec![json!(1)])
            .unwrap()
            .await
            .unwrap()
            .into_instance()
            .unwrap();

        assert_eq!(user.model_name(), "User");
        assert_eq!(user.get("name"), Some(&json!("ada")));
        assert_eq!(invoker.calls_to("User.findById")[0].args, vec![json!(1)]);
    }

    #[tokio::test]
    async fn test_remote_errors_pass_through() {
        let invoker = MockInvoker::new();
        invoker.fail("User.count", RemoteError::new("boom").with_status(500));
        let registry = registry_on(invoker, vec![ModelDescriptor::persisted("User")]);

        let err = registry
            .model("User")
            .unwrap()
            .call("count", vec![])
            .unwrap()
            .await
            .unwrap_err();

        assert_eq!(err.remote().and_then(|e| e.status), Some(500));
    }

    #[tokio::test]
    async fn test_on_ready_fires_after_yield() {
        let registry = registry_with(vec![ModelDescriptor::new("User")]);
        let fired = Arc::new(AtomicBool::new(false));
        let (tx, rx) = tokio::sync::oneshot::channel();

        let flag = fired.clone();
        registry.on_ready(move |registry| {
            flag.store(true, Ordering::SeqCst);
            tx.send(registry.model_names().len()).ok();
        });
        assert!(!fired.load(Ordering::SeqCst));

        assert_eq!(rx.await.unwrap(), 1);
        assert!(fired.load(Ordering::SeqCst));
    }
}
