//! Proxy generation: one shared remote stand-in per method descriptor
//!
//! Every remotely invocable method becomes a [`RemoteMethod`]. The generator
//! installs it in the static or prototype [`MethodTable`] under its canonical
//! name and every alias, all pointing at the same `Arc`.
//!
//! A call through a proxy:
//!
//! 1. spawns exactly one invocation on the model's invoker
//! 2. applies the method's [`ResultPolicy`] to the outcome
//! 3. converts the raw payload through the registered type materializers

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, debug_span, warn, Instrument};

use crate::call::CallHandle;
use crate::descriptor::{MethodDescriptor, Returns};
use crate::error::{CallError, Result, TetherError};
use crate::registry::Registry;

/// Methods whose "record not found" outcome is reported as a null result
pub const SINGLE_RECORD_FINDERS: [&str; 2] = ["findById", "findOne"];

/// Per-method result translation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultPolicy {
    /// Every outcome is passed through
    Passthrough,

    /// `MODEL_NOT_FOUND` completes successfully with a null result
    NotFoundAsNull,
}

impl ResultPolicy {
    /// Fixed policy table, keyed by canonical method name
    pub fn for_method(name: &str) -> Self {
        if SINGLE_RECORD_FINDERS.contains(&name) {
            ResultPolicy::NotFoundAsNull
        } else {
            ResultPolicy::Passthrough
        }
    }

    pub fn apply(
        self,
        outcome: tether_core_interface::Result<Value>,
    ) -> std::result::Result<Value, CallError> {
        match outcome {
            Ok(value) => Ok(value),
            Err(err) if self == ResultPolicy::NotFoundAsNull && err.is_not_found() => {
                debug!("Not-found lookup mapped to null: {}", err.message);
                Ok(Value::Null)
            }
            Err(err) => Err(CallError::Remote(err)),
        }
    }
}

/// What a proxied call is addressed to
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// The model itself
    Static,

    /// The instance with this identity
    Instance(Value),
}

/// Local stand-in for one remote method
#[derive(Debug)]
pub struct RemoteMethod {
    name: String,
    aliases: Vec<String>,
    path: String,
    is_static: bool,
    returns: Returns,
    policy: ResultPolicy,
}

impl RemoteMethod {
    pub(crate) fn from_descriptor(model: &str, descriptor: &MethodDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            aliases: descriptor.aliases.clone(),
            path: descriptor.path_identifier(model),
            is_static: descriptor.is_static,
            returns: descriptor.returns.clone(),
            policy: ResultPolicy::for_method(&descriptor.name),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// Remote path identifier
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn returns(&self) -> &Returns {
        &self.returns
    }

    pub fn policy(&self) -> ResultPolicy {
        self.policy
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    /// Issue the remote call
    pub(crate) fn invoke(&self, registry: &Registry, target: Target, args: Vec<Value>) -> CallHandle {
        let invoker = registry.invoker();
        let registry = registry.clone();
        let path = self.path.clone();
        let returns = self.returns.clone();
        let policy = self.policy;

        debug!(
            "Invoking {} via {} ({} args, target={:?})",
            path,
            invoker.name(),
            args.len(),
            target
        );

        // Closes when the invocation settles; file logs record its timing
        let span = debug_span!("invoke", path = %path, invoker = invoker.name(), args = args.len());

        CallHandle::spawn(
            async move {
                let outcome = match target {
                    Target::Static => invoker.invoke_static(&path, args).await,
                    Target::Instance(id) => invoker.invoke_instance(&path, id, args).await,
                };

                let raw = policy.apply(outcome)?;
                registry.convert(&returns, raw)
            }
            .instrument(span),
        )
    }
}

/// Name -> proxy table for one scope (static or prototype)
#[derive(Debug, Default)]
pub struct MethodTable {
    by_name: HashMap<String, Arc<RemoteMethod>>,
    methods: Vec<Arc<RemoteMethod>>,
}

impl MethodTable {
    /// Install `method` under its canonical name and every alias
    pub(crate) fn install(&mut self, model: &str, method: Arc<RemoteMethod>) -> Result<()> {
        if let Some(name) = method.names().find(|name| self.by_name.contains_key(*name)) {
            return Err(TetherError::DuplicateMethod {
                model: model.to_string(),
                name: name.to_string(),
            });
        }

        for name in method.names() {
            self.by_name.insert(name.to_string(), method.clone());
        }
        self.methods.push(method);

        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<RemoteMethod>> {
        self.by_name.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Installed methods in installation order, one entry per descriptor
    pub fn methods(&self) -> impl Iterator<Item = &Arc<RemoteMethod>> {
        self.methods.iter()
    }

    /// Every callable name, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Scope tables a generator installs into
pub(crate) struct Scopes<'a> {
    pub model: &'a str,
    pub id_property: Option<&'a str>,
    pub statics: &'a mut MethodTable,
    pub prototype: &'a mut MethodTable,
}

/// Generate and install the proxy for `descriptor`
///
/// Returns `None` for excluded methods, which are left to local code.
pub(crate) fn generate(
    scopes: &mut Scopes<'_>,
    descriptor: &MethodDescriptor,
    excluded: &[String],
) -> Result<Option<Arc<RemoteMethod>>> {
    if descriptor.name.is_empty() || descriptor.aliases.iter().any(String::is_empty) {
        return Err(TetherError::InvalidDescriptor {
            model: scopes.model.to_string(),
            reason: "method names must not be empty".to_string(),
        });
    }

    if excluded.iter().any(|name| *name == descriptor.name) {
        warn!(
            "Skipping local-only method {}.{}",
            scopes.model, descriptor.name
        );
        return Ok(None);
    }

    if !descriptor.is_static && scopes.id_property.is_none() {
        return Err(TetherError::NoInstanceScope {
            model: scopes.model.to_string(),
            method: descriptor.name.clone(),
        });
    }

    let method = Arc::new(RemoteMethod::from_descriptor(scopes.model, descriptor));
    let table = if method.is_static() {
        &mut *scopes.statics
    } else {
        &mut *scopes.prototype
    };
    table.install(scopes.model, method.clone())?;

    Ok(Some(method))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core_interface::RemoteError;

    fn tables() -> (MethodTable, MethodTable) {
        (MethodTable::default(), MethodTable::default())
    }

    #[test]
    fn test_finder_policy_table() {
        assert_eq!(ResultPolicy::for_method("findById"), ResultPolicy::NotFoundAsNull);
        assert_eq!(ResultPolicy::for_method("findOne"), ResultPolicy::NotFoundAsNull);
        assert_eq!(ResultPolicy::for_method("find"), ResultPolicy::Passthrough);
        assert_eq!(ResultPolicy::for_method("__findById__posts"), ResultPolicy::Passthrough);
    }

    #[test]
    fn test_not_found_as_null() {
        let outcome = ResultPolicy::NotFoundAsNull.apply(Err(RemoteError::not_found("gone")));
        assert_eq!(outcome, Ok(Value::Null));

        let other = RemoteError::new("denied").with_code("AUTHORIZATION_REQUIRED");
        let outcome = ResultPolicy::NotFoundAsNull.apply(Err(other.clone()));
        assert_eq!(outcome, Err(CallError::Remote(other)));
    }

    #[test]
    fn test_passthrough_keeps_not_found() {
        let err = RemoteError::not_found("gone");
        let outcome = ResultPolicy::Passthrough.apply(Err(err.clone()));
        assert_eq!(outcome, Err(CallError::Remote(err)));
    }

    #[test]
    fn test_aliases_share_one_proxy() {
        let (mut statics, mut prototype) = tables();
        let mut scopes = Scopes {
            model: "User",
            id_property: Some("id"),
            statics: &mut statics,
            prototype: &mut prototype,
        };

        let descriptor =
            MethodDescriptor::new_static("deleteById").with_aliases(["destroyById", "removeById"]);
        generate(&mut scopes, &descriptor, &[]).unwrap();

        let canonical = statics.get("deleteById").unwrap();
        for alias in ["destroyById", "removeById"] {
            assert!(Arc::ptr_eq(canonical, statics.get(alias).unwrap()));
        }
        assert_eq!(statics.len(), 1);
        assert_eq!(statics.names(), vec!["deleteById", "destroyById", "removeById"]);
        assert!(prototype.is_empty());
    }

    #[test]
    fn test_instance_methods_go_to_prototype() {
        let (mut statics, mut prototype) = tables();
        let mut scopes = Scopes {
            model: "User",
            id_property: Some("id"),
            statics: &mut statics,
            prototype: &mut prototype,
        };

        let method = generate(&mut scopes, &MethodDescriptor::new_instance("reload"), &[])
            .unwrap()
            .unwrap();

        assert_eq!(method.path(), "User.prototype.reload");
        assert!(prototype.contains("reload"));
        assert!(!statics.contains("reload"));
    }

    #[test]
    fn test_excluded_methods_are_not_installed() {
        let (mut statics, mut prototype) = tables();
        let mut scopes = Scopes {
            model: "User",
            id_property: Some("id"),
            statics: &mut statics,
            prototype: &mut prototype,
        };
        let excluded = vec!["Change".to_string(), "Checkpoint".to_string()];

        for name in ["Change", "Checkpoint"] {
            let method = generate(&mut scopes, &MethodDescriptor::new_static(name), &excluded).unwrap();
            assert!(method.is_none());
        }
        assert!(statics.is_empty());
    }

    #[test]
    fn test_instance_method_without_identity_fails_fast() {
        let (mut statics, mut prototype) = tables();
        let mut scopes = Scopes {
            model: "Metric",
            id_property: None,
            statics: &mut statics,
            prototype: &mut prototype,
        };

        let err = generate(&mut scopes, &MethodDescriptor::new_instance("reset"), &[]).unwrap_err();
        assert!(matches!(err, TetherError::NoInstanceScope { .. }));
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let (mut statics, mut prototype) = tables();
        let mut scopes = Scopes {
            model: "User",
            id_property: Some("id"),
            statics: &mut statics,
            prototype: &mut prototype,
        };

        generate(&mut scopes, &MethodDescriptor::new_static("upsert").with_aliases(["updateOrCreate"]), &[])
            .unwrap();
        let err = generate(&mut scopes, &MethodDescriptor::new_static("updateOrCreate"), &[]).unwrap_err();
        assert!(matches!(err, TetherError::DuplicateMethod { ref name, .. } if name == "updateOrCreate"));
    }

    #[test]
    fn test_empty_names_are_invalid() {
        let (mut statics, mut prototype) = tables();
        let mut scopes = Scopes {
            model: "User",
            id_property: Some("id"),
            statics: &mut statics,
            prototype: &mut prototype,
        };

        let err = generate(&mut scopes, &MethodDescriptor::new_static("find").with_aliases([""]), &[])
            .unwrap_err();
        assert!(matches!(err, TetherError::InvalidDescriptor { .. }));
    }
}
