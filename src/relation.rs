//! Relation accessors and relation scopes
//!
//! Each declared relation gets a frozen [`RelationAccessor`]: six remote
//! operations on the owning model's prototype scope. Reading a relation on an
//! instance builds a fresh [`RelationScope`] over that accessor and the
//! instance's relation cache.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::call::{CallHandle, CallResult, CallValue};
use crate::descriptor::{MethodDescriptor, RelationDeclaration, RelationDescriptor, Returns};
use crate::error::{CallError, Result, TetherError};
use crate::instance::{CachedRelation, Instance};
use crate::proxy::{MethodTable, RemoteMethod};

/// Remote operations backing every relation, by operation name
pub const RELATION_OPERATIONS: [&str; 6] =
    ["get", "count", "create", "destroyById", "exists", "findById"];

/// Synthesized instance method name for relation operation `op`
pub fn operation_name(op: &str, relation: &str) -> String {
    format!("__{}__{}", op, relation)
}

/// The frozen operation set of one relation
#[derive(Debug)]
pub struct RelationAccessor {
    descriptor: RelationDescriptor,
    get: Arc<RemoteMethod>,
    count: Arc<RemoteMethod>,
    create: Arc<RemoteMethod>,
    destroy_by_id: Arc<RemoteMethod>,
    exists: Arc<RemoteMethod>,
    find_by_id: Arc<RemoteMethod>,
}

impl RelationAccessor {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &RelationDescriptor {
        &self.descriptor
    }

    /// The remote method behind the relation fetch
    pub fn get_method(&self) -> &Arc<RemoteMethod> {
        &self.get
    }
}

/// Relation accessors of one model, in declaration order
#[derive(Debug, Default)]
pub struct RelationTable {
    accessors: Vec<RelationAccessor>,
}

impl RelationTable {
    pub(crate) fn push(&mut self, model: &str, accessor: RelationAccessor) -> Result<()> {
        if self.get(accessor.name()).is_some() {
            return Err(TetherError::InvalidDescriptor {
                model: model.to_string(),
                reason: format!("relation {} is declared twice", accessor.name()),
            });
        }
        self.accessors.push(accessor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&RelationAccessor> {
        self.accessors.iter().find(|accessor| accessor.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RelationAccessor> {
        self.accessors.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.accessors.iter().map(RelationAccessor::name).collect()
    }

    pub fn len(&self) -> usize {
        self.accessors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessors.is_empty()
    }
}

/// Build the accessor for `declaration` on `model`
///
/// Operations already present in `prototype` (supplied by the model's method
/// descriptors) are reused; the rest are synthesized and installed there.
pub(crate) fn build(
    model: &str,
    id_property: Option<&str>,
    declaration: &RelationDeclaration,
    prototype: &mut MethodTable,
) -> Result<RelationAccessor> {
    let descriptor = declaration.resolve(model)?;

    if id_property.is_none() {
        return Err(TetherError::NoInstanceScope {
            model: model.to_string(),
            method: operation_name("get", &descriptor.name),
        });
    }

    let mut operation = |op: &str, returns: Returns| -> Result<Arc<RemoteMethod>> {
        let name = operation_name(op, &descriptor.name);
        if let Some(existing) = prototype.get(&name) {
            return Ok(existing.clone());
        }

        let method = Arc::new(RemoteMethod::from_descriptor(
            model,
            &MethodDescriptor::new_instance(name).returning(returns),
        ));
        prototype.install(model, method.clone())?;
        Ok(method)
    };

    let one = || Returns::One(descriptor.target.clone());
    let accessor = RelationAccessor {
        get: operation("get", descriptor.fetch_returns())?,
        count: operation("count", Returns::Raw)?,
        create: operation("create", one())?,
        destroy_by_id: operation("destroyById", Returns::Raw)?,
        exists: operation("exists", Returns::Raw)?,
        find_by_id: operation("findById", one())?,
        descriptor: descriptor.clone(),
    };

    debug!(
        "Built {} relation {}.{} -> {}",
        descriptor.kind, model, descriptor.name, descriptor.target
    );

    Ok(accessor)
}

/// A relation as read from one instance
///
/// Scopes are cheap and rebuilt on every read; they borrow the instance, so
/// every scope of an instance sees the same cache.
pub struct RelationScope<'a> {
    instance: &'a Instance,
    accessor: &'a RelationAccessor,
}

impl<'a> RelationScope<'a> {
    pub(crate) fn new(instance: &'a Instance, accessor: &'a RelationAccessor) -> Self {
        Self { instance, accessor }
    }

    pub fn name(&self) -> &str {
        self.accessor.name()
    }

    pub fn descriptor(&self) -> &RelationDescriptor {
        self.accessor.descriptor()
    }

    /// Materialize the cached payload, if the instance holds one
    pub fn cached(&self) -> Option<CallResult> {
        let entry = self.instance.cached_relation(self.name())?;
        let registry = self.instance.registry();
        let target = &self.accessor.descriptor().target;

        let result = match entry {
            CachedRelation::One(payload) => registry
                .materialize(target, payload.clone())
                .map(CallValue::Instance),
            CachedRelation::Many(payloads) => payloads
                .iter()
                .map(|payload| registry.materialize(target, payload.clone()))
                .collect::<std::result::Result<Vec<_>, CallError>>()
                .map(CallValue::Instances),
        };

        Some(result)
    }

    /// Read the relation
    ///
    /// Without arguments a cached payload is served locally. Any argument
    /// forces a remote fetch.
    pub fn call(&self, args: Vec<Value>) -> Result<CallHandle> {
        if args.is_empty() {
            if let Some(result) = self.cached() {
                trace!(
                    "Serving {}.{} from relation cache",
                    self.instance.model_name(),
                    self.name()
                );
                return Ok(CallHandle::ready(result));
            }
        }

        self.instance.invoke_method(&self.accessor.get, args)
    }

    /// Read the relation and register `callback` as a completion listener
    pub fn call_with<F>(&self, args: Vec<Value>, callback: F) -> Result<CallHandle>
    where
        F: FnOnce(CallResult) + Send + 'static,
    {
        let handle = self.call(args)?;
        handle.on_complete(callback);
        Ok(handle)
    }

    pub fn count(&self, args: Vec<Value>) -> Result<CallHandle> {
        self.instance.invoke_method(&self.accessor.count, args)
    }

    pub fn create(&self, args: Vec<Value>) -> Result<CallHandle> {
        self.instance.invoke_method(&self.accessor.create, args)
    }

    pub fn delete_by_id(&self, args: Vec<Value>) -> Result<CallHandle> {
        self.instance.invoke_method(&self.accessor.destroy_by_id, args)
    }

    pub fn destroy_by_id(&self, args: Vec<Value>) -> Result<CallHandle> {
        self.instance.invoke_method(&self.accessor.destroy_by_id, args)
    }

    pub fn exists(&self, args: Vec<Value>) -> Result<CallHandle> {
        self.instance.invoke_method(&self.accessor.exists, args)
    }

    pub fn find_by_id(&self, args: Vec<Value>) -> Result<CallHandle> {
        self.instance.invoke_method(&self.accessor.find_by_id, args)
    }
}
