//! Model, method and relation descriptors
//!
//! Descriptors are the read-only input of the bridge: they are consumed once
//! when a model is defined and never consulted again afterwards. They can be
//! built in code or deserialized from model definition JSON:
//!
//! ```json
//! {
//!   "name": "User",
//!   "persisted": true,
//!   "relations": [
//!     { "name": "posts", "kind": "hasMany", "model": "Post", "foreignKey": "userId" }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::call::{CallResult, CallValue};
use crate::error::{Result, TetherError};

/// How a method's raw result is turned into a local value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Returns {
    /// Hand the payload back untouched
    #[default]
    Raw,

    /// One instance of the named model
    One(String),

    /// An ordered sequence of instances of the named model
    Many(String),
}

impl Returns {
    /// Model this result materializes into, if any
    pub fn model(&self) -> Option<&str> {
        match self {
            Returns::Raw => None,
            Returns::One(model) | Returns::Many(model) => Some(model),
        }
    }
}

/// One remotely invocable operation on a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    /// Canonical name
    pub name: String,

    /// Remote path identifier; defaults to `Model.name` or `Model.prototype.name`
    #[serde(default)]
    pub path: Option<String>,

    /// Static (model-level) or instance-level
    #[serde(default, rename = "static")]
    pub is_static: bool,

    /// Additional names resolving to the same proxy
    #[serde(default)]
    pub aliases: Vec<String>,

    /// Result conversion
    #[serde(default)]
    pub returns: Returns,
}

impl MethodDescriptor {
    /// A static method returning a raw payload
    pub fn new_static(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            is_static: true,
            aliases: Vec::new(),
            returns: Returns::Raw,
        }
    }

    /// An instance method returning a raw payload
    pub fn new_instance(name: impl Into<String>) -> Self {
        Self {
            is_static: false,
            ..Self::new_static(name)
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    pub fn returning(mut self, returns: Returns) -> Self {
        self.returns = returns;
        self
    }

    /// The path identifier used for the remote call
    pub fn path_identifier(&self, model: &str) -> String {
        match &self.path {
            Some(path) => path.clone(),
            None if self.is_static => format!("{}.{}", model, self.name),
            None => format!("{}.prototype.{}", model, self.name),
        }
    }

    /// Canonical name followed by every alias
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// The standard remote surface of a persisted model
pub fn standard_methods(model: &str) -> Vec<MethodDescriptor> {
    let one = || Returns::One(model.to_string());

    vec![
        MethodDescriptor::new_static("create").returning(one()),
        MethodDescriptor::new_static("upsert")
            .with_aliases(["patchOrCreate", "updateOrCreate"])
            .returning(one()),
        MethodDescriptor::new_static("replaceOrCreate").returning(one()),
        MethodDescriptor::new_static("exists"),
        MethodDescriptor::new_static("findById").returning(one()),
        MethodDescriptor::new_static("replaceById").returning(one()),
        MethodDescriptor::new_static("find").returning(Returns::Many(model.to_string())),
        MethodDescriptor::new_static("findOne").returning(one()),
        MethodDescriptor::new_static("updateAll").with_aliases(["update"]),
        MethodDescriptor::new_static("deleteById").with_aliases(["destroyById", "removeById"]),
        MethodDescriptor::new_static("count"),
        MethodDescriptor::new_instance("updateAttributes")
            .with_aliases(["patchAttributes"])
            .returning(one()),
    ]
}

/// Relation kinds with a builder strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    HasMany,
    BelongsTo,
    HasAndBelongsToMany,
    HasOne,
    ReferencesMany,
    EmbedsOne,
    EmbedsMany,
}

impl RelationKind {
    pub const ALL: [RelationKind; 7] = [
        RelationKind::HasMany,
        RelationKind::BelongsTo,
        RelationKind::HasAndBelongsToMany,
        RelationKind::HasOne,
        RelationKind::ReferencesMany,
        RelationKind::EmbedsOne,
        RelationKind::EmbedsMany,
    ];

    /// Whether the relation resolves to a sequence of related instances
    pub fn is_plural(&self) -> bool {
        matches!(
            self,
            RelationKind::HasMany
                | RelationKind::HasAndBelongsToMany
                | RelationKind::ReferencesMany
                | RelationKind::EmbedsMany
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::HasMany => "hasMany",
            RelationKind::BelongsTo => "belongsTo",
            RelationKind::HasAndBelongsToMany => "hasAndBelongsToMany",
            RelationKind::HasOne => "hasOne",
            RelationKind::ReferencesMany => "referencesMany",
            RelationKind::EmbedsOne => "embedsOne",
            RelationKind::EmbedsMany => "embedsMany",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        RelationKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// A relation as declared in a model definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationDeclaration {
    /// Property name on the owning instance
    pub name: String,

    /// Relation kind, e.g. `hasMany`
    pub kind: String,

    /// Target model name
    pub model: String,

    #[serde(default)]
    pub foreign_key: Option<String>,
}

impl RelationDeclaration {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            model: model.into(),
            foreign_key: None,
        }
    }

    pub fn with_foreign_key(mut self, key: impl Into<String>) -> Self {
        self.foreign_key = Some(key.into());
        self
    }

    /// Resolve the declaration into a descriptor for `owner`
    pub fn resolve(&self, owner: &str) -> Result<RelationDescriptor> {
        let kind = self
            .kind
            .parse::<RelationKind>()
            .map_err(|kind| TetherError::UnsupportedRelation {
                model: owner.to_string(),
                relation: self.name.clone(),
                kind,
            })?;

        Ok(RelationDescriptor {
            name: self.name.clone(),
            kind,
            target: self.model.clone(),
            foreign_key: self.foreign_key.clone(),
        })
    }
}

/// A resolved relation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDescriptor {
    pub name: String,
    pub kind: RelationKind,
    pub target: String,
    pub foreign_key: Option<String>,
}

impl RelationDescriptor {
    pub fn is_plural(&self) -> bool {
        self.kind.is_plural()
    }

    /// Result conversion for a fetch of the whole relation
    pub fn fetch_returns(&self) -> Returns {
        if self.is_plural() {
            Returns::Many(self.target.clone())
        } else {
            Returns::One(self.target.clone())
        }
    }
}

/// Local implementation for a method that never goes remote
#[derive(Clone)]
pub struct LocalMethod(Arc<dyn Fn(&[Value]) -> CallResult + Send + Sync>);

impl LocalMethod {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> CallResult + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// A local method that always answers `value`
    pub fn constant(value: Value) -> Self {
        Self::new(move |_| Ok(CallValue::from_json(value.clone())))
    }

    pub fn call(&self, args: &[Value]) -> CallResult {
        (self.0)(args)
    }
}

impl fmt::Debug for LocalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LocalMethod(..)")
    }
}

fn default_id_property() -> Option<String> {
    Some("id".to_string())
}

/// A locally declared model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub name: String,

    /// Identity field; `None` means instances cannot be addressed remotely
    #[serde(default = "default_id_property")]
    pub id_property: Option<String>,

    /// Remote method surface; `None` when the model carries no remoting metadata
    #[serde(default)]
    pub methods: Option<Vec<MethodDescriptor>>,

    /// Prepend the standard persisted-model surface
    #[serde(default)]
    pub persisted: bool,

    #[serde(default)]
    pub relations: Vec<RelationDeclaration>,

    /// Implementations for excluded (local-only) methods
    #[serde(skip)]
    pub local_methods: BTreeMap<String, LocalMethod>,
}

impl ModelDescriptor {
    /// A model with an empty remote surface and identity property `id`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id_property: default_id_property(),
            methods: Some(Vec::new()),
            persisted: false,
            relations: Vec::new(),
            local_methods: BTreeMap::new(),
        }
    }

    /// A model exposing the standard persisted-model surface
    pub fn persisted(name: impl Into<String>) -> Self {
        Self {
            persisted: true,
            ..Self::new(name)
        }
    }

    /// A model without any remoting metadata
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            methods: None,
            ..Self::new(name)
        }
    }

    pub fn with_id_property(mut self, property: Option<&str>) -> Self {
        self.id_property = property.map(str::to_string);
        self
    }

    pub fn with_method(mut self, method: MethodDescriptor) -> Self {
        self.methods.get_or_insert_with(Vec::new).push(method);
        self
    }

    pub fn with_relation(mut self, relation: RelationDeclaration) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn with_local_method(mut self, name: impl Into<String>, method: LocalMethod) -> Self {
        self.local_methods.insert(name.into(), method);
        self
    }

    /// The full method surface: the standard catalog (when persisted) followed
    /// by the declared methods
    pub fn resolved_methods(&self) -> Option<Vec<MethodDescriptor>> {
        match (self.persisted, &self.methods) {
            (false, None) => None,
            (false, Some(methods)) => Some(methods.clone()),
            (true, methods) => {
                let mut all = standard_methods(&self.name);
                all.extend(methods.iter().flatten().cloned());
                Some(all)
            }
        }
    }
}
