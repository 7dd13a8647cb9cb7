/*!
 * Connector: the composition root
 *
 * A connector binds an invoker to the configured endpoint, defines models one
 * at a time (each definition builds its method and relation tables right
 * away) and finally freezes them into a `Registry`.
 */

use std::path::Path;
use std::sync::Arc;
use tether_core_interface::Invoker;
use tracing::info;

use crate::config::ConnectorConfig;
use crate::descriptor::ModelDescriptor;
use crate::error::{Result, TetherError};
use crate::registry::{ModelDef, Registry};

/// Model definitions waiting to be frozen into a registry
pub struct Connector {
    config: ConnectorConfig,
    invoker: Arc<dyn Invoker>,
    models: Vec<ModelDef>,
}

impl Connector {
    /// Bind the HTTP invoker to the configured endpoint
    #[cfg(feature = "http")]
    pub fn new(config: ConnectorConfig) -> Result<Self> {
        use tether_connect::HttpInvoker;

        let endpoint = config.endpoint();
        let invoker = match config.timeout() {
            Some(timeout) => HttpInvoker::with_timeout(&endpoint, timeout),
            None => HttpInvoker::new(&endpoint),
        }
        .map_err(|e| TetherError::Connect(e.to_string()))?;

        info!("Bound HTTP invoker to {}", invoker.endpoint());
        Ok(Self::with_invoker(config, Arc::new(invoker)))
    }

    /// Use an already constructed invoker
    pub fn with_invoker(config: ConnectorConfig, invoker: Arc<dyn Invoker>) -> Self {
        Self {
            config,
            invoker,
            models: Vec::new(),
        }
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    /// Resolved endpoint address
    pub fn endpoint(&self) -> String {
        self.config.endpoint()
    }

    /// Define one model
    ///
    /// Any definition error is returned immediately and the model is not kept.
    pub fn define(&mut self, descriptor: ModelDescriptor) -> Result<&mut Self> {
        if self.models.iter().any(|model| model.name() == descriptor.name) {
            return Err(TetherError::Config(format!(
                "Model {} is defined twice",
                descriptor.name
            )));
        }

        let def = ModelDef::define(descriptor, &self.config.excluded_methods)?;
        self.models.push(def);
        Ok(self)
    }

    pub fn define_all<I>(&mut self, descriptors: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = ModelDescriptor>,
    {
        for descriptor in descriptors {
            self.define(descriptor)?;
        }
        Ok(self)
    }

    /// Names of the models defined so far, in definition order
    pub fn model_names(&self) -> Vec<&str> {
        self.models.iter().map(ModelDef::name).collect()
    }

    /// Freeze every defined model into a registry
    pub fn initialize(self) -> Result<Registry> {
        let count = self.models.len();
        let registry = Registry::freeze(self.invoker, self.models)?;

        info!(
            "Initialized {} models against {}",
            count,
            self.config.endpoint()
        );
        Ok(registry)
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("endpoint", &self.config.endpoint())
            .field("invoker", &self.invoker.name())
            .field("models", &self.model_names())
            .finish()
    }
}

/// Load model definitions from a JSON file holding an array of models
pub fn load_models(path: &Path) -> Result<Vec<ModelDescriptor>> {
    let contents = std::fs::read_to_string(path)?;
    let models = serde_json::from_str(&contents)?;
    Ok(models)
}
