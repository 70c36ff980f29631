use std::sync::Arc;

use crate::config::Config;
use crate::providers::ProviderRegistry;
use crate::services::{Gateway, OauthMediator};
use crate::store::Store;

/// Shared application state handed to every handler and middleware.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub registry: ProviderRegistry,
    pub mediator: Arc<OauthMediator>,
    pub gateway: Arc<Gateway>,
}

impl AppState {
    /// Wires the full service graph over an already-built store, with
    /// adapters chosen from the configured credentials.
    pub fn build(store: Arc<dyn Store>, config: Config) -> Self {
        let config = Arc::new(config);
        let registry = ProviderRegistry::from_config(&config);
        Self::with_registry(store, registry, config)
    }

    /// Same wiring with a caller-supplied registry. Tests plug spy adapters
    /// in through this.
    pub fn with_registry(
        store: Arc<dyn Store>,
        registry: ProviderRegistry,
        config: Arc<Config>,
    ) -> Self {
        let mediator = Arc::new(OauthMediator::new(
            store.clone(),
            registry.clone(),
            config.clone(),
        ));
        let gateway = Arc::new(Gateway::new(
            store.clone(),
            registry.clone(),
            mediator.clone(),
            &config,
        ));
        AppState {
            config,
            store,
            registry,
            mediator,
            gateway,
        }
    }
}
