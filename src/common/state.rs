// Application state shared across all modules

use std::sync::Arc;

use super::AuthConfig;
use crate::auth::providers::ProviderRegistry;
use crate::services::reconciler::IdentityReconciler;
use crate::services::token::TokenService;
use crate::services::user_store::UserStore;

/// Configuration and services handed to every handler. Immutable after startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AuthConfig>,
    pub registry: Arc<ProviderRegistry>,
    pub reconciler: IdentityReconciler,
    pub tokens: TokenService,
}

impl AppState {
    pub fn new(config: Arc<AuthConfig>, store: Arc<dyn UserStore>) -> Result<Self, reqwest::Error> {
        let tokens = TokenService::new(config.clone(), store.clone());
        let reconciler = IdentityReconciler::new(store, tokens.clone());
        let registry = Arc::new(ProviderRegistry::new(config.clone())?);

        Ok(Self {
            config,
            registry,
            reconciler,
            tokens,
        })
    }
}
