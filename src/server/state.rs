use std::sync::Arc;

use tokio::sync::Mutex;

use super::auth::{Authorizer, BearerTokenAuthorizer};
use super::registry::Registry;
use crate::config::Config;

/// Shared application state exposed to handlers.
#[derive(Clone)]
pub struct AppState {
    /// Every game and player. Admission and cleanup both hold this lock for
    /// the whole of their update, so they never interleave.
    pub(crate) registry: Arc<Mutex<Registry>>,
    pub config: Arc<Config>,
    pub authorizer: Arc<dyn Authorizer>,
}

impl AppState {
    /// State with the bearer-token admin gate built from `config`.
    pub fn new(config: Config) -> Self {
        let authorizer = Arc::new(BearerTokenAuthorizer::new(config.admin_token.clone()));
        Self::with_authorizer(config, authorizer)
    }

    pub fn with_authorizer(config: Config, authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::new())),
            config: Arc::new(config),
            authorizer,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        AppState::new(Config::default())
    }
}
