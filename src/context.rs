//! Process-wide application context handed to every handler.

use crate::{
    config::AppConfig,
    services::{document_store::DocumentStore, messenger::Messenger, object_store::ObjectStore},
};
use std::sync::Arc;

/// Collaborators and settings, built once in `main` and cloned into each request.
#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<dyn ObjectStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub messenger: Arc<dyn Messenger>,
    pub config: Arc<AppConfig>,
}

impl AppContext {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        documents: Arc<dyn DocumentStore>,
        messenger: Arc<dyn Messenger>,
        config: AppConfig,
    ) -> Self {
        Self {
            store,
            documents,
            messenger,
            config: Arc::new(config),
        }
    }
}
