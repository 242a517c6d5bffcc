//! Business logic services

pub mod catalog;
pub mod email;
pub mod issues;
pub mod reminders;
pub mod scheduler;

use std::sync::Arc;

use crate::{config::LoansConfig, repository::Store};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub catalog: catalog::CatalogService,
    pub issues: issues::IssuesService,
    pub store: Arc<dyn Store>,
    pub notifier: Arc<dyn email::Notifier>,
}

impl Services {
    /// Create all services over the given store and notifier
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn email::Notifier>,
        loans_config: &LoansConfig,
    ) -> Self {
        Self {
            catalog: catalog::CatalogService::new(store.clone()),
            issues: issues::IssuesService::new(store.clone(), loans_config),
            store,
            notifier,
        }
    }
}
