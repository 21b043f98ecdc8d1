//! Provider registry and reference implementations

pub mod mock;

use payout_core::{Error, Provider, ProviderId, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

pub use mock::MockProvider;

/// Registered providers, keyed by ID
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<ProviderId, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Create empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a provider under its own ID
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.id().clone(), provider);
    }

    /// Get a provider
    pub fn get(&self, id: &ProviderId) -> Result<Arc<dyn Provider>> {
        self.providers
            .get(id)
            .cloned()
            .ok_or_else(|| Error::ProviderNotConfigured(id.to_string()))
    }

    /// Check registration
    pub fn contains(&self, id: &ProviderId) -> bool {
        self.providers.contains_key(id)
    }

    /// Registered providers in ID order
    pub fn iter(&self) -> impl Iterator<Item = (&ProviderId, &Arc<dyn Provider>)> {
        self.providers.iter()
    }
}

impl FromIterator<Arc<dyn Provider>> for ProviderRegistry {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Provider>>>(iter: I) -> Self {
        let mut registry = Self::new();
        for provider in iter {
            registry.register(provider);
        }
        registry
    }
}
