//! Adapter registry
//!
//! Maps a platform name to a factory producing its adapter. Every registered
//! field map is validated when the registry is built, so a broken map fails
//! at startup rather than halfway through a conversion.

use std::collections::BTreeMap;
use tracing::debug;

use super::classic::ClassicAdapter;
use super::{PlatformInfo, SourceAdapter};
use crate::convert::error::ConfigError;

pub type AdapterFactory = fn() -> Box<dyn SourceAdapter>;

#[derive(Default)]
pub struct AdapterRegistry {
    factories: BTreeMap<&'static str, AdapterFactory>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every adapter shipped with the service
    pub fn builtin() -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        registry.register(ClassicAdapter::NAME, || Box::new(ClassicAdapter::new()))?;
        Ok(registry)
    }

    /// Add a platform; its field map is validated immediately
    pub fn register(&mut self, name: &'static str, factory: AdapterFactory) -> Result<(), ConfigError> {
        let adapter = factory();
        adapter
            .field_map()
            .validate()
            .map_err(|source| ConfigError::InvalidFieldMap {
                platform: name.to_string(),
                source,
            })?;

        debug!("Registered source platform: {}", name);
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Instantiate the adapter for `name`
    pub fn create(&self, name: &str) -> Result<Box<dyn SourceAdapter>, ConfigError> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| ConfigError::UnknownPlatform(name.to_string()))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    pub fn platforms(&self) -> Vec<PlatformInfo> {
        self.factories.values().map(|factory| factory().info()).collect()
    }
}
