//! Explicit provider registry owned by the dispatcher.

use crate::error::{DispatchError, Result};
use crate::traits::Provider;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

type ProviderFactory = Box<dyn Fn() -> Arc<dyn Provider> + Send + Sync>;

/// Name-to-instance provider registry with lazy, memoized instantiation.
///
/// Replaces a process-wide instance map: one registry per dispatcher, no
/// hidden global state. Eagerly registered instances and lazily constructed
/// ones share the same lookup path.
#[derive(Default)]
pub struct ProviderRegistry {
    instances: RwLock<HashMap<String, Arc<dyn Provider>>>,
    factories: Mutex<HashMap<String, ProviderFactory>>,
}

impl ProviderRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instance under its own name. Registering a second
    /// provider with the same name replaces the first.
    pub fn register(&self, provider: Arc<dyn Provider>) {
        let name = provider.name().to_string();
        self.instances.write().unwrap().insert(name, provider);
    }

    /// Register a factory invoked (once) on first resolution of `name`.
    pub fn register_lazy(
        &self,
        name: &str,
        factory: impl Fn() -> Arc<dyn Provider> + Send + Sync + 'static,
    ) {
        self.factories
            .lock()
            .unwrap()
            .insert(name.to_string(), Box::new(factory));
    }

    /// Resolve `name`, instantiating and memoizing from a factory when
    /// needed.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Provider>> {
        if let Some(provider) = self.instances.read().unwrap().get(name) {
            return Ok(provider.clone());
        }

        let factory = self.factories.lock().unwrap().remove(name);
        if let Some(factory) = factory {
            let provider = factory();
            self.instances
                .write()
                .unwrap()
                .insert(name.to_string(), provider.clone());
            return Ok(provider);
        }

        Err(DispatchError::Config(format!(
            "Provider [{}] is not configured",
            name
        )))
    }

    /// Names of all registered providers and pending factories.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .instances
            .read()
            .unwrap()
            .keys()
            .chain(self.factories.lock().unwrap().keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvider;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn resolve_unknown_provider_is_a_config_error() {
        let registry = ProviderRegistry::new();
        let err = registry.resolve("nope").unwrap_err();
        assert!(matches!(err, DispatchError::Config(_)));
    }

    #[test]
    fn eager_registration_resolves_by_name() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(MockProvider::new("openai")));
        assert_eq!(registry.resolve("openai").unwrap().name(), "openai");
    }

    #[test]
    fn lazy_factories_run_once_and_memoize() {
        let registry = ProviderRegistry::new();
        let built = Arc::new(AtomicU32::new(0));
        let built_factory = built.clone();
        registry.register_lazy("claude", move || {
            built_factory.fetch_add(1, Ordering::SeqCst);
            Arc::new(MockProvider::new("claude"))
        });

        let a = registry.resolve("claude").unwrap();
        let b = registry.resolve("claude").unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn names_cover_instances_and_factories() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(MockProvider::new("openai")));
        registry.register_lazy("claude", || Arc::new(MockProvider::new("claude")));
        assert_eq!(registry.names(), vec!["claude", "openai"]);
    }
}
