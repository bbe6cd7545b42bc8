//! Module registry: process-wide table of module classes

use crate::descriptor::ModuleDescriptor;
use crate::error::RegistryError;
use crate::module::RegisteredModule;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

/// Read-mostly table mapping module-class ids to registered modules
///
/// Lookups take a shared lock; registration takes the exclusive lock, so an
/// install completes before any later validation can observe the id.
pub struct ModuleRegistry {
    modules: RwLock<HashMap<String, Arc<RegisteredModule>>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            modules: RwLock::new(HashMap::with_capacity(16)),
        }
    }

    /// Register a module class, replacing any previous entry with the same id
    pub fn register(&self, module: RegisteredModule) {
        let id = module.id().to_string();
        let mut modules = self.modules.write().unwrap_or_else(PoisonError::into_inner);
        if modules.insert(id.clone(), Arc::new(module)).is_some() {
            info!("Re-registered module: {}", id);
        } else {
            info!("Registered module: {}", id);
        }
    }

    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownModule`] if the id is not registered.
    pub fn resolve(&self, id: &str) -> Result<Arc<RegisteredModule>, RegistryError> {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownModule(id.to_string()))
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// All registered modules, sorted by id
    #[must_use]
    pub fn all(&self) -> Vec<Arc<RegisteredModule>> {
        let mut modules: Vec<_> = self
            .modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        modules.sort_by(|a, b| a.id().cmp(b.id()));
        modules
    }

    /// Descriptors of all registered modules, sorted by id
    #[must_use]
    pub fn descriptors(&self) -> Vec<ModuleDescriptor> {
        self.all().iter().map(|m| m.descriptor().clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ParameterDefinition, Role};
    use crate::module::{ModuleImpl, SinkModule};

    struct NullSink;
    impl SinkModule for NullSink {}

    fn sink(id: &str, params: usize) -> RegisteredModule {
        let mut builder = ModuleDescriptor::builder(id, Role::Sink);
        for i in 0..params {
            builder = builder.parameter(ParameterDefinition::string(&format!("p{i}")));
        }
        RegisteredModule::new(builder.build().unwrap(), ModuleImpl::Sink(Arc::new(NullSink)))
            .unwrap()
    }

    #[test]
    fn test_resolve_unknown() {
        let registry = ModuleRegistry::new();
        assert!(matches!(
            registry.resolve("nope"),
            Err(RegistryError::UnknownModule(id)) if id == "nope"
        ));
    }

    #[test]
    fn test_register_is_idempotent_per_id() {
        let registry = ModuleRegistry::new();
        registry.register(sink("out", 0));
        registry.register(sink("out", 2));
        assert_eq!(registry.len(), 1);
        let m = registry.resolve("out").unwrap();
        assert_eq!(m.descriptor().parameters().len(), 2);
    }

    #[test]
    fn test_all_sorted() {
        let registry = ModuleRegistry::new();
        registry.register(sink("zeta", 0));
        registry.register(sink("alpha", 0));
        let ids: Vec<_> = registry.descriptors().iter().map(|d| d.id().to_string()).collect();
        assert_eq!(ids, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_concurrent_readers() {
        let registry = Arc::new(ModuleRegistry::new());
        registry.register(sink("out", 0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let r = Arc::clone(&registry);
                std::thread::spawn(move || r.resolve("out").is_ok())
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap());
        }
    }
}
