use tracing::{debug, info};

use super::cache::SessionCache;
use super::config::GttConfig;
use super::host::HostEngine;
use super::materializer;
use super::registry::{CatalogRegistry, RegistryStore};
use super::template::SessionBinding;
use crate::core::{DbError, RelationId, Result};

/// Global temporary table state of one session: the switch, the cache of
/// bindings and access to the registry.
#[derive(Debug)]
pub struct GttSession {
    config: GttConfig,
    enabled: bool,
    cache: SessionCache,
    registry: CatalogRegistry,
}

impl GttSession {
    pub fn new(config: GttConfig) -> Self {
        let registry = CatalogRegistry::new(&config.schema, &config.registry_table);
        Self {
            enabled: config.enabled,
            config,
            cache: SessionCache::new(),
            registry,
        }
    }

    pub fn config(&self) -> &GttConfig {
        &self.config
    }

    pub fn schema(&self) -> &str {
        &self.config.schema
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            info!(enabled, "global temporary tables switched");
        }
        self.enabled = enabled;
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut SessionCache {
        &mut self.cache
    }

    pub fn registry(&self) -> &CatalogRegistry {
        &self.registry
    }

    /// Seeds a fresh cache with every registered template, none materialized.
    pub fn load(&mut self, host: &dyn HostEngine) -> Result<usize> {
        self.cache.delete_all();
        for template in self.registry.load_all(host)? {
            self.cache.insert_or_replace(SessionBinding::new(template));
        }
        debug!(templates = self.cache.len(), "templates loaded");
        Ok(self.cache.len())
    }

    /// Syncs the binding of `name` with the registry: caches templates registered
    /// after session start and evicts bindings whose template another session
    /// dropped or renamed. Returns whether `name` is a template.
    pub fn load_binding(&mut self, host: &dyn HostEngine, name: &str) -> Result<bool> {
        match self.registry.find_by_name(host, name)? {
            Some(template) => {
                self.cache.refresh(template);
                Ok(true)
            }
            None => {
                if let Some(stale) = self.cache.delete(name) {
                    debug!(template = name, materialized = ?stale.materialized_id, "template no longer registered, binding evicted");
                }
                Ok(false)
            }
        }
    }

    /// Name of the template that `id` is the placeholder or materialization of,
    /// as currently registered.
    pub fn template_for_relation(&mut self, host: &dyn HostEngine, id: RelationId) -> Result<Option<String>> {
        let cached = self.cache.find_by_relation(id).map(|b| (b.name().to_string(), b.template.placeholder_id));
        let placeholder = match &cached {
            Some((_, placeholder)) => *placeholder,
            None => {
                let Some(info) = host.relation(id) else {
                    return Ok(None);
                };
                if info.namespace_name != self.config.schema || info.name == self.config.registry_table {
                    return Ok(None);
                }
                id
            }
        };

        match self.registry.find_by_placeholder(host, placeholder)? {
            Some(template) => {
                let name = template.name.clone();
                if self.cache.refresh(template) {
                    debug!(template = %name, placeholder = %placeholder, "binding synced with registry");
                }
                Ok(Some(name))
            }
            None => {
                if let Some((stale, _)) = cached {
                    self.cache.delete(&stale);
                    debug!(template = %stale, placeholder = %placeholder, "template no longer registered, binding evicted");
                }
                Ok(None)
            }
        }
    }

    /// Drops a cached materialization id that no longer denotes a live relation,
    /// then reports whether the template is materialized.
    pub fn revalidate(&mut self, host: &dyn HostEngine, name: &str) -> bool {
        let Some(binding) = self.cache.lookup_mut(name) else {
            return false;
        };
        if let Some(id) = binding.materialized_id {
            if host.relation_exists(id) {
                return true;
            }
            debug!(template = name, relation = %id, "materialization no longer exists, resetting binding");
            binding.reset();
        }
        false
    }

    /// Id of this session's materialization of `name`, creating it on first use.
    pub fn ensure_materialized(&mut self, host: &mut dyn HostEngine, name: &str) -> Result<RelationId> {
        if !self.load_binding(host, name)? {
            return Err(DbError::Internal(format!("{} is not a global temporary table", name)));
        }
        if self.revalidate(host, name) {
            if let Some(id) = self.cache.lookup(name).and_then(|b| b.materialized_id) {
                return Ok(id);
            }
        }

        let template = self
            .cache
            .lookup(name)
            .map(|b| b.template.clone())
            .ok_or_else(|| DbError::Internal(format!("template {} vanished from the cache", name)))?;
        let id = materializer::materialize(host, &template, false)?;
        if let Some(binding) = self.cache.lookup_mut(name) {
            binding.materialized_id = Some(id);
        }
        Ok(id)
    }

    /// Rebuilds the cache from the registry after a rollback, keeping materializations that survived.
    pub fn reconcile(&mut self, host: &dyn HostEngine) -> Result<()> {
        let mut fresh = SessionCache::new();
        for template in self.registry.load_all(host)? {
            let survivor = self
                .cache
                .bindings()
                .find(|b| b.template.placeholder_id == template.placeholder_id)
                .and_then(|b| b.materialized_id)
                .filter(|id| host.relation_exists(*id));
            let mut binding = SessionBinding::new(template);
            binding.materialized_id = survivor;
            fresh.insert_or_replace(binding);
        }
        debug!(before = self.cache.len(), after = fresh.len(), "cache reconciled with registry");
        self.cache = fresh;
        Ok(())
    }

    pub fn clear(&mut self) {
        let removed = self.cache.delete_all();
        debug!(removed, "session cache released");
    }
}
