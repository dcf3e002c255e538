use std::sync::Arc;

use dashmap::DashMap;

use crate::config::EngineConfig;
use crate::engine::{Engine, EngineError, Stores};
use crate::limits::*;

/// Per-tenant engines. Each clinic gets its own engine and stores; nothing
/// is shared between them but the configuration.
pub struct TenantManager {
    engines: DashMap<String, Arc<Engine>>,
    config: EngineConfig,
}

impl TenantManager {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            engines: DashMap::new(),
            config,
        }
    }

    /// Get or lazily create an in-memory engine for the given tenant.
    pub fn get_or_create(&self, tenant: &str) -> Result<Arc<Engine>, EngineError> {
        let name = sanitize(tenant)?;
        if let Some(engine) = self.engines.get(&name) {
            return Ok(engine.value().clone());
        }
        self.insert(name, Stores::in_memory())
    }

    /// Attach a tenant to caller-provided stores.
    pub fn register(&self, tenant: &str, stores: Stores) -> Result<Arc<Engine>, EngineError> {
        let name = sanitize(tenant)?;
        if self.engines.contains_key(&name) {
            return Err(EngineError::InvalidTenant(format!("{name} already registered")));
        }
        self.insert(name, stores)
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    fn insert(&self, name: String, stores: Stores) -> Result<Arc<Engine>, EngineError> {
        if self.engines.len() >= MAX_TENANTS {
            return Err(EngineError::LimitExceeded("too many tenants"));
        }
        // Two callers may race here; the first insert wins.
        let engine = self
            .engines
            .entry(name.clone())
            .or_insert_with(|| Arc::new(Engine::new(stores, self.config.clone())))
            .value()
            .clone();
        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.engines.len() as f64);
        tracing::info!(tenant = %name, "tenant engine ready");
        Ok(engine)
    }
}

fn sanitize(tenant: &str) -> Result<String, EngineError> {
    if tenant.len() > MAX_TENANT_NAME_LEN {
        return Err(EngineError::InvalidTenant("tenant name too long".into()));
    }
    let safe: String = tenant
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if safe.is_empty() {
        return Err(EngineError::InvalidTenant("empty tenant name".into()));
    }
    Ok(safe)
}
