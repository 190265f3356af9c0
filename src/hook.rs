//! Build interceptors.
//!
//! A [`HookRegistry`] is an explicit, shareable list of [`Interceptor`]s.
//! `QueryBuilder::build_with` runs every `before_build` in registration
//! order against the query's [`Metadata`], then every `after_build` against
//! the finalized query. The first failure aborts the build.

use crate::error::{QueryError, Result};
use crate::query::Query;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Free-form context carried by a query, filled in by interceptors.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Metadata {
    pub trace_id: Option<String>,
    pub tenant_id: Option<String>,
    pub custom: BTreeMap<String, String>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.custom.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.custom.get(key).map(String::as_str)
    }
}

/// Observer invoked around `QueryBuilder::build_with`.
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &str;

    fn before_build(&self, _meta: &mut Metadata) -> Result<()> {
        Ok(())
    }

    fn after_build(&self, _query: &Query) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct HookRegistry {
    hooks: RwLock<Vec<Arc<dyn Interceptor>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, hook: Arc<dyn Interceptor>) {
        debug!(hook = hook.name(), "registered interceptor");
        self.hooks.write().push(hook);
    }

    /// Remove every interceptor with this name. Returns whether any was removed.
    pub fn unregister(&self, name: &str) -> bool {
        let mut hooks = self.hooks.write();
        let before = hooks.len();
        hooks.retain(|h| h.name() != name);
        before != hooks.len()
    }

    pub fn names(&self) -> Vec<String> {
        self.hooks.read().iter().map(|h| h.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.hooks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.read().is_empty()
    }

    pub fn clear(&self) {
        self.hooks.write().clear();
    }

    // Hooks run on a snapshot so they may touch the registry themselves.
    fn snapshot(&self) -> Vec<Arc<dyn Interceptor>> {
        self.hooks.read().clone()
    }

    pub(crate) fn before_build(&self, meta: &mut Metadata) -> Result<()> {
        for hook in self.snapshot() {
            hook.before_build(meta).map_err(|e| wrap(hook.as_ref(), e))?;
        }
        Ok(())
    }

    pub(crate) fn after_build(&self, query: &Query) -> Result<()> {
        for hook in self.snapshot() {
            hook.after_build(query).map_err(|e| wrap(hook.as_ref(), e))?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry").field("hooks", &self.names()).finish()
    }
}

fn wrap(hook: &dyn Interceptor, err: QueryError) -> QueryError {
    match err {
        err @ QueryError::Hook { .. } => err,
        other => QueryError::Hook {
            name: hook.name().to_string(),
            message: other.to_string(),
        },
    }
}
