//! Cached type loading.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::ControlResult;
use crate::info::Type;
use crate::loader::ClassLoader;

/// Loads and validates component types, caching them per loader and class
#[derive(Debug, Default)]
pub struct TypeLoader {
    cache: RwLock<HashMap<(u64, String), Arc<Type>>>,
}

impl TypeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `classname` through `loader` and checks it has exactly one
    /// public constructor.
    pub fn load_type(&self, loader: &ClassLoader, classname: &str) -> ControlResult<Arc<Type>> {
        let key = (loader.id(), classname.to_string());
        if let Some(ty) = self.cache.read().get(&key) {
            return Ok(ty.clone());
        }

        let ty = loader.load_class(classname)?;
        ty.constructor()?;
        tracing::trace!(classname, loader = %loader.identity(), "loaded component type");
        Ok(self.cache.write().entry(key).or_insert(ty).clone())
    }

    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }
}
