//! Named backend registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::Backend;
use crate::error::Result;

/// Backends indexed by name.
#[derive(Default)]
pub struct BackendRegistry {
    backends: RwLock<HashMap<String, Arc<dyn Backend>>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `backend` under `name`, replacing any previous entry.
    pub fn register(&self, name: impl Into<String>, backend: Arc<dyn Backend>) {
        let name = name.into();
        debug!(backend = %name, "Registering backend");
        self.backends.write().insert(name, backend);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Backend>> {
        self.backends.read().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.backends.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.read().is_empty()
    }

    /// Close every backend and empty the registry.
    ///
    /// All backends are closed even if some fail; the first error is
    /// returned. Calling it again on an empty registry is a no-op.
    pub async fn close(&self) -> Result<()> {
        let backends: Vec<(String, Arc<dyn Backend>)> = self.backends.write().drain().collect();

        let mut first_err = None;
        for (name, backend) in backends {
            if let Err(e) = backend.close().await {
                warn!(backend = %name, error = %e, "Failed to close backend");
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
