use std::sync::Arc;

use dashmap::DashMap;

use crate::core::{domain::Reference, errors::CompileError};
use crate::metadata::Assembly;

/// Loaded reference assemblies keyed by the blake3 hash of their image.
///
/// Owned by a compiler instance (or shared between instances through an
/// `Arc`). Only fully decoded assemblies are inserted, so a cancelled compile
/// never leaves a partial entry behind.
#[derive(Debug, Default)]
pub struct MetadataCache {
    entries: DashMap<[u8; 32], Arc<Assembly>>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self, reference: &Reference) -> Result<Arc<Assembly>, CompileError> {
        if reference.name.trim().is_empty() {
            return Err(CompileError::InvalidReference {
                name: reference.name.clone(),
                msg: "reference name must not be empty".to_string(),
            });
        }

        let key = *blake3::hash(&reference.body).as_bytes();
        if let Some(hit) = self.entries.get(&key) {
            tracing::trace!("Metadata cache hit for {}", reference.name);
            return Ok(hit.value().clone());
        }

        let assembly = Assembly::load(&reference.body).map_err(|e| CompileError::InvalidReference {
            name: reference.name.clone(),
            msg: e.to_string(),
        })?;
        let assembly = Arc::new(assembly);
        self.entries.insert(key, assembly.clone());
        tracing::debug!("Loaded reference {} into metadata cache", reference.name);
        Ok(assembly)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
