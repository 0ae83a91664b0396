//! The process-local descriptor cache.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::RwLock;

use tracing::warn;

use crate::builder::SchemaBuilder;
use crate::descriptor::TypeRef;
use crate::error::SchemaResult;
use crate::storable::Storable;

#[derive(Default)]
pub(crate) struct RegistryState {
    pub(crate) by_type: HashMap<TypeId, TypeRef>,
    pub(crate) by_name: HashMap<&'static str, TypeId>,
}

/// Cache of type descriptors, keyed by concrete type.
///
/// Owned by whoever constructs it (normally the store) rather than living in
/// a global, so independent stores and tests never share state.
pub struct SchemaRegistry {
    state: RwLock<RegistryState>,
}

impl SchemaRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Descriptor for `T`, built on first use.
    ///
    /// Concurrent first uses of the same type serialize on the registry's
    /// exclusive lock; the loser of the race finds the winner's descriptor.
    pub fn describe<T: Storable>(&self) -> SchemaResult<TypeRef> {
        let id = TypeId::of::<T>();
        if let Some(found) = self.lookup(&id) {
            return Ok(found);
        }

        let mut state = self.state.write().expect("schema registry lock poisoned");
        if let Some(found) = state.by_type.get(&id) {
            return Ok(found.clone());
        }

        let mut builder = SchemaBuilder::new(&mut state);
        match builder.resolve::<T>() {
            Ok(handle) => Ok(handle),
            Err(e) => {
                warn!(type_name = T::type_name(), error = %e, "descriptor build failed");
                builder.rollback();
                Err(e)
            }
        }
    }

    /// Descriptor of an already registered type, by logical name.
    pub fn by_name(&self, name: &str) -> Option<TypeRef> {
        let state = self.state.read().expect("schema registry lock poisoned");
        state
            .by_name
            .get(name)
            .and_then(|id| state.by_type.get(id))
            .cloned()
    }

    /// Logical names of all registered types, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let state = self.state.read().expect("schema registry lock poisoned");
        let mut names: Vec<&'static str> = state.by_name.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Number of registered types (including scalar element types).
    pub fn len(&self) -> usize {
        self.state
            .read()
            .expect("schema registry lock poisoned")
            .by_type
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, id: &TypeId) -> Option<TypeRef> {
        self.state
            .read()
            .expect("schema registry lock poisoned")
            .by_type
            .get(id)
            .cloned()
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("types", &self.names())
            .finish()
    }
}
