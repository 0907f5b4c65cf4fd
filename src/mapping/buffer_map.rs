//! Per-buffer cache of derived resources.

use crate::capture::BufferId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Caches a value derived from each capture buffer.
///
/// Buffers circulate, so anything expensive to build from one (an
/// inference tensor, a mapped view) only needs building once per id. The
/// map is owned by whoever creates the derived values and is cleared
/// together with the stream.
#[derive(Debug)]
pub struct BufferMap<V> {
    entries: Mutex<HashMap<BufferId, Arc<V>>>,
}

impl<V> Default for BufferMap<V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<V> BufferMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached value for `id`, building it with `init` on first
    /// use.
    ///
    /// A failed `init` leaves the map unchanged.
    pub fn get_or_try_insert_with<E>(
        &self,
        id: BufferId,
        init: impl FnOnce() -> Result<V, E>,
    ) -> Result<Arc<V>, E> {
        let mut entries = self.entries.lock();
        if let Some(value) = entries.get(&id) {
            return Ok(Arc::clone(value));
        }
        let value = Arc::new(init()?);
        entries.insert(id, Arc::clone(&value));
        tracing::debug!(%id, cached = entries.len(), "Buffer mapping created");
        Ok(value)
    }

    pub fn get(&self, id: BufferId) -> Option<Arc<V>> {
        self.entries.lock().get(&id).cloned()
    }

    /// Forgets the mapping for `id`.
    pub fn remove(&self, id: BufferId) -> Option<Arc<V>> {
        self.entries.lock().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drops every mapping.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
