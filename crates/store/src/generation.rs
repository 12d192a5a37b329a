//! Two-generation values: one being built by the current pass, one published to readers.
//!
//! Readers only ever see a whole generation. `commit` replaces the published
//! value with a single pointer store and starts an empty building value.

use std::sync::Arc;

use arc_swap::ArcSwap;

/// A published generation. Epoch 0 means nothing has been committed yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Published<T> {
    pub epoch: u64,
    pub data: T,
}

pub struct Generational<T> {
    building: T,
    published: Arc<ArcSwap<Published<T>>>,
}

impl<T: Default> Default for Generational<T> {
    fn default() -> Self { Self::new() }
}

impl<T: Default> Generational<T> {
    pub fn new() -> Self {
        Self {
            building: T::default(),
            published: Arc::new(ArcSwap::from_pointee(Published { epoch: 0, data: T::default() })),
        }
    }

    pub fn building(&self) -> &T { &self.building }
    pub fn building_mut(&mut self) -> &mut T { &mut self.building }

    /// Publish the building value and start an empty one. Returns the new epoch.
    pub fn commit(&mut self) -> u64 {
        let data = std::mem::take(&mut self.building);
        let epoch = self.published.load().epoch + 1;
        self.published.store(Arc::new(Published { epoch, data }));
        epoch
    }

    pub fn published(&self) -> Arc<Published<T>> { self.published.load_full() }

    pub fn epoch(&self) -> u64 { self.published.load().epoch }

    pub fn reader(&self) -> GenerationReader<T> { GenerationReader { inner: Arc::clone(&self.published) } }
}

impl<T: Clone> Generational<T> {
    /// Copy of the building value, tagged with the epoch it will be published as.
    pub fn building_snapshot(&self) -> Published<T> {
        Published { epoch: self.published.load().epoch + 1, data: self.building.clone() }
    }
}

/// Read-only handle on the published generation, usable from other tasks.
pub struct GenerationReader<T> {
    inner: Arc<ArcSwap<Published<T>>>,
}

impl<T> Clone for GenerationReader<T> {
    fn clone(&self) -> Self { Self { inner: Arc::clone(&self.inner) } }
}

impl<T> GenerationReader<T> {
    pub fn load(&self) -> Arc<Published<T>> { self.inner.load_full() }
    pub fn epoch(&self) -> u64 { self.inner.load().epoch }
}
