use slotmap::{DefaultKey, SlotMap};

use super::Handle;

/// Owning arena behind every handle kind. Freed slots are reused with a
/// bumped generation, so stale handles fail to resolve instead of aliasing.
pub struct AssetCache<T> {
    items: SlotMap<DefaultKey, T>,
}

impl<T> AssetCache<T> {
    pub fn new() -> Self {
        Self {
            items: SlotMap::new(),
        }
    }

    pub fn insert(&mut self, item: T) -> Handle<T> {
        Handle::from_key(self.items.insert(item))
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        self.items.get(handle.key())
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.items.get_mut(handle.key())
    }

    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        self.items.remove(handle.key())
    }

    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.items.contains_key(handle.key())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.items.iter().map(|(key, item)| (Handle::from_key(key), item))
    }

    pub fn handles(&self) -> Vec<Handle<T>> {
        self.items.keys().map(Handle::from_key).collect()
    }

    pub fn drain(&mut self) -> Vec<(Handle<T>, T)> {
        self.items
            .drain()
            .map(|(key, item)| (Handle::from_key(key), item))
            .collect()
    }
}

impl<T> Default for AssetCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
