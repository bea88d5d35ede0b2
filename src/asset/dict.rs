use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

use super::Identified;

struct Slot<K, V> {
    entry: Option<(K, V)>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Insertion-ordered cache mapping keys to handle values.
///
/// Inserting an existing key is a no-op, so the first writer wins. Removal
/// unlinks the slot and puts it on a free list; later inserts reuse it but
/// are appended at the end of the iteration order. Capacity therefore stays
/// bounded by the peak number of live entries.
pub struct HandleDict<K, V> {
    index: HashMap<K, usize>,
    slots: Vec<Slot<K, V>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<K: Eq + Hash + Clone, V> HandleDict<K, V> {
    pub fn new() -> Self {
        Self {
            index: HashMap::new(),
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
        }
    }

    /// Returns `false` (and drops `value`) when `key` is already present.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        if self.index.contains_key(&key) {
            return false;
        }

        let slot = Slot {
            entry: Some((key.clone(), value)),
            prev: self.tail,
            next: None,
        };
        let position = match self.free.pop() {
            Some(position) => {
                self.slots[position] = slot;
                position
            }
            None => {
                self.slots.push(slot);
                self.slots.len() - 1
            }
        };

        match self.tail {
            Some(tail) => self.slots[tail].next = Some(position),
            None => self.head = Some(position),
        }
        self.tail = Some(position);
        self.index.insert(key, position);
        true
    }

    pub fn find<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let position = *self.index.get(key)?;
        self.slots[position].entry.as_ref().map(|(_, value)| value)
    }

    pub fn find_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let position = *self.index.get(key)?;
        self.slots[position].entry.as_mut().map(|(_, value)| value)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.contains_key(key)
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let position = self.index.remove(key)?;
        Some(self.release(position))
    }

    /// Removes the first entry (in insertion order) whose value equals `value`.
    pub fn remove_value(&mut self, value: &V) -> Option<V>
    where
        V: PartialEq,
    {
        let key = self
            .iter()
            .find(|(_, candidate)| *candidate == value)
            .map(|(key, _)| key.clone())?;
        self.remove(&key)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of slots ever allocated, live or free.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            slots: &self.slots,
            cursor: self.head,
            remaining: self.index.len(),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(key, _)| key)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, value)| value)
    }

    fn release(&mut self, position: usize) -> V {
        let (prev, next) = {
            let slot = &self.slots[position];
            (slot.prev, slot.next)
        };
        match prev {
            Some(prev) => self.slots[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.slots[next].prev = prev,
            None => self.tail = prev,
        }

        let slot = &mut self.slots[position];
        slot.prev = None;
        slot.next = None;
        self.free.push(position);
        match slot.entry.take() {
            Some((_, value)) => value,
            None => unreachable!("indexed slot {position} holds no entry"),
        }
    }
}

impl<K: Eq + Hash + Clone, V> Default for HandleDict<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Iter<'a, K, V> {
    slots: &'a [Slot<K, V>],
    cursor: Option<usize>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let position = self.cursor?;
        let slot = &self.slots[position];
        self.cursor = slot.next;
        self.remaining = self.remaining.saturating_sub(1);
        slot.entry.as_ref().map(|(key, value)| (key, value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

/// Handle registry keyed by each handle's own identifier.
pub struct HandlePool<T> {
    handles: HandleDict<u64, T>,
}

impl<T: Identified> HandlePool<T> {
    pub fn new() -> Self {
        Self {
            handles: HandleDict::new(),
        }
    }

    pub fn insert(&mut self, handle: T) -> bool {
        self.handles.insert(handle.identifier(), handle)
    }

    pub fn find(&self, identifier: u64) -> Option<&T> {
        self.handles.find(&identifier)
    }

    pub fn contains(&self, identifier: u64) -> bool {
        self.handles.contains_key(&identifier)
    }

    pub fn remove(&mut self, handle: &T) -> Option<T> {
        self.handles.remove(&handle.identifier())
    }

    pub fn remove_identifier(&mut self, identifier: u64) -> Option<T> {
        self.handles.remove(&identifier)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.handles.values()
    }
}

impl<T: Identified> Default for HandlePool<T> {
    fn default() -> Self {
        Self::new()
    }
}
