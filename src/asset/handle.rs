use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use slotmap::{DefaultKey, Key};

/// Anything that can be looked up by a stable 64-bit identifier.
///
/// Identifier `0` is reserved for the null value of every handle kind.
pub trait Identified {
    fn identifier(&self) -> u64;

    fn is_null(&self) -> bool {
        self.identifier() == 0
    }
}

/// Generational key into an [`AssetCache`](super::AssetCache).
///
/// Copying a handle never copies the value it points at. A handle whose slot
/// has been freed (or reused) simply stops resolving.
pub struct Handle<T> {
    key: DefaultKey,
    _marker: PhantomData<fn() -> T>,
}

// Manually implement Clone without requiring T: Clone
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

// Manually implement Copy without requiring T: Copy
impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Handle(null)")
        } else {
            write!(f, "Handle({:#x})", self.identifier())
        }
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> Handle<T> {
    pub(crate) fn from_key(key: DefaultKey) -> Self {
        Self {
            key,
            _marker: PhantomData,
        }
    }

    pub(crate) fn key(self) -> DefaultKey {
        self.key
    }

    pub fn null() -> Self {
        Self::from_key(DefaultKey::null())
    }

    pub fn is_null(self) -> bool {
        self.key.is_null()
    }

    /// Packed slot index and generation; `0` only for the null handle.
    pub fn identifier(self) -> u64 {
        if self.key.is_null() {
            0
        } else {
            self.key.data().as_ffi()
        }
    }
}

impl<T> Identified for Handle<T> {
    fn identifier(&self) -> u64 {
        Handle::identifier(*self)
    }
}
