//! Scene graph seam and the in-memory scene used by headless peers.
//!
//! The replication layer never owns drawable objects. It talks to whatever
//! holds them through [`SceneGraph`]: materialize a shape, update it in
//! place, remove it, or read its current state back. Handles are opaque to
//! the engine; the mapping to stable object ids lives in the engine.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;

use frames::Shape;

/// Editable scene graph driven by the reconciliation engine.
pub trait SceneGraph {
    /// Scene-local reference to one object. Not stable across processes.
    type Handle: Copy + Eq + Hash + fmt::Debug;

    /// Create a new object from `shape` and return its handle.
    fn materialize(&mut self, shape: &Shape) -> Self::Handle;

    /// Overwrite the mutable attributes of an existing object.
    ///
    /// Returns `false` when the object is gone or cannot take the new shape
    /// in place (for example, a kind change); the caller then recreates it.
    fn update_in_place(&mut self, handle: Self::Handle, shape: &Shape) -> bool;

    fn remove(&mut self, handle: Self::Handle);

    /// Current state of `handle`, or `None` if it no longer exists.
    fn serialize(&self, handle: Self::Handle) -> Option<Shape>;

    /// Every object currently in the scene, in draw order.
    fn handles(&self) -> Vec<Self::Handle>;
}

/// Handle into a [`MemoryScene`]. Allocated in increasing order, so handle
/// order is creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SceneHandle(u64);

impl fmt::Display for SceneHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Scene graph kept entirely in memory. Used by the CLI peer and in tests.
#[derive(Debug, Default)]
pub struct MemoryScene {
    next: u64,
    objects: BTreeMap<SceneHandle, Shape>,
}

impl MemoryScene {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a shape as a local user action would.
    pub fn add(&mut self, shape: Shape) -> SceneHandle {
        self.next += 1;
        let handle = SceneHandle(self.next);
        self.objects.insert(handle, shape);
        handle
    }

    #[must_use]
    pub fn get(&self, handle: SceneHandle) -> Option<&Shape> {
        self.objects.get(&handle)
    }

    /// Mutate a shape in place. Returns `false` if the handle is unknown.
    pub fn modify(&mut self, handle: SceneHandle, f: impl FnOnce(&mut Shape)) -> bool {
        match self.objects.get_mut(&handle) {
            Some(shape) => {
                f(shape);
                true
            }
            None => false,
        }
    }

    /// Replace a shape wholesale, whatever its kind.
    pub fn replace(&mut self, handle: SceneHandle, shape: Shape) -> bool {
        self.modify(handle, |current| *current = shape)
    }

    pub fn delete(&mut self, handle: SceneHandle) -> Option<Shape> {
        self.objects.remove(&handle)
    }

    /// Objects in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (SceneHandle, &Shape)> {
        self.objects.iter().map(|(h, s)| (*h, s))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl SceneGraph for MemoryScene {
    type Handle = SceneHandle;

    fn materialize(&mut self, shape: &Shape) -> SceneHandle {
        self.add(shape.clone())
    }

    fn update_in_place(&mut self, handle: SceneHandle, shape: &Shape) -> bool {
        match self.objects.get_mut(&handle) {
            Some(current) if current.kind() == shape.kind() => {
                *current = shape.clone();
                true
            }
            _ => false,
        }
    }

    fn remove(&mut self, handle: SceneHandle) {
        self.objects.remove(&handle);
    }

    fn serialize(&self, handle: SceneHandle) -> Option<Shape> {
        self.objects.get(&handle).cloned()
    }

    fn handles(&self) -> Vec<SceneHandle> {
        self.objects.keys().copied().collect()
    }
}

#[cfg(test)]
#[path = "scene_test.rs"]
mod tests;
