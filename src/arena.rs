use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// Handle to an item stored in an [`Arena`].
///
/// Handles are plain integers, so node links in the hash table chains and the
/// tree are `Copy` and never dangle: the arena only grows.
pub struct NodeId<T> {
    index: u32,
    marker: PhantomData<fn() -> T>,
}

impl<T> NodeId<T> {
    fn new(index: usize) -> Self {
        assert!(
            index <= u32::MAX as usize,
            "arena holds more than {} items",
            u32::MAX
        );
        NodeId {
            index: index as u32,
            marker: PhantomData,
        }
    }

    pub fn index(self) -> usize {
        self.index as usize
    }
}

impl<T> Clone for NodeId<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for NodeId<T> {}

impl<T> PartialEq for NodeId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for NodeId<T> {}

impl<T> std::fmt::Debug for NodeId<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeId({})", self.index)
    }
}

/// Append-only storage for the lifetime of a run. Items are never freed
/// individually; the whole arena goes away when it is dropped.
pub struct Arena<T> {
    items: Vec<T>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Arena { items: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Arena {
            items: Vec::with_capacity(capacity),
        }
    }

    pub fn alloc(&mut self, item: T) -> NodeId<T> {
        let id = NodeId::new(self.items.len());
        self.items.push(item);
        id
    }

    pub fn get(&self, id: NodeId<T>) -> &T {
        &self.items[id.index()]
    }

    pub fn get_mut(&mut self, id: NodeId<T>) -> &mut T {
        &mut self.items[id.index()]
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Index<NodeId<T>> for Arena<T> {
    type Output = T;

    fn index(&self, id: NodeId<T>) -> &T {
        self.get(id)
    }
}

impl<T> IndexMut<NodeId<T>> for Arena<T> {
    fn index_mut(&mut self, id: NodeId<T>) -> &mut T {
        self.get_mut(id)
    }
}
