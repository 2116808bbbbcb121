//! Weak-AVL multimap from `u32` keys to chains of `u32` values.
//!
//! The tree only grows. Ranks follow the weak-AVL rules for insertion: every
//! rank difference is 1 or 2, leaves have rank 0 and missing children count as
//! rank -1. Equal keys do not create nodes; their values are appended to the
//! existing node's chain in insertion order.
//!
//! [`WavlTree::freeze`] consumes the tree and threads every node onto a doubly
//! linked list between a bottom and a top sentinel, fixing the traversal order
//! once. A frozen tree can only be walked, so inserting after freezing is a
//! compile error rather than a runtime one.

use std::cmp::Ordering;

use crate::arena::{Arena, NodeId};

type NodeHandle = NodeId<Node>;
type LinkHandle = NodeId<Link>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Lowest key first.
    Ascending,
    /// Highest key first.
    Descending,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sentinel {
    Bottom,
    Top,
}

struct Link {
    value: u32,
    next: Option<LinkHandle>,
}

struct Chain {
    head: LinkHandle,
    tail: LinkHandle,
}

struct Node {
    key: u32,
    rank: u8,
    parent: Option<NodeHandle>,
    left: Option<NodeHandle>,
    right: Option<NodeHandle>,
    // None only for the sentinels
    chain: Option<Chain>,
    prev: Option<NodeHandle>,
    next: Option<NodeHandle>,
}

impl Node {
    fn new(key: u32, chain: Option<Chain>, parent: Option<NodeHandle>) -> Self {
        Node {
            key,
            rank: 0,
            parent,
            left: None,
            right: None,
            chain,
            prev: None,
            next: None,
        }
    }
}

pub struct WavlTree {
    nodes: Arena<Node>,
    links: Arena<Link>,
    root: Option<NodeHandle>,
}

impl Default for WavlTree {
    fn default() -> Self {
        Self::new()
    }
}

impl WavlTree {
    pub fn new() -> Self {
        WavlTree {
            nodes: Arena::new(),
            links: Arena::new(),
            root: None,
        }
    }

    /// Pre-sizes the node and value arenas.
    pub fn with_capacity(keys: usize, values: usize) -> Self {
        WavlTree {
            nodes: Arena::with_capacity(keys + 2),
            links: Arena::with_capacity(values),
            root: None,
        }
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Number of values across all keys.
    pub fn value_count(&self) -> usize {
        self.links.len()
    }

    pub fn insert(&mut self, key: u32, value: u32) {
        let Some(mut current) = self.root else {
            let chain = self.new_chain(value);
            self.root = Some(self.nodes.alloc(Node::new(key, Some(chain), None)));
            return;
        };

        loop {
            let node = &self.nodes[current];
            let child = match key.cmp(&node.key) {
                Ordering::Equal => {
                    self.append_value(current, value);
                    return;
                }
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
            };
            match child {
                Some(child) => current = child,
                None => {
                    let chain = self.new_chain(value);
                    let leaf = self.nodes.alloc(Node::new(key, Some(chain), Some(current)));
                    if key < self.nodes[current].key {
                        self.nodes[current].left = Some(leaf);
                    } else {
                        self.nodes[current].right = Some(leaf);
                    }
                    self.rebalance_after_insert(leaf);
                    return;
                }
            }
        }
    }

    fn new_chain(&mut self, value: u32) -> Chain {
        let link = self.links.alloc(Link { value, next: None });
        Chain {
            head: link,
            tail: link,
        }
    }

    fn append_value(&mut self, node: NodeHandle, value: u32) {
        let link = self.links.alloc(Link { value, next: None });
        if let Some(chain) = self.nodes[node].chain.as_mut() {
            let tail = chain.tail;
            chain.tail = link;
            self.links[tail].next = Some(link);
        }
    }

    fn rank(&self, node: Option<NodeHandle>) -> i32 {
        node.map_or(-1, |id| i32::from(self.nodes[id].rank))
    }

    fn promote(&mut self, node: NodeHandle) {
        self.nodes[node].rank += 1;
    }

    fn demote(&mut self, node: NodeHandle) {
        self.nodes[node].rank -= 1;
    }

    fn is_left_child(&self, node: NodeHandle, parent: NodeHandle) -> bool {
        self.nodes[parent].left == Some(node)
    }

    /// Walks up from a freshly inserted leaf while it is a 0-child, promoting
    /// parents whose other child is a 1-child and rotating once a parent is a
    /// 0,2 node.
    fn rebalance_after_insert(&mut self, leaf: NodeHandle) {
        let mut node = leaf;
        while let Some(parent) = self.nodes[node].parent {
            let parent_rank = self.rank(Some(parent));
            if parent_rank != self.rank(Some(node)) {
                break;
            }

            let node_is_left = self.is_left_child(node, parent);
            let sibling = if node_is_left {
                self.nodes[parent].right
            } else {
                self.nodes[parent].left
            };

            if parent_rank - self.rank(sibling) == 1 {
                self.promote(parent);
                node = parent;
                continue;
            }

            let inner = if node_is_left {
                self.nodes[node].right
            } else {
                self.nodes[node].left
            };

            match inner {
                Some(inner) if self.rank(Some(node)) - self.rank(Some(inner)) == 1 => {
                    if node_is_left {
                        self.rotate_left(node);
                        self.rotate_right(parent);
                    } else {
                        self.rotate_right(node);
                        self.rotate_left(parent);
                    }
                    self.promote(inner);
                    self.demote(node);
                    self.demote(parent);
                }
                _ => {
                    if node_is_left {
                        self.rotate_right(parent);
                    } else {
                        self.rotate_left(parent);
                    }
                    self.demote(parent);
                }
            }
            break;
        }
    }

    fn replace_child(&mut self, parent: Option<NodeHandle>, old: NodeHandle, new: NodeHandle) {
        self.nodes[new].parent = parent;
        match parent {
            None => self.root = Some(new),
            Some(parent) => {
                if self.nodes[parent].left == Some(old) {
                    self.nodes[parent].left = Some(new);
                } else {
                    self.nodes[parent].right = Some(new);
                }
            }
        }
    }

    fn rotate_right(&mut self, node: NodeHandle) {
        let Some(pivot) = self.nodes[node].left else {
            return;
        };
        let inner = self.nodes[pivot].right;
        self.nodes[node].left = inner;
        if let Some(inner) = inner {
            self.nodes[inner].parent = Some(node);
        }
        let parent = self.nodes[node].parent;
        self.replace_child(parent, node, pivot);
        self.nodes[pivot].right = Some(node);
        self.nodes[node].parent = Some(pivot);
    }

    fn rotate_left(&mut self, node: NodeHandle) {
        let Some(pivot) = self.nodes[node].right else {
            return;
        };
        let inner = self.nodes[pivot].left;
        self.nodes[node].right = inner;
        if let Some(inner) = inner {
            self.nodes[inner].parent = Some(node);
        }
        let parent = self.nodes[node].parent;
        self.replace_child(parent, node, pivot);
        self.nodes[pivot].left = Some(node);
        self.nodes[node].parent = Some(pivot);
    }

    /// Threads the nodes in `direction` order between the two sentinels.
    pub fn freeze(mut self, direction: Direction) -> FrozenWavlTree {
        let len = self.nodes.len();
        let value_count = self.links.len();
        let bottom = self.nodes.alloc(Node::new(0, None, None));
        let top = self.nodes.alloc(Node::new(0, None, None));

        let mut last = bottom;
        let mut stack = Vec::new();
        let mut cursor = self.root;
        loop {
            while let Some(node) = cursor {
                stack.push(node);
                cursor = match direction {
                    Direction::Ascending => self.nodes[node].left,
                    Direction::Descending => self.nodes[node].right,
                };
            }
            let Some(node) = stack.pop() else {
                break;
            };
            self.nodes[last].next = Some(node);
            self.nodes[node].prev = Some(last);
            last = node;
            cursor = match direction {
                Direction::Ascending => self.nodes[node].right,
                Direction::Descending => self.nodes[node].left,
            };
        }
        self.nodes[last].next = Some(top);
        self.nodes[top].prev = Some(last);

        FrozenWavlTree {
            nodes: self.nodes,
            links: self.links,
            bottom,
            top,
            len,
            value_count,
        }
    }

    #[cfg(test)]
    fn height(&self) -> usize {
        fn walk(tree: &WavlTree, node: Option<NodeHandle>) -> usize {
            node.map_or(0, |id| {
                1 + walk(tree, tree.nodes[id].left).max(walk(tree, tree.nodes[id].right))
            })
        }
        walk(self, self.root)
    }

    /// Checks ordering, parent links and the weak-AVL rank rules.
    #[cfg(test)]
    fn assert_valid(&self) {
        fn walk(tree: &WavlTree, node: NodeHandle, lo: Option<u32>, hi: Option<u32>) {
            let n = &tree.nodes[node];
            assert!(lo.map_or(true, |lo| n.key > lo), "order violated");
            assert!(hi.map_or(true, |hi| n.key < hi), "order violated");
            for child in [n.left, n.right] {
                let diff = tree.rank(Some(node)) - tree.rank(child);
                assert!(diff == 1 || diff == 2, "rank difference {diff}");
                if let Some(child) = child {
                    assert_eq!(tree.nodes[child].parent, Some(node));
                }
            }
            if n.left.is_none() && n.right.is_none() {
                assert_eq!(n.rank, 0, "leaf with non-zero rank");
            }
            if let Some(left) = n.left {
                walk(tree, left, lo, Some(n.key));
            }
            if let Some(right) = n.right {
                walk(tree, right, Some(n.key), hi);
            }
        }
        if let Some(root) = self.root {
            assert_eq!(self.nodes[root].parent, None);
            walk(self, root, None, None);
        }
    }
}

/// A tree whose traversal order has been fixed by [`WavlTree::freeze`].
pub struct FrozenWavlTree {
    nodes: Arena<Node>,
    links: Arena<Link>,
    bottom: NodeHandle,
    top: NodeHandle,
    len: usize,
    value_count: usize,
}

impl FrozenWavlTree {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn value_count(&self) -> usize {
        self.value_count
    }

    /// Walks the frozen list starting next to `sentinel`: forwards from the
    /// bottom, backwards from the top. The sentinels themselves are never
    /// yielded.
    pub fn traverse_from(&self, sentinel: Sentinel) -> Traverse<'_> {
        let (cursor, forward) = match sentinel {
            Sentinel::Bottom => (self.nodes[self.bottom].next, true),
            Sentinel::Top => (self.nodes[self.top].prev, false),
        };
        Traverse {
            tree: self,
            cursor,
            forward,
        }
    }

    /// Nodes in frozen order.
    pub fn iter(&self) -> Traverse<'_> {
        self.traverse_from(Sentinel::Bottom)
    }

    /// Every value in frozen order, each key's chain in insertion order.
    pub fn values(&self) -> impl Iterator<Item = u32> + '_ {
        self.iter().flat_map(|node| node.values())
    }
}

pub struct Traverse<'a> {
    tree: &'a FrozenWavlTree,
    cursor: Option<NodeHandle>,
    forward: bool,
}

impl<'a> Iterator for Traverse<'a> {
    type Item = NodeRef<'a>;

    fn next(&mut self) -> Option<NodeRef<'a>> {
        let id = self.cursor?;
        let node = &self.tree.nodes[id];
        // only the sentinels have no chain
        node.chain.as_ref()?;
        self.cursor = if self.forward { node.next } else { node.prev };
        Some(NodeRef {
            tree: self.tree,
            id,
        })
    }
}

#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    tree: &'a FrozenWavlTree,
    id: NodeHandle,
}

impl<'a> NodeRef<'a> {
    pub fn key(&self) -> u32 {
        self.tree.nodes[self.id].key
    }

    /// The value chain for this key, in insertion order.
    pub fn values(&self) -> Values<'a> {
        Values {
            links: &self.tree.links,
            cursor: self.tree.nodes[self.id].chain.as_ref().map(|chain| chain.head),
        }
    }
}

pub struct Values<'a> {
    links: &'a Arena<Link>,
    cursor: Option<LinkHandle>,
}

impl Iterator for Values<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let link = &self.links[self.cursor?];
        self.cursor = link.next;
        Some(link.value)
    }
}
