//! Persistent argument list.
//!
//! [`ArgList`] is an immutable, structurally shared sequence: a
//! bit-partitioned trie with branching factor 32 plus a tail buffer of up
//! to 32 items.  Every "mutation" returns a new list; the receiver is never
//! touched, and the untouched parts of the trie are shared between the old
//! and the new list.
//!
//! | Operation | Cost |
//! |-----------|------|
//! | [`ArgList::get`] | O(log₃₂ n) |
//! | [`ArgList::push`] / [`ArgList::append`] | amortised O(1) per item |
//! | [`ArgList::set`] | O(log₃₂ n), copies the root-to-leaf path only |
//! | [`ArgList::iter`] / [`ArgList::range`] | O(n) |
//! | [`ArgList::tail`] / [`ArgList::reverse`] | O(n), new storage |

use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;

const BITS: u32 = 5;
const WIDTH: usize = 1 << BITS;
const MASK: usize = WIDTH - 1;

// ── Trie nodes ────────────────────────────────────────────────────────────────

enum Node<T> {
    Branch(Vec<Arc<Node<T>>>),
    /// Always exactly `WIDTH` items.
    Leaf(Vec<T>),
}

impl<T> Node<T> {
    fn children(&self) -> &[Arc<Node<T>>] {
        match self {
            Node::Branch(children) => children,
            Node::Leaf(_) => &[],
        }
    }
}

/// Wrap `node` in single-child branches until it sits `level` bits deep.
fn new_path<T>(level: u32, node: Arc<Node<T>>) -> Arc<Node<T>> {
    if level == 0 {
        node
    } else {
        Arc::new(Node::Branch(vec![new_path(level - BITS, node)]))
    }
}

/// Copy the rightmost path of `parent` and hang `leaf` off its end.
/// `len` is the list length before the push (the full tail included).
fn push_tail<T>(len: usize, level: u32, parent: &Node<T>, leaf: Arc<Node<T>>) -> Arc<Node<T>> {
    let sub_idx = ((len - 1) >> level) & MASK;
    let mut children = parent.children().to_vec();
    let node = if level == BITS {
        leaf
    } else if let Some(child) = children.get(sub_idx) {
        push_tail(len, level - BITS, child, leaf)
    } else {
        new_path(level - BITS, leaf)
    };
    if sub_idx < children.len() {
        children[sub_idx] = node;
    } else {
        children.push(node);
    }
    Arc::new(Node::Branch(children))
}

fn assoc<T: Clone>(level: u32, node: &Node<T>, index: usize, value: T) -> Arc<Node<T>> {
    match node {
        Node::Leaf(items) => {
            let mut items = items.clone();
            items[index & MASK] = value;
            Arc::new(Node::Leaf(items))
        }
        Node::Branch(children) => {
            let sub_idx = (index >> level) & MASK;
            let mut copied = children.clone();
            copied[sub_idx] = assoc(level - BITS, &children[sub_idx], index, value);
            Arc::new(Node::Branch(copied))
        }
    }
}

// ── ArgList ───────────────────────────────────────────────────────────────────

/// An immutable ordered sequence with structural sharing.
pub struct ArgList<T> {
    len: usize,
    shift: u32,
    root: Arc<Node<T>>,
    tail: Arc<Vec<T>>,
}

impl<T> Clone for ArgList<T> {
    fn clone(&self) -> Self {
        ArgList {
            len: self.len,
            shift: self.shift,
            root: Arc::clone(&self.root),
            tail: Arc::clone(&self.tail),
        }
    }
}

impl<T> ArgList<T> {
    /// The empty list.  All empty lists compare equal.
    pub fn nil() -> Self {
        ArgList {
            len: 0,
            shift: BITS,
            root: Arc::new(Node::Branch(Vec::new())),
            tail: Arc::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_nil(&self) -> bool {
        self.len == 0
    }

    pub fn is_empty(&self) -> bool {
        self.is_nil()
    }

    fn tail_offset(&self) -> usize {
        if self.len < WIDTH {
            0
        } else {
            ((self.len - 1) >> BITS) << BITS
        }
    }

    /// The 32-item chunk holding position `index`.
    fn chunk_for(&self, index: usize) -> &[T] {
        if index >= self.tail_offset() {
            return &self.tail;
        }
        let mut node: &Node<T> = &self.root;
        let mut level = self.shift;
        loop {
            match node {
                Node::Branch(children) => {
                    node = &children[(index >> level) & MASK];
                    level = level.saturating_sub(BITS);
                }
                Node::Leaf(items) => return items,
            }
        }
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len {
            return None;
        }
        Some(&self.chunk_for(index)[index & MASK])
    }

    /// First item, if any.
    pub fn head(&self) -> Option<&T> {
        self.get(0)
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter { list: self, index: 0, chunk: &[] }
    }

    /// Visit items in order until `visit` breaks.
    pub fn range<B>(&self, mut visit: impl FnMut(&T) -> ControlFlow<B>) -> ControlFlow<B> {
        for item in self.iter() {
            if let ControlFlow::Break(b) = visit(item) {
                return ControlFlow::Break(b);
            }
        }
        ControlFlow::Continue(())
    }
}

impl<T: Clone> ArgList<T> {
    /// Append in place.  Only storage uniquely owned by `self` is written;
    /// anything shared with another list is copied first.
    fn push_mut(&mut self, value: T) {
        if self.len - self.tail_offset() == WIDTH {
            let full = std::mem::replace(&mut self.tail, Arc::new(Vec::with_capacity(WIDTH)));
            let items = Arc::try_unwrap(full).unwrap_or_else(|shared| (*shared).clone());
            let leaf = Arc::new(Node::Leaf(items));
            if (self.len >> BITS) > (1 << self.shift) {
                let path = new_path(self.shift, leaf);
                self.root = Arc::new(Node::Branch(vec![Arc::clone(&self.root), path]));
                self.shift += BITS;
            } else {
                self.root = push_tail(self.len, self.shift, &self.root, leaf);
            }
        }
        Arc::make_mut(&mut self.tail).push(value);
        self.len += 1;
    }

    /// A new list with `value` added at the end.
    pub fn push(&self, value: T) -> Self {
        let mut out = self.clone();
        out.push_mut(value);
        out
    }

    /// A new list with every item of `values` added at the end, in order.
    pub fn append(&self, values: impl IntoIterator<Item = T>) -> Self {
        let mut out = self.clone();
        for value in values {
            out.push_mut(value);
        }
        out
    }

    /// A new list with position `index` replaced, or `None` if out of bounds.
    pub fn set(&self, index: usize, value: T) -> Option<Self> {
        if index >= self.len {
            return None;
        }
        let mut out = self.clone();
        if index >= self.tail_offset() {
            Arc::make_mut(&mut out.tail)[index & MASK] = value;
        } else {
            out.root = assoc(self.shift, &self.root, index, value);
        }
        Some(out)
    }

    /// Everything but the first item.  The tail of nil is nil.
    pub fn tail(&self) -> Self {
        self.iter().skip(1).cloned().collect()
    }

    /// The same items in reverse order, in fresh storage.
    pub fn reverse(&self) -> Self {
        let mut items = self.to_vec();
        items.reverse();
        items.into_iter().collect()
    }

    /// Copy the items out into a `Vec`.
    pub fn to_vec(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.len);
        let mut index = 0;
        while index < self.len {
            let chunk = self.chunk_for(index);
            let take = chunk.len().min(self.len - index);
            out.extend_from_slice(&chunk[..take]);
            index += take;
        }
        out
    }
}

impl<T> Default for ArgList<T> {
    fn default() -> Self {
        Self::nil()
    }
}

impl<T: Clone> FromIterator<T> for ArgList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut out = ArgList::nil();
        for value in iter {
            out.push_mut(value);
        }
        out
    }
}

impl<T: Clone> From<Vec<T>> for ArgList<T> {
    fn from(items: Vec<T>) -> Self {
        items.into_iter().collect()
    }
}

impl<T: PartialEq> PartialEq for ArgList<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl<T: fmt::Debug> fmt::Debug for ArgList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

// ── Iteration ─────────────────────────────────────────────────────────────────

/// Borrowing iterator; walks the trie once per 32-item chunk.
pub struct Iter<'a, T> {
    list: &'a ArgList<T>,
    index: usize,
    chunk: &'a [T],
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.index >= self.list.len {
            return None;
        }
        if self.index & MASK == 0 || self.chunk.is_empty() {
            self.chunk = self.list.chunk_for(self.index);
        }
        let item = &self.chunk[self.index & MASK];
        self.index += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.list.len - self.index;
        (left, Some(left))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<'a, T> IntoIterator for &'a ArgList<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
