//! Connection-node allocator trait and default implementation.
//!
//! This module provides the [`Allocator`] trait that defines the interface for
//! connection-node storage, and [`DefaultAllocator`] which keeps nodes in a
//! [`slab::Slab`]. Keys handed out by an allocator stay valid until the node is
//! deallocated, which is what lets the router link nodes by index instead of
//! by pointer.

use std::io::{Error, ErrorKind, Result};

use slab::Slab;

use crate::node::{ConnectionNode, NodeKey};

/// Trait for connection-node storage backends.
///
/// The router calls [`allocate`](Self::allocate) when a dynamic connection is
/// made or a static node is reserved, and [`deallocate`](Self::deallocate)
/// once a node it handed out is no longer needed. Nothing else creates or
/// destroys nodes.
///
/// Implementations must ensure:
/// - a key returned by `allocate` resolves through `get`/`get_mut` until it is
///   passed to `deallocate`
/// - a deallocated key is not handed out again while another node holds it
///
/// # Example
///
/// ```rust
/// use std::io::{Error, ErrorKind, Result};
/// use ruapc_sigslot::{Allocator, ConnectionNode, NodeKey, RouterBuilder};
///
/// /// Refuses every allocation, like an exhausted host heap.
/// struct Exhausted;
///
/// impl Allocator for Exhausted {
///     fn allocate(&mut self, _node: ConnectionNode) -> Result<NodeKey> {
///         Err(Error::new(ErrorKind::OutOfMemory, "heap exhausted"))
///     }
///     fn deallocate(&mut self, _key: NodeKey) -> Option<ConnectionNode> { None }
///     fn get(&self, _key: NodeKey) -> Option<&ConnectionNode> { None }
///     fn get_mut(&mut self, _key: NodeKey) -> Option<&mut ConnectionNode> { None }
///     fn len(&self) -> usize { 0 }
/// }
///
/// let mut router = RouterBuilder::new().allocator(Box::new(Exhausted)).build();
/// let fired = router.signal::<()>("fired");
/// let sink = router.slot("sink", |_, _: &()| {});
/// assert!(router.connect(fired, sink).is_err());
/// ```
pub trait Allocator {
    /// Stores `node` in a fresh block and returns its key.
    ///
    /// # Errors
    ///
    /// Returns an error (conventionally `OutOfMemory`) if no block is
    /// available. The node is dropped in that case.
    fn allocate(&mut self, node: ConnectionNode) -> Result<NodeKey>;

    /// Releases the block at `key`, returning the node that lived there.
    fn deallocate(&mut self, key: NodeKey) -> Option<ConnectionNode>;

    /// Returns the node at `key`, if allocated.
    fn get(&self, key: NodeKey) -> Option<&ConnectionNode>;

    /// Returns the node at `key` for mutation, if allocated.
    fn get_mut(&mut self, key: NodeKey) -> Option<&mut ConnectionNode>;

    /// Returns the number of allocated nodes.
    fn len(&self) -> usize;

    /// Returns `true` if no node is allocated.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Default allocator storing nodes in a [`Slab`].
///
/// Unbounded by default. [`with_capacity`](Self::with_capacity) preallocates a
/// fixed number of blocks and never grows past them, which suits targets that
/// cannot allocate after start-up.
#[derive(Debug, Default)]
pub struct DefaultAllocator {
    nodes: Slab<ConnectionNode>,
    capacity: Option<usize>,
}

impl DefaultAllocator {
    /// Creates an unbounded allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an allocator with `capacity` preallocated blocks and no growth.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Slab::with_capacity(capacity),
            capacity: Some(capacity),
        }
    }

    /// Returns the block limit, if bounded.
    #[must_use]
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

impl Allocator for DefaultAllocator {
    fn allocate(&mut self, node: ConnectionNode) -> Result<NodeKey> {
        if self.capacity.is_some_and(|cap| self.nodes.len() >= cap) {
            return Err(Error::new(
                ErrorKind::OutOfMemory,
                "connection node storage exhausted",
            ));
        }
        Ok(NodeKey::new(self.nodes.insert(node)))
    }

    fn deallocate(&mut self, key: NodeKey) -> Option<ConnectionNode> {
        self.nodes.try_remove(key.index())
    }

    fn get(&self, key: NodeKey) -> Option<&ConnectionNode> {
        self.nodes.get(key.index())
    }

    fn get_mut(&mut self, key: NodeKey) -> Option<&mut ConnectionNode> {
        self.nodes.get_mut(key.index())
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }
}
