//! Index-addressed circular doubly-linked list.
//!
//! Link fields are embedded in the records that own them (endpoint heads and
//! connection nodes), so list membership needs no separate allocation. Links
//! name their neighbours by [`Pos`] instead of by pointer, and the records are
//! resolved through a [`LinkTable`]. An empty list is an anchor whose `prev`
//! and `next` both point at itself.
//!
//! Traversal holds a shared borrow of the table, so the list cannot be
//! restructured while an [`Iter`] is alive.

use std::iter::FusedIterator;

use crate::node::{EndpointId, NodeKey};

/// Position of a link inside a [`LinkTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pos {
    /// The anchor of an endpoint head.
    Anchor(EndpointId),
    /// A connection node.
    Node(NodeKey),
}

/// Which of the two embedded links of a record is meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    /// Edges in which the record's endpoint is the consuming side.
    Consumer = 0,
    /// Edges in which the record's endpoint is the emitting side.
    Subscriber = 1,
}

impl Lane {
    /// Returns the slot of this lane in a record's link array.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// The `prev`/`next` pair embedded in a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub(crate) prev: Pos,
    pub(crate) next: Pos,
}

impl Link {
    /// Returns a link that points at `at` in both directions.
    #[inline]
    pub const fn detached(at: Pos) -> Self {
        Self { prev: at, next: at }
    }

    /// Returns `true` if both directions point at `at`.
    #[inline]
    pub fn is_detached(&self, at: Pos) -> bool {
        self.prev == at && self.next == at
    }
}

/// Resolves positions to the links embedded in their records.
///
/// Implementations may panic on a position that does not name a live record;
/// list operations only follow positions that were linked through them.
pub trait LinkTable {
    /// Returns the link of `pos` on `lane`.
    fn link(&self, pos: Pos, lane: Lane) -> &Link;

    /// Returns the link of `pos` on `lane` for mutation.
    fn link_mut(&mut self, pos: Pos, lane: Lane) -> &mut Link;
}

/// Resets `head` to the empty-list state.
pub fn init<T: LinkTable + ?Sized>(table: &mut T, lane: Lane, head: Pos) {
    *table.link_mut(head, lane) = Link::detached(head);
}

/// Splices `node` in immediately before `head`, making it the new tail.
///
/// This operation is O(1). `node` must not be a member of any list on `lane`.
pub fn insert_tail<T: LinkTable + ?Sized>(table: &mut T, lane: Lane, head: Pos, node: Pos) {
    debug_assert!(
        table.link(node, lane).is_detached(node),
        "node is already linked"
    );

    let tail = table.link(head, lane).prev;
    *table.link_mut(node, lane) = Link { prev: tail, next: head };
    table.link_mut(tail, lane).next = node;
    table.link_mut(head, lane).prev = node;
}

/// Unlinks `node` from whatever list it is in on `lane`.
///
/// Afterwards both of `node`'s links point at itself, so calling this again
/// is a no-op.
pub fn remove<T: LinkTable + ?Sized>(table: &mut T, lane: Lane, node: Pos) {
    let Link { prev, next } = *table.link(node, lane);
    table.link_mut(prev, lane).next = next;
    table.link_mut(next, lane).prev = prev;
    *table.link_mut(node, lane) = Link::detached(node);
}

/// Returns a forward traversal of the nodes after `head` on `lane`.
pub fn iter<T: LinkTable + ?Sized>(table: &T, lane: Lane, head: Pos) -> Iter<'_, T> {
    Iter {
        table,
        lane,
        head,
        cursor: head,
    }
}

/// Forward traversal from `head.next` back to `head`.
pub struct Iter<'a, T: ?Sized> {
    table: &'a T,
    lane: Lane,
    head: Pos,
    cursor: Pos,
}

impl<T: LinkTable + ?Sized> Iterator for Iter<'_, T> {
    type Item = NodeKey;

    fn next(&mut self) -> Option<NodeKey> {
        let next = self.table.link(self.cursor, self.lane).next;
        if next == self.head {
            return None;
        }
        self.cursor = next;
        match next {
            Pos::Node(key) => Some(key),
            // Anchors only ever appear as the list head.
            Pos::Anchor(_) => None,
        }
    }
}

impl<T: LinkTable + ?Sized> FusedIterator for Iter<'_, T> {}
