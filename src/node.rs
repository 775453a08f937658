//! Endpoint heads and connection nodes.
//!
//! Every declared signal or slot owns one [`Head`] that anchors two lists:
//! the edges it consumes and the edges subscribed to its emissions. Each edge
//! is one [`ConnectionNode`] that is a member of exactly two of those lists,
//! the consumer list of its target and the subscriber list of its signal.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::handler::ErasedHandler;
use crate::intrusive_list::{Lane, Link, Pos};

/// Global counter handing out router identities.
static NEXT_ROUTER: AtomicU64 = AtomicU64::new(0);

/// Identity of one router, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouterId(pub(crate) u64);

impl RouterId {
    /// Returns an identity no other router in this process has.
    pub(crate) fn next() -> Self {
        Self(NEXT_ROUTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RouterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "router#{}", self.0)
    }
}

/// Identity of a declared signal or slot.
///
/// Carries the router it was declared on, so ids from different routers never
/// compare equal. A signal's id doubles as the sender identity passed to
/// handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId {
    router: RouterId,
    index: usize,
}

impl EndpointId {
    pub(crate) const fn new(router: RouterId, index: usize) -> Self {
        Self { router, index }
    }

    /// Returns the router this endpoint was declared on.
    #[must_use]
    pub const fn router(self) -> RouterId {
        self.router
    }

    /// Returns the declaration index of this endpoint within its router.
    #[must_use]
    pub const fn index(self) -> usize {
        self.index
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "endpoint#{}", self.index)
    }
}

/// Stable key of a connection node inside an [`Allocator`](crate::Allocator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeKey(usize);

impl NodeKey {
    /// Placeholder key of a node that has not been stored yet.
    pub(crate) const DANGLING: Self = Self(usize::MAX);

    /// Creates a key from a storage index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the storage index of this key.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Whether a head was declared as a signal or as a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// An event source. Its handler re-emits it, so it can also be a target.
    Signal,
    /// An event sink.
    Slot,
}

/// The permanent anchor record of one declared endpoint.
pub(crate) struct Head {
    pub(crate) name: String,
    pub(crate) kind: EndpointKind,
    /// Indexed by [`Lane`]: consumer anchor, then subscriber anchor.
    pub(crate) links: [Link; 2],
    pub(crate) handler: Rc<dyn ErasedHandler>,
}

impl Head {
    /// Creates a head. Its anchors must be initialized once the head has an id.
    pub(crate) fn new(name: String, kind: EndpointKind, handler: Rc<dyn ErasedHandler>) -> Self {
        let anchor = Link::detached(Pos::Anchor(EndpointId::new(RouterId(u64::MAX), usize::MAX)));
        Self {
            name,
            kind,
            links: [anchor; 2],
            handler,
        }
    }
}

/// One signal-to-target edge.
///
/// Nodes are created blank, stored by an [`Allocator`](crate::Allocator) and
/// filled in when the router links them. Once unlinked, both link fields point
/// back at the node itself.
pub struct ConnectionNode {
    pub(crate) key: NodeKey,
    pub(crate) links: [Link; 2],
    pub(crate) handler: Option<Rc<dyn ErasedHandler>>,
    pub(crate) owner_signal: Option<EndpointId>,
    pub(crate) target: Option<EndpointId>,
    pub(crate) pinned: bool,
}

impl ConnectionNode {
    /// Creates an unlinked node with no edge recorded yet.
    pub(crate) const fn blank(pinned: bool) -> Self {
        let at = Link::detached(Pos::Node(NodeKey::DANGLING));
        Self {
            key: NodeKey::DANGLING,
            links: [at; 2],
            handler: None,
            owner_signal: None,
            target: None,
            pinned,
        }
    }

    /// Records the node's storage key and points both links at itself.
    pub(crate) fn detach(&mut self, key: NodeKey) {
        self.key = key;
        self.links = [Link::detached(Pos::Node(key)); 2];
    }

    /// Returns the signal whose emissions this node carries, if it was ever linked.
    #[must_use]
    pub const fn owner_signal(&self) -> Option<EndpointId> {
        self.owner_signal
    }

    /// Returns the consuming endpoint of this edge, if it was ever linked.
    #[must_use]
    pub const fn target(&self) -> Option<EndpointId> {
        self.target
    }

    /// Returns `true` if the node is currently a member of both lists.
    #[must_use]
    pub fn is_linked(&self) -> bool {
        !self.links[Lane::Consumer.index()].is_detached(Pos::Node(self.key))
    }

    /// Returns `true` if the node was reserved for static connections.
    #[must_use]
    pub const fn is_static(&self) -> bool {
        self.pinned
    }
}

impl fmt::Debug for ConnectionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionNode")
            .field("key", &self.key)
            .field("owner_signal", &self.owner_signal)
            .field("target", &self.target)
            .field("linked", &self.is_linked())
            .field("pinned", &self.pinned)
            .finish_non_exhaustive()
    }
}
