//! Connection engine: the endpoint heads, the node storage, and the link and
//! unlink algorithms that keep both lists of every edge consistent.
//!
//! Nothing here allocates nodes or reports diagnostics; the router supplies
//! nodes and decides what to do with the ones it gets back.

use std::rc::Rc;

use crate::allocator::Allocator;
use crate::error::{Error, Result};
use crate::handler::ErasedHandler;
use crate::intrusive_list::{self, Lane, Link, LinkTable, Pos};
use crate::node::{ConnectionNode, EndpointId, EndpointKind, Head, NodeKey, RouterId};

/// All heads of one router plus the storage of its connection nodes.
pub(crate) struct Graph {
    router: RouterId,
    heads: Vec<Head>,
    nodes: Box<dyn Allocator>,
    /// Number of nodes currently linked into both lists.
    linked: usize,
}

impl LinkTable for Graph {
    fn link(&self, pos: Pos, lane: Lane) -> &Link {
        match pos {
            Pos::Anchor(id) => &self.head(id).links[lane.index()],
            Pos::Node(key) => &self.node(key).links[lane.index()],
        }
    }

    fn link_mut(&mut self, pos: Pos, lane: Lane) -> &mut Link {
        match pos {
            Pos::Anchor(id) => &mut self.head_mut(id).links[lane.index()],
            Pos::Node(key) => &mut self.node_mut(key).links[lane.index()],
        }
    }
}

impl Graph {
    pub(crate) fn new(router: RouterId, nodes: Box<dyn Allocator>) -> Self {
        Self {
            router,
            heads: Vec::new(),
            nodes,
            linked: 0,
        }
    }

    /// Creates a head with empty anchors and returns its id.
    pub(crate) fn declare(
        &mut self,
        name: String,
        kind: EndpointKind,
        handler: Rc<dyn ErasedHandler>,
    ) -> EndpointId {
        let id = self.next_id();
        self.heads.push(Head::new(name, kind, handler));
        intrusive_list::init(self, Lane::Consumer, Pos::Anchor(id));
        intrusive_list::init(self, Lane::Subscriber, Pos::Anchor(id));
        id
    }

    /// Returns the id the next [`declare`](Self::declare) will hand out.
    pub(crate) fn next_id(&self) -> EndpointId {
        EndpointId::new(self.router, self.heads.len())
    }

    pub(crate) fn router(&self) -> RouterId {
        self.router
    }

    /// Returns `true` if `id` was declared on this graph.
    pub(crate) fn owns(&self, id: EndpointId) -> bool {
        id.router() == self.router
    }

    /// # Panics
    ///
    /// Panics if `id` was not declared on this graph.
    pub(crate) fn head(&self, id: EndpointId) -> &Head {
        assert!(self.owns(id), "{id} belongs to {}, not {}", id.router(), self.router);
        &self.heads[id.index()]
    }

    pub(crate) fn head_mut(&mut self, id: EndpointId) -> &mut Head {
        assert!(self.owns(id), "{id} belongs to {}, not {}", id.router(), self.router);
        &mut self.heads[id.index()]
    }

    /// # Panics
    ///
    /// Panics if the allocator no longer holds `key`; the router only follows
    /// keys it allocated and has not released.
    pub(crate) fn node(&self, key: NodeKey) -> &ConnectionNode {
        self.nodes
            .get(key)
            .expect("connection node missing from allocator")
    }

    fn node_mut(&mut self, key: NodeKey) -> &mut ConnectionNode {
        self.nodes
            .get_mut(key)
            .expect("connection node missing from allocator")
    }

    /// Stores a blank node and returns its key.
    pub(crate) fn allocate(&mut self, pinned: bool) -> std::io::Result<NodeKey> {
        let key = self.nodes.allocate(ConnectionNode::blank(pinned))?;
        self.node_mut(key).detach(key);
        Ok(key)
    }

    /// Hands an unlinked node back to the allocator.
    pub(crate) fn release(&mut self, key: NodeKey) -> Option<ConnectionNode> {
        debug_assert!(!self.node(key).is_linked(), "releasing a linked node");
        self.nodes.deallocate(key)
    }

    pub(crate) fn name(&self, id: EndpointId) -> &str {
        &self.head(id).name
    }

    pub(crate) fn linked(&self) -> usize {
        self.linked
    }

    /// Finds the edge from `signal` in `target`'s consumer list.
    pub(crate) fn find(&self, signal: EndpointId, target: EndpointId) -> Option<NodeKey> {
        intrusive_list::iter(self, Lane::Consumer, Pos::Anchor(target))
            .find(|&key| self.node(key).owner_signal == Some(signal))
    }

    /// Links node `key` as the edge `signal` -> `target`.
    ///
    /// The node captures `target`'s current handler and is appended to the
    /// tail of both lists, so it is dispatched after every earlier edge of
    /// `signal`.
    ///
    /// # Errors
    ///
    /// - `DuplicateConnection` if the pair already has an edge
    /// - `StaticNodeInUse` if `key` is still linked to some other pair
    ///
    /// Nothing is mutated on error and `key` stays with the caller.
    pub(crate) fn link_edge(
        &mut self,
        signal: EndpointId,
        target: EndpointId,
        key: NodeKey,
    ) -> Result<()> {
        if self.find(signal, target).is_some() {
            return Err(Error::DuplicateConnection {
                signal: self.name(signal).to_owned(),
                target: self.name(target).to_owned(),
            });
        }
        if self.node(key).is_linked() {
            return Err(Error::StaticNodeInUse {
                signal: self.name(signal).to_owned(),
                target: self.name(target).to_owned(),
            });
        }

        let handler = Rc::clone(&self.head(target).handler);
        let node = self.node_mut(key);
        node.owner_signal = Some(signal);
        node.target = Some(target);
        node.handler = Some(handler);

        intrusive_list::insert_tail(self, Lane::Consumer, Pos::Anchor(target), Pos::Node(key));
        intrusive_list::insert_tail(self, Lane::Subscriber, Pos::Anchor(signal), Pos::Node(key));
        self.linked += 1;
        Ok(())
    }

    /// Removes the edge `signal` -> `target` from both lists and returns its
    /// node, which keeps its `owner_signal` and `target`.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionNotFound` if the pair has no edge.
    pub(crate) fn unlink_edge(&mut self, signal: EndpointId, target: EndpointId) -> Result<NodeKey> {
        let Some(key) = self.find(signal, target) else {
            return Err(Error::ConnectionNotFound {
                signal: self.name(signal).to_owned(),
                target: self.name(target).to_owned(),
            });
        };

        intrusive_list::remove(self, Lane::Subscriber, Pos::Node(key));
        intrusive_list::remove(self, Lane::Consumer, Pos::Node(key));
        self.node_mut(key).handler = None;
        self.linked -= 1;
        Ok(key)
    }

    /// Nodes on `signal`'s subscriber list, in dispatch order.
    pub(crate) fn subscriber_nodes(&self, signal: EndpointId) -> intrusive_list::Iter<'_, Self> {
        intrusive_list::iter(self, Lane::Subscriber, Pos::Anchor(signal))
    }

    /// Nodes on `target`'s consumer list, in connection order.
    pub(crate) fn consumer_nodes(&self, target: EndpointId) -> intrusive_list::Iter<'_, Self> {
        intrusive_list::iter(self, Lane::Consumer, Pos::Anchor(target))
    }
}
