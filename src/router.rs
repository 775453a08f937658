//! Router implementation: declaration, connection management and dispatch.
//!
//! This module provides the [`Router`] and [`RouterBuilder`] types together
//! with the typed [`Signal`] and [`Slot`] handles and the [`Emission`] context
//! passed to handlers.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::io::{Error as IoError, ErrorKind};
use std::marker::PhantomData;
use std::ops::Deref;
use std::rc::Rc;

use crate::allocator::{Allocator, DefaultAllocator};
use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::handler::{ErasedHandler, Forward, Handler, SignalBody, Typed};
use crate::node::{EndpointId, EndpointKind, NodeKey, RouterId};
use crate::report::{Reporter, TracingReporter};

/// Typed handle of a declared signal.
///
/// Emitting it passes `&A` to every connected target.
pub struct Signal<A> {
    id: EndpointId,
    _marker: PhantomData<fn(&A)>,
}

/// Typed handle of a declared slot.
pub struct Slot<A> {
    id: EndpointId,
    _marker: PhantomData<fn(&A)>,
}

macro_rules! impl_handle {
    ($handle:ident) => {
        impl<A> $handle<A> {
            const fn new(id: EndpointId) -> Self {
                Self {
                    id,
                    _marker: PhantomData,
                }
            }

            /// Returns the endpoint id behind this handle.
            #[must_use]
            pub const fn id(self) -> EndpointId {
                self.id
            }
        }

        impl<A> Clone for $handle<A> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<A> Copy for $handle<A> {}

        impl<A> PartialEq for $handle<A> {
            fn eq(&self, other: &Self) -> bool {
                self.id == other.id
            }
        }

        impl<A> Eq for $handle<A> {}

        impl<A> fmt::Debug for $handle<A> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($handle)).field(&self.id).finish()
            }
        }

        impl<A> Endpoint<A> for $handle<A> {
            fn endpoint(&self) -> EndpointId {
                self.id
            }
        }
    };
}

impl_handle!(Signal);
impl_handle!(Slot);

impl<A> Signal<A> {
    /// Returns `true` if `sender` is this signal.
    #[must_use]
    pub fn is_sender(self, sender: EndpointId) -> bool {
        self.id == sender
    }
}

/// Anything a signal can be connected to: a slot, or another signal with the
/// same argument type.
pub trait Endpoint<A> {
    /// Returns the endpoint id of the consuming side.
    fn endpoint(&self) -> EndpointId;
}

/// Context handed to a handler for one invocation.
pub struct Emission<'a> {
    router: &'a Router,
    sender: EndpointId,
    receiver: EndpointId,
    /// Edges walked by sends on the receiver's own subscriber list.
    sent: Cell<usize>,
}

impl<'a> Emission<'a> {
    const fn new(router: &'a Router, sender: EndpointId, receiver: EndpointId) -> Self {
        Self {
            router,
            sender,
            receiver,
            sent: Cell::new(0),
        }
    }

    /// Returns the signal that triggered this invocation.
    #[must_use]
    pub const fn sender(&self) -> EndpointId {
        self.sender
    }

    /// Returns `true` if `signal` triggered this invocation.
    ///
    /// Lets a slot connected to several signals tell them apart.
    #[must_use]
    pub fn is_sender<A>(&self, signal: Signal<A>) -> bool {
        signal.is_sender(self.sender)
    }

    /// Returns the endpoint whose body is running.
    #[must_use]
    pub const fn receiver(&self) -> EndpointId {
        self.receiver
    }

    /// Returns the declared name of the sender.
    #[must_use]
    pub fn sender_name(&self) -> &'a str {
        self.router.name(self.sender)
    }

    /// Returns the router that is dispatching.
    #[must_use]
    pub const fn router(&self) -> &'a Router {
        self.router
    }

    /// Emits `signal` from inside a handler.
    ///
    /// The nested emission runs to completion before the outer one resumes.
    pub fn emit<A: 'static>(&self, signal: Signal<A>, args: &A) -> usize {
        self.router.emit(signal, args)
    }

    /// Walks the receiver's subscriber list with the receiver as the sender.
    pub(crate) fn forward(&self, args: &dyn Any) -> usize {
        let walked = self.router.dispatch(self.receiver, args);
        self.sent.set(self.sent.get() + walked);
        walked
    }
}

/// Sending side of a signal body declared with [`Router::signal_with`].
///
/// Dereferences to the [`Emission`] that started the body, so the body can
/// still ask who sent it.
pub struct Outlet<'e, A> {
    emission: &'e Emission<'e>,
    _marker: PhantomData<fn(&A)>,
}

impl<'e, A> Outlet<'e, A> {
    pub(crate) const fn new(emission: &'e Emission<'e>) -> Self {
        Self {
            emission,
            _marker: PhantomData,
        }
    }
}

impl<A: 'static> Outlet<'_, A> {
    /// Invokes every target of the signal in connection order, with the
    /// signal as the sender. Returns the number of edges walked.
    ///
    /// A body may send any number of times, including not at all.
    pub fn send(&self, args: &A) -> usize {
        self.emission.forward(args)
    }
}

impl<'e, A> Deref for Outlet<'e, A> {
    type Target = Emission<'e>;

    fn deref(&self) -> &Emission<'e> {
        self.emission
    }
}

/// Handle to a connection node reserved for static connections.
///
/// The node is taken from the allocator once by
/// [`Router::reserve_static`] and stays reserved until it is handed to
/// [`Router::release_static`]. It can carry one edge at a time; after
/// [`Router::disconnect`] it is free for the next [`Router::connect_static`].
///
/// Dropping the handle without releasing it keeps the block reserved for the
/// lifetime of the router.
#[derive(Debug)]
pub struct StaticConnection {
    router: RouterId,
    key: NodeKey,
}

impl StaticConnection {
    /// Returns the router the node was reserved on.
    #[must_use]
    pub const fn router(&self) -> RouterId {
        self.router
    }
}

/// One detached edge, as returned by [`Router::disconnect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    /// The signal the edge carried emissions from.
    pub owner_signal: EndpointId,
    /// The consuming endpoint.
    pub target: EndpointId,
    /// `true` if the node was a static one and stays reserved.
    pub is_static: bool,
}

/// Builder for creating a [`Router`] with custom configuration.
///
/// # Example
///
/// ```rust
/// use ruapc_sigslot::{DefaultAllocator, RouterBuilder};
///
/// let router = RouterBuilder::new()
///     .max_connections(64)
///     .allocator(Box::new(DefaultAllocator::with_capacity(64)))
///     .reporter(|message: &str| eprintln!("sigslot: {message}"))
///     .build();
/// assert_eq!(router.connection_count(), 0);
/// ```
pub struct RouterBuilder {
    max_connections: Option<usize>,
    allocator: Box<dyn Allocator>,
    reporter: Box<dyn Reporter>,
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterBuilder {
    /// Creates a new builder with default settings.
    ///
    /// Default settings:
    /// - Max connections: unlimited
    /// - Allocator: [`DefaultAllocator`]
    /// - Reporter: [`TracingReporter`]
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_connections: None,
            allocator: Box::new(DefaultAllocator::new()),
            reporter: Box::new(TracingReporter),
        }
    }

    /// Caps the number of live dynamic connections.
    ///
    /// Connecting beyond the cap fails with
    /// [`AllocationFailure`](Error::AllocationFailure) without asking the
    /// allocator. Static connections do not count.
    #[must_use]
    pub const fn max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = Some(max_connections);
        self
    }

    /// Sets the allocator that stores connection nodes.
    #[must_use]
    pub fn allocator(mut self, allocator: Box<dyn Allocator>) -> Self {
        self.allocator = allocator;
        self
    }

    /// Sets the sink for diagnostics about failed connects and disconnects.
    #[must_use]
    pub fn reporter<R: Reporter + 'static>(mut self, reporter: R) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    /// Builds the router with the configured settings.
    #[must_use]
    pub fn build(self) -> Router {
        Router {
            graph: Graph::new(RouterId::next(), self.allocator),
            reporter: self.reporter,
            max_connections: self.max_connections,
            dynamic: 0,
        }
    }
}

/// Registry of signals and slots plus the edges between them.
///
/// Declaring returns a typed handle. Connecting a signal to a target appends
/// an edge to the signal's subscriber list, and emitting walks that list in
/// connection order, invoking each target synchronously.
///
/// Handlers receive `&Router` through their [`Emission`], so they may emit
/// further signals but cannot connect or disconnect while a dispatch is in
/// progress.
///
/// Every router has its own [`RouterId`], which is stamped into each handle
/// it declares. Connection management rejects handles from another router
/// with an error; emission and introspection panic on them.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use ruapc_sigslot::Router;
///
/// # fn main() -> ruapc_sigslot::Result<()> {
/// let mut router = Router::new();
/// let s1 = router.signal::<&'static str>("s1");
/// let s2 = router.signal::<&'static str>("s2");
///
/// let calls = Rc::new(RefCell::new(Vec::new()));
/// let sink = Rc::clone(&calls);
/// let t1 = router.slot("t1", move |emission, text: &&'static str| {
///     sink.borrow_mut().push(format!("t1 {text} from {}", emission.sender_name()));
/// });
///
/// router.connect(s1, t1)?;
/// router.connect(s2, t1)?;
/// router.connect(s1, s2)?;
///
/// router.emit(s1, &"hello");
/// assert_eq!(*calls.borrow(), ["t1 hello from s1", "t1 hello from s2"]);
/// # Ok(())
/// # }
/// ```
pub struct Router {
    graph: Graph,
    reporter: Box<dyn Reporter>,
    max_connections: Option<usize>,
    /// Number of linked dynamic nodes.
    dynamic: usize,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Creates a new router with default settings.
    ///
    /// This is equivalent to `RouterBuilder::new().build()`.
    #[must_use]
    pub fn new() -> Self {
        RouterBuilder::new().build()
    }

    /// Returns a builder for a custom router.
    #[must_use]
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// Returns the identity stamped into every handle of this router.
    #[must_use]
    pub fn id(&self) -> RouterId {
        self.graph.router()
    }

    /// Declares a signal carrying `&A`.
    ///
    /// Emitting it sends the arguments unchanged to its targets. It can also
    /// be the target of another signal with the same argument type.
    pub fn signal<A: 'static>(&mut self, name: impl Into<String>) -> Signal<A> {
        let handler: Rc<dyn ErasedHandler> = Rc::new(Forward);
        Signal::new(self.graph.declare(name.into(), EndpointKind::Signal, handler))
    }

    /// Declares a signal whose emission routine is `body`.
    ///
    /// The body runs whenever the signal is emitted or fired through an edge
    /// from another signal, and reaches the signal's targets only through
    /// [`Outlet::send`]. It may run logic around the send, skip it, or send
    /// different arguments.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::cell::RefCell;
    /// use std::rc::Rc;
    /// use ruapc_sigslot::Router;
    ///
    /// let mut router = Router::new();
    /// let level = router.signal_with("level", |outlet, raw: &i32| {
    ///     if *raw >= 0 {
    ///         outlet.send(&(raw * 10));
    ///     }
    /// });
    ///
    /// let seen = Rc::new(RefCell::new(Vec::new()));
    /// let sink = Rc::clone(&seen);
    /// let meter = router.slot("meter", move |_, value: &i32| sink.borrow_mut().push(*value));
    /// router.connect(level, meter).unwrap();
    ///
    /// assert_eq!(router.emit(level, &4), 1);
    /// assert_eq!(router.emit(level, &-1), 0);
    /// assert_eq!(*seen.borrow(), [40]);
    /// ```
    pub fn signal_with<A, F>(&mut self, name: impl Into<String>, body: F) -> Signal<A>
    where
        A: 'static,
        F: Fn(&Outlet<'_, A>, &A) + 'static,
    {
        let handler: Rc<dyn ErasedHandler> = Rc::new(SignalBody::<A, F>::new(body));
        Signal::new(self.graph.declare(name.into(), EndpointKind::Signal, handler))
    }

    /// Declares a slot whose body is the closure `f`.
    pub fn slot<A, F>(&mut self, name: impl Into<String>, f: F) -> Slot<A>
    where
        A: 'static,
        F: Fn(&Emission<'_>, &A) + 'static,
    {
        self.slot_with(name, f)
    }

    /// Declares a slot whose body is `handler`.
    pub fn slot_with<A, H>(&mut self, name: impl Into<String>, handler: H) -> Slot<A>
    where
        A: 'static,
        H: Handler<A> + 'static,
    {
        let handler: Rc<dyn ErasedHandler> = Rc::new(Typed::<A, H>::new(handler));
        Slot::new(self.graph.declare(name.into(), EndpointKind::Slot, handler))
    }

    /// Replaces the body of `slot`.
    ///
    /// Edges that already exist keep the body captured when they were
    /// connected; only later connections invoke `f`.
    ///
    /// # Panics
    ///
    /// Panics if `slot` was declared on another router.
    pub fn set_handler<A, F>(&mut self, slot: Slot<A>, f: F)
    where
        A: 'static,
        F: Fn(&Emission<'_>, &A) + 'static,
    {
        self.graph.head_mut(slot.id).handler = Rc::new(Typed::<A, F>::new(f));
    }

    /// Returns the declared name of `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` was declared on another router.
    #[must_use]
    pub fn name(&self, id: EndpointId) -> &str {
        self.graph.name(id)
    }

    /// Returns whether `id` was declared as a signal or a slot.
    ///
    /// # Panics
    ///
    /// Panics if `id` was declared on another router.
    #[must_use]
    pub fn kind(&self, id: EndpointId) -> EndpointKind {
        self.graph.head(id).kind
    }

    /// Connects `signal` to `target` using a node from the allocator.
    ///
    /// The edge is dispatched after every edge `signal` already has.
    ///
    /// # Errors
    ///
    /// - [`AllocationFailure`](Error::AllocationFailure) if the connection cap
    ///   is reached or the allocator has no block; nothing is connected
    /// - [`DuplicateConnection`](Error::DuplicateConnection) if the pair is
    ///   already connected; the unused node goes back to the allocator
    /// - [`ForeignEndpoint`](Error::ForeignEndpoint) if either handle belongs
    ///   to another router
    ///
    /// All are also passed to the reporter.
    pub fn connect<A>(&mut self, signal: Signal<A>, target: impl Endpoint<A>) -> Result<()> {
        let target = target.endpoint();
        if let Err(e) = self.check(signal.id).and(self.check(target)) {
            return Err(self.fail(e));
        }
        let key = match self.allocate_dynamic(target) {
            Ok(key) => key,
            Err(e) => return Err(self.fail(e)),
        };

        if let Err(e) = self.graph.link_edge(signal.id, target, key) {
            self.graph.release(key);
            return Err(self.fail(e));
        }

        self.dynamic += 1;
        tracing::debug!(
            target: "ruapc_sigslot",
            signal = self.graph.name(signal.id),
            consumer = self.graph.name(target),
            "connected"
        );
        Ok(())
    }

    /// Reserves a connection node for static use.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationFailure`](Error::AllocationFailure) if the allocator
    /// has no block. The failure is also passed to the reporter.
    pub fn reserve_static(&mut self) -> Result<StaticConnection> {
        match self.graph.allocate(true) {
            Ok(key) => Ok(StaticConnection {
                router: self.graph.router(),
                key,
            }),
            Err(source) => Err(self.fail(Error::AllocationFailure {
                target: "static".to_owned(),
                source,
            })),
        }
    }

    /// Connects `signal` to `target` through the reserved `node`.
    ///
    /// # Errors
    ///
    /// - [`DuplicateConnection`](Error::DuplicateConnection) if the pair is
    ///   already connected
    /// - [`StaticNodeInUse`](Error::StaticNodeInUse) if `node` still carries
    ///   another edge
    /// - [`ForeignEndpoint`](Error::ForeignEndpoint) or
    ///   [`ForeignStaticNode`](Error::ForeignStaticNode) if a handle belongs
    ///   to another router
    ///
    /// All are also passed to the reporter.
    pub fn connect_static<A>(
        &mut self,
        signal: Signal<A>,
        target: impl Endpoint<A>,
        node: &StaticConnection,
    ) -> Result<()> {
        let target = target.endpoint();
        let checked = self
            .check_static(node)
            .and(self.check(signal.id))
            .and(self.check(target));
        if let Err(e) = checked.and_then(|()| self.graph.link_edge(signal.id, target, node.key)) {
            return Err(self.fail(e));
        }

        tracing::debug!(
            target: "ruapc_sigslot",
            signal = self.graph.name(signal.id),
            consumer = self.graph.name(target),
            "connected static"
        );
        Ok(())
    }

    /// Removes the edge `signal` -> `target`.
    ///
    /// A dynamic node is returned to the allocator; a static node stays
    /// reserved for its next [`connect_static`](Self::connect_static).
    ///
    /// # Errors
    ///
    /// - [`ConnectionNotFound`](Error::ConnectionNotFound) if the pair is not
    ///   connected
    /// - [`ForeignEndpoint`](Error::ForeignEndpoint) if either handle belongs
    ///   to another router
    ///
    /// Both are also passed to the reporter.
    pub fn disconnect<A>(&mut self, signal: Signal<A>, target: impl Endpoint<A>) -> Result<Connection> {
        let target = target.endpoint();
        let unlinked = self
            .check(signal.id)
            .and(self.check(target))
            .and_then(|()| self.graph.unlink_edge(signal.id, target));
        let key = match unlinked {
            Ok(key) => key,
            Err(e) => return Err(self.fail(e)),
        };

        let node = self.graph.node(key);
        let connection = Connection {
            owner_signal: node.owner_signal().unwrap_or(signal.id),
            target: node.target().unwrap_or(target),
            is_static: node.is_static(),
        };
        if !connection.is_static {
            self.graph.release(key);
            self.dynamic -= 1;
        }

        tracing::debug!(
            target: "ruapc_sigslot",
            signal = self.graph.name(signal.id),
            consumer = self.graph.name(target),
            "disconnected"
        );
        Ok(connection)
    }

    /// Gives a reserved node back to the allocator.
    ///
    /// If the node still carries an edge, the edge is removed first.
    ///
    /// # Errors
    ///
    /// Returns [`ForeignStaticNode`](Error::ForeignStaticNode) if `node` was
    /// reserved on another router; that router keeps the block. The failure
    /// is also passed to the reporter.
    pub fn release_static(&mut self, node: StaticConnection) -> Result<()> {
        if let Err(e) = self.check_static(&node) {
            return Err(self.fail(e));
        }

        let record = self.graph.node(node.key);
        if let (true, Some(signal), Some(target)) =
            (record.is_linked(), record.owner_signal(), record.target())
        {
            if let Err(e) = self.graph.unlink_edge(signal, target) {
                return Err(self.fail(e));
            }
        }
        self.graph.release(node.key);

        tracing::debug!(target: "ruapc_sigslot", "released static node");
        Ok(())
    }

    /// Emits `signal` by running its emission routine with `signal` as the
    /// sender.
    ///
    /// For a plain signal this invokes every connected target in connection
    /// order. Dispatch is synchronous and depth-first: a target that emits
    /// another signal finishes that emission before the next target of
    /// `signal` runs. Returns the number of edges walked on `signal`'s own
    /// subscriber list.
    ///
    /// # Panics
    ///
    /// Panics if `signal` was declared on another router.
    pub fn emit<A: 'static>(&self, signal: Signal<A>, args: &A) -> usize {
        let emission = Emission::new(self, signal.id, signal.id);
        self.graph.head(signal.id).handler.call(&emission, args);
        emission.sent.get()
    }

    /// Walks `signal`'s subscriber list with `signal` as the sender.
    fn dispatch(&self, signal: EndpointId, args: &dyn Any) -> usize {
        let mut count = 0;
        for key in self.graph.subscriber_nodes(signal) {
            let node = self.graph.node(key);
            if let (Some(handler), Some(target)) = (&node.handler, node.target) {
                handler.call(&Emission::new(self, signal, target), args);
            }
            count += 1;
        }
        count
    }

    /// Returns `true` if `signal` currently has an edge to `target`.
    #[must_use]
    pub fn is_connected<A>(&self, signal: Signal<A>, target: impl Endpoint<A>) -> bool {
        self.graph.find(signal.id, target.endpoint()).is_some()
    }

    /// Returns the targets of `signal` in dispatch order.
    pub fn subscribers<A>(&self, signal: Signal<A>) -> impl Iterator<Item = EndpointId> {
        self.graph
            .subscriber_nodes(signal.id)
            .filter_map(|key| self.graph.node(key).target())
    }

    /// Returns the signals feeding `target` in connection order.
    pub fn sources<A>(&self, target: impl Endpoint<A>) -> impl Iterator<Item = EndpointId> {
        self.graph
            .consumer_nodes(target.endpoint())
            .filter_map(|key| self.graph.node(key).owner_signal())
    }

    /// Returns the number of targets connected to `signal`.
    #[must_use]
    pub fn subscriber_count<A>(&self, signal: Signal<A>) -> usize {
        self.graph.subscriber_nodes(signal.id).count()
    }

    /// Returns the number of signals connected to `target`.
    #[must_use]
    pub fn source_count<A>(&self, target: impl Endpoint<A>) -> usize {
        self.graph.consumer_nodes(target.endpoint()).count()
    }

    /// Returns the number of live edges, static ones included.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.graph.linked()
    }

    /// Rejects an endpoint declared on another router.
    fn check(&self, id: EndpointId) -> Result<()> {
        if self.graph.owns(id) {
            Ok(())
        } else {
            Err(Error::ForeignEndpoint {
                endpoint: id,
                router: self.graph.router(),
            })
        }
    }

    /// Rejects a static node reserved on another router.
    fn check_static(&self, node: &StaticConnection) -> Result<()> {
        if node.router == self.graph.router() {
            Ok(())
        } else {
            Err(Error::ForeignStaticNode {
                owner: node.router,
                router: self.graph.router(),
            })
        }
    }

    /// Takes a node for a dynamic connection to `target`.
    fn allocate_dynamic(&mut self, target: EndpointId) -> Result<NodeKey> {
        if self.max_connections.is_some_and(|max| self.dynamic >= max) {
            return Err(Error::AllocationFailure {
                target: self.graph.name(target).to_owned(),
                source: IoError::new(ErrorKind::OutOfMemory, "connection limit reached"),
            });
        }
        self.graph
            .allocate(false)
            .map_err(|source| Error::AllocationFailure {
                target: self.graph.name(target).to_owned(),
                source,
            })
    }

    /// Passes `err` to the reporter and returns it.
    fn fail(&self, err: Error) -> Error {
        self.reporter.report(&err.to_string());
        err
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    type Calls = Rc<RefCell<Vec<String>>>;

    /// Declares a slot that records `"<slot>(<text>, sender=<signal>)"`.
    fn recording_slot(router: &mut Router, name: &'static str, calls: &Calls) -> Slot<String> {
        let calls = Rc::clone(calls);
        router.slot(name, move |emission, text: &String| {
            calls
                .borrow_mut()
                .push(format!("{name}({text}, sender={})", emission.sender_name()));
        })
    }

    /// Builds `builder` with a reporter that records every message.
    fn capturing(builder: RouterBuilder) -> (Router, Calls) {
        let reports = Calls::default();
        let sink = Rc::clone(&reports);
        let router = builder
            .reporter(move |message: &str| sink.borrow_mut().push(message.to_owned()))
            .build();
        (router, reports)
    }

    fn capturing_router() -> (Router, Calls) {
        capturing(RouterBuilder::new())
    }

    #[test]
    fn test_two_signal_scenario() {
        let mut router = Router::new();
        let calls = Calls::default();
        let s1 = router.signal::<String>("s1");
        let s2 = router.signal::<String>("s2");
        let t1 = recording_slot(&mut router, "t1", &calls);
        let t2 = recording_slot(&mut router, "t2", &calls);

        router.connect(s1, t1).unwrap();
        router.connect(s1, t2).unwrap();
        router.connect(s2, t1).unwrap();
        router.connect(s2, t2).unwrap();
        router.connect(s1, s2).unwrap();

        assert_eq!(router.emit(s1, &"hello".to_owned()), 3);
        assert_eq!(
            *calls.borrow(),
            [
                "t1(hello, sender=s1)",
                "t2(hello, sender=s1)",
                "t1(hello, sender=s2)",
                "t2(hello, sender=s2)",
            ]
        );

        calls.borrow_mut().clear();
        assert_eq!(router.emit(s2, &"world".to_owned()), 2);
        assert_eq!(
            *calls.borrow(),
            ["t1(world, sender=s2)", "t2(world, sender=s2)"]
        );
    }

    #[test]
    fn test_dispatch_order_follows_connection_order() {
        let mut router = Router::new();
        let calls = Calls::default();
        let s = router.signal::<String>("s");
        let a = recording_slot(&mut router, "a", &calls);
        let b = recording_slot(&mut router, "b", &calls);

        router.connect(s, a).unwrap();
        router.connect(s, b).unwrap();
        router.emit(s, &"1".to_owned());

        router.disconnect(s, a).unwrap();
        router.connect(s, a).unwrap();
        router.emit(s, &"2".to_owned());

        assert_eq!(
            *calls.borrow(),
            [
                "a(1, sender=s)",
                "b(1, sender=s)",
                "b(2, sender=s)",
                "a(2, sender=s)",
            ]
        );
        assert_eq!(router.subscribers(s).collect::<Vec<_>>(), vec![b.id(), a.id()]);
    }

    #[test]
    fn test_duplicate_connect_is_reported_and_unchanged() {
        let (mut router, reports) = capturing_router();
        let calls = Calls::default();
        let s = router.signal::<String>("s");
        let t = recording_slot(&mut router, "t", &calls);
        let u = recording_slot(&mut router, "u", &calls);
        router.connect(s, t).unwrap();
        router.connect(s, u).unwrap();

        let before: Vec<_> = router.subscribers(s).collect();
        let nodes_before: Vec<NodeKey> = router.graph.subscriber_nodes(s.id()).collect();
        let sources_before: Vec<NodeKey> = router.graph.consumer_nodes(t.id()).collect();
        let err = router.connect(s, t).unwrap_err();

        assert!(matches!(err, Error::DuplicateConnection { .. }));
        assert_eq!(router.subscribers(s).collect::<Vec<_>>(), before);
        assert_eq!(
            router.graph.subscriber_nodes(s.id()).collect::<Vec<_>>(),
            nodes_before
        );
        assert_eq!(
            router.graph.consumer_nodes(t.id()).collect::<Vec<_>>(),
            sources_before
        );
        assert_eq!(router.connection_count(), 2);
        assert_eq!(*reports.borrow(), ["t has been connected to the s"]);

        // The rejected node went back to the allocator
        router.disconnect(s, t).unwrap();
        router.disconnect(s, u).unwrap();
        assert_eq!(router.connection_count(), 0);
    }

    #[test]
    fn test_disconnect_missing_pair_is_reported() {
        let (mut router, reports) = capturing_router();
        let calls = Calls::default();
        let s = router.signal::<String>("s");
        let t = recording_slot(&mut router, "t", &calls);

        let err = router.disconnect(s, t).unwrap_err();
        assert!(matches!(err, Error::ConnectionNotFound { .. }));
        assert_eq!(err.as_label(), "connection_not_found");
        assert_eq!(*reports.borrow(), ["the s and t have been disconnected"]);
        assert_eq!(router.connection_count(), 0);
    }

    #[test]
    fn test_successful_operations_do_not_report() {
        let (mut router, reports) = capturing_router();
        let calls = Calls::default();
        let s = router.signal::<String>("s");
        let t = recording_slot(&mut router, "t", &calls);

        router.connect(s, t).unwrap();
        router.emit(s, &"x".to_owned());
        router.disconnect(s, t).unwrap();

        assert!(reports.borrow().is_empty());
    }

    #[test]
    fn test_connect_disconnect_round_trip() {
        let mut router = Router::new();
        let calls = Calls::default();
        let s = router.signal::<String>("s");
        let t = recording_slot(&mut router, "t", &calls);

        router.connect(s, t).unwrap();
        assert!(router.is_connected(s, t));

        let connection = router.disconnect(s, t).unwrap();
        assert_eq!(connection.owner_signal, s.id());
        assert_eq!(connection.target, t.id());
        assert!(!connection.is_static);

        assert!(!router.is_connected(s, t));
        assert_eq!(router.subscriber_count(s), 0);
        assert_eq!(router.source_count(t), 0);
        assert_eq!(router.emit(s, &"gone".to_owned()), 0);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_sender_identity() {
        let mut router = Router::new();
        let s1 = router.signal::<u8>("s1");
        let s2 = router.signal::<u8>("s2");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let t = router.slot("t", move |emission, _: &u8| {
            sink.borrow_mut()
                .push((emission.is_sender(s1), emission.is_sender(s2)));
        });

        router.connect(s1, t).unwrap();
        router.connect(s2, t).unwrap();

        router.emit(s1, &0);
        router.emit(s2, &0);

        assert_eq!(*seen.borrow(), [(true, false), (false, true)]);
        assert!(s1.is_sender(s1.id()));
        assert!(!s1.is_sender(s2.id()));
    }

    #[test]
    fn test_subscriber_count_tracks_distinct_targets() {
        let mut router = Router::new();
        let s = router.signal::<u32>("s");
        let slots: Vec<Slot<u32>> = (0..6)
            .map(|i| router.slot(format!("t{i}"), |_, _: &u32| {}))
            .collect();

        let mut connected = vec![false; slots.len()];
        // Deterministic pseudo-random mix of connects and disconnects
        let mut state = 7u32;
        for _ in 0..200 {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let i = (state >> 16) as usize % slots.len();
            if connected[i] {
                router.disconnect(s, slots[i]).unwrap();
            } else {
                router.connect(s, slots[i]).unwrap();
            }
            connected[i] = !connected[i];

            let expected = connected.iter().filter(|&&c| c).count();
            assert_eq!(router.subscriber_count(s), expected);
            assert_eq!(router.connection_count(), expected);
            for (slot, &on) in slots.iter().zip(&connected) {
                assert_eq!(router.is_connected(s, *slot), on);
                let sources: Vec<_> = router.sources(*slot).collect();
                assert_eq!(sources, if on { vec![s.id()] } else { vec![] });
            }
        }
    }

    #[test]
    fn test_handler_snapshot_at_connect() {
        let mut router = Router::new();
        let calls = Calls::default();
        let s = router.signal::<String>("s");
        let t = recording_slot(&mut router, "t", &calls);
        router.connect(s, t).unwrap();

        let replaced = Rc::clone(&calls);
        router.set_handler(t, move |_, text: &String| {
            replaced.borrow_mut().push(format!("new({text})"));
        });

        router.emit(s, &"a".to_owned());
        router.disconnect(s, t).unwrap();
        router.connect(s, t).unwrap();
        router.emit(s, &"b".to_owned());

        assert_eq!(*calls.borrow(), ["t(a, sender=s)", "new(b)"]);
    }

    #[test]
    fn test_nested_emission_runs_depth_first() {
        let mut router = Router::new();
        let calls = Calls::default();
        let outer = router.signal::<String>("outer");
        let inner = router.signal::<String>("inner");
        let deep = recording_slot(&mut router, "deep", &calls);

        let relay_calls = Rc::clone(&calls);
        let relay = router.slot("relay", move |emission, text: &String| {
            relay_calls.borrow_mut().push(format!("relay({text})"));
            emission.emit(inner, &format!("{text}!"));
        });
        let last = recording_slot(&mut router, "last", &calls);

        router.connect(inner, deep).unwrap();
        router.connect(outer, relay).unwrap();
        router.connect(outer, last).unwrap();

        router.emit(outer, &"go".to_owned());

        assert_eq!(
            *calls.borrow(),
            ["relay(go)", "deep(go!, sender=inner)", "last(go, sender=outer)"]
        );
    }

    #[test]
    fn test_max_connections() {
        let (mut router, reports) = capturing(RouterBuilder::new().max_connections(1));
        let s = router.signal::<()>("s");
        let a = router.slot("a", |_, _: &()| {});
        let b = router.slot("b", |_, _: &()| {});

        router.connect(s, a).unwrap();
        let err = router.connect(s, b).unwrap_err();
        assert!(matches!(err, Error::AllocationFailure { .. }));
        assert!(!router.is_connected(s, b));
        assert_eq!(reports.borrow().len(), 1);
        assert!(reports.borrow()[0].starts_with("failed to allocate b node"));

        // Freeing the first edge makes room
        router.disconnect(s, a).unwrap();
        router.connect(s, b).unwrap();
    }

    #[test]
    fn test_bounded_allocator_failure() {
        let (mut router, reports) =
            capturing(RouterBuilder::new().allocator(Box::new(DefaultAllocator::with_capacity(1))));
        let s = router.signal::<()>("s");
        let a = router.slot("a", |_, _: &()| {});
        let b = router.slot("b", |_, _: &()| {});

        router.connect(s, a).unwrap();
        let err = router.connect(s, b).unwrap_err();
        match err {
            Error::AllocationFailure { target, source } => {
                assert_eq!(target, "b");
                assert_eq!(source.kind(), ErrorKind::OutOfMemory);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(router.subscriber_count(s), 1);
        assert_eq!(
            *reports.borrow(),
            ["failed to allocate b node: connection node storage exhausted"]
        );
    }

    #[test]
    fn test_duplicate_releases_node_to_bounded_allocator() {
        let mut router = RouterBuilder::new()
            .allocator(Box::new(DefaultAllocator::with_capacity(2)))
            .build();
        let s = router.signal::<()>("s");
        let a = router.slot("a", |_, _: &()| {});
        let b = router.slot("b", |_, _: &()| {});

        router.connect(s, a).unwrap();
        assert!(router.connect(s, a).is_err());
        // The second block is still free
        router.connect(s, b).unwrap();
    }

    #[test]
    fn test_static_connection_reuse() {
        let (mut router, reports) = capturing_router();
        let calls = Calls::default();
        let s = router.signal::<String>("s");
        let t = recording_slot(&mut router, "t", &calls);
        let u = recording_slot(&mut router, "u", &calls);
        let node = router.reserve_static().unwrap();

        router.connect_static(s, t, &node).unwrap();
        assert!(router.is_connected(s, t));

        // Still carrying s -> t
        let err = router.connect_static(s, u, &node).unwrap_err();
        assert!(matches!(err, Error::StaticNodeInUse { .. }));

        let connection = router.disconnect(s, t).unwrap();
        assert!(connection.is_static);
        assert_eq!(connection.owner_signal, s.id());

        router.connect_static(s, u, &node).unwrap();
        router.emit(s, &"x".to_owned());

        assert_eq!(*calls.borrow(), ["u(x, sender=s)"]);
        assert_eq!(reports.borrow().len(), 1);
    }

    #[test]
    fn test_static_duplicate() {
        let mut router = Router::new();
        let s = router.signal::<()>("s");
        let t = router.slot("t", |_, _: &()| {});
        let first = router.reserve_static().unwrap();
        let second = router.reserve_static().unwrap();

        router.connect_static(s, t, &first).unwrap();
        let err = router.connect_static(s, t, &second).unwrap_err();
        assert!(matches!(err, Error::DuplicateConnection { .. }));

        // A dynamic connect of the same pair is a duplicate too
        assert!(router.connect(s, t).is_err());
        assert_eq!(router.connection_count(), 1);
    }

    #[test]
    fn test_signal_as_target_forwards_arguments() {
        let mut router = Router::new();
        let calls = Calls::default();
        let a = router.signal::<String>("a");
        let b = router.signal::<String>("b");
        let c = router.signal::<String>("c");
        let t = recording_slot(&mut router, "t", &calls);

        router.connect(a, b).unwrap();
        router.connect(b, c).unwrap();
        router.connect(c, t).unwrap();

        assert_eq!(router.kind(b.id()), EndpointKind::Signal);
        assert_eq!(router.kind(t.id()), EndpointKind::Slot);

        router.emit(a, &"chain".to_owned());
        assert_eq!(*calls.borrow(), ["t(chain, sender=c)"]);
    }

    #[test]
    fn test_sources_in_connection_order() {
        let mut router = Router::new();
        let s1 = router.signal::<()>("s1");
        let s2 = router.signal::<()>("s2");
        let t = router.slot("t", |_, _: &()| {});

        router.connect(s2, t).unwrap();
        router.connect(s1, t).unwrap();

        assert_eq!(router.sources(t).collect::<Vec<_>>(), vec![s2.id(), s1.id()]);
        assert_eq!(router.source_count(t), 2);
        assert_eq!(router.name(s2.id()), "s2");
    }

    #[test]
    fn test_signal_body_transforms_and_filters() {
        let mut router = Router::new();
        let calls = Calls::default();

        let body_calls = Rc::clone(&calls);
        let shout = router.signal_with("shout", move |outlet, text: &String| {
            body_calls
                .borrow_mut()
                .push(format!("shout({text}, sender={})", outlet.sender_name()));
            if !text.is_empty() {
                outlet.send(&text.to_uppercase());
            }
        });
        let raw = router.signal::<String>("raw");
        let t = recording_slot(&mut router, "t", &calls);

        router.connect(shout, t).unwrap();
        router.connect(raw, shout).unwrap();

        assert_eq!(router.emit(shout, &"hi".to_owned()), 1);
        assert_eq!(router.emit(shout, &String::new()), 0);
        // Fired through raw -> shout, the body sees raw as its sender
        assert_eq!(router.emit(raw, &"yo".to_owned()), 1);

        assert_eq!(
            *calls.borrow(),
            [
                "shout(hi, sender=shout)",
                "t(HI, sender=shout)",
                "shout(, sender=shout)",
                "shout(yo, sender=raw)",
                "t(YO, sender=shout)",
            ]
        );
        assert_eq!(router.kind(shout.id()), EndpointKind::Signal);
    }

    #[test]
    fn test_signal_body_may_send_twice() {
        let mut router = Router::new();
        let calls = Calls::default();
        let twice = router.signal_with("twice", |outlet, text: &String| {
            outlet.send(text);
            outlet.send(&format!("{text} again"));
        });
        let t = recording_slot(&mut router, "t", &calls);
        let u = recording_slot(&mut router, "u", &calls);
        router.connect(twice, t).unwrap();
        router.connect(twice, u).unwrap();

        assert_eq!(router.emit(twice, &"x".to_owned()), 4);
        assert_eq!(
            *calls.borrow(),
            [
                "t(x, sender=twice)",
                "u(x, sender=twice)",
                "t(x again, sender=twice)",
                "u(x again, sender=twice)",
            ]
        );
    }

    #[test]
    fn test_release_static_returns_block() {
        let (mut router, reports) =
            capturing(RouterBuilder::new().allocator(Box::new(DefaultAllocator::with_capacity(2))));
        let s = router.signal::<()>("s");
        let t = router.slot("t", |_, _: &()| {});
        let u = router.slot("u", |_, _: &()| {});

        for _ in 0..2 {
            let node = router.reserve_static().unwrap();
            router.connect_static(s, t, &node).unwrap();
            router.disconnect(s, t).unwrap();
            router.release_static(node).unwrap();
        }

        // Both blocks are free again
        router.connect(s, t).unwrap();
        router.connect(s, u).unwrap();
        assert_eq!(router.connection_count(), 2);
        assert!(reports.borrow().is_empty());
    }

    #[test]
    fn test_release_static_unlinks_live_edge() {
        let mut router =
            RouterBuilder::new().allocator(Box::new(DefaultAllocator::with_capacity(1))).build();
        let s = router.signal::<()>("s");
        let t = router.slot("t", |_, _: &()| {});

        let node = router.reserve_static().unwrap();
        router.connect_static(s, t, &node).unwrap();
        router.release_static(node).unwrap();

        assert!(!router.is_connected(s, t));
        assert_eq!(router.connection_count(), 0);
        assert_eq!(router.emit(s, &()), 0);
        router.connect(s, t).unwrap();
    }

    #[test]
    fn test_handles_from_another_router_are_rejected() {
        let (mut router, reports) = capturing_router();
        let s = router.signal::<u32>("s");
        let local = router.slot("local", |_, _: &u32| {});

        let mut other = Router::new();
        let _other_signal = other.signal::<u32>("other_signal");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let remote = other.slot("remote", move |_, n: &u32| sink.borrow_mut().push(*n));
        let remote_node = other.reserve_static().unwrap();

        assert_ne!(router.id(), other.id());
        assert_eq!(remote.id().router(), other.id());

        let err = router.connect(s, remote).unwrap_err();
        assert!(matches!(err, Error::ForeignEndpoint { endpoint, .. } if endpoint == remote.id()));
        let err = router.connect_static(s, local, &remote_node).unwrap_err();
        assert!(matches!(err, Error::ForeignStaticNode { .. }));
        let err = router.disconnect(s, remote).unwrap_err();
        assert_eq!(err.as_label(), "foreign_endpoint");
        let err = router.release_static(remote_node).unwrap_err();
        assert_eq!(err.as_label(), "foreign_static_node");

        assert_eq!(router.connection_count(), 0);
        assert_eq!(router.emit(s, &7), 0);
        assert!(seen.borrow().is_empty());
        assert_eq!(reports.borrow().len(), 4);
        assert!(reports.borrow()[0].ends_with(&format!("not to {}", router.id())));
    }

    #[test]
    #[should_panic(expected = "belongs to")]
    fn test_emit_foreign_signal_panics() {
        let router = Router::new();
        let mut other = Router::new();
        let remote = other.signal::<()>("remote");
        router.emit(remote, &());
    }
}
