//! Error types returned by connection management.
//!
//! No condition here is fatal: every variant leaves the graph as it was before
//! the failing call, and the caller decides whether to retry, ignore or
//! escalate. Dispatch has no error conditions of its own.

use thiserror::Error;

use crate::node::{EndpointId, RouterId};

/// Errors produced by connect and disconnect.
///
/// The `Display` text of each variant is also what the router passes to its
/// [`Reporter`](crate::Reporter).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    /// The pair is already connected; the graph is unchanged.
    #[error("{target} has been connected to the {signal}")]
    DuplicateConnection {
        /// Name of the emitting signal.
        signal: String,
        /// Name of the consuming endpoint.
        target: String,
    },

    /// The pair has no edge to remove; the graph is unchanged.
    #[error("the {signal} and {target} have been disconnected")]
    ConnectionNotFound {
        /// Name of the emitting signal.
        signal: String,
        /// Name of the consuming endpoint.
        target: String,
    },

    /// No storage could be obtained for a new connection node.
    #[error("failed to allocate {target} node: {source}")]
    AllocationFailure {
        /// Name of the consuming endpoint the node was meant for.
        target: String,
        /// The allocator's error.
        source: std::io::Error,
    },

    /// A static node is still linked to another pair.
    #[error("static node is still in use; cannot connect {target} to the {signal}")]
    StaticNodeInUse {
        /// Name of the emitting signal.
        signal: String,
        /// Name of the consuming endpoint.
        target: String,
    },

    /// A signal or slot handle was declared on another router.
    #[error("{endpoint} belongs to {}, not to {router}", .endpoint.router())]
    ForeignEndpoint {
        /// The rejected endpoint.
        endpoint: EndpointId,
        /// The router that rejected it.
        router: RouterId,
    },

    /// A static node was reserved on another router.
    #[error("static node belongs to {owner}, not to {router}")]
    ForeignStaticNode {
        /// The router the node was reserved on.
        owner: RouterId,
        /// The router that rejected it.
        router: RouterId,
    },
}

impl Error {
    /// Returns a short stable label (`snake_case`) for use in logs.
    ///
    /// # Example
    /// ```
    /// use ruapc_sigslot::Error;
    ///
    /// let err = Error::ConnectionNotFound { signal: "s1".into(), target: "t1".into() };
    /// assert_eq!(err.as_label(), "connection_not_found");
    /// ```
    #[must_use]
    pub fn as_label(&self) -> &'static str {
        match self {
            Error::DuplicateConnection { .. } => "duplicate_connection",
            Error::ConnectionNotFound { .. } => "connection_not_found",
            Error::AllocationFailure { .. } => "allocation_failure",
            Error::StaticNodeInUse { .. } => "static_node_in_use",
            Error::ForeignEndpoint { .. } => "foreign_endpoint",
            Error::ForeignStaticNode { .. } => "foreign_static_node",
        }
    }
}

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
