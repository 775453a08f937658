//! # ruapc-sigslot
//!
//! A signal/slot connection engine for single-threaded, embedded-style hosts.
//! Named signals are wired to named slots at runtime, and emitting a signal
//! synchronously invokes every connected slot with the signal's arguments.
//! This crate is part of the [ruapc](https://github.com/SF-Zhou/ruapc) project.
//!
//! ## Features
//!
//! - **O(1) Linking**: Each edge is one node spliced into two circular lists,
//!   the target's source list and the signal's subscriber list
//! - **Deterministic Dispatch**: Targets run in connection order, depth-first
//!   through nested emissions
//! - **Signal Forwarding**: A signal can be the target of another signal
//! - **Signal Bodies**: A signal may run its own routine around the send, or
//!   send different arguments
//! - **Sender Identity**: Slots connected to several signals can tell which one fired
//! - **Custom Allocators**: Pluggable allocator trait for connection-node storage,
//!   plus reserved static nodes for targets without a heap after start-up
//! - **Non-fatal Diagnostics**: Duplicate connects, missing disconnects and
//!   allocation failures are returned as errors and passed to a reporter
//!
//! ## Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use ruapc_sigslot::Router;
//!
//! # fn main() -> ruapc_sigslot::Result<()> {
//! let mut router = Router::new();
//! let clicked = router.signal::<String>("clicked");
//!
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let sink = Rc::clone(&log);
//! let printer = router.slot("printer", move |emission, text: &String| {
//!     sink.borrow_mut().push(format!("{text} from {}", emission.sender_name()));
//! });
//!
//! router.connect(clicked, printer)?;
//! router.emit(clicked, &"hello".to_string());
//! assert_eq!(*log.borrow(), ["hello from clicked"]);
//!
//! // Connecting the same pair twice is reported and leaves the graph unchanged
//! assert!(router.connect(clicked, printer).is_err());
//! assert_eq!(router.subscriber_count(clicked), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Static Connections
//!
//! ```rust
//! use ruapc_sigslot::Router;
//!
//! # fn main() -> ruapc_sigslot::Result<()> {
//! let mut router = Router::new();
//! let tick = router.signal::<u32>("tick");
//! let sink = router.slot("sink", |_, _: &u32| {});
//!
//! // Reserve the node up front; it is reused across connect/disconnect cycles
//! let node = router.reserve_static()?;
//! router.connect_static(tick, sink, &node)?;
//! let connection = router.disconnect(tick, sink)?;
//! assert!(connection.is_static);
//! router.connect_static(tick, sink, &node)?;
//!
//! // Hand the block back once the edge is no longer needed
//! router.release_static(node)?;
//! assert_eq!(router.connection_count(), 0);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod allocator;
mod error;
mod graph;
mod handler;
mod intrusive_list;
mod node;
mod report;
mod router;

pub use allocator::{Allocator, DefaultAllocator};
pub use error::{Error, Result};
pub use handler::Handler;
pub use node::{ConnectionNode, EndpointId, EndpointKind, NodeKey, RouterId};
pub use report::{Reporter, TracingReporter};
pub use router::{
    Connection, Emission, Endpoint, Outlet, Router, RouterBuilder, Signal, Slot,
    StaticConnection,
};
