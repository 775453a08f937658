//! The handler capability invoked once per edge at dispatch time.
//!
//! Slot bodies implement [`Handler`]. Heads and connection nodes store the
//! type-erased form so that signals with different argument types can share
//! one router; the typed [`Signal`](crate::Signal) and [`Slot`](crate::Slot)
//! handles guarantee that the erased arguments always have the expected type.
//!
//! Every signal head carries its own emission routine: [`Forward`] for a plain
//! signal, or a [`SignalBody`] that decides what to send. Connecting signal
//! `a` to signal `b` therefore makes firing `a` run `b`'s routine.

use std::any::Any;
use std::marker::PhantomData;

use crate::router::{Emission, Outlet};

/// A slot body.
///
/// Implemented for every `Fn(&Emission<'_>, &A)`, so closures can be used
/// directly. Implement it on a named type when the slot carries state that
/// needs a name of its own.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use ruapc_sigslot::{Emission, Handler, Router, Slot};
///
/// struct Counter(Cell<u32>);
///
/// impl Handler<u32> for Counter {
///     fn invoke(&self, _emission: &Emission<'_>, step: &u32) {
///         self.0.set(self.0.get() + step);
///     }
/// }
///
/// let mut router = Router::new();
/// let tick = router.signal::<u32>("tick");
/// let counter: Slot<u32> = router.slot_with("counter", Counter(Cell::new(0)));
/// router.connect(tick, counter).unwrap();
/// assert_eq!(router.emit(tick, &2), 1);
/// ```
pub trait Handler<A> {
    /// Runs the slot for one emission.
    ///
    /// `emission` identifies the sender and allows nested emissions.
    fn invoke(&self, emission: &Emission<'_>, args: &A);
}

impl<A, F> Handler<A> for F
where
    F: Fn(&Emission<'_>, &A),
{
    fn invoke(&self, emission: &Emission<'_>, args: &A) {
        self(emission, args);
    }
}

/// Handler with its argument type erased.
pub(crate) trait ErasedHandler {
    fn call(&self, emission: &Emission<'_>, args: &dyn Any);
}

/// Adapts a typed [`Handler`] to [`ErasedHandler`].
pub(crate) struct Typed<A, H> {
    handler: H,
    _marker: PhantomData<fn(&A)>,
}

impl<A, H> Typed<A, H> {
    pub(crate) const fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

impl<A: 'static, H: Handler<A>> ErasedHandler for Typed<A, H> {
    fn call(&self, emission: &Emission<'_>, args: &dyn Any) {
        // Typed handles of one router always agree on `A`.
        if let Some(args) = args.downcast_ref::<A>() {
            self.handler.invoke(emission, args);
        }
    }
}

/// Emission routine of a plain signal: sends the arguments unchanged on the
/// signal's own subscriber list.
pub(crate) struct Forward;

impl ErasedHandler for Forward {
    fn call(&self, emission: &Emission<'_>, args: &dyn Any) {
        emission.forward(args);
    }
}

/// Emission routine of a signal declared with a body of its own.
pub(crate) struct SignalBody<A, F> {
    body: F,
    _marker: PhantomData<fn(&A)>,
}

impl<A, F> SignalBody<A, F> {
    pub(crate) const fn new(body: F) -> Self {
        Self {
            body,
            _marker: PhantomData,
        }
    }
}

impl<A, F> ErasedHandler for SignalBody<A, F>
where
    A: 'static,
    F: Fn(&Outlet<'_, A>, &A),
{
    fn call(&self, emission: &Emission<'_>, args: &dyn Any) {
        if let Some(args) = args.downcast_ref::<A>() {
            (self.body)(&Outlet::new(emission), args);
        }
    }
}
