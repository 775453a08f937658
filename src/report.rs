//! Diagnostic sink for non-fatal connection errors.
//!
//! The router reports duplicate connects, missing disconnects and allocation
//! failures here, never successful operations.

/// Receives one formatted diagnostic per failed connect or disconnect.
///
/// Implemented for every `Fn(&str)`.
pub trait Reporter {
    /// Handles one diagnostic message.
    fn report(&self, message: &str);
}

impl<F> Reporter for F
where
    F: Fn(&str),
{
    fn report(&self, message: &str) {
        self(message);
    }
}

/// Default reporter: emits each message as a `tracing` warning.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, message: &str) {
        tracing::warn!(target: "ruapc_sigslot", "{message}");
    }
}
