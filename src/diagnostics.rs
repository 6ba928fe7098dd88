use crate::Error;

/// Receives errors that happen in the background: failed catalog fetches and undelivered event
/// batches. These never reach feature evaluation, which keeps using the last good catalog.
///
/// Closures taking `&Error` implement this trait.
///
/// ```
/// # use molasses::ClientConfig;
/// let config = ClientConfig::from_api_key("api-key").diagnostics(|err: &molasses::Error| {
///     eprintln!("molasses: {err}");
/// });
/// ```
pub trait DiagnosticHook {
    /// Called for every background error.
    fn on_error(&self, error: &Error);
}

pub(crate) struct NoopDiagnosticHook;
impl DiagnosticHook for NoopDiagnosticHook {
    fn on_error(&self, _error: &Error) {}
}

impl<T: Fn(&Error)> DiagnosticHook for T {
    fn on_error(&self, error: &Error) {
        self(error);
    }
}
