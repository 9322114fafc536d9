use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::error::Error;

/// Lazily constructed, process-wide handle.
///
/// The cell is an ordinary value: put it in a `static` or in application
/// state and pass it to whoever needs the handle. The factory runs at most
/// once successfully; a failed construction is not cached and surfaces again
/// on the next call.
///
/// ```rust,ignore
/// static BROWSER: HandleCell<BrowserClient> = HandleCell::new(create_browser_client);
///
/// let a = BROWSER.get_handle()?;
/// let b = BROWSER.get_handle()?;
/// assert!(Arc::ptr_eq(&a, &b));
/// ```
pub struct HandleCell<H, F = fn() -> Result<H, Error>> {
    handle: OnceCell<Arc<H>>,
    factory: F,
}

impl<H, F> HandleCell<H, F>
where
    F: Fn() -> Result<H, Error>,
{
    pub const fn new(factory: F) -> Self {
        Self {
            handle: OnceCell::new(),
            factory,
        }
    }

    /// The cached handle, constructing it on first use.
    ///
    /// # Errors
    ///
    /// Returns whatever the factory returns, typically [`Error::Config`].
    pub fn get_handle(&self) -> Result<Arc<H>, Error> {
        self.handle
            .get_or_try_init(|| {
                let handle = (self.factory)().inspect_err(|e| {
                    tracing::error!(error = %e, "Handle construction failed");
                })?;
                tracing::debug!("Handle constructed");
                Ok(Arc::new(handle))
            })
            .cloned()
    }

    /// Whether construction has already happened.
    #[must_use]
    pub fn is_constructed(&self) -> bool {
        self.handle.get().is_some()
    }
}
