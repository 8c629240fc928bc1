//! Time budgets for blocking stages.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use super::cancel::CancellationToken;
use crate::error::{Error, Result};

/// Run `f` with a time budget.
///
/// Without a budget `f` runs on the calling thread. With one it runs on a
/// worker thread and `Error::Timeout { stage, page }` is returned when the
/// budget expires.
///
/// A thread cannot be killed, so an expired worker is abandoned rather than
/// stopped: it is never joined and keeps its captures alive until `f`
/// returns. `f` receives a token that is cancelled at expiry; work that
/// loops should poll it and return early. Its result is discarded.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use pdf_catalog::pipeline::timeout::run_with_timeout;
///
/// let value = run_with_timeout(Some(Duration::from_secs(5)), "ocr", 0, |_| Ok(42)).unwrap();
/// assert_eq!(value, 42);
/// ```
pub fn run_with_timeout<T, F>(
    timeout: Option<Duration>,
    stage: &'static str,
    page: usize,
    f: F,
) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&CancellationToken) -> Result<T> + Send + 'static,
{
    let token = CancellationToken::new();
    let Some(timeout) = timeout else {
        return f(&token);
    };

    let (tx, rx) = mpsc::channel();
    let worker_token = token.clone();
    thread::Builder::new()
        .name(format!("{}-page-{}", stage, page))
        .spawn(move || {
            // The receiver is gone when the caller already timed out.
            let _ = tx.send(f(&worker_token));
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => {
            token.cancel();
            log::warn!(
                "{} exceeded {:?} on page {}; abandoning its worker",
                stage,
                timeout,
                page
            );
            Err(Error::Timeout { stage, page })
        },
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(Error::Io(std::io::Error::other(
            format!("{} worker for page {} panicked", stage, page),
        ))),
    }
}
