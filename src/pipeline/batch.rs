//! Many documents on a pool of scoped worker threads.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use super::cancel::CancellationToken;
use super::gate::AdmissionGate;
use crate::error::{Error, Result};

/// Runs a per-document job over many inputs.
///
/// Workers pull inputs from a shared cursor; each job runs only while holding
/// an [`AdmissionGate`] permit. Results come back in input order.
#[derive(Debug)]
pub struct BatchRunner {
    jobs: usize,
    gate: Arc<AdmissionGate>,
    cancel: CancellationToken,
}

impl BatchRunner {
    /// Runner with `jobs` workers sharing `gate`.
    pub fn new(jobs: usize, gate: Arc<AdmissionGate>) -> Self {
        Self {
            jobs: jobs.max(1),
            gate,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop picking up new inputs once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Number of workers.
    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Run `job` on every input.
    ///
    /// Inputs not started before cancellation yield `Err(Error::Cancelled)`.
    pub fn run<T, F>(&self, inputs: &[PathBuf], job: F) -> Vec<Result<T>>
    where
        T: Send,
        F: Fn(&Path) -> Result<T> + Sync,
    {
        let cursor = AtomicUsize::new(0);
        let workers = self.jobs.min(inputs.len()).max(1);
        log::info!("processing {} documents on {} workers", inputs.len(), workers);

        let mut indexed: Vec<(usize, Result<T>)> = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    scope.spawn(|| {
                        let mut done = Vec::new();
                        loop {
                            let index = cursor.fetch_add(1, Ordering::SeqCst);
                            let Some(input) = inputs.get(index) else {
                                break;
                            };
                            if self.cancel.is_cancelled() {
                                done.push((index, Err(Error::Cancelled)));
                                continue;
                            }
                            let _permit = self.gate.admit();
                            log::debug!("starting {}", input.display());
                            done.push((index, job(input)));
                        }
                        done
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|handle| match handle.join() {
                    Ok(done) => done,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        });

        indexed.sort_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, result)| result).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn inputs(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("doc-{}.pdf", i))).collect()
    }

    #[test]
    fn test_results_in_input_order() {
        let runner = BatchRunner::new(4, Arc::new(AdmissionGate::new(4)));
        let results = runner.run(&inputs(20), |path| {
            let n: u64 = path
                .to_string_lossy()
                .trim_start_matches("doc-")
                .trim_end_matches(".pdf")
                .parse()
                .unwrap();
            // Later documents finish first.
            thread::sleep(Duration::from_millis(20 - n));
            Ok(n)
        });
        let values: Vec<u64> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_gate_bounds_concurrency() {
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let runner = BatchRunner::new(8, Arc::new(AdmissionGate::new(2)));
        let results = runner.run(&inputs(16), |_| {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        });
        assert!(results.iter().all(|r| r.is_ok()));
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_failures_do_not_stop_the_batch() {
        let runner = BatchRunner::new(2, Arc::new(AdmissionGate::new(2)));
        let results = runner.run(&inputs(4), |path| {
            if path.ends_with("doc-1.pdf") {
                Err(Error::InvalidPdf("broken".to_string()))
            } else {
                Ok(())
            }
        });
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[3].is_ok());
    }

    #[test]
    fn test_cancelled_batch() {
        let token = CancellationToken::new();
        token.cancel();
        let runner = BatchRunner::new(2, Arc::new(AdmissionGate::new(2))).with_cancellation(token);
        let results = runner.run(&inputs(3), |_| Ok(()));
        assert!(results.iter().all(|r| matches!(r, Err(Error::Cancelled))));
    }
}
