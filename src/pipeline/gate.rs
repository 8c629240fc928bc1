//! Cross-document admission control.
//!
//! [`AdmissionGate`] bounds how many documents are in flight and pauses
//! admission while system memory usage is high. Usage is sampled through a
//! [`MemoryGauge`]; admission stops at the high-water mark and resumes once
//! usage drops a hysteresis margin below it.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use sysinfo::System;

/// Default fraction of memory in use at which admission pauses.
pub const DEFAULT_HIGH_WATER: f32 = 0.80;

/// Default margin below the high-water mark at which admission resumes.
pub const DEFAULT_HYSTERESIS: f32 = 0.10;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Source of the current memory usage.
pub trait MemoryGauge: Send + Sync {
    /// Fraction of memory in use in [0, 1]; `None` when unknown.
    fn usage(&self) -> Option<f32>;
}

/// System memory through `sysinfo`: `1 - available / total`.
pub struct SystemMemory {
    system: Mutex<System>,
}

impl std::fmt::Debug for SystemMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemMemory").finish_non_exhaustive()
    }
}

impl Default for SystemMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemMemory {
    /// Gauge over the host's physical memory.
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl MemoryGauge for SystemMemory {
    fn usage(&self) -> Option<f32> {
        let mut system = lock(&self.system);
        system.refresh_memory();
        usage_fraction(system.total_memory(), system.available_memory())
    }
}

/// `1 - available / total`, or `None` when the total is unknown.
pub fn usage_fraction(total_bytes: u64, available_bytes: u64) -> Option<f32> {
    if total_bytes == 0 {
        return None;
    }
    Some((1.0 - available_bytes as f64 / total_bytes as f64).clamp(0.0, 1.0) as f32)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Counting semaphore.
#[derive(Debug)]
pub struct Semaphore {
    permits: Mutex<usize>,
    released: Condvar,
}

impl Semaphore {
    /// Semaphore with `permits` permits (at least one).
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits.max(1)),
            released: Condvar::new(),
        }
    }

    /// Block until a permit is available.
    pub fn acquire(&self) -> SemaphorePermit<'_> {
        let mut permits = lock(&self.permits);
        while *permits == 0 {
            permits = self
                .released
                .wait(permits)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *permits -= 1;
        SemaphorePermit { semaphore: self }
    }

    /// Take a permit if one is free.
    pub fn try_acquire(&self) -> Option<SemaphorePermit<'_>> {
        let mut permits = lock(&self.permits);
        if *permits == 0 {
            return None;
        }
        *permits -= 1;
        Some(SemaphorePermit { semaphore: self })
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        *lock(&self.permits)
    }

    fn release(&self) {
        *lock(&self.permits) += 1;
        self.released.notify_one();
    }
}

/// Returns its permit on drop.
#[derive(Debug)]
pub struct SemaphorePermit<'a> {
    semaphore: &'a Semaphore,
}

impl Drop for SemaphorePermit<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

#[derive(Debug, Default)]
struct GateState {
    active: usize,
    paused: bool,
}

/// Admission control for concurrent documents.
pub struct AdmissionGate {
    max_concurrent: usize,
    high_water: f32,
    hysteresis: f32,
    poll_interval: Duration,
    gauge: Option<Arc<dyn MemoryGauge>>,
    state: Mutex<GateState>,
    changed: Condvar,
}

impl std::fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("max_concurrent", &self.max_concurrent)
            .field("high_water", &self.high_water)
            .field("hysteresis", &self.hysteresis)
            .field("has_gauge", &self.gauge.is_some())
            .finish()
    }
}

impl AdmissionGate {
    /// Gate admitting up to `max_concurrent` documents, without a memory gauge.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            high_water: DEFAULT_HIGH_WATER,
            hysteresis: DEFAULT_HYSTERESIS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            gauge: None,
            state: Mutex::new(GateState::default()),
            changed: Condvar::new(),
        }
    }

    /// Pause admission on high memory usage as reported by `gauge`.
    pub fn with_memory_gauge(mut self, gauge: Arc<dyn MemoryGauge>) -> Self {
        self.gauge = Some(gauge);
        self
    }

    /// Set the high-water mark and hysteresis.
    pub fn with_thresholds(mut self, high_water: f32, hysteresis: f32) -> Self {
        self.high_water = high_water;
        self.hysteresis = hysteresis;
        self
    }

    /// How often a waiting caller re-samples memory.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Block until the document may start.
    pub fn admit(&self) -> AdmissionPermit<'_> {
        let mut state = lock(&self.state);
        loop {
            if self.may_admit(&mut state) {
                state.active += 1;
                return AdmissionPermit { gate: self };
            }
            state = self
                .changed
                .wait_timeout(state, self.poll_interval)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Admit without waiting, if possible.
    pub fn try_admit(&self) -> Option<AdmissionPermit<'_>> {
        let mut state = lock(&self.state);
        if self.may_admit(&mut state) {
            state.active += 1;
            Some(AdmissionPermit { gate: self })
        } else {
            None
        }
    }

    /// Documents currently admitted.
    pub fn active(&self) -> usize {
        lock(&self.state).active
    }

    /// Is admission paused for memory?
    pub fn is_paused(&self) -> bool {
        lock(&self.state).paused
    }

    fn may_admit(&self, state: &mut GateState) -> bool {
        if let Some(usage) = self.gauge.as_ref().and_then(|g| g.usage()) {
            if state.paused && usage < self.high_water - self.hysteresis {
                log::info!("memory at {:.0}%, resuming admission", usage * 100.0);
                state.paused = false;
            } else if !state.paused && usage >= self.high_water {
                log::warn!("memory at {:.0}%, pausing admission", usage * 100.0);
                state.paused = true;
            }
        }
        !state.paused && state.active < self.max_concurrent
    }

    fn release(&self) {
        let mut state = lock(&self.state);
        state.active = state.active.saturating_sub(1);
        drop(state);
        self.changed.notify_all();
    }
}

/// Held while a document is being processed.
#[derive(Debug)]
pub struct AdmissionPermit<'a> {
    gate: &'a AdmissionGate,
}

impl Drop for AdmissionPermit<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Gauge whose reading tests can change.
    struct ManualGauge(AtomicU32);

    impl ManualGauge {
        fn new(usage: f32) -> Arc<Self> {
            Arc::new(Self(AtomicU32::new(usage.to_bits())))
        }

        fn set(&self, usage: f32) {
            self.0.store(usage.to_bits(), Ordering::SeqCst);
        }
    }

    impl MemoryGauge for ManualGauge {
        fn usage(&self) -> Option<f32> {
            Some(f32::from_bits(self.0.load(Ordering::SeqCst)))
        }
    }

    #[test]
    fn test_usage_fraction() {
        let usage = usage_fraction(16_000_000_000, 4_000_000_000).unwrap();
        assert!((usage - 0.75).abs() < 1e-6);
        assert_eq!(usage_fraction(0, 0), None);
        // Available above total (stale counters) reads as empty, not negative.
        assert_eq!(usage_fraction(100, 150), Some(0.0));
    }

    #[test]
    fn test_system_memory_reads_a_fraction() {
        let gauge = SystemMemory::new();
        if let Some(usage) = gauge.usage() {
            assert!((0.0..=1.0).contains(&usage), "usage {}", usage);
        }
        let gate = AdmissionGate::new(1)
            .with_memory_gauge(Arc::new(gauge))
            .with_thresholds(1.1, 0.1);
        assert!(gate.try_admit().is_some());
    }

    #[test]
    fn test_concurrency_limit() {
        let gate = AdmissionGate::new(2);
        let a = gate.try_admit();
        let b = gate.try_admit();
        assert!(a.is_some() && b.is_some());
        assert!(gate.try_admit().is_none());
        drop(a);
        assert_eq!(gate.active(), 1);
        assert!(gate.try_admit().is_some());
    }

    #[test]
    fn test_memory_hysteresis() {
        let gauge = ManualGauge::new(0.5);
        let gate = AdmissionGate::new(8).with_memory_gauge(gauge.clone());

        assert!(gate.try_admit().is_some());
        gauge.set(0.85);
        assert!(gate.try_admit().is_none());
        assert!(gate.is_paused());

        // Below high water but inside the hysteresis band: still paused.
        gauge.set(0.75);
        assert!(gate.try_admit().is_none());

        gauge.set(0.69);
        assert!(gate.try_admit().is_some());
        assert!(!gate.is_paused());
    }

    #[test]
    fn test_admit_waits_for_release() {
        let gate = Arc::new(AdmissionGate::new(1).with_poll_interval(Duration::from_millis(5)));
        let permit = gate.admit();
        let waiter = {
            let gate = Arc::clone(&gate);
            std::thread::spawn(move || {
                let _permit = gate.admit();
                true
            })
        };
        std::thread::sleep(Duration::from_millis(30));
        drop(permit);
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_semaphore() {
        let semaphore = Semaphore::new(1);
        let permit = semaphore.acquire();
        assert!(semaphore.try_acquire().is_none());
        drop(permit);
        assert_eq!(semaphore.available(), 1);
    }
}
