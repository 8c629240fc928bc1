//! Optional external layout refinement.
//!
//! A [`LayoutRefiner`] (typically a vision model behind a remote API) looks at
//! a page and its consolidated regions and proposes replacement boxes or
//! roles. The pipeline owns acceptance: a proposal is applied only when its
//! box lies inside the page, is not degenerate, and leaves every pair of
//! regions within the overlap policy. Anything else is rejected and the
//! consolidator's own result stands.
//!
//! Calls go through a [`RateLimiter`] shared by every document in the process.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use image::RgbImage;

use crate::catalog::validate::overlap_legal;
use crate::catalog::{BlockRole, PageInfo};
use crate::consolidate::{Region, MIN_AREA, MIN_SIDE};
use crate::error::Result;
use crate::geometry::BBox;
use crate::pipeline::gate::{Semaphore, SemaphorePermit};

/// Replacement for one region.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    /// Index into the regions given to the refiner
    pub index: usize,
    /// New box in pixels
    pub bbox: BBox,
    /// New role, if it changes
    pub role: Option<BlockRole>,
}

/// Proposes corrections to a page layout.
pub trait LayoutRefiner: Send + Sync {
    /// Proposals for `regions` on `page`.
    fn propose(&self, page: &PageInfo, image: &RgbImage, regions: &[Region]) -> Result<Vec<Proposal>>;

    /// Name for logs.
    fn name(&self) -> &str;
}

/// Bounds concurrent calls and spaces them out.
#[derive(Debug)]
pub struct RateLimiter {
    semaphore: Semaphore,
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// At most `max_concurrent` calls in flight.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Semaphore::new(max_concurrent),
            min_interval: Duration::ZERO,
            last_call: Mutex::new(None),
        }
    }

    /// Wait at least `interval` between call starts.
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Block until a call may start.
    pub fn acquire(&self) -> SemaphorePermit<'_> {
        let permit = self.semaphore.acquire();
        if !self.min_interval.is_zero() {
            let mut last = self
                .last_call
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(previous) = *last {
                let elapsed = previous.elapsed();
                if elapsed < self.min_interval {
                    std::thread::sleep(self.min_interval - elapsed);
                }
            }
            *last = Some(Instant::now());
        }
        permit
    }

    /// Run `f` under the limiter.
    pub fn run<T>(&self, f: impl FnOnce() -> T) -> T {
        let _permit = self.acquire();
        f()
    }
}

/// Why a proposal was not applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// Index does not name a region
    UnknownRegion(usize),
    /// Box extends past the page
    OutsidePage(BBox),
    /// Box too small or inverted
    Degenerate(BBox),
    /// Applying it would create an illegal overlap with another region
    Overlap(usize),
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::UnknownRegion(i) => write!(f, "no region {}", i),
            Rejection::OutsidePage(b) => write!(f, "box {:?} outside the page", b),
            Rejection::Degenerate(b) => write!(f, "degenerate box {:?}", b),
            Rejection::Overlap(i) => write!(f, "illegal overlap with region {}", i),
        }
    }
}

/// Check one proposal against the current regions.
pub fn check_proposal(
    page: &PageInfo,
    regions: &[Region],
    proposal: &Proposal,
    merge_threshold: f32,
) -> std::result::Result<(), Rejection> {
    let Some(current) = regions.get(proposal.index) else {
        return Err(Rejection::UnknownRegion(proposal.index));
    };
    let bbox = proposal.bbox;
    if !bbox.is_valid() || bbox.area() < MIN_AREA || bbox.width() < MIN_SIDE || bbox.height() < MIN_SIDE {
        return Err(Rejection::Degenerate(bbox));
    }
    if !bbox.within(page.pixel_width as f32, page.pixel_height as f32) {
        return Err(Rejection::OutsidePage(bbox));
    }
    let role = proposal.role.unwrap_or(current.role);
    for (i, other) in regions.iter().enumerate() {
        if i != proposal.index && !overlap_legal((role, &bbox), (other.role, &other.bbox), merge_threshold) {
            return Err(Rejection::Overlap(i));
        }
    }
    Ok(())
}

/// Apply acceptable proposals in order, each checked against the result of
/// the previous ones. Returns the rejected proposals with their reasons.
pub fn apply_proposals(
    page: &PageInfo,
    regions: &mut [Region],
    proposals: &[Proposal],
    merge_threshold: f32,
) -> Vec<(Proposal, Rejection)> {
    let mut rejected = Vec::new();
    for proposal in proposals {
        match check_proposal(page, regions, proposal, merge_threshold) {
            Ok(()) => {
                let region = &mut regions[proposal.index];
                log::debug!(
                    "page {}: refinement moves {:?} to {:?}",
                    page.page_index,
                    region.bbox,
                    proposal.bbox
                );
                region.bbox = proposal.bbox;
                if let Some(role) = proposal.role {
                    region.role = role;
                }
            },
            Err(reason) => {
                log::debug!("page {}: rejected proposal: {}", page.page_index, reason);
                rejected.push((proposal.clone(), reason));
            },
        }
    }
    rejected
}
