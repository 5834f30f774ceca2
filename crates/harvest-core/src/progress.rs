//! Progress aggregation shared by the crawl controller and the download queue.
//!
//! Both subsystems report integer percentages computed here; neither depends on
//! the other's types.

/// Per-page increment of the crawl heuristic.
pub const CRAWL_STEP_PERCENT: u32 = 5;
/// The crawl heuristic never reaches 100 until the cursor is exhausted.
pub const CRAWL_CAP_PERCENT: u32 = 95;

/// Approximate crawl progress while pages remain: `min(page * 5, 95)`.
///
/// The total page count is unknown until the cursor runs out, so this is a
/// monotonic estimate rather than a fraction. A finished crawl reports 100.
pub fn crawl_progress(page: u32) -> u8 {
    page.saturating_mul(CRAWL_STEP_PERCENT).min(CRAWL_CAP_PERCENT) as u8
}

/// `round(done / total * 100)`, clamped to 100; 0 when `total` is 0.
pub fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let done = done.min(total);
    ((done as f64 / total as f64) * 100.0).round() as u8
}

/// Snapshot of a download job's progress (CLI-friendly).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressStats {
    /// Galleries that reached `Completed`.
    pub galleries_done: usize,
    /// Galleries in the job.
    pub gallery_count: usize,
    /// Assets downloaded across all galleries.
    pub assets_done: u64,
    /// Assets expected across galleries whose metadata is known.
    pub asset_count: u64,
}

impl ProgressStats {
    /// Job-level percentage, driven by gallery completion only.
    pub fn job_percent(&self) -> u8 {
        percent(self.galleries_done, self.gallery_count)
    }

    /// Fraction of known assets fetched, in [0.0, 1.0].
    pub fn asset_fraction(&self) -> f64 {
        if self.asset_count == 0 {
            return 0.0;
        }
        (self.assets_done as f64 / self.asset_count as f64).min(1.0)
    }
}
