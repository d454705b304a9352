//! Range planning for ranged member list queries.
//!
//! Member lists are requested in fixed windows of [`WINDOW_SIZE`] positions.
//! The planner produces the windows for the first request and for each
//! follow-up, and decides when a follow-up is warranted.

use crate::assembly::QueryOptions;
use muster_protocol::RangeWindow;

/// Positions covered by one window.
pub const WINDOW_SIZE: u32 = 100;

/// Windows sent per request unless configured otherwise.
pub const DEFAULT_RANGES_PER_REQUEST: usize = 1;

/// Plans request windows for a single query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangePlanner {
    ranges_per_request: usize,
}

impl Default for RangePlanner {
    fn default() -> Self {
        Self::new(DEFAULT_RANGES_PER_REQUEST)
    }
}

impl RangePlanner {
    /// Create a planner sending `ranges_per_request` windows per request
    /// (at least one).
    #[must_use]
    pub fn new(ranges_per_request: usize) -> Self {
        Self {
            ranges_per_request: ranges_per_request.max(1),
        }
    }

    /// Windows sent per request.
    #[must_use]
    pub fn ranges_per_request(&self) -> usize {
        self.ranges_per_request
    }

    /// Windows for the first request, starting at `offset`.
    #[must_use]
    pub fn plan_initial(&self, offset: u32) -> Vec<RangeWindow> {
        self.windows_from(offset)
    }

    /// Windows for a follow-up request, starting right after the highest
    /// position merged so far.
    #[must_use]
    pub fn plan_followup(&self, highest_index_seen: u32) -> Vec<RangeWindow> {
        match highest_index_seen.checked_add(1) {
            Some(start) => self.windows_from(start),
            None => Vec::new(),
        }
    }

    /// Decide whether another batch of windows should be requested.
    ///
    /// Requires all of: the cap (if any) not yet reached, the server total
    /// extending past the highest merged position, and no request still
    /// outstanding. Nothing is requested before a first position is merged.
    #[must_use]
    pub fn needs_followup(
        &self,
        merged: usize,
        options: &QueryOptions,
        combined: u32,
        highest_index_seen: Option<u32>,
        outstanding: usize,
    ) -> bool {
        if outstanding > 0 {
            return false;
        }
        if options.is_capped() && merged >= options.count {
            return false;
        }
        match highest_index_seen {
            Some(highest) => u64::from(combined) > u64::from(highest) + 1,
            None => false,
        }
    }

    fn windows_from(&self, start: u32) -> Vec<RangeWindow> {
        let mut windows = Vec::with_capacity(self.ranges_per_request);
        let mut next = Some(start);

        for _ in 0..self.ranges_per_request {
            let Some(start) = next else { break };
            windows.push(RangeWindow::new(
                start,
                start.saturating_add(WINDOW_SIZE - 1),
            ));
            next = start.checked_add(WINDOW_SIZE);
        }

        windows
    }
}
