//! Result assembly for position-indexed query results.
//!
//! Responses arrive as [`Fragment`]s: a start index plus consecutive
//! elements. [`ResultAccumulator`] places them by position so arrival order
//! and duplicate delivery do not matter, and decides when a query has seen
//! enough to resolve.

use std::collections::BTreeMap;

/// Caller options for a ranged query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryOptions {
    /// First position to request.
    pub offset: u32,
    /// Maximum results to return, `0` for everything available.
    pub count: usize,
}

impl QueryOptions {
    /// Options requesting everything from position 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the starting position.
    #[must_use]
    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    /// Cap the number of results.
    #[must_use]
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    /// Whether a result cap is set.
    #[must_use]
    pub fn is_capped(&self) -> bool {
        self.count > 0
    }
}

/// A slice of a query result starting at `start`.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment<T> {
    pub start: u32,
    pub items: Vec<T>,
}

impl<T> Fragment<T> {
    /// Create a fragment.
    #[must_use]
    pub fn new(start: u32, items: Vec<T>) -> Self {
        Self { start, items }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the fragment carries no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Position-keyed store of merged fragments.
#[derive(Debug, Clone)]
pub struct ResultAccumulator<T> {
    entries: BTreeMap<u32, T>,
}

impl<T> Default for ResultAccumulator<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T> ResultAccumulator<T> {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a fragment, overwriting any element already at the same position.
    ///
    /// Returns the number of elements written.
    pub fn merge(&mut self, fragment: Fragment<T>) -> usize {
        let start = fragment.start;
        let mut written = 0;

        for (offset, item) in fragment.items.into_iter().enumerate() {
            let Some(position) = u32::try_from(offset)
                .ok()
                .and_then(|offset| start.checked_add(offset))
            else {
                break;
            };
            self.entries.insert(position, item);
            written += 1;
        }

        written
    }

    /// Number of distinct positions held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing has been merged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest position held.
    #[must_use]
    pub fn highest_index(&self) -> Option<u32> {
        self.entries.last_key_value().map(|(position, _)| *position)
    }

    /// Element at a position.
    #[must_use]
    pub fn get(&self, position: u32) -> Option<&T> {
        self.entries.get(&position)
    }

    /// Iterate over `(position, element)` in ascending position order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.entries.iter().map(|(position, item)| (*position, item))
    }

    /// Decide whether the query can resolve.
    ///
    /// Complete when the cap in `options` is reached, or when the highest
    /// merged position covers the `combined` total reported by the server.
    /// With nothing merged, complete only if nothing exists at or past the
    /// requested offset.
    #[must_use]
    pub fn is_complete(&self, combined: u32, options: &QueryOptions) -> bool {
        if options.is_capped() && self.len() >= options.count {
            return true;
        }

        match self.highest_index() {
            Some(highest) => u64::from(highest) + 1 >= u64::from(combined),
            None => combined <= options.offset,
        }
    }

    /// Consume the accumulator into elements ordered by position, truncated
    /// to the cap in `options`.
    #[must_use]
    pub fn finalize(self, options: &QueryOptions) -> Vec<T> {
        let items = self.entries.into_values();
        if options.is_capped() {
            items.take(options.count).collect()
        } else {
            items.collect()
        }
    }
}
