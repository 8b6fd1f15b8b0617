//! Tunables for page growth and iteration

use crate::page::MAX_SLOTS_PER_PAGE;

/// Per-hive configuration
///
/// Every page after the first gets `total_capacity * growth_factor` slots,
/// clamped to `[initial_page_capacity, max_page_capacity]`. With the defaults
/// that doubles the total capacity of a hive each time it grows, until pages
/// hit 4096 slots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HiveConfig {
    /// Number of slots in the first page (and the minimum for every later page)
    pub initial_page_capacity: usize,
    /// Upper bound on the number of slots in one page
    pub max_page_capacity: usize,
    /// Multiplier applied to the current total capacity when growing
    pub growth_factor: usize,
    /// How many slots ahead of the visited one to prefetch while iterating (0 = off)
    pub prefetch_distance: usize,
}

impl Default for HiveConfig {
    fn default() -> Self {
        Self {
            initial_page_capacity: 16,
            max_page_capacity: 4096,
            growth_factor: 2,
            prefetch_distance: 4,
        }
    }
}

impl HiveConfig {
    pub fn with_initial_page_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "page capacity must be greater than zero");
        assert!(capacity <= MAX_SLOTS_PER_PAGE, "page capacity too large");
        self.initial_page_capacity = capacity;
        if self.max_page_capacity < capacity {
            self.max_page_capacity = capacity;
        }
        self
    }

    pub fn with_max_page_capacity(mut self, capacity: usize) -> Self {
        assert!(
            capacity >= self.initial_page_capacity,
            "max page capacity must be at least the initial page capacity"
        );
        assert!(capacity <= MAX_SLOTS_PER_PAGE, "page capacity too large");
        self.max_page_capacity = capacity;
        self
    }

    pub fn with_growth_factor(mut self, factor: usize) -> Self {
        assert!(factor >= 1, "growth factor must be at least 1");
        self.growth_factor = factor;
        self
    }

    pub fn with_prefetch_distance(mut self, distance: usize) -> Self {
        self.prefetch_distance = distance;
        self
    }

    /// Capacity of the next page for a hive that currently holds `total_capacity` slots
    pub fn next_page_capacity(&self, total_capacity: usize) -> usize {
        if total_capacity == 0 {
            return self.initial_page_capacity;
        }
        total_capacity
            .saturating_mul(self.growth_factor)
            .clamp(self.initial_page_capacity, self.max_page_capacity)
    }
}
