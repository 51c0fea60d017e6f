/// Normalizes run progress to `[0.0, 1.0]`.
///
/// `completed_bytes` counts every item already finished successfully;
/// `fraction` is the in-flight item's own progress and is weighted by that
/// item's size. A run with nothing to download is complete by definition.
pub fn normalized_progress(
    completed_bytes: u64,
    fraction: f32,
    item_size_bytes: u64,
    total_bytes: u64,
) -> f32 {
    if total_bytes == 0 {
        return 1.0;
    }
    let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
    let done = completed_bytes as f64 + item_size_bytes as f64 * fraction as f64;
    (done / total_bytes as f64).clamp(0.0, 1.0) as f32
}

/// Per-run progress state: committed bytes plus a high-water mark so the
/// emitted value never moves backwards, even when a handle's own progress
/// source does.
#[derive(Debug, Clone)]
pub struct ProgressAggregator {
    total_bytes: u64,
    completed_bytes: u64,
    last_value: f32,
}

impl ProgressAggregator {
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            completed_bytes: 0,
            last_value: 0.0,
        }
    }

    /// Progress with the in-flight item at `fraction` of `item_size_bytes`.
    pub fn update(&mut self, fraction: f32, item_size_bytes: u64) -> f32 {
        let value =
            normalized_progress(self.completed_bytes, fraction, item_size_bytes, self.total_bytes);
        self.last_value = self.last_value.max(value);
        self.last_value
    }

    /// Commits a successfully downloaded item.
    pub fn complete_item(&mut self, item_size_bytes: u64) {
        self.completed_bytes = self.completed_bytes.saturating_add(item_size_bytes);
    }

    pub fn finish(&mut self) -> f32 {
        self.last_value = 1.0;
        self.last_value
    }

    pub fn completed_bytes(&self) -> u64 {
        self.completed_bytes
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_in_flight_item_by_size() {
        // A (100) done, B (300) half way: (100 + 150) / 400
        assert_eq!(normalized_progress(100, 0.5, 300, 400), 0.625);
    }

    #[test]
    fn empty_total_is_complete() {
        assert_eq!(normalized_progress(0, 0.0, 0, 0), 1.0);
    }

    #[test]
    fn out_of_range_fractions_are_clamped() {
        assert_eq!(normalized_progress(0, 2.0, 100, 100), 1.0);
        assert_eq!(normalized_progress(0, -1.0, 100, 100), 0.0);
        assert_eq!(normalized_progress(0, f32::NAN, 100, 100), 0.0);
    }

    #[test]
    fn aggregator_never_regresses() {
        let mut agg = ProgressAggregator::new(200);
        assert_eq!(agg.update(0.5, 100), 0.25);
        // handle reports less than before
        assert_eq!(agg.update(0.2, 100), 0.25);
        agg.complete_item(100);
        assert_eq!(agg.completed_bytes(), 100);
        assert_eq!(agg.update(0.0, 100), 0.5);
        assert_eq!(agg.finish(), 1.0);
    }

    #[test]
    fn failed_item_does_not_commit_bytes() {
        let mut agg = ProgressAggregator::new(400);
        agg.update(0.9, 100);
        // item failed: nothing committed, next item starts from the high-water mark
        let next = agg.update(0.1, 300);
        assert!(next >= 0.225);
        assert_eq!(agg.completed_bytes(), 0);
    }
}
