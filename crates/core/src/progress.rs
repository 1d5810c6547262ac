//! Monotonic progress aggregation.
//!
//! Progress reports arrive asynchronously over an unreliable channel and
//! may be observed out of order. [`ProgressTracker`] therefore keeps the
//! running maximum: a report lower than the current value is ignored, not
//! applied. Finalization forces exactly 100 regardless of the last report.

/// Merges possibly out-of-order progress reports into a monotonic value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressTracker {
    current: u8,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current progress in `[0, 100]`.
    pub fn value(&self) -> u8 {
        self.current
    }

    /// Merge a report: clamp to `[0, 100]`, apply only if it does not
    /// regress. Returns the (possibly unchanged) stored value.
    pub fn update(&mut self, reported: i64) -> u8 {
        let clamped = reported.clamp(0, 100) as u8;
        if clamped >= self.current {
            self.current = clamped;
        }
        self.current
    }

    /// Force progress to exactly 100. Called by the end-of-run finalizer.
    pub fn finalize(&mut self) {
        self.current = 100;
    }

    /// Drop back to zero for a fresh run. Monotonicity holds per run, not
    /// across restarts.
    pub fn reset(&mut self) {
        self.current = 0;
    }
}

/// Parse an engine progress report line.
///
/// The reconstruction engine emits `PROGRESS:<percent>` lines on stdout
/// interleaved with its normal output; everything else is plain log text.
pub fn parse_progress_line(line: &str) -> Option<i64> {
    let rest = line.trim().strip_prefix("PROGRESS:")?;
    rest.trim().parse::<f64>().ok().map(|p| p.round() as i64)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_applies_increasing_reports() {
        let mut tracker = ProgressTracker::new();
        assert_eq!(tracker.update(10), 10);
        assert_eq!(tracker.update(55), 55);
        assert_eq!(tracker.value(), 55);
    }

    #[test]
    fn update_ignores_regressions() {
        let mut tracker = ProgressTracker::new();
        tracker.update(60);
        assert_eq!(tracker.update(30), 60);
        assert_eq!(tracker.value(), 60);
    }

    #[test]
    fn update_clamps_out_of_range_reports() {
        let mut tracker = ProgressTracker::new();
        assert_eq!(tracker.update(250), 100);
        assert_eq!(tracker.update(-5), 100);

        let mut tracker = ProgressTracker::new();
        assert_eq!(tracker.update(-5), 0);
    }

    #[test]
    fn stored_value_is_running_maximum_of_reports() {
        // For any sequence, the stored value equals the clamped running max.
        let reports: [i64; 8] = [3, 80, 12, -4, 95, 95, 200, 7];
        let mut tracker = ProgressTracker::new();
        let mut max = 0i64;
        for r in reports {
            tracker.update(r);
            max = max.max(r.clamp(0, 100));
            assert_eq!(tracker.value() as i64, max);
        }
    }

    #[test]
    fn finalize_forces_exactly_100() {
        let mut tracker = ProgressTracker::new();
        tracker.update(42);
        tracker.finalize();
        assert_eq!(tracker.value(), 100);
    }

    #[test]
    fn reset_starts_a_fresh_run() {
        let mut tracker = ProgressTracker::new();
        tracker.update(90);
        tracker.reset();
        assert_eq!(tracker.value(), 0);
        assert_eq!(tracker.update(5), 5);
    }

    #[test]
    fn parse_progress_line_accepts_engine_format() {
        assert_eq!(parse_progress_line("PROGRESS: 42"), Some(42));
        assert_eq!(parse_progress_line("PROGRESS:87.6"), Some(88));
        assert_eq!(parse_progress_line("  PROGRESS: 100"), Some(100));
    }

    #[test]
    fn parse_progress_line_rejects_plain_log_text() {
        assert_eq!(parse_progress_line("[INFO] Running dense matching"), None);
        assert_eq!(parse_progress_line("PROGRESS: n/a"), None);
        assert_eq!(parse_progress_line(""), None);
    }
}
