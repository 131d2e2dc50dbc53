use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_REPORT_INTERVAL_MS: u64 = 1000;

/// Emitted when a report pass is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportTick {
    pub counter: u32,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchedulerStats {
    pub total_reports: u32,
    /// Times the loop fell more than one interval behind and the deadline was re-based.
    pub deadline_clamps: u32,
}

/// Fixed-period wall-clock report scheduler.
///
/// Polled from the main loop with the current time rather than sleeping, so
/// command handling stays responsive between reports. When the loop falls
/// behind by more than one interval the next deadline is re-based to
/// `now + interval`, so a long stall costs one skipped cycle instead of a
/// burst of back-to-back reports.
#[derive(Debug)]
pub struct ReportScheduler {
    interval_ms: u64,
    start_ms: u64,
    next_deadline_ms: u64,
    report_counter: u32,
    stats: SchedulerStats,
}

impl ReportScheduler {
    pub fn new(interval_ms: u64, start_ms: u64) -> Self {
        debug_assert!(interval_ms > 0, "report interval must be non-zero");
        let interval_ms = interval_ms.max(1);

        Self {
            interval_ms,
            start_ms,
            next_deadline_ms: start_ms.saturating_add(interval_ms),
            report_counter: 0,
            stats: SchedulerStats::default(),
        }
    }

    /// Returns a tick when a report is due at `now_ms`.
    pub fn maybe_report(&mut self, now_ms: u64) -> Option<ReportTick> {
        if now_ms < self.next_deadline_ms {
            return None;
        }

        self.report_counter = self.report_counter.wrapping_add(1);
        self.next_deadline_ms = self.next_deadline_ms.saturating_add(self.interval_ms);
        if self.next_deadline_ms <= now_ms {
            debug!(
                now_ms,
                behind_ms = now_ms - self.next_deadline_ms,
                "report loop fell behind, re-basing deadline"
            );
            self.next_deadline_ms = now_ms.saturating_add(self.interval_ms);
            self.stats.deadline_clamps += 1;
        }
        self.stats.total_reports += 1;

        Some(ReportTick {
            counter: self.report_counter,
            uptime_secs: now_ms.saturating_sub(self.start_ms) / 1000,
        })
    }

    /// Restarts the schedule, e.g. once start-up signalling has finished.
    pub fn rebase(&mut self, start_ms: u64) {
        self.start_ms = start_ms;
        self.next_deadline_ms = start_ms.saturating_add(self.interval_ms);
    }

    pub fn next_deadline_ms(&self) -> u64 {
        self.next_deadline_ms
    }

    pub fn report_counter(&self) -> u32 {
        self.report_counter
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn start_ms(&self) -> u64 {
        self.start_ms
    }

    pub fn get_stats(&self) -> &SchedulerStats {
        &self.stats
    }
}

impl Default for ReportScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_REPORT_INTERVAL_MS, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_creation() {
        let scheduler = ReportScheduler::new(1000, 0);
        assert_eq!(scheduler.next_deadline_ms(), 1000);
        assert_eq!(scheduler.report_counter(), 0);
        assert_eq!(scheduler.get_stats().total_reports, 0);
    }

    #[test]
    fn test_report_sequence() {
        let mut scheduler = ReportScheduler::new(1000, 0);

        assert_eq!(scheduler.maybe_report(0), None);
        assert_eq!(scheduler.maybe_report(500), None);

        let tick = scheduler.maybe_report(1000).unwrap();
        assert_eq!(tick.counter, 1);
        assert_eq!(scheduler.next_deadline_ms(), 2000);

        // 2000 <= 2500, so this call reports; 3000 is still ahead, no clamp.
        let tick = scheduler.maybe_report(2500).unwrap();
        assert_eq!(tick.counter, 2);
        assert_eq!(tick.uptime_secs, 2);
        assert_eq!(scheduler.next_deadline_ms(), 3000);

        let tick = scheduler.maybe_report(3000).unwrap();
        assert_eq!(tick.counter, 3);
        assert_eq!(scheduler.next_deadline_ms(), 4000);
        assert_eq!(scheduler.get_stats().deadline_clamps, 0);
    }

    #[test]
    fn test_deadline_clamped_after_stall() {
        let mut scheduler = ReportScheduler::new(1000, 0);
        scheduler.maybe_report(1000).unwrap();

        let tick = scheduler.maybe_report(5500).unwrap();
        assert_eq!(tick.counter, 2);
        assert_eq!(scheduler.next_deadline_ms(), 6500);
        assert_eq!(scheduler.get_stats().deadline_clamps, 1);

        // No catch-up burst.
        assert_eq!(scheduler.maybe_report(5501), None);
        assert_eq!(scheduler.maybe_report(6499), None);
        assert!(scheduler.maybe_report(6500).is_some());
    }

    #[test]
    fn test_deadline_never_more_than_one_interval_behind() {
        let mut scheduler = ReportScheduler::new(250, 0);
        let mut now = 0;
        for step in [10u64, 900, 3, 4000, 250, 251, 17, 10_000] {
            now += step;
            scheduler.maybe_report(now);
            assert!(scheduler.next_deadline_ms() > now);
            assert!(scheduler.next_deadline_ms() <= now + 250);
        }
    }

    #[test]
    fn test_uptime_counts_from_start() {
        let mut scheduler = ReportScheduler::new(1000, 4_000);
        let tick = scheduler.maybe_report(7_200).unwrap();
        assert_eq!(tick.uptime_secs, 3);
    }

    #[test]
    fn test_rebase() {
        let mut scheduler = ReportScheduler::new(1000, 0);
        scheduler.rebase(2_000);
        assert_eq!(scheduler.maybe_report(2_500), None);
        assert_eq!(scheduler.maybe_report(3_000).unwrap().uptime_secs, 1);
    }
}
