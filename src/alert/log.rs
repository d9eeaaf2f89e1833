use chrono::{DateTime, TimeDelta, Utc};
use std::collections::VecDeque;

use super::types::Alert;

/// Bounded in-memory alert history for a single analyzer.
/// Oldest alerts fall off the front once `capacity` is reached.
#[derive(Debug)]
pub struct AlertLog {
    alerts: VecDeque<Alert>,
    capacity: usize,
}

impl AlertLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            alerts: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, alert: Alert) {
        if self.alerts.len() >= self.capacity {
            self.alerts.pop_front();
        }
        self.alerts.push_back(alert);
    }

    /// Alerts strictly newer than `now - window`, oldest first. A window
    /// reaching past the representable range returns everything.
    pub fn since(&self, window: TimeDelta, now: DateTime<Utc>) -> Vec<Alert> {
        let Some(cutoff) = now.checked_sub_signed(window) else {
            return self.alerts.iter().cloned().collect();
        };
        self.alerts
            .iter()
            .filter(|a| a.timestamp > cutoff)
            .cloned()
            .collect()
    }

    /// Drop alerts older than `max_age`. Returns how many were removed.
    pub fn clear_older_than(&mut self, max_age: TimeDelta, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = now.checked_sub_signed(max_age) else {
            return 0;
        };
        let before = self.alerts.len();
        self.alerts.retain(|a| a.timestamp > cutoff);
        before - self.alerts.len()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::types::{ActivityKind, AlertDraft, TimeWindows};

    fn alert_at(ts: DateTime<Utc>) -> Alert {
        Alert::from_draft(AlertDraft::new(ActivityKind::XcmpSpam), "test", ts)
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let now = Utc::now();
        let mut log = AlertLog::new(2);
        log.push(alert_at(now - TimeDelta::seconds(3)));
        log.push(alert_at(now - TimeDelta::seconds(2)));
        log.push(alert_at(now - TimeDelta::seconds(1)));

        assert_eq!(log.len(), 2);
        let all = log.since(TimeWindows::HOUR, now);
        assert_eq!(all[0].timestamp, now - TimeDelta::seconds(2));
    }

    #[test]
    fn test_since_filters_by_window() {
        let now = Utc::now();
        let mut log = AlertLog::new(10);
        log.push(alert_at(now - TimeWindows::HOUR - TimeDelta::seconds(1)));
        log.push(alert_at(now - TimeWindows::MINUTE));

        assert_eq!(log.since(TimeWindows::HOUR, now).len(), 1);
        assert_eq!(log.since(TimeWindows::DAY, now).len(), 2);
    }

    #[test]
    fn test_since_with_unbounded_window() {
        let now = Utc::now();
        let mut log = AlertLog::new(10);
        log.push(alert_at(now - TimeWindows::WEEK));
        log.push(alert_at(now));

        assert_eq!(log.since(TimeDelta::MAX, now).len(), 2);
        assert_eq!(log.clear_older_than(TimeDelta::MAX, now), 0);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_clear_older_than() {
        let now = Utc::now();
        let mut log = AlertLog::new(10);
        log.push(alert_at(now - TimeWindows::WEEK - TimeDelta::seconds(1)));
        log.push(alert_at(now));

        assert_eq!(log.clear_older_than(TimeWindows::WEEK, now), 1);
        assert_eq!(log.len(), 1);
        assert_eq!(log.clear_older_than(TimeWindows::WEEK, now), 0);
    }
}
