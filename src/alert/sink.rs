use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use super::types::Alert;

/// Destination for stamped alerts. Implementations must tolerate concurrent
/// calls from analyzers running in parallel.
pub trait AlertSink: Send + Sync {
    fn on_alert(&self, alert: &Alert);
}

// ============================================================
// Tracing sink
// ============================================================

/// Emits every alert as one structured `WARN` event.
#[derive(Debug, Default)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn on_alert(&self, alert: &Alert) {
        let details = serde_json::to_string(&alert.details).unwrap_or_default();
        tracing::warn!(
            target: "chainwatch_sentinel::alert",
            alert_type = alert.kind.as_str(),
            severity = alert.severity.as_str(),
            monitor = %alert.monitor,
            timestamp = %alert.timestamp.to_rfc3339(),
            details = %details,
            "ACTIVITY DETECTED"
        );
    }
}

// ============================================================
// JSON Lines file sink
// ============================================================

/// Appends each alert as a single JSON line. The file is reopened in append
/// mode on every write so external rotation can move it between writes.
pub struct JsonlAlertSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlAlertSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)
    }
}

impl AlertSink for JsonlAlertSink {
    fn on_alert(&self, alert: &Alert) {
        let line = match serde_json::to_string(alert) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize alert");
                return;
            }
        };

        if let Err(e) = self.append(&line) {
            tracing::error!(
                path = %self.path.display(),
                error = %e,
                "Failed to append alert to JSONL file"
            );
        }
    }
}

// ============================================================
// Fan-out
// ============================================================

/// Forwards each alert to every inner sink in registration order.
#[derive(Default)]
pub struct AlertFanout {
    sinks: Vec<Box<dyn AlertSink>>,
}

impl AlertFanout {
    pub fn new(sinks: Vec<Box<dyn AlertSink>>) -> Self {
        Self { sinks }
    }

    pub fn add(&mut self, sink: Box<dyn AlertSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl AlertSink for AlertFanout {
    fn on_alert(&self, alert: &Alert) {
        for sink in &self.sinks {
            sink.on_alert(alert);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::types::{ActivityKind, AlertDraft, Severity};
    use chrono::Utc;
    use std::sync::Arc;

    struct Counting(Arc<Mutex<usize>>);

    impl AlertSink for Counting {
        fn on_alert(&self, _alert: &Alert) {
            *self.0.lock().unwrap() += 1;
        }
    }

    fn sample() -> Alert {
        Alert::from_draft(
            AlertDraft::new(ActivityKind::ContractSelfDestruct)
                .severity(Severity::Medium)
                .detail("account", "5GrwvaEF"),
            "ContractMonitor",
            Utc::now(),
        )
    }

    #[test]
    fn test_fanout_reaches_every_sink() {
        let count = Arc::new(Mutex::new(0));
        let fanout = AlertFanout::new(vec![
            Box::new(Counting(count.clone())),
            Box::new(Counting(count.clone())),
            Box::new(TracingAlertSink),
        ]);

        fanout.on_alert(&sample());
        assert_eq!(*count.lock().unwrap(), 2);
        assert_eq!(fanout.len(), 3);
    }

    #[test]
    fn test_jsonl_sink_appends_lines() {
        let path = std::env::temp_dir().join(format!(
            "chainwatch-sentinel-alerts-{}.jsonl",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        let sink = JsonlAlertSink::new(&path);
        sink.on_alert(&sample());
        sink.on_alert(&sample());

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: Alert = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.kind, ActivityKind::ContractSelfDestruct);
        assert_eq!(parsed.details["account"], "5GrwvaEF");

        let _ = std::fs::remove_file(&path);
    }
}
