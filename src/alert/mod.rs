pub mod log;
pub mod sink;
pub mod types;

pub use log::AlertLog;
pub use sink::{AlertFanout, AlertSink, JsonlAlertSink, TracingAlertSink};
pub use types::{ActivityKind, Alert, AlertDraft, Severity, TimeWindows};
