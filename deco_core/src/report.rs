//! Structured warnings raised while planning.
//!
//! Numerical trouble never stops a computation; it is handed to a
//! [`ReportSink`] and the planner carries on with its best estimate.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Root finder bounds did not straddle a sign change
    BracketViolation,
    /// A solver hit its iteration cap
    IterationLimit,
    /// The critical-volume loop ran out of passes
    CriticalVolumeNotConverged,
    /// Onset of impermeability could not be located during a descent
    OnsetOfImpermeability,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Receives warnings as they happen
pub trait ReportSink {
    fn report(&mut self, warning: Warning);
}

/// Logs each warning and keeps it for the dive result
#[derive(Debug, Default)]
pub struct CollectingSink {
    warnings: Vec<Warning>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

impl ReportSink for CollectingSink {
    fn report(&mut self, warning: Warning) {
        tracing::warn!(kind = ?warning.kind, "{}", warning.message);
        self.warnings.push(warning);
    }
}

/// Only logs
#[derive(Debug, Default)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn report(&mut self, warning: Warning) {
        tracing::warn!(kind = ?warning.kind, "{}", warning.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_sink_keeps_order() {
        let mut sink = CollectingSink::new();
        sink.report(Warning::new(WarningKind::IterationLimit, "first"));
        sink.report(Warning::new(WarningKind::BracketViolation, "second"));

        let warnings = sink.into_warnings();
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].message, "first");
        assert_eq!(warnings[1].kind, WarningKind::BracketViolation);
    }

    #[test]
    fn test_warning_serializes_kind_in_snake_case() {
        let w = Warning::new(WarningKind::CriticalVolumeNotConverged, "x");
        let json = serde_json::to_string(&w).unwrap();
        assert!(json.contains("critical_volume_not_converged"));
    }
}
