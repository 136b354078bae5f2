//! CLI command implementations.

pub mod cancel;
pub mod run;

use rxtx_core::{Outcome, RollbackReason, TransactionMode};
use rxtx_resource::{Dataset, OperationResult};
use rxtx_testkit::{render_rows, AnyStore, Backend};
use serde::Serialize;

/// Parses `--backend`, defaulting to every backend.
pub fn parse_backends(arg: Option<&str>) -> Result<Vec<Backend>, Box<dyn std::error::Error>> {
    match arg {
        Some(name) => Ok(vec![name.parse::<Backend>()?]),
        None => Ok(Backend::ALL.to_vec()),
    }
}

/// Parses a demarcation mode name.
pub fn parse_mode(name: &str) -> Result<TransactionMode, Box<dyn std::error::Error>> {
    match name {
        "auto-commit" | "autocommit" => Ok(TransactionMode::AutoCommit),
        "explicit" => Ok(TransactionMode::Explicit),
        "declarative" => Ok(TransactionMode::Declarative),
        other => Err(format!("unknown mode: {other}").into()),
    }
}

/// Result of one scenario run.
#[derive(Debug, Serialize)]
pub struct ScenarioReport {
    /// Backend name.
    pub backend: String,
    /// Demarcation mode.
    pub mode: String,
    /// `committed`, `rolled back` or `failed`.
    pub outcome: String,
    /// Human-readable outcome with its reason.
    pub detail: String,
    /// Index of the operation that stopped the unit, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_operation: Option<usize>,
    /// Committed rows after the run.
    pub rows: Dataset,
}

impl ScenarioReport {
    /// Builds a report from an outcome and the store it ran against.
    pub fn new(
        store: &AnyStore,
        mode: TransactionMode,
        outcome: &Outcome<Vec<OperationResult>>,
    ) -> Self {
        let failed_operation = match outcome {
            Outcome::Failed { operation, .. } => *operation,
            Outcome::RolledBack(RollbackReason::OperationFailed { index, .. }) => Some(*index),
            Outcome::RolledBack(_) | Outcome::Committed(_) => None,
        };
        Self {
            backend: store.backend().to_string(),
            mode: mode.to_string(),
            outcome: outcome.kind().to_string(),
            detail: outcome.to_string(),
            failed_operation,
            rows: store.snapshot(),
        }
    }
}

/// Prints reports in the requested format.
pub fn print_reports(
    reports: &[ScenarioReport],
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(reports)?);
        }
        _ => {
            for report in reports {
                print_text_output(report);
            }
        }
    }
    Ok(())
}

fn print_text_output(report: &ScenarioReport) {
    println!("=== {} / {} ===", report.backend, report.mode);
    println!("Outcome: {}", report.detail);
    if let Some(index) = report.failed_operation {
        println!("Stopped at operation: {index}");
    }
    let rows = render_rows(&report.rows);
    if rows.is_empty() {
        println!("No rows committed");
    } else {
        print!("{rows}");
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mode_accepts_known_names() {
        assert_eq!(parse_mode("auto-commit").unwrap(), TransactionMode::AutoCommit);
        assert_eq!(parse_mode("autocommit").unwrap(), TransactionMode::AutoCommit);
        assert_eq!(parse_mode("explicit").unwrap(), TransactionMode::Explicit);
        assert_eq!(parse_mode("declarative").unwrap(), TransactionMode::Declarative);
    }

    #[test]
    fn parse_mode_rejects_unknown_names() {
        let err = parse_mode("Explicit").unwrap_err();
        assert_eq!(err.to_string(), "unknown mode: Explicit");
    }

    #[test]
    fn parse_backends_defaults_to_all() {
        assert_eq!(parse_backends(None).unwrap(), Backend::ALL.to_vec());
        assert_eq!(parse_backends(Some("graph")).unwrap(), vec![Backend::Graph]);
        assert!(parse_backends(Some("columnar")).is_err());
    }

    #[test]
    fn report_points_at_the_failing_operation() {
        let store = Backend::Relational.store();
        let fixture = Backend::Relational.scenario();
        let coordinator = rxtx_core::TransactionCoordinator::new();

        let outcome = store.run(
            &coordinator,
            TransactionMode::Explicit,
            &fixture.dependent_failure,
        );
        let report = ScenarioReport::new(&store, TransactionMode::Explicit, &outcome);

        assert_eq!(report.outcome, outcome.kind().to_string());
        assert_eq!(report.failed_operation, Some(fixture.failing_step()));
        assert_eq!(report.rows.total(), 0);
    }
}
