//! Run command implementation.

use super::{print_reports, ScenarioReport};
use rxtx_core::{TransactionCoordinator, TransactionMode};
use rxtx_testkit::Backend;
use tracing::info;

/// Runs the named scenario once per backend.
pub fn run(
    backends: &[Backend],
    mode: TransactionMode,
    scenario: &str,
    seeded: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if seeded && scenario == "unique" {
        return Err("--seeded only applies to the dependent scenario".into());
    }
    let coordinator = TransactionCoordinator::new();
    let mut reports = Vec::with_capacity(backends.len());

    for &backend in backends {
        let store = backend.store();
        let fixture = backend.scenario();
        let operations = match (scenario, seeded) {
            ("dependent", false) => fixture.dependent_failure.as_slice(),
            ("dependent", true) => {
                let seed = store.run(&coordinator, TransactionMode::AutoCommit, fixture.seed());
                info!(%backend, outcome = %seed, "seeded");
                fixture.after_seed()
            }
            ("unique", false) => fixture.unique_violation.as_slice(),
            (other, _) => return Err(format!("unknown scenario: {other}").into()),
        };

        let outcome = store.run(&coordinator, mode, operations);
        info!(%backend, %mode, %outcome, "scenario finished");
        reports.push(ScenarioReport::new(&store, mode, &outcome));
    }

    print_reports(&reports, format)
}
