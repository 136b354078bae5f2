//! Cancel command implementation.

use super::{print_reports, ScenarioReport};
use rxtx_core::{AsyncTransactionCoordinator, CancellationToken, TransactionMode};
use rxtx_testkit::Backend;
use std::time::Duration;
use tracing::info;

/// Runs the dependent scenario on async stores and cancels it after `after_ms`.
pub fn run(
    backends: &[Backend],
    mode: TransactionMode,
    latency_ms: u64,
    after_ms: u64,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let latency = Duration::from_millis(latency_ms);
    let after = Duration::from_millis(after_ms);

    let reports = runtime.block_on(async {
        let coordinator = AsyncTransactionCoordinator::new();
        let mut reports = Vec::with_capacity(backends.len());
        for &backend in backends {
            let store = backend.store();
            let fixture = backend.scenario();
            let token = CancellationToken::new();
            let canceller = token.clone();
            let timer = tokio::spawn(async move {
                tokio::time::sleep(after).await;
                canceller.cancel();
            });

            let outcome = store
                .run_async(
                    &coordinator,
                    mode,
                    &fixture.dependent_failure,
                    latency,
                    &token,
                )
                .await;
            timer.abort();
            info!(%backend, %mode, %outcome, "cancellable scenario finished");
            reports.push(ScenarioReport::new(&store, mode, &outcome));
        }
        reports
    });

    print_reports(&reports, format)
}
