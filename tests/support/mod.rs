//! Shared scaffolding for the kernel integration suite: a fast-timing
//! `KernelConfig` so a control loop round completes in single-digit
//! milliseconds, and a small poll helper for waiting on bus state.

use orchestrator_core::{DurationMs, Event};
use orchestrator_kernel::{Kernel, KernelConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// A `KernelConfig` with every `spec.md` §6 timing knob turned down from
/// its conversation-scale default to a test-scale one. Ratios between
/// the knobs (e.g. `t_quiet_ms` well under `t_starve_ms`) are preserved
/// so the trigger priority order in `orchestrator_trigger::engine::decide`
/// still exercises the same branches it would in production.
pub fn fast_config() -> KernelConfig {
    let mut config = KernelConfig::default();
    config.floor.t_min = DurationMs::from_millis(20);
    config.floor.t_max = DurationMs::from_millis(1_500);
    config.trigger.t_quiet_ms = 30;
    config.trigger.t_starve_ms = 250;
    config.trigger.max_silent_rounds = 10_000;
    config.turn.flush_bytes = 256;
    config.turn.flush_ms = DurationMs::from_millis(15);
    config.turn.deadline_ms = DurationMs::from_millis(1_500);
    config.turn.grace_ms = DurationMs::from_millis(150);
    config.turn.byte_budget = Some(4096);
    config.heartbeat_ms = DurationMs::from_millis(40);
    config.poll_interval_ms = DurationMs::from_millis(8);
    config
}

/// Poll `kernel.tail(n)` until `pred` holds or `budget` elapses, returning
/// whatever the last poll saw either way (callers assert on the content,
/// which gives a much more informative failure than a bare timeout panic).
pub async fn wait_until(
    kernel: &Arc<Kernel>,
    n: usize,
    budget: Duration,
    mut pred: impl FnMut(&[Event]) -> bool,
) -> Vec<Event> {
    let deadline = Instant::now() + budget;
    loop {
        let tail = kernel.tail(n).await;
        if pred(&tail) || Instant::now() >= deadline {
            return tail;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Shut the kernel down and wait for its `run()` task to return, failing
/// loudly (rather than hanging) if it doesn't within `budget`.
pub async fn shutdown_and_join(
    kernel: &Arc<Kernel>,
    run_task: tokio::task::JoinHandle<Result<(), orchestrator_core::KernelError>>,
    budget: Duration,
) {
    kernel.request_shutdown("test finished");
    tokio::time::timeout(budget, run_task)
        .await
        .expect("kernel run() task did not exit after shutdown")
        .expect("kernel run() task panicked")
        .expect("kernel run() returned an error");
}
