//! End-to-end scenario 5 (`spec.md` §8): plain two-way alternation never
//! revisits a third agent (the pairwise "exclude the last holder" rule
//! just ping-pongs between the other two), so the starvation guard has
//! to step in and force a grant once that third agent has gone quiet
//! for `t_starve_ms`.

mod support;

use orchestrator_core::test_support::ScriptedAgent;
use orchestrator_core::{Act, AgentChunk, Role};
use orchestrator_kernel::Kernel;
use std::sync::Arc;
use std::time::Duration;

fn quick_agent(text: &str) -> Arc<ScriptedAgent> {
    Arc::new(ScriptedAgent::new(vec![AgentChunk::Content {
        act: Act::Say,
        text: text.into(),
    }]))
}

#[tokio::test]
async fn a_third_agent_starved_by_plain_alternation_eventually_gets_the_floor() {
    let kernel = Kernel::new(support::fast_config()).await.unwrap();

    kernel.register_agent("agent.A", Role::Strategist, quick_agent("a")).unwrap();
    kernel.register_agent("agent.B", Role::Implementer, quick_agent("b")).unwrap();
    // A second implementer-role stream so it's excluded from ordinary
    // two-way hysteresis the same way a real third participant would be.
    kernel.register_agent("agent.C", Role::Implementer, quick_agent("c")).unwrap();

    let run_task = tokio::spawn(Arc::clone(&kernel).run());

    let tail = support::wait_until(&kernel, 256, Duration::from_secs(5), |events| {
        events.iter().any(|e| e.act == Act::FloorGrant && e.stream.as_str() == "agent.C")
    })
    .await;

    support::shutdown_and_join(&kernel, run_task, Duration::from_secs(2)).await;

    let c_grant = tail
        .iter()
        .find(|e| e.act == Act::FloorGrant && e.stream.as_str() == "agent.C");
    assert!(c_grant.is_some(), "agent.C was never granted the floor within the starvation window");

    let a_grants = tail.iter().filter(|e| e.act == Act::FloorGrant && e.stream.as_str() == "agent.A").count();
    let b_grants = tail.iter().filter(|e| e.act == Act::FloorGrant && e.stream.as_str() == "agent.B").count();
    assert!(a_grants >= 1 && b_grants >= 1, "expected A and B to have alternated before C was starved in");
}
