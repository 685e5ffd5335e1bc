//! `decide` — the pure function at the heart of the Trigger Engine (C6).

use crate::decision::{FloorDecision, GrantReason};
use orchestrator_core::event::Event;
use orchestrator_core::id::StreamId;
use orchestrator_core::payload::{Act, Role};
use orchestrator_core::stream_record::StreamRecord;

/// Tunable thresholds, named after the `floor.*` / `turn.*` configuration
/// keys they implement.
#[derive(Debug, Clone, Copy)]
pub struct TriggerConfig {
    /// Idle gap after a release before alternation proposes the next grant.
    pub t_quiet_ms: u64,
    /// Produced-bytes threshold that proposes an early release.
    pub byte_budget: u64,
    /// Silence duration before the starvation guard proposes a grant.
    pub t_starve_ms: u64,
    /// After this many consecutive silent rounds, stop proposing grants
    /// and settle for `Idle` (heartbeat-only).
    pub max_silent_rounds: u32,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            t_quiet_ms: 1_000,
            byte_budget: 4096,
            t_starve_ms: 30_000,
            max_silent_rounds: 2,
        }
    }
}

/// The currently-running turn, if any, as the engine needs to see it.
#[derive(Debug, Clone)]
pub struct CurrentTurn {
    /// The stream holding the floor.
    pub holder: StreamId,
    /// Bytes produced so far this turn.
    pub produced_bytes: u64,
}

/// Everything [`decide`] needs: a tail window, stream states, and a
/// handful of scalars the caller is responsible for tracking (so this
/// function stays a pure read — no hidden state, no I/O).
#[derive(Debug, Clone)]
pub struct TriggerInput<'a> {
    /// Recent bus events, oldest first, that have not yet been acted on
    /// by a previous decision (i.e. `seq > last_handled_seq`).
    pub unhandled: &'a [Event],
    /// Every non-dead registered stream.
    pub streams: &'a [StreamRecord],
    /// Current wall-clock reading.
    pub now_ms: u64,
    /// The turn in progress, if any.
    pub current_turn: Option<CurrentTurn>,
    /// When the floor was last released (for the time trigger).
    pub last_floor_release_ms: Option<u64>,
    /// Who held the floor last, so the quiet-period alternation trigger
    /// can exclude them the same way the mid-turn size trigger excludes
    /// `current_turn.holder`. Without this, `next_alternation_target`
    /// has nothing to alternate away from once the floor is idle and
    /// would just re-grant whichever stream sorts first every round.
    pub last_holder: Option<StreamId>,
    /// Consecutive rounds the silence trigger has already fired without
    /// a single new event appearing.
    pub silent_rounds: u32,
    /// Whether kernel shutdown has been requested.
    pub shutdown_requested: bool,
}

/// Decide the next floor action. Idempotent: identical inputs always
/// yield identical output, independent of wall-clock except through
/// `input.now_ms`.
pub fn decide(input: &TriggerInput<'_>, config: &TriggerConfig) -> FloorDecision {
    if input.shutdown_requested {
        return FloorDecision::Shutdown;
    }

    if let Some(stream) = user_trigger(input) {
        return FloorDecision::GrantNext {
            stream,
            reason: GrantReason::UserInput,
        };
    }

    if let Some(stream) = tool_trigger(input) {
        return FloorDecision::GrantNext {
            stream,
            reason: GrantReason::ToolCompletion,
        };
    }

    if let Some(turn) = &input.current_turn {
        if turn.produced_bytes >= config.byte_budget {
            if let Some(stream) = next_alternation_target(input, Some(&turn.holder)) {
                return FloorDecision::GrantNext {
                    stream,
                    reason: GrantReason::SizeBudget,
                };
            }
        }
        return FloorDecision::Continue;
    }

    if let Some(released_ms) = input.last_floor_release_ms {
        let quiet_for = input.now_ms.saturating_sub(released_ms);
        if quiet_for >= config.t_quiet_ms {
            if let Some(stream) = next_alternation_target(input, input.last_holder.as_ref()) {
                return FloorDecision::GrantNext {
                    stream,
                    reason: GrantReason::Alternation,
                };
            }
        }
    }

    if let Some(stream) = starvation_trigger(input, config) {
        if input.silent_rounds < config.max_silent_rounds {
            return FloorDecision::GrantNext {
                stream,
                reason: GrantReason::Starvation,
            };
        }
        return FloorDecision::Idle;
    }

    FloorDecision::Idle
}

fn user_trigger(input: &TriggerInput<'_>) -> Option<StreamId> {
    let interrupt = input
        .unhandled
        .iter()
        .find(|e| e.act == Act::Interrupt && e.role == Role::User)?;

    let addressee = match &input.current_turn {
        Some(turn) => other_agent(input, &turn.holder),
        None => primary_agent(input),
    };
    addressee.or_else(|| Some(interrupt.stream.clone()))
}

fn tool_trigger(input: &TriggerInput<'_>) -> Option<StreamId> {
    let tool_end = input.unhandled.iter().find(|e| e.act == Act::ToolEnd)?;
    let parent_seq = tool_end.parent_seq?;
    // Invocations live further back than the current unhandled window in
    // general, but for a freshly-appended tool_end the invoking event is
    // commonly still within it; callers that need deeper lookback should
    // pass a wider `unhandled` slice built from the full tail.
    input
        .unhandled
        .iter()
        .find(|e| e.seq == parent_seq && e.act == Act::ToolInvoke)
        .map(|invocation| invocation.stream.clone())
}

fn starvation_trigger(input: &TriggerInput<'_>, config: &TriggerConfig) -> Option<StreamId> {
    if input.current_turn.is_some() {
        return None;
    }
    let mut starved: Vec<&StreamRecord> = input
        .streams
        .iter()
        .filter(|s| is_agent(s.role) && s.is_eligible(input.now_ms))
        .filter(|s| input.now_ms.saturating_sub(s.last_active_ms) >= config.t_starve_ms)
        .collect();
    starved.sort_by(|a, b| a.name.as_str().cmp(b.name.as_str()));
    starved.first().map(|s| s.name.clone())
}

fn next_alternation_target(input: &TriggerInput<'_>, exclude: Option<&StreamId>) -> Option<StreamId> {
    let mut eligible: Vec<&StreamRecord> = input
        .streams
        .iter()
        .filter(|s| is_agent(s.role) && s.is_eligible(input.now_ms))
        .collect();
    eligible.sort_by(|a, b| a.name.as_str().cmp(b.name.as_str()));

    if eligible.is_empty() {
        return None;
    }
    if eligible.len() == 1 {
        // Hysteresis exception: the only eligible holder may be regranted.
        return Some(eligible[0].name.clone());
    }
    match exclude {
        Some(prev) => eligible
            .iter()
            .find(|s| &s.name != prev)
            .map(|s| s.name.clone())
            .or_else(|| Some(eligible[0].name.clone())),
        None => Some(eligible[0].name.clone()),
    }
}

fn other_agent(input: &TriggerInput<'_>, than: &StreamId) -> Option<StreamId> {
    next_alternation_target(input, Some(than))
}

fn primary_agent(input: &TriggerInput<'_>) -> Option<StreamId> {
    next_alternation_target(input, None)
}

fn is_agent(role: Role) -> bool {
    matches!(role, Role::Strategist | Role::Implementer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_core::event::PartialEvent;
    use orchestrator_core::id::TurnId;
    use orchestrator_core::payload::Payload;

    fn agent(name: &str, role: Role, last_active_ms: u64) -> StreamRecord {
        let mut record = StreamRecord::new(StreamId::new(name), role, 0);
        record.last_active_ms = last_active_ms;
        record
    }

    fn base_streams() -> Vec<StreamRecord> {
        vec![
            agent("implementer", Role::Implementer, 0),
            agent("strategist", Role::Strategist, 0),
        ]
    }

    fn base_input(streams: &[StreamRecord]) -> TriggerInput<'_> {
        TriggerInput {
            unhandled: &[],
            streams,
            now_ms: 0,
            current_turn: None,
            last_floor_release_ms: None,
            last_holder: None,
            silent_rounds: 0,
            shutdown_requested: false,
        }
    }

    #[test]
    fn shutdown_dominates_everything_else() {
        let streams = base_streams();
        let mut input = base_input(&streams);
        input.shutdown_requested = true;
        input.current_turn = Some(CurrentTurn {
            holder: StreamId::new("strategist"),
            produced_bytes: 999_999,
        });
        assert_eq!(decide(&input, &TriggerConfig::default()), FloorDecision::Shutdown);
    }

    #[test]
    fn time_trigger_alternates_after_quiet_period() {
        let streams = base_streams();
        let mut input = base_input(&streams);
        input.now_ms = 2_000;
        input.last_floor_release_ms = Some(0);
        let decision = decide(&input, &TriggerConfig::default());
        assert_eq!(
            decision,
            FloorDecision::GrantNext {
                stream: StreamId::new("implementer"),
                reason: GrantReason::Alternation,
            }
        );
    }

    #[test]
    fn time_trigger_excludes_the_last_holder_even_when_it_sorts_first() {
        // "implementer" sorts before "strategist", so without `last_holder`
        // the plain lexicographic fallback in `next_alternation_target`
        // would re-grant it and alternation would never actually alternate.
        let streams = base_streams();
        let mut input = base_input(&streams);
        input.now_ms = 2_000;
        input.last_floor_release_ms = Some(0);
        input.last_holder = Some(StreamId::new("implementer"));
        let decision = decide(&input, &TriggerConfig::default());
        assert_eq!(
            decision,
            FloorDecision::GrantNext {
                stream: StreamId::new("strategist"),
                reason: GrantReason::Alternation,
            }
        );
    }

    #[test]
    fn time_trigger_does_not_fire_before_t_quiet() {
        let streams = base_streams();
        let mut input = base_input(&streams);
        input.now_ms = 100;
        input.last_floor_release_ms = Some(0);
        assert_eq!(decide(&input, &TriggerConfig::default()), FloorDecision::Idle);
    }

    #[test]
    fn size_trigger_proposes_alternation_mid_turn() {
        let streams = base_streams();
        let mut input = base_input(&streams);
        input.current_turn = Some(CurrentTurn {
            holder: StreamId::new("strategist"),
            produced_bytes: 5_000,
        });
        let decision = decide(&input, &TriggerConfig::default());
        assert_eq!(
            decision,
            FloorDecision::GrantNext {
                stream: StreamId::new("implementer"),
                reason: GrantReason::SizeBudget,
            }
        );
    }

    #[test]
    fn under_budget_turn_continues() {
        let streams = base_streams();
        let mut input = base_input(&streams);
        input.current_turn = Some(CurrentTurn {
            holder: StreamId::new("strategist"),
            produced_bytes: 10,
        });
        assert_eq!(decide(&input, &TriggerConfig::default()), FloorDecision::Continue);
    }

    fn event(seq: u64, stream: &str, role: Role, act: Act, parent_seq: Option<u64>) -> Event {
        let mut partial = PartialEvent::new(StreamId::new(stream), role, TurnId::new(), act, Payload::None);
        partial.parent_seq = parent_seq;
        Event::seal(partial, seq, seq, seq)
    }

    #[test]
    fn user_trigger_outranks_time_and_size() {
        let streams = base_streams();
        let mut input = base_input(&streams);
        input.now_ms = 5_000;
        input.last_floor_release_ms = Some(0);
        let interrupt = event(10, "user", Role::User, Act::Interrupt, None);
        input.unhandled = std::slice::from_ref(&interrupt);
        input.current_turn = Some(CurrentTurn {
            holder: StreamId::new("strategist"),
            produced_bytes: 1,
        });
        let decision = decide(&input, &TriggerConfig::default());
        assert_eq!(
            decision,
            FloorDecision::GrantNext {
                stream: StreamId::new("implementer"),
                reason: GrantReason::UserInput,
            }
        );
    }

    #[test]
    fn tool_trigger_grants_back_to_invoking_agent() {
        let streams = base_streams();
        let mut input = base_input(&streams);
        let invoke = event(5, "strategist", Role::Strategist, Act::ToolInvoke, None);
        let end = event(9, "tool.shell.1", Role::Tool, Act::ToolEnd, Some(5));
        let events = vec![invoke, end];
        input.unhandled = &events;
        let decision = decide(&input, &TriggerConfig::default());
        assert_eq!(
            decision,
            FloorDecision::GrantNext {
                stream: StreamId::new("strategist"),
                reason: GrantReason::ToolCompletion,
            }
        );
    }

    #[test]
    fn starvation_grant_fires_after_t_starve_when_idle() {
        let streams = vec![
            agent("implementer", Role::Implementer, 0),
            agent("strategist", Role::Strategist, 29_000),
        ];
        let mut input = base_input(&streams);
        input.now_ms = 30_000;
        let decision = decide(&input, &TriggerConfig::default());
        assert_eq!(
            decision,
            FloorDecision::GrantNext {
                stream: StreamId::new("implementer"),
                reason: GrantReason::Starvation,
            }
        );
    }

    #[test]
    fn silence_settles_to_idle_after_max_rounds() {
        let streams = vec![
            agent("implementer", Role::Implementer, 0),
            agent("strategist", Role::Strategist, 0),
        ];
        let mut input = base_input(&streams);
        input.now_ms = 60_000;
        input.silent_rounds = 2;
        assert_eq!(decide(&input, &TriggerConfig::default()), FloorDecision::Idle);
    }

    #[test]
    fn only_eligible_holder_may_be_regranted_despite_hysteresis() {
        let streams = vec![agent("strategist", Role::Strategist, 0)];
        let mut input = base_input(&streams);
        input.now_ms = 2_000;
        input.last_floor_release_ms = Some(0);
        let decision = decide(&input, &TriggerConfig::default());
        assert_eq!(
            decision,
            FloorDecision::GrantNext {
                stream: StreamId::new("strategist"),
                reason: GrantReason::Alternation,
            }
        );
    }

    #[test]
    fn decisions_are_idempotent_over_identical_input() {
        let streams = base_streams();
        let mut input = base_input(&streams);
        input.now_ms = 2_000;
        input.last_floor_release_ms = Some(0);
        let config = TriggerConfig::default();
        assert_eq!(decide(&input, &config), decide(&input, &config));
    }
}
