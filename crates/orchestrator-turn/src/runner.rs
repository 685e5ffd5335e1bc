//! The Turn Runner (C7): drives one floor-holder through a single turn,
//! coalescing speaker chunks into flushed content events and enforcing
//! the turn's deadline.

use futures::StreamExt;
use orchestrator_bus::EventBus;
use orchestrator_core::capability::agent::{AgentChunk, AgentStream, SpeakParams, SpeakTrigger};
use orchestrator_core::{Act, DurationMs, Event, PartialEvent, Payload, Role, StreamId, TurnError, TurnId, TurnStatus};
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// `turn.*` tunables.
#[derive(Debug, Clone, Copy)]
pub struct TurnConfig {
    /// Flush a content event once the buffered text reaches this many bytes.
    pub flush_bytes: usize,
    /// Flush a content event once this long has elapsed since the last flush.
    pub flush_ms: DurationMs,
    /// Hard turn deadline, measured from the turn's start.
    pub deadline_ms: DurationMs,
    /// Lead time before the hard deadline at which a soft-stop is signaled.
    pub grace_ms: DurationMs,
    /// Size trigger threshold (`turn.byte_budget`): once flushed content
    /// reaches this many bytes, the runner ends the turn as `Completed`
    /// at the next flush boundary rather than waiting for the speaker to
    /// finish on its own. `None` disables the cap.
    pub byte_budget: Option<u64>,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            flush_bytes: 256,
            flush_ms: DurationMs::from_millis(120),
            deadline_ms: DurationMs::from_secs(8),
            grace_ms: DurationMs::from_millis(500),
            byte_budget: Some(4096),
        }
    }
}

/// What a completed (or cut-short) turn produced. Does not include the
/// bracketing `floor_grant`/`floor_release` events — those belong to the
/// Floor Controller.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// This turn's id.
    pub turn_id: TurnId,
    /// How the turn ended.
    pub status: TurnStatus,
    /// Total content bytes flushed.
    pub produced_bytes: u64,
    /// Total events appended (content + tool_invoke).
    pub produced_events: u64,
    /// `tool_invoke` events raised during this turn, in order, for the
    /// caller to hand to the Tool Adapter Contract shim.
    pub tool_invocations: Vec<Event>,
}

/// Drives one turn to completion, cancellation, timeout, or speaker error.
pub struct TurnRunner {
    bus: EventBus,
    config: TurnConfig,
}

impl TurnRunner {
    /// Construct a runner over a shared bus with the given tunables.
    pub fn new(bus: EventBus, config: TurnConfig) -> Self {
        Self { bus, config }
    }

    /// Run one agent turn. `preempt` is the cancellation handle derived
    /// from the Preemption Mux; it is observed alongside this turn's own
    /// deadline.
    pub async fn run_agent_turn(
        &self,
        speaker: &dyn AgentStream,
        stream: StreamId,
        role: Role,
        turn_id: TurnId,
        trigger: SpeakTrigger,
        preempt: CancellationToken,
    ) -> Result<TurnOutcome, TurnError> {
        let hard_deadline = self.config.deadline_ms.to_std();
        let soft_deadline = hard_deadline.saturating_sub(self.config.grace_ms.to_std());
        let flush_period = self.config.flush_ms.to_std().max(Duration::from_millis(1));

        let speak_cancel = CancellationToken::new();
        let mut chunks = speaker
            .speak(
                speak_cancel.clone(),
                SpeakParams {
                    trigger,
                    soft_deadline_ms: soft_deadline.as_millis() as u64,
                },
            )
            .await?;

        let start = Instant::now();
        let mut soft_fired = false;
        let mut pending: Option<(Act, String)> = None;
        let mut last_flush = start;
        let mut produced_bytes: u64 = 0;
        let mut produced_events: u64 = 0;
        let mut tool_invocations = Vec::new();

        let mut ticker = interval(flush_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // first tick fires immediately; consume it

        let status = loop {
            tokio::select! {
                biased;

                _ = preempt.cancelled() => {
                    speak_cancel.cancel();
                    self.flush_pending(&mut pending, &stream, role, turn_id, true, &mut produced_bytes, &mut produced_events).await?;
                    break TurnStatus::Preempted;
                }

                _ = tokio::time::sleep(hard_deadline.saturating_sub(start.elapsed())) => {
                    self.flush_pending(&mut pending, &stream, role, turn_id, true, &mut produced_bytes, &mut produced_events).await?;
                    break TurnStatus::TimedOut;
                }

                _ = tokio::time::sleep(soft_deadline.saturating_sub(start.elapsed())), if !soft_fired => {
                    soft_fired = true;
                    speak_cancel.cancel();
                }

                _ = ticker.tick() => {
                    if pending.is_some() && last_flush.elapsed() >= flush_period {
                        self.flush_pending(&mut pending, &stream, role, turn_id, false, &mut produced_bytes, &mut produced_events).await?;
                        last_flush = Instant::now();
                        if self.over_byte_budget(produced_bytes) {
                            speak_cancel.cancel();
                            break TurnStatus::Completed;
                        }
                    }
                }

                item = chunks.next() => {
                    match item {
                        Some(Ok(AgentChunk::Content { act, text })) => {
                            match &mut pending {
                                Some((buffered_act, buffer)) if *buffered_act == act => {
                                    buffer.push_str(&text);
                                }
                                _ => {
                                    if pending.is_some() {
                                        self.flush_pending(&mut pending, &stream, role, turn_id, false, &mut produced_bytes, &mut produced_events).await?;
                                        last_flush = Instant::now();
                                    }
                                    pending = Some((act, text));
                                }
                            }
                            let ready = pending.as_ref().map(|(_, b)| b.len() >= self.config.flush_bytes).unwrap_or(false);
                            if ready {
                                self.flush_pending(&mut pending, &stream, role, turn_id, false, &mut produced_bytes, &mut produced_events).await?;
                                last_flush = Instant::now();
                                if self.over_byte_budget(produced_bytes) {
                                    speak_cancel.cancel();
                                    break TurnStatus::Completed;
                                }
                            }
                        }
                        Some(Ok(AgentChunk::ToolInvoke { name, args })) => {
                            if pending.is_some() {
                                self.flush_pending(&mut pending, &stream, role, turn_id, false, &mut produced_bytes, &mut produced_events).await?;
                                last_flush = Instant::now();
                            }
                            let partial = PartialEvent::new(
                                stream.clone(),
                                role,
                                turn_id,
                                Act::ToolInvoke,
                                Payload::ToolInvoke { name, args },
                            );
                            let event = self.bus.append(partial).await?;
                            produced_events += 1;
                            tool_invocations.push(event);
                        }
                        Some(Err(e)) => {
                            let message = e.to_string();
                            let partial = PartialEvent::new(stream.clone(), role, turn_id, Act::Error, Payload::Error { message });
                            self.bus.append(partial).await?;
                            produced_events += 1;
                            break TurnStatus::Errored;
                        }
                        None => {
                            self.flush_pending(&mut pending, &stream, role, turn_id, false, &mut produced_bytes, &mut produced_events).await?;
                            break TurnStatus::Completed;
                        }
                    }
                }
            }
        };

        Ok(TurnOutcome {
            turn_id,
            status,
            produced_bytes,
            produced_events,
            tool_invocations,
        })
    }

    fn over_byte_budget(&self, produced_bytes: u64) -> bool {
        self.config.byte_budget.is_some_and(|budget| produced_bytes >= budget)
    }

    #[allow(clippy::too_many_arguments)]
    async fn flush_pending(
        &self,
        pending: &mut Option<(Act, String)>,
        stream: &StreamId,
        role: Role,
        turn_id: TurnId,
        partial: bool,
        produced_bytes: &mut u64,
        produced_events: &mut u64,
    ) -> Result<(), TurnError> {
        let Some((act, text)) = pending.take() else {
            return Ok(());
        };
        let len = text.len() as u64;
        let payload = Payload::Text { text, partial };
        self.bus
            .append(PartialEvent::new(stream.clone(), role, turn_id, act, payload))
            .await?;
        *produced_bytes += len;
        *produced_events += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_bus::BusConfig;
    use orchestrator_core::test_support::ScriptedAgent;

    fn long_text(byte_len: usize) -> String {
        "x".repeat(byte_len)
    }

    #[tokio::test]
    async fn completes_and_flushes_buffered_content() {
        let bus = EventBus::open(BusConfig::default()).await.unwrap();
        let runner = TurnRunner::new(bus.clone(), TurnConfig::default());
        let agent = ScriptedAgent::new(vec![
            AgentChunk::Content { act: Act::Say, text: "hello ".into() },
            AgentChunk::Content { act: Act::Say, text: "world".into() },
        ]);

        let outcome = runner
            .run_agent_turn(
                &agent,
                StreamId::new("agent.A"),
                Role::Strategist,
                TurnId::new(),
                SpeakTrigger::Alternation,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, TurnStatus::Completed);
        assert_eq!(outcome.produced_bytes, "hello world".len() as u64);
        let tail = bus.tail(10).await;
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].payload.as_text(), Some("hello world"));
    }

    #[tokio::test]
    async fn flush_bytes_threshold_splits_into_multiple_events() {
        let bus = EventBus::open(BusConfig::default()).await.unwrap();
        let mut config = TurnConfig::default();
        config.flush_bytes = 4;
        let runner = TurnRunner::new(bus.clone(), config);
        let agent = ScriptedAgent::new(vec![AgentChunk::Content {
            act: Act::Say,
            text: long_text(10),
        }]);

        let outcome = runner
            .run_agent_turn(
                &agent,
                StreamId::new("agent.A"),
                Role::Strategist,
                TurnId::new(),
                SpeakTrigger::Alternation,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, TurnStatus::Completed);
        let tail = bus.tail(10).await;
        assert!(tail.len() >= 2, "expected chunking to produce multiple events, got {}", tail.len());
    }

    #[tokio::test]
    async fn preemption_flushes_partial_buffer_and_stops() {
        let bus = EventBus::open(BusConfig::default()).await.unwrap();
        let mut config = TurnConfig::default();
        config.flush_bytes = 1024;
        let runner = TurnRunner::new(bus.clone(), config);
        let agent = ScriptedAgent::new(vec![AgentChunk::Content {
            act: Act::Say,
            text: "partial output".into(),
        }]);
        let preempt = CancellationToken::new();
        preempt.cancel();

        let outcome = runner
            .run_agent_turn(
                &agent,
                StreamId::new("agent.A"),
                Role::Strategist,
                TurnId::new(),
                SpeakTrigger::Alternation,
                preempt,
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, TurnStatus::Preempted);
    }

    #[tokio::test]
    async fn tool_invoke_does_not_block_subsequent_content() {
        let bus = EventBus::open(BusConfig::default()).await.unwrap();
        let runner = TurnRunner::new(bus.clone(), TurnConfig::default());
        let agent = ScriptedAgent::new(vec![
            AgentChunk::ToolInvoke {
                name: "shell".into(),
                args: serde_json::json!({"cmd": "ls"}),
            },
            AgentChunk::Content { act: Act::Say, text: "done".into() },
        ]);

        let outcome = runner
            .run_agent_turn(
                &agent,
                StreamId::new("agent.A"),
                Role::Strategist,
                TurnId::new(),
                SpeakTrigger::Alternation,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, TurnStatus::Completed);
        assert_eq!(outcome.tool_invocations.len(), 1);
        assert_eq!(outcome.tool_invocations[0].act, Act::ToolInvoke);
    }
}
