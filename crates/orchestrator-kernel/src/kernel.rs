//! The Kernel: wires the Event Bus, Stream Registry, Trigger Engine,
//! Floor Controller, Turn Runner, Preemption Mux, and Tool Adapter shim
//! into the single control loop that drives the whole orchestrator.

use crate::config::KernelConfig;
use orchestrator_bus::{BusSubscription, EventBus};
use orchestrator_core::capability::agent::{AgentStream, SpeakTrigger};
use orchestrator_core::capability::memory::MemoryPlane;
use orchestrator_core::capability::tool::ToolAdapter;
use orchestrator_core::error::KernelError;
use orchestrator_core::{Act, Event, PartialEvent, Payload, Role, StreamId, TurnStatus};
use orchestrator_floor::{FloorController, PreemptionMux};
use orchestrator_registry::Registry;
use orchestrator_trigger::{decide, CurrentTurn, FloorDecision, GrantReason, TriggerConfig, TriggerInput};
use orchestrator_turn::{ToolAdapterShim, TurnRunner};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

const USER_STREAM: &str = "user";
const SYSTEM_STREAM: &str = "system.kernel";

/// How much of the bus tail the control loop re-reads each round to
/// compute `TriggerInput::unhandled`. Generous relative to any realistic
/// per-round append volume; cheaper than tracking subscriptions per loop.
const TAIL_WINDOW: usize = 1024;

struct Agents {
    by_stream: HashMap<StreamId, (Role, Arc<dyn AgentStream>)>,
}

/// The top-level Orchestrator Kernel. Construct with [`Kernel::new`],
/// register agents/tools, then drive [`Kernel::run`] on a background
/// task — everything else (`subscribe`, `tail`, `post_user`,
/// `request_shutdown`) may be called concurrently from other tasks.
pub struct Kernel {
    bus: EventBus,
    registry: Arc<Registry>,
    floor: FloorController,
    mux: PreemptionMux,
    turn_runner: TurnRunner,
    tool_shim: ToolAdapterShim,
    trigger_config: TriggerConfig,
    turn_byte_budget: Option<u64>,
    heartbeat_ms: u64,
    poll_interval: std::time::Duration,
    agents: Mutex<Agents>,
    tools: Mutex<HashMap<String, Arc<dyn ToolAdapter>>>,
    memory_plane: Mutex<Option<Arc<dyn MemoryPlane>>>,
    last_handled_seq: AtomicU64,
    last_floor_release_ms: Mutex<Option<u64>>,
    last_holder: Mutex<Option<StreamId>>,
    last_heartbeat_ms: AtomicU64,
    silent_rounds: AtomicU32,
    shutdown_requested: AtomicBool,
}

impl Kernel {
    /// Open the bus and wire every sub-component over it. Does not start
    /// the control loop; call [`Kernel::run`] for that.
    pub async fn new(config: KernelConfig) -> Result<Arc<Self>, KernelError> {
        let bus = EventBus::open(config.bus).await?;
        let registry = Arc::new(Registry::new(config.registry));
        let floor = FloorController::new(bus.clone(), registry.clone(), config.floor);
        let turn_byte_budget = config.turn.byte_budget;
        let turn_runner = TurnRunner::new(bus.clone(), config.turn);
        let tool_shim = ToolAdapterShim::new(bus.clone(), registry.clone());

        Ok(Arc::new(Self {
            bus,
            registry,
            floor,
            mux: PreemptionMux::new(),
            turn_runner,
            tool_shim,
            trigger_config: config.trigger,
            turn_byte_budget,
            heartbeat_ms: config.heartbeat_ms.as_millis(),
            poll_interval: config.poll_interval_ms.to_std(),
            agents: Mutex::new(Agents { by_stream: HashMap::new() }),
            tools: Mutex::new(HashMap::new()),
            memory_plane: Mutex::new(None),
            last_handled_seq: AtomicU64::new(0),
            // Seeded to construction time rather than `None`: the time
            // trigger only fires off a prior release, and a kernel that
            // never preempts or grants anything would otherwise sit idle
            // forever waiting on the starvation guard alone. Boot counts
            // as the first "release" for the quiet-timer's purposes.
            last_floor_release_ms: Mutex::new(Some(now_ms())),
            last_holder: Mutex::new(None),
            last_heartbeat_ms: AtomicU64::new(0),
            silent_rounds: AtomicU32::new(0),
            shutdown_requested: AtomicBool::new(false),
        }))
    }

    /// Register a speaker under `name`/`role`. Fails if the name is
    /// already registered.
    pub fn register_agent(
        &self,
        name: impl Into<StreamId>,
        role: Role,
        speaker: Arc<dyn AgentStream>,
    ) -> Result<(), KernelError> {
        let stream = name.into();
        self.registry.register(stream.clone(), role, now_ms())?;
        self.agents.lock().unwrap().by_stream.insert(stream, (role, speaker));
        Ok(())
    }

    /// Register a tool adapter under the command name agents will ask
    /// for it by. Unlike agents, tool adapters are not stream-registered
    /// up front — each invocation mints its own `tool.{command}.{seq}`
    /// stream for the duration of that invocation only.
    pub fn register_tool_adapter(&self, name: impl Into<String>, adapter: Arc<dyn ToolAdapter>) {
        self.tools.lock().unwrap().insert(name.into(), adapter);
    }

    /// Attach the optional memory plane. Once set, every durably appended
    /// event is handed to [`MemoryPlane::observe`] fire-and-forget from
    /// the control loop. Replaces any previously registered plane.
    pub fn register_memory_plane(&self, plane: Arc<dyn MemoryPlane>) {
        *self.memory_plane.lock().unwrap() = Some(plane);
    }

    /// Append a summary produced by the memory plane back onto the bus,
    /// as an `observe` event from the system stream.
    pub async fn post_observation(&self, text: impl Into<String>) -> Result<Event, KernelError> {
        let partial = PartialEvent::new(
            StreamId::new(SYSTEM_STREAM),
            Role::System,
            orchestrator_core::TurnId::new(),
            Act::Observe,
            Payload::text(text.into()),
        );
        Ok(self.bus.append(partial).await?)
    }

    /// Subscribe from `from_seq` onward.
    pub async fn subscribe(&self, from_seq: u64) -> Result<BusSubscription, KernelError> {
        Ok(self.bus.subscribe(from_seq).await?)
    }

    /// Subscribe to just the last `tail_n` events plus everything after.
    pub async fn subscribe_tail(&self, tail_n: usize) -> BusSubscription {
        self.bus.subscribe_tail(tail_n).await
    }

    /// Synchronous snapshot of the last `n` events.
    pub async fn tail(&self, n: usize) -> Vec<Event> {
        self.bus.tail(n).await
    }

    /// Whether the bus has downgraded to memory-only persistence.
    pub async fn is_persistence_degraded(&self) -> bool {
        self.bus.is_persistence_degraded().await
    }

    /// Enqueue user text and signal the Preemption Mux. Appended as
    /// `interrupt` (not `say`): the Trigger Engine's user trigger keys on
    /// `act=interrupt, role=user`, and `interrupt` is one of the three
    /// floor-exempt acts — a `say` would require the user to hold the
    /// floor, which it never does.
    pub async fn post_user(&self, text: impl Into<String>) -> Result<Event, KernelError> {
        let partial = PartialEvent::new(
            StreamId::new(USER_STREAM),
            Role::User,
            orchestrator_core::TurnId::new(),
            Act::Interrupt,
            Payload::Text { text: text.into(), partial: false },
        );
        let event = self.bus.append(partial).await?;
        self.mux.signal_user_input();
        Ok(event)
    }

    /// Request a clean shutdown. Takes effect on the control loop's next
    /// iteration: any in-flight turn is preempted, released, and the bus
    /// is flushed and closed.
    pub fn request_shutdown(&self, reason: impl Into<String>) {
        info!(reason = %reason.into(), "shutdown requested");
        self.shutdown_requested.store(true, Ordering::SeqCst);
        self.mux.signal_shutdown();
    }

    /// Drive the control loop until shutdown. Intended to run on its own
    /// task; `post_user`/`request_shutdown`/`register_*` remain callable
    /// from other tasks while this runs, since every sub-component here
    /// is either `Arc`-shared or internally synchronized.
    pub async fn run(self: Arc<Self>) -> Result<(), KernelError> {
        loop {
            let now = now_ms();
            let tail = self.bus.tail(TAIL_WINDOW).await;
            let unhandled = self.advance_unhandled(&tail);
            self.notify_memory_plane(&unhandled);

            let streams = self.registry.list_live();
            let holder = self.floor.current();
            let current_turn = holder.as_ref().map(|h| CurrentTurn {
                holder: h.stream.clone(),
                produced_bytes: turn_produced_bytes(&tail, h.turn_id),
            });

            let input = TriggerInput {
                unhandled: &unhandled,
                streams: &streams,
                now_ms: now,
                current_turn,
                last_floor_release_ms: *self.last_floor_release_ms.lock().unwrap(),
                last_holder: self.last_holder.lock().unwrap().clone(),
                silent_rounds: self.silent_rounds.load(Ordering::Relaxed),
                shutdown_requested: self.shutdown_requested.load(Ordering::Relaxed),
            };
            let decision = decide(&input, &self.trigger_config);

            match decision {
                FloorDecision::Shutdown => {
                    self.shut_down(now).await?;
                    return Ok(());
                }
                FloorDecision::GrantNext { stream, reason } => {
                    let already_holds = holder.as_ref().is_some_and(|h| h.stream == stream);
                    if already_holds {
                        tokio::time::sleep(self.poll_interval).await;
                        continue;
                    }
                    if let Some(h) = &holder {
                        self.preempt_current(h.stream.clone(), now).await?;
                    }
                    self.run_turn(Arc::clone(&self), stream, reason, now).await?;
                }
                FloorDecision::Continue => {
                    tokio::time::sleep(self.poll_interval).await;
                }
                FloorDecision::Idle => {
                    self.maybe_heartbeat(now).await?;
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Compute events not yet seen by a previous round's decision, then
    /// advance the watermark and silence counter for the next round.
    /// `last_handled_seq` holds the next *unseen* seq (so `0` on a fresh
    /// kernel correctly includes a first event at `seq=0`).
    fn advance_unhandled(&self, tail: &[Event]) -> Vec<Event> {
        let next_unseen = self.last_handled_seq.load(Ordering::Relaxed);
        let unhandled: Vec<Event> = tail.iter().filter(|e| e.seq >= next_unseen).cloned().collect();
        match tail.iter().map(|e| e.seq).max() {
            Some(max_seq) if max_seq >= next_unseen => {
                self.last_handled_seq.store(max_seq + 1, Ordering::Relaxed);
                self.silent_rounds.store(0, Ordering::Relaxed);
            }
            _ => {
                self.silent_rounds.fetch_add(1, Ordering::Relaxed);
            }
        }
        unhandled
    }

    async fn preempt_current(&self, holder_stream: StreamId, now: u64) -> Result<(), KernelError> {
        if !self.mux.is_tripped() {
            self.mux.signal_policy_override();
        }
        let role = self
            .registry
            .get(&holder_stream)
            .map(|r| r.role)
            .unwrap_or(Role::System);
        let reason = self.mux.reason().map(|r| format!("{r:?}"));
        let _ = self
            .floor
            .release(role, TurnStatus::Preempted, reason, now, true)
            .await;
        *self.last_floor_release_ms.lock().unwrap() = Some(now);
        self.mux.reset();
        Ok(())
    }

    async fn run_turn(
        &self,
        kernel: Arc<Self>,
        stream: StreamId,
        reason: GrantReason,
        now: u64,
    ) -> Result<(), KernelError> {
        let speaker = {
            let agents = self.agents.lock().unwrap();
            agents.by_stream.get(&stream).cloned()
        };
        let Some((role, speaker)) = speaker else {
            // Trigger proposed a stream with no registered speaker (a
            // tool or the user stream can't hold the floor); treat as a
            // no-op and let the next round re-decide.
            warn!(stream = %stream, "floor proposed for a stream with no registered agent");
            return Ok(());
        };

        let (turn_id, _grant_event) = self
            .floor
            .grant(stream.clone(), role, now)
            .await
            .map_err(|e| KernelError::Other(Box::new(e)))?;
        *self.last_holder.lock().unwrap() = Some(stream.clone());
        let child = self.mux.child_token();

        let outcome = self
            .turn_runner
            .run_agent_turn(speaker.as_ref(), stream.clone(), role, turn_id, to_speak_trigger(reason), child.clone())
            .await;

        let (mut status, produced_bytes, tool_invocations) = match outcome {
            Ok(o) => (o.status, o.produced_bytes, o.tool_invocations),
            Err(e) => {
                warn!(error = %e, stream = %stream, "turn runner returned an error");
                (TurnStatus::Errored, 0, Vec::new())
            }
        };

        // `floor.release` rejects a voluntary release before `T_min` has
        // elapsed (`FloorConfig::past_min_duration`). A speaker that
        // finishes quickly still has to hold the floor out to `T_min`
        // unless preempted in the meantime, in which case the wait itself
        // is what gets preempted.
        if !matches!(status, TurnStatus::Preempted) {
            while !self.floor.past_min_duration(now_ms()) {
                tokio::select! {
                    _ = child.cancelled() => {
                        status = TurnStatus::Preempted;
                        break;
                    }
                    _ = tokio::time::sleep(std::time::Duration::from_millis(5)) => {}
                }
            }
        }

        let preempted = matches!(status, TurnStatus::Preempted);
        let release_now = now_ms();
        // The size trigger only ever fires inside the Turn Runner itself
        // (it ends the turn as `Completed` once `produced_bytes` crosses
        // `turn.byte_budget`); `reason` here is why the *grant* happened,
        // not why it ended, so the release reason is derived from the
        // outcome, not from `GrantReason::SizeBudget`. A preempted turn
        // picks up the mux's reason directly: cancellation reaches this
        // turn through its own child token, not through `preempt_current`
        // (that path only fires between turns, never while one is
        // in-flight, since the control loop awaits a turn out fully
        // before it can observe a new decision).
        let release_reason = if preempted {
            self.mux.reason().map(|r| format!("{r:?}"))
        } else {
            (matches!(status, TurnStatus::Completed)
                && self.turn_byte_budget.is_some_and(|budget| produced_bytes >= budget))
            .then(|| "byte_budget".to_string())
        };
        let _ = self.floor.release(role, status, release_reason, release_now, preempted).await;
        *self.last_floor_release_ms.lock().unwrap() = Some(release_now);
        if preempted {
            self.mux.reset();
        }

        for invoke_event in tool_invocations {
            Self::spawn_tool_invocation(Arc::clone(&kernel), invoke_event, child.clone());
        }
        Ok(())
    }

    fn spawn_tool_invocation(
        kernel: Arc<Self>,
        invoke_event: Event,
        cancel: tokio_util::sync::CancellationToken,
    ) {
        tokio::spawn(async move {
            let (name, args) = match &invoke_event.payload {
                Payload::ToolInvoke { name, args } => (name.clone(), args.clone()),
                _ => return,
            };
            let adapter = kernel.tools.lock().unwrap().get(&name).cloned();
            let Some(adapter) = adapter else {
                warn!(tool = %name, "tool_invoke for an unregistered adapter");
                return;
            };
            let cli_args = args_to_strings(&args);
            if let Err(e) = kernel
                .tool_shim
                .run_invocation(adapter.as_ref(), &invoke_event, &name, &cli_args, &[], cancel, now_ms())
                .await
            {
                warn!(error = %e, tool = %name, "tool invocation failed");
            }
        });
    }

    /// Hand each newly-observed event to the memory plane, if one is
    /// registered, without blocking the control loop on it.
    fn notify_memory_plane(&self, unhandled: &[Event]) {
        let Some(plane) = self.memory_plane.lock().unwrap().clone() else {
            return;
        };
        for event in unhandled {
            let plane = Arc::clone(&plane);
            let event = event.clone();
            tokio::spawn(async move { plane.observe(&event).await });
        }
    }

    async fn maybe_heartbeat(&self, now: u64) -> Result<(), KernelError> {
        let last = self.last_heartbeat_ms.load(Ordering::Relaxed);
        if now.saturating_sub(last) < self.heartbeat_ms {
            return Ok(());
        }
        let partial = PartialEvent::new(
            StreamId::new(SYSTEM_STREAM),
            Role::System,
            orchestrator_core::TurnId::new(),
            Act::Heartbeat,
            Payload::None,
        )
        .finalize();
        self.bus.append(partial).await?;
        self.last_heartbeat_ms.store(now, Ordering::Relaxed);
        Ok(())
    }

    async fn shut_down(&self, now: u64) -> Result<(), KernelError> {
        if let Some(holder) = self.floor.current() {
            let role = self.registry.get(&holder.stream).map(|r| r.role).unwrap_or(Role::System);
            let _ = self
                .floor
                .release(role, TurnStatus::Preempted, Some("shutdown".to_string()), now, true)
                .await;
        }
        self.bus.flush().await?;
        self.bus.close().await;
        info!("kernel shut down cleanly");
        Ok(())
    }
}

fn turn_produced_bytes(tail: &[Event], turn_id: orchestrator_core::TurnId) -> u64 {
    tail.iter()
        .filter(|e| e.turn_id == turn_id)
        .filter_map(|e| e.payload.as_text())
        .map(|t| t.len() as u64)
        .sum()
}

fn to_speak_trigger(reason: GrantReason) -> SpeakTrigger {
    match reason {
        GrantReason::UserInput => SpeakTrigger::User,
        GrantReason::ToolCompletion => SpeakTrigger::ToolCompletion,
        GrantReason::Alternation | GrantReason::SizeBudget => SpeakTrigger::Alternation,
        GrantReason::Starvation => SpeakTrigger::Starvation,
    }
}

fn args_to_strings(args: &serde_json::Value) -> Vec<String> {
    match args.as_array() {
        Some(values) => values
            .iter()
            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
            .collect(),
        None => Vec::new(),
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
