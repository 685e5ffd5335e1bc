//! The Floor Controller (C5): selects the next holder and owns
//! `floor_grant`/`floor_release` emission.

use crate::error::FloorError;
use orchestrator_bus::EventBus;
use orchestrator_core::duration::DurationMs;
use orchestrator_core::event::PartialEvent;
use orchestrator_core::id::{StreamId, TurnId};
use orchestrator_core::payload::{Act, Payload, ReleaseReason, Role, TurnStatus};
use orchestrator_core::stream_record::StreamState;
use orchestrator_registry::Registry;
use std::sync::Mutex;
use std::sync::Arc;

/// `floor.*` configuration this controller enforces.
#[derive(Debug, Clone, Copy)]
pub struct FloorConfig {
    /// Minimum time a holder must keep the floor absent preemption.
    pub t_min: DurationMs,
    /// Maximum time a holder may keep the floor before forced release.
    pub t_max: DurationMs,
}

impl Default for FloorConfig {
    fn default() -> Self {
        Self {
            t_min: DurationMs::from_millis(400),
            t_max: DurationMs::from_secs(8),
        }
    }
}

/// The stream currently holding the floor, and when it was granted.
#[derive(Debug, Clone)]
pub struct FloorHolder {
    /// Which stream holds the floor.
    pub stream: StreamId,
    /// This turn's id.
    pub turn_id: TurnId,
    /// When the grant happened.
    pub granted_ms: u64,
}

/// Owns the single floor-holder slot: who holds it, for how long, and
/// the `floor_grant`/`floor_release` events that bracket a turn.
pub struct FloorController {
    bus: EventBus,
    registry: Arc<Registry>,
    config: FloorConfig,
    current: Mutex<Option<FloorHolder>>,
}

impl FloorController {
    /// Construct a controller over a shared bus and registry.
    pub fn new(bus: EventBus, registry: Arc<Registry>, config: FloorConfig) -> Self {
        Self {
            bus,
            registry,
            config,
            current: Mutex::new(None),
        }
    }

    /// Current holder, if any.
    pub fn current(&self) -> Option<FloorHolder> {
        self.current.lock().unwrap().clone()
    }

    /// Grant the floor to `stream`, minting a fresh [`TurnId`] and
    /// appending the `floor_grant` event. Fails if another stream
    /// already holds it — callers must `release` first.
    pub async fn grant(&self, stream: StreamId, role: Role, now_ms: u64) -> Result<(TurnId, orchestrator_core::event::Event), FloorError> {
        {
            let held = self.current.lock().unwrap();
            if let Some(holder) = held.as_ref() {
                return Err(FloorError::AlreadyHeld(holder.stream.to_string()));
            }
        }

        self.registry.set_state(&stream, StreamState::Granted, now_ms)?;

        let turn_id = TurnId::new();
        let partial = PartialEvent::new(stream.clone(), role, turn_id, Act::FloorGrant, Payload::None);
        let event = self.bus.append(partial).await?;

        *self.current.lock().unwrap() = Some(FloorHolder {
            stream,
            turn_id,
            granted_ms: now_ms,
        });
        Ok((turn_id, event))
    }

    /// Whether the current holder may voluntarily release yet (`T_min`
    /// has elapsed). Preemption bypasses this check entirely — callers
    /// driving a preempted release should not consult it.
    pub fn past_min_duration(&self, now_ms: u64) -> bool {
        match self.current.lock().unwrap().as_ref() {
            Some(holder) => now_ms.saturating_sub(holder.granted_ms) >= self.config.t_min.as_millis(),
            None => true,
        }
    }

    /// Whether the current holder has exceeded `T_max` and must be
    /// force-released regardless of voluntary completion.
    pub fn past_max_duration(&self, now_ms: u64) -> bool {
        match self.current.lock().unwrap().as_ref() {
            Some(holder) => now_ms.saturating_sub(holder.granted_ms) >= self.config.t_max.as_millis(),
            None => false,
        }
    }

    /// Release the floor. `preempted` bypasses the `T_min` guard — a
    /// preemption signal always wins immediately.
    pub async fn release(
        &self,
        role: Role,
        status: TurnStatus,
        reason: ReleaseReason,
        now_ms: u64,
        preempted: bool,
    ) -> Result<orchestrator_core::event::Event, FloorError> {
        let holder = {
            let held = self.current.lock().unwrap();
            held.clone().ok_or(FloorError::NotHolder("<none>".to_string()))?
        };

        if !preempted && !self.past_min_duration(now_ms) {
            return Err(FloorError::BeforeMinDuration);
        }

        self.registry
            .set_state(&holder.stream, StreamState::Idle, now_ms)?;

        let mut partial = PartialEvent::new(
            holder.stream.clone(),
            role,
            holder.turn_id,
            Act::FloorRelease,
            Payload::FloorRelease { status, reason },
        );
        partial.is_final = true;
        let event = self.bus.append(partial).await?;

        *self.current.lock().unwrap() = None;
        Ok(event)
    }
}
