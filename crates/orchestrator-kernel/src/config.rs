//! Kernel-scope configuration: one struct per config table, aggregated
//! the way the sub-crates already define them.

use orchestrator_bus::BusConfig;
use orchestrator_core::DurationMs;
use orchestrator_floor::FloorConfig;
use orchestrator_registry::RegistryConfig;
use orchestrator_trigger::TriggerConfig;
use orchestrator_turn::TurnConfig;

/// Everything the control loop itself needs beyond what the Floor
/// Controller, Trigger Engine, Turn Runner, and Registry already own.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// Event Bus tunables (`bus.*`, `watermark.*`).
    pub bus: BusConfig,
    /// Floor Controller tunables (`floor.T_min_ms` / `floor.T_max_ms`).
    pub floor: FloorConfig,
    /// Trigger Engine tunables (`floor.T_quiet_ms` / `floor.T_starve_ms` /
    /// `turn.byte_budget`, duplicated onto the engine's own copy since it
    /// reads produced-bytes independently of the Turn Runner's cap).
    pub trigger: TriggerConfig,
    /// Turn Runner tunables (`turn.*`).
    pub turn: TurnConfig,
    /// Stream Registry tunables (`tool.max_streams`).
    pub registry: RegistryConfig,
    /// `floor.T_heartbeat_ms` — cadence for idle heartbeats.
    pub heartbeat_ms: DurationMs,
    /// `preempt.target_ms` — SLA for preemption propagation. Not
    /// enforced in-process (there is no blocking point to bound); kept
    /// for config-surface parity and for tests to assert against.
    pub preempt_target_ms: DurationMs,
    /// How often the control loop re-polls the bus tail and stream
    /// states when there is nothing to act on immediately.
    pub poll_interval_ms: DurationMs,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            floor: FloorConfig::default(),
            trigger: TriggerConfig::default(),
            turn: TurnConfig::default(),
            registry: RegistryConfig::default(),
            heartbeat_ms: DurationMs::from_secs(5),
            preempt_target_ms: DurationMs::from_millis(200),
            poll_interval_ms: DurationMs::from_millis(50),
        }
    }
}
