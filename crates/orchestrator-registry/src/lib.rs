#![deny(missing_docs)]
//! The Stream Registry (C4): liveness bookkeeping, name uniqueness, and
//! the tool-stream cap.
//!
//! Synchronous and lock-based (`std::sync::Mutex`) rather than
//! async — registry operations never perform I/O, so there is nothing
//! to `.await` and no reason to pull the rest of a task's executor into
//! the critical section.

use orchestrator_core::error::RegistryError;
use orchestrator_core::id::StreamId;
use orchestrator_core::payload::Role;
use orchestrator_core::stream_record::{StreamRecord, StreamState};
use std::collections::HashMap;
use std::sync::Mutex;

/// Configuration for the registry.
#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    /// Maximum number of simultaneously registered `Role::Tool` streams.
    pub max_tool_streams: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_tool_streams: 16,
        }
    }
}

struct Inner {
    streams: HashMap<StreamId, StreamRecord>,
    tool_stream_count: usize,
}

/// The registry of all currently- or formerly-live streams.
pub struct Registry {
    inner: Mutex<Inner>,
    config: RegistryConfig,
}

impl Registry {
    /// Construct an empty registry.
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                streams: HashMap::new(),
                tool_stream_count: 0,
            }),
            config,
        }
    }

    /// Register a new stream. Fails with [`RegistryError::DuplicateName`]
    /// if `name` is already registered (even if the prior registration
    /// is now `Dead` — name uniqueness holds regardless of liveness), or
    /// [`RegistryError::ToolStreamCapReached`] if `role` is
    /// [`Role::Tool`] and the configured cap is already met.
    pub fn register(&self, name: StreamId, role: Role, now_ms: u64) -> Result<StreamId, RegistryError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.streams.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }
        if role == Role::Tool && inner.tool_stream_count >= self.config.max_tool_streams {
            return Err(RegistryError::ToolStreamCapReached(self.config.max_tool_streams));
        }

        let record = StreamRecord::new(name.clone(), role, now_ms);
        if role == Role::Tool {
            inner.tool_stream_count += 1;
        }
        inner.streams.insert(name.clone(), record);
        Ok(name)
    }

    /// Mark a stream `Dead` and remove it from the live set, decrementing
    /// the tool-stream count if it was a tool.
    pub fn deregister(&self, id: &StreamId) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .streams
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        if record.role == Role::Tool && record.state != StreamState::Dead {
            inner.tool_stream_count = inner.tool_stream_count.saturating_sub(1);
        }
        record.state = StreamState::Dead;
        Ok(())
    }

    /// Transition a stream's lifecycle state.
    pub fn set_state(&self, id: &StreamId, state: StreamState, now_ms: u64) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .streams
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        record.state = state;
        if matches!(state, StreamState::Speaking | StreamState::Granted) {
            record.last_active_ms = now_ms;
        }
        Ok(())
    }

    /// Snapshot every stream not in the `Dead` state, ordered
    /// deterministically by name (the Floor Controller's tie-break).
    pub fn list_live(&self) -> Vec<StreamRecord> {
        let inner = self.inner.lock().unwrap();
        let mut live: Vec<StreamRecord> = inner
            .streams
            .values()
            .filter(|r| r.state != StreamState::Dead)
            .cloned()
            .collect();
        live.sort_by(|a, b| a.name.as_str().cmp(b.name.as_str()));
        live
    }

    /// Add `n` to a stream's running produced-bytes counter, for
    /// backpressure accounting.
    pub fn mark_bytes(&self, id: &StreamId, n: u64) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .streams
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        record.pending_bytes += n;
        Ok(())
    }

    /// Look up a single stream's current record.
    pub fn get(&self, id: &StreamId) -> Option<StreamRecord> {
        self.inner.lock().unwrap().streams.get(id).cloned()
    }
}
