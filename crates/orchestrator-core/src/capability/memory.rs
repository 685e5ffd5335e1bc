//! The `MemoryPlane` capability — long-term summarization/fact storage.

use crate::event::Event;
use async_trait::async_trait;

/// External collaborator that observes the event stream and may later
/// append `observe` events of its own summarizing what it saw (e.g. a
/// rolling-summary or skill-library component). The kernel contains no
/// summarization logic itself — it only calls `observe` fire-and-forget
/// after each durable append (once a plane is registered with
/// `Kernel::register_memory_plane`), and separately exposes
/// `Kernel::post_observation` for the memory plane to push a summary
/// back onto the bus.
#[async_trait]
pub trait MemoryPlane: Send + Sync {
    /// Called after an event is durably appended. Implementations should
    /// return quickly; this is not awaited on the hot append path by
    /// anything other than the dedicated notification task.
    async fn observe(&self, event: &Event);
}
