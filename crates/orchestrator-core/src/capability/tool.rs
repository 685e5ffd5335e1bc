//! The `ToolAdapter` capability — an external-subprocess-backed tool.

use crate::capability::agent::ChunkStream;
use crate::error::ToolError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Opaque handle to a running (or finished) tool invocation. Adapters
/// mint these at `start` and the kernel threads them back through
/// `stdout_chunks`/`stderr_chunks`/`wait`/`cancel` — the kernel never
/// inspects the handle's contents.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ToolHandle(pub String);

impl ToolHandle {
    /// Wrap an adapter-assigned handle id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// A capability wrapping an external subprocess (shell, file probe,
/// network probe, ...). Tool sandboxing, allowlisting, and redaction of
/// the actual command live entirely in the adapter: the kernel accepts
/// tool adapters by registration only and never parses commands itself.
#[async_trait]
pub trait ToolAdapter: Send + Sync {
    /// Start a tool invocation. Returns immediately with a handle; output
    /// streams asynchronously via `stdout_chunks`/`stderr_chunks`.
    async fn start(
        &self,
        command: &str,
        args: &[String],
        env: &[(String, String)],
    ) -> Result<ToolHandle, ToolError>;

    /// A lazy, finite, non-restartable stream of stdout chunks.
    fn stdout_chunks(&self, handle: &ToolHandle) -> ChunkStream<Vec<u8>>;

    /// A lazy, finite, non-restartable stream of stderr chunks.
    fn stderr_chunks(&self, handle: &ToolHandle) -> ChunkStream<Vec<u8>>;

    /// Wait for the process to exit and return its exit code.
    async fn wait(&self, handle: &ToolHandle) -> Result<i32, ToolError>;

    /// Cancel a running invocation (used when the invoking turn is preempted).
    async fn cancel(&self, handle: &ToolHandle);
}
