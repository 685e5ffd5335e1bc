//! `ScriptedTool` — a fake [`ToolAdapter`] backed by in-memory scripts.

use crate::capability::agent::ChunkStream;
use crate::capability::tool::{ToolAdapter, ToolHandle};
use crate::error::ToolError;
use async_trait::async_trait;
use futures_core::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::task::{Context, Poll};

/// One scripted invocation outcome: the stdout/stderr chunks to replay
/// and the exit code `wait` should eventually return.
#[derive(Debug, Clone, Default)]
pub struct ToolScript {
    /// Chunks yielded from `stdout_chunks`.
    pub stdout: Vec<Vec<u8>>,
    /// Chunks yielded from `stderr_chunks`.
    pub stderr: Vec<Vec<u8>>,
    /// Exit code `wait` resolves to.
    pub exit_code: i32,
}

struct Invocation {
    script: ToolScript,
    cancelled: bool,
}

/// A [`ToolAdapter`] that never spawns a real process. Every `start`
/// call is served from a pre-registered [`ToolScript`] keyed by command
/// name, mirroring `layer0::test_utils`'s fixed-response adapters one
/// layer down (the tool boundary instead of the LLM boundary).
pub struct ScriptedTool {
    scripts: HashMap<String, ToolScript>,
    invocations: Mutex<HashMap<String, Invocation>>,
    next_id: AtomicU64,
}

impl ScriptedTool {
    /// Build a scripted tool adapter from a `command name -> script` table.
    pub fn new(scripts: HashMap<String, ToolScript>) -> Self {
        Self {
            scripts,
            invocations: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    fn script_for(&self, handle: &ToolHandle) -> ToolScript {
        self.invocations
            .lock()
            .unwrap()
            .get(&handle.0)
            .map(|inv| inv.script.clone())
            .unwrap_or_default()
    }
}

struct VecChunks {
    remaining: std::vec::IntoIter<Vec<u8>>,
}

impl Stream for VecChunks {
    type Item = Vec<u8>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.remaining.next())
    }
}

#[async_trait]
impl ToolAdapter for ScriptedTool {
    async fn start(
        &self,
        command: &str,
        _args: &[String],
        _env: &[(String, String)],
    ) -> Result<ToolHandle, ToolError> {
        let script = self
            .scripts
            .get(command)
            .cloned()
            .ok_or_else(|| ToolError::SpawnFailed {
                tool: command.to_string(),
                message: "no script registered for this command".to_string(),
            })?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = ToolHandle::new(format!("{command}-{id}"));
        self.invocations.lock().unwrap().insert(
            handle.0.clone(),
            Invocation {
                script,
                cancelled: false,
            },
        );
        Ok(handle)
    }

    fn stdout_chunks(&self, handle: &ToolHandle) -> ChunkStream<Vec<u8>> {
        Box::pin(VecChunks {
            remaining: self.script_for(handle).stdout.into_iter(),
        })
    }

    fn stderr_chunks(&self, handle: &ToolHandle) -> ChunkStream<Vec<u8>> {
        Box::pin(VecChunks {
            remaining: self.script_for(handle).stderr.into_iter(),
        })
    }

    async fn wait(&self, handle: &ToolHandle) -> Result<i32, ToolError> {
        let invocations = self.invocations.lock().unwrap();
        match invocations.get(&handle.0) {
            Some(inv) if inv.cancelled => Err(ToolError::Cancelled),
            Some(inv) => Ok(inv.script.exit_code),
            None => Err(ToolError::SpawnFailed {
                tool: handle.0.clone(),
                message: "unknown handle".to_string(),
            }),
        }
    }

    async fn cancel(&self, handle: &ToolHandle) {
        if let Some(inv) = self.invocations.lock().unwrap().get_mut(&handle.0) {
            inv.cancelled = true;
        }
    }
}
