//! The Tool Adapter Contract shim (C9): starts a tool invocation,
//! converts its stdout/stderr into `tool_chunk` events, and closes it
//! out with `tool_end`.

use futures::StreamExt;
use orchestrator_bus::EventBus;
use orchestrator_core::capability::tool::ToolAdapter;
use orchestrator_core::{
    Act, Event, PartialEvent, Payload, Role, StreamId, ToolChannel, ToolEndStatus, ToolError,
};
use orchestrator_registry::Registry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Drives one tool invocation from `start` through `tool_end`, appending
/// every chunk and the terminal event to the bus under a tool stream
/// registered for the invocation's lifetime.
pub struct ToolAdapterShim {
    bus: EventBus,
    registry: Arc<Registry>,
}

impl ToolAdapterShim {
    /// Construct a shim over a shared bus and registry.
    pub fn new(bus: EventBus, registry: Arc<Registry>) -> Self {
        Self { bus, registry }
    }

    /// Run one invocation to completion. `invoke_event` is the
    /// `tool_invoke` event that requested it — its `seq` becomes
    /// `parent_seq` for every event this shim appends,
    /// and its `turn_id` is carried onto them. `cancel` is the invoking
    /// turn's cancellation handle; tripping it cancels the adapter and
    /// yields a `tool_end(status=cancelled)`.
    pub async fn run_invocation(
        &self,
        adapter: &dyn ToolAdapter,
        invoke_event: &Event,
        command: &str,
        args: &[String],
        env: &[(String, String)],
        cancel: CancellationToken,
        now_ms: u64,
    ) -> Result<Event, ToolError> {
        let stream = StreamId::new(format!("tool.{command}.{}", invoke_event.seq));

        let handle = match adapter.start(command, args, env).await {
            Ok(h) => h,
            Err(e) => {
                return self.finish_errored(&stream, invoke_event, &e.to_string()).await;
            }
        };
        // A name collision or a tool-stream cap breach does not abort an
        // already-started process; it just means this invocation won't
        // show up in `Registry::list_live`.
        let _ = self.registry.register(stream.clone(), Role::Tool, now_ms);

        let mut stdout = adapter.stdout_chunks(&handle);
        let mut stderr = adapter.stderr_chunks(&handle);
        let mut stdout_done = false;
        let mut stderr_done = false;

        while !(stdout_done && stderr_done) {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                chunk = stdout.next(), if !stdout_done => match chunk {
                    Some(bytes) => self.append_chunk(&stream, invoke_event, ToolChannel::Stdout, bytes).await?,
                    None => stdout_done = true,
                },

                chunk = stderr.next(), if !stderr_done => match chunk {
                    Some(bytes) => self.append_chunk(&stream, invoke_event, ToolChannel::Stderr, bytes).await?,
                    None => stderr_done = true,
                },
            }
        }

        let outcome = if cancel.is_cancelled() {
            adapter.cancel(&handle).await;
            Err(ToolError::Cancelled)
        } else {
            adapter.wait(&handle).await
        };

        let _ = self.registry.deregister(&stream);

        match outcome {
            Ok(exit_code) => self.finish(&stream, invoke_event, Some(exit_code), ToolEndStatus::Completed).await,
            Err(ToolError::Cancelled) => self.finish(&stream, invoke_event, None, ToolEndStatus::Cancelled).await,
            Err(e) => self.finish_errored(&stream, invoke_event, &e.to_string()).await,
        }
    }

    async fn append_chunk(
        &self,
        stream: &StreamId,
        invoke_event: &Event,
        channel: ToolChannel,
        bytes: Vec<u8>,
    ) -> Result<(), ToolError> {
        let partial = PartialEvent::new(
            stream.clone(),
            Role::Tool,
            invoke_event.turn_id,
            Act::ToolChunk,
            Payload::ToolChunk { channel, bytes },
        )
        .with_parent(invoke_event.seq);
        self.bus.append(partial).await.map_err(|e| ToolError::Io(e.to_string()))?;
        Ok(())
    }

    async fn finish(
        &self,
        stream: &StreamId,
        invoke_event: &Event,
        exit_code: Option<i32>,
        status: ToolEndStatus,
    ) -> Result<Event, ToolError> {
        let partial = PartialEvent::new(
            stream.clone(),
            Role::Tool,
            invoke_event.turn_id,
            Act::ToolEnd,
            Payload::ToolEnd { exit_code, status },
        )
        .with_parent(invoke_event.seq)
        .finalize();
        self.bus.append(partial).await.map_err(|e| ToolError::Io(e.to_string()))
    }

    async fn finish_errored(&self, stream: &StreamId, invoke_event: &Event, message: &str) -> Result<Event, ToolError> {
        let error_partial = PartialEvent::new(
            stream.clone(),
            Role::Tool,
            invoke_event.turn_id,
            Act::Error,
            Payload::Error { message: message.to_string() },
        )
        .with_parent(invoke_event.seq);
        self.bus
            .append(error_partial)
            .await
            .map_err(|e| ToolError::Io(e.to_string()))?;
        self.finish(stream, invoke_event, None, ToolEndStatus::Errored).await
    }
}
