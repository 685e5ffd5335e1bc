//! `ScriptedAgent` — yields a fixed sequence of chunks, then ends.

use crate::capability::agent::{AgentChunk, AgentStream, ChunkStream, SpeakParams};
use crate::error::TurnError;
use async_trait::async_trait;
use futures_core::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::sync::CancellationToken;

/// An [`AgentStream`] that replays a scripted list of chunks regardless
/// of `params`, ending the stream once exhausted or once `cancel` fires.
/// Used to drive deterministic Floor Controller / Turn Runner tests.
pub struct ScriptedAgent {
    chunks: Vec<AgentChunk>,
}

impl ScriptedAgent {
    /// Create a scripted agent that will yield exactly `chunks`, in order.
    pub fn new(chunks: Vec<AgentChunk>) -> Self {
        Self { chunks }
    }
}

struct ScriptedChunks {
    remaining: std::vec::IntoIter<AgentChunk>,
    cancel: CancellationToken,
}

impl Stream for ScriptedChunks {
    type Item = Result<AgentChunk, TurnError>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancel.is_cancelled() {
            return Poll::Ready(None);
        }
        Poll::Ready(self.remaining.next().map(Ok))
    }
}

#[async_trait]
impl AgentStream for ScriptedAgent {
    async fn speak(
        &self,
        cancel: CancellationToken,
        _params: SpeakParams,
    ) -> Result<ChunkStream<Result<AgentChunk, TurnError>>, TurnError> {
        Ok(Box::pin(ScriptedChunks {
            remaining: self.chunks.clone().into_iter(),
            cancel,
        }))
    }
}
