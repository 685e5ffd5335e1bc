//! The `AgentStream` capability — a model-provider-backed speaker.

use crate::error::TurnError;
use crate::payload::Act;
use async_trait::async_trait;
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// A boxed, owned, `Send` stream of items: a lazy, finite,
/// non-restartable sequence of output chunks from a speaker.
pub type ChunkStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

/// One unit of output from an agent's [`AgentStream::speak`] call.
///
/// The Turn Runner buffers [`AgentChunk::Content`] into flushed content
/// events and reacts to [`AgentChunk::ToolInvoke`] immediately by
/// registering a pending invocation — a tool invocation never waits for
/// the next flush boundary.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AgentChunk {
    /// A piece of conversational content tagged with the speech-act it
    /// performs. Must be one of the "content" acts (`say`, `propose`,
    /// `ask`, `answer`, `observe`, `plan`, `decide`) — the Turn Runner
    /// downgrades anything else to `say` and logs a warning.
    Content {
        /// The speech-act this chunk performs.
        act: Act,
        /// The text content.
        text: String,
    },
    /// A request to invoke a tool. Does not transfer the floor.
    ToolInvoke {
        /// Name of the tool to invoke.
        name: String,
        /// Tool arguments.
        args: serde_json::Value,
    },
}

/// What triggered this turn — informs context assembly upstream of the
/// kernel. The kernel passes it through unchanged; it does not interpret it.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SpeakTrigger {
    /// The user just spoke.
    User,
    /// A tool invocation this agent issued just completed.
    ToolCompletion,
    /// Plain time-sliced alternation.
    Alternation,
    /// The starvation guard granted this slot.
    Starvation,
}

/// Parameters the Floor Controller/Turn Runner pass to a speaker for one turn.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct SpeakParams {
    /// Why this turn was granted.
    pub trigger: SpeakTrigger,
    /// Soft-stop deadline; the speaker should wrap up by this time.
    pub soft_deadline_ms: u64,
}

/// A model-provider-backed participant. The kernel never makes an HTTP
/// call itself — it consumes this capability, which concrete providers
/// (e.g. an Anthropic or OpenAI client) implement.
#[async_trait]
pub trait AgentStream: Send + Sync {
    /// Begin producing one turn's worth of output.
    ///
    /// The returned stream is lazy, finite, and non-restartable: the
    /// Turn Runner polls it until it ends or `cancel` fires. `cancel`
    /// carries the soft-stop signal at `deadline - grace` and the hard
    /// cancellation at `deadline`; the implementation is responsible for
    /// observing it promptly.
    async fn speak(
        &self,
        cancel: CancellationToken,
        params: SpeakParams,
    ) -> Result<ChunkStream<Result<AgentChunk, TurnError>>, TurnError>;
}
