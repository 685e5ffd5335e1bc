//! Error types for each kernel boundary.

use thiserror::Error;

/// Event Bus errors (C2).
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BusError {
    /// The kernel is shutting down; no further appends are accepted.
    #[error("bus closed")]
    BusClosed,

    /// The in-memory queue depth bound was exceeded.
    #[error("backpressure exceeded: queue depth {depth} >= bound {bound}")]
    BackpressureExceeded {
        /// Observed queue depth.
        depth: usize,
        /// Configured bound.
        bound: usize,
    },

    /// A subscriber fell behind and was disconnected.
    #[error("subscriber lagged past {dropped} events")]
    Lagged {
        /// Approximate number of events the subscriber missed.
        dropped: u64,
    },

    /// The requested replay `seq` has already been compacted out of the log.
    #[error("seq {0} is no longer available for replay")]
    SeqUnavailable(u64),

    /// Persistence failure (disk full, permission, I/O error). Non-fatal:
    /// the bus downgrades to memory-only mode and keeps running.
    #[error("persistence degraded: {0}")]
    PersistenceDegraded(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Stream Registry errors (C4).
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A stream with this name is already registered.
    #[error("stream already registered: {0}")]
    DuplicateName(String),

    /// No stream with this name is registered.
    #[error("stream not found: {0}")]
    NotFound(String),

    /// The configured cap on concurrent tool streams was reached.
    #[error("tool stream cap reached: {0}")]
    ToolStreamCapReached(usize),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Turn Runner errors (C7).
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TurnError {
    /// The speaker capability returned an error.
    #[error("speaker error: {0}")]
    Speaker(String),

    /// The turn's hard deadline was reached.
    #[error("turn timed out")]
    Timeout,

    /// The turn was cancelled (preemption).
    #[error("turn preempted")]
    Preempted,

    /// An event append failed while driving this turn.
    #[error("bus error while driving turn: {0}")]
    Bus(#[from] BusError),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Tool Adapter errors (C9).
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ToolError {
    /// The adapter failed to start the subprocess.
    #[error("failed to start tool {tool}: {message}")]
    SpawnFailed {
        /// Tool name.
        tool: String,
        /// Error detail.
        message: String,
    },

    /// An I/O error occurred while reading tool output or waiting on it.
    #[error("tool I/O error: {0}")]
    Io(String),

    /// The invocation was cancelled before completion.
    #[error("tool invocation cancelled")]
    Cancelled,

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Top-level kernel errors, the union callers of the Kernel API see.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum KernelError {
    /// An event bus error.
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    /// A stream registry error.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// A turn error.
    #[error("turn error: {0}")]
    Turn(#[from] TurnError),

    /// A tool adapter error.
    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    /// An invariant (seq/watermark/floor) was violated. Fatal: the kernel
    /// logs diagnostics and shuts down cleanly.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}
