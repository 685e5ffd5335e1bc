//! The Event Bus (C2): single-writer append, watermarking, JSONL
//! durability, and bounded fan-out to subscribers.

use crate::clock::WatermarkClock;
use crate::persistence::{recover_last_seq, EventLogWriter, LogConfig};
use orchestrator_core::capability::redact::{NoopRedactor, Redactor};
use orchestrator_core::error::BusError;
use orchestrator_core::event::{Event, PartialEvent};
use orchestrator_core::payload::Payload;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, Mutex};
use tracing::warn;

/// Tunables for one bus instance. Field names mirror the `bus.*` /
/// `watermark.*` configuration keys.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Bound on unflushed (appended-but-not-yet-durable) events before
    /// `append` starts failing with [`BusError::BackpressureExceeded`].
    pub queue_depth: usize,
    /// Capacity of each subscriber's fan-out channel.
    pub subscriber_queue_depth: usize,
    /// Watermark Clock skew tolerance.
    pub skew_tolerance_ms: u64,
    /// JSONL durability settings. `None` runs memory-only (tests, or a
    /// caller that wants no disk I/O at all).
    pub log: Option<(PathBuf, LogConfig)>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_depth: 1024,
            subscriber_queue_depth: 1024,
            skew_tolerance_ms: crate::clock::DEFAULT_SKEW_TOLERANCE_MS,
            log: None,
        }
    }
}

struct Inner {
    next_seq: u64,
    clock: WatermarkClock,
    tail: VecDeque<Event>,
    tail_cap: usize,
    backlog: usize,
    writer: Option<EventLogWriter>,
    persistence_degraded: bool,
    closed: bool,
    redactor: Arc<dyn Redactor>,
    broadcast_tx: broadcast::Sender<Event>,
}

/// Append-only, single-writer event bus. Cheap to clone: internally
/// `Arc`-backed, so every clone shares the same log, sequence counter,
/// and subscriber set.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<Inner>>,
}

impl EventBus {
    /// Construct a fresh bus, recovering `next_seq` from any existing
    /// JSONL files under `config.log`'s directory.
    pub async fn open(config: BusConfig) -> Result<Self, BusError> {
        Self::open_with_redactor(config, Arc::new(NoopRedactor)).await
    }

    /// Like [`Self::open`], with an explicit redactor.
    pub async fn open_with_redactor(
        config: BusConfig,
        redactor: Arc<dyn Redactor>,
    ) -> Result<Self, BusError> {
        let (broadcast_tx, _rx) = broadcast::channel(config.subscriber_queue_depth.max(1));

        let (writer, next_seq) = match config.log {
            Some((dir, log_config)) => {
                let last_seq = recover_last_seq(&dir)
                    .await
                    .map_err(|e| BusError::PersistenceDegraded(e.to_string()))?;
                (Some(EventLogWriter::new(dir, log_config)), last_seq + 1)
            }
            None => (None, 0),
        };

        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                next_seq,
                clock: WatermarkClock::new(config.skew_tolerance_ms),
                tail: VecDeque::with_capacity(config.queue_depth.min(4096)),
                tail_cap: config.queue_depth,
                backlog: 0,
                writer,
                persistence_degraded: false,
                closed: false,
                redactor,
                broadcast_tx,
            })),
        })
    }

    /// Seal and append one event: assigns `seq`, stamps `event_time_ms`,
    /// advances `watermark_ms`, redacts free-text payloads, writes one
    /// JSONL line, then notifies subscribers.
    ///
    /// `backlog` tracks events pending durability, not total appends: it
    /// only grows while a log writer is attached and only applies
    /// backpressure in that mode, since a memory-only bus (by choice, or
    /// after a write failure downgrades it) has nothing on disk to fall
    /// behind on.
    pub async fn append(&self, partial: PartialEvent) -> Result<Event, BusError> {
        let mut inner = self.inner.lock().await;

        if inner.closed {
            return Err(BusError::BusClosed);
        }
        if inner.writer.is_some() && inner.backlog >= inner.tail_cap {
            return Err(BusError::BackpressureExceeded {
                depth: inner.backlog,
                bound: inner.tail_cap,
            });
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;

        let event_time_ms = now_ms();
        let watermark_ms = inner.clock.advance(event_time_ms);

        let mut partial = partial;
        partial.payload = redact_payload(inner.redactor.as_ref(), partial.payload);
        let event = Event::seal(partial, seq, event_time_ms, watermark_ms);

        if let Some(writer) = inner.writer.as_mut() {
            match writer.append(&event).await {
                Ok(fsynced) => inner.backlog = if fsynced { 0 } else { inner.backlog + 1 },
                Err(e) => {
                    warn!(error = %e, "event log write failed, downgrading to memory-only");
                    inner.persistence_degraded = true;
                    inner.writer = None;
                    inner.backlog = 0;
                }
            }
        }

        drop_tail_overflow(&mut inner.tail, inner.tail_cap);
        inner.tail.push_back(event.clone());
        let _ = inner.broadcast_tx.send(event.clone());
        Ok(event)
    }

    /// Whether the bus has downgraded to memory-only mode after a
    /// persistence failure.
    pub async fn is_persistence_degraded(&self) -> bool {
        self.inner.lock().await.persistence_degraded
    }

    /// Synchronous snapshot of the last `n` events held in memory.
    pub async fn tail(&self, n: usize) -> Vec<Event> {
        let inner = self.inner.lock().await;
        let skip = inner.tail.len().saturating_sub(n);
        inner.tail.iter().skip(skip).cloned().collect()
    }

    /// Subscribe starting from `from_seq` (inclusive), replaying what's
    /// still held in the in-memory tail before following live appends.
    /// Fails with [`BusError::SeqUnavailable`] if `from_seq` predates
    /// the oldest event still in memory.
    pub async fn subscribe(&self, from_seq: u64) -> Result<BusSubscription, BusError> {
        let inner = self.inner.lock().await;
        let oldest = inner.tail.front().map(|e| e.seq).unwrap_or(inner.next_seq);
        if from_seq < oldest && inner.next_seq > 0 && !inner.tail.is_empty() {
            return Err(BusError::SeqUnavailable(from_seq));
        }
        let backlog: VecDeque<Event> = inner
            .tail
            .iter()
            .filter(|e| e.seq >= from_seq)
            .cloned()
            .collect();
        Ok(BusSubscription {
            backlog,
            live: inner.broadcast_tx.subscribe(),
            last_seq: from_seq.saturating_sub(1),
        })
    }

    /// Subscribe to just the last `tail_n` events plus everything appended after.
    pub async fn subscribe_tail(&self, tail_n: usize) -> BusSubscription {
        let inner = self.inner.lock().await;
        let skip = inner.tail.len().saturating_sub(tail_n);
        let backlog: VecDeque<Event> = inner.tail.iter().skip(skip).cloned().collect();
        let last_seq = backlog.back().map(|e| e.seq);
        BusSubscription {
            backlog,
            live: inner.broadcast_tx.subscribe(),
            last_seq: last_seq.unwrap_or(0),
        }
    }

    /// Force a durability checkpoint now (used by shutdown paths).
    pub async fn flush(&self) -> Result<(), BusError> {
        let mut inner = self.inner.lock().await;
        if let Some(writer) = inner.writer.as_mut() {
            writer
                .fsync()
                .await
                .map_err(|e| BusError::PersistenceDegraded(e.to_string()))?;
        }
        inner.backlog = 0;
        Ok(())
    }

    /// Stop accepting new appends. Existing subscribers keep draining
    /// whatever is already queued on their channel.
    pub async fn close(&self) {
        self.inner.lock().await.closed = true;
    }
}

/// One subscriber's view of the bus: a backlog of already-known events
/// followed by a live broadcast receiver.
pub struct BusSubscription {
    backlog: VecDeque<Event>,
    live: broadcast::Receiver<Event>,
    last_seq: u64,
}

/// What a subscriber receives from [`BusSubscription::recv`].
#[derive(Debug)]
pub enum SubscriptionEvent {
    /// A well-formed, in-order event.
    Event(Event),
    /// The subscriber fell behind and missed some number of events. It
    /// may keep consuming; ordering resumes from whatever the channel
    /// delivers next.
    Lagged {
        /// Approximate number of events missed.
        dropped: u64,
    },
    /// The bus closed and no more events will ever arrive.
    Closed,
}

impl BusSubscription {
    /// Receive the next event, first draining the replay backlog.
    pub async fn recv(&mut self) -> SubscriptionEvent {
        if let Some(event) = self.backlog.pop_front() {
            self.last_seq = event.seq;
            return SubscriptionEvent::Event(event);
        }
        loop {
            match self.live.recv().await {
                Ok(event) => {
                    if event.seq <= self.last_seq {
                        continue; // already delivered from backlog
                    }
                    self.last_seq = event.seq;
                    return SubscriptionEvent::Event(event);
                }
                Err(broadcast::error::RecvError::Lagged(dropped)) => {
                    return SubscriptionEvent::Lagged { dropped }
                }
                Err(broadcast::error::RecvError::Closed) => return SubscriptionEvent::Closed,
            }
        }
    }

    /// The `seq` of the last event delivered by this subscription, or
    /// the `from_seq` it was opened with minus one if nothing yet.
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }
}

fn drop_tail_overflow(tail: &mut VecDeque<Event>, cap: usize) {
    while tail.len() >= cap.max(1) {
        tail.pop_front();
    }
}

fn redact_payload(redactor: &dyn Redactor, payload: Payload) -> Payload {
    match payload {
        Payload::Text { text, partial } => Payload::Text {
            text: redact_string(redactor, text),
            partial,
        },
        Payload::ToolChunk { channel, bytes } => Payload::ToolChunk {
            channel,
            bytes: redactor.redact(&bytes),
        },
        Payload::Error { message } => Payload::Error {
            message: redact_string(redactor, message),
        },
        other => other,
    }
}

fn redact_string(redactor: &dyn Redactor, s: String) -> String {
    let redacted = redactor.redact(s.as_bytes());
    String::from_utf8(redacted).unwrap_or(s)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_core::id::{StreamId, TurnId};
    use orchestrator_core::payload::{Act, Role};

    fn say(turn_id: TurnId) -> PartialEvent {
        PartialEvent::new(
            StreamId::new("strategist"),
            Role::Strategist,
            turn_id,
            Act::Say,
            Payload::text("hi"),
        )
    }

    #[tokio::test]
    async fn seq_is_dense_and_strictly_increasing() {
        let bus = EventBus::open(BusConfig::default()).await.unwrap();
        let turn = TurnId::new();
        let a = bus.append(say(turn)).await.unwrap();
        let b = bus.append(say(turn)).await.unwrap();
        let c = bus.append(say(turn)).await.unwrap();
        assert_eq!(b.seq, a.seq + 1);
        assert_eq!(c.seq, b.seq + 1);
    }

    #[tokio::test]
    async fn watermark_is_non_decreasing() {
        let bus = EventBus::open(BusConfig::default()).await.unwrap();
        let turn = TurnId::new();
        let a = bus.append(say(turn)).await.unwrap();
        let b = bus.append(say(turn)).await.unwrap();
        assert!(b.watermark_ms >= a.watermark_ms);
    }

    #[tokio::test]
    async fn closed_bus_rejects_append() {
        let bus = EventBus::open(BusConfig::default()).await.unwrap();
        bus.close().await;
        let err = bus.append(say(TurnId::new())).await.unwrap_err();
        assert!(matches!(err, BusError::BusClosed));
    }

    #[tokio::test]
    async fn tail_returns_last_n_events() {
        let bus = EventBus::open(BusConfig::default()).await.unwrap();
        let turn = TurnId::new();
        for _ in 0..5 {
            bus.append(say(turn)).await.unwrap();
        }
        let tail = bus.tail(2).await;
        assert_eq!(tail.len(), 2);
        assert!(tail[0].seq < tail[1].seq);
    }

    #[tokio::test]
    async fn subscriber_replays_backlog_then_live() {
        let bus = EventBus::open(BusConfig::default()).await.unwrap();
        let turn = TurnId::new();
        bus.append(say(turn)).await.unwrap();
        let mut sub = bus.subscribe(0).await.unwrap();
        let live = bus.append(say(turn)).await.unwrap();

        let first = sub.recv().await;
        assert!(matches!(first, SubscriptionEvent::Event(e) if e.seq == 0));
        let second = sub.recv().await;
        assert!(matches!(second, SubscriptionEvent::Event(e) if e.seq == live.seq));
    }

    #[tokio::test]
    async fn subscribe_below_evicted_floor_fails() {
        let mut config = BusConfig::default();
        config.queue_depth = 2;
        let bus = EventBus::open(config).await.unwrap();
        let turn = TurnId::new();
        for _ in 0..5 {
            bus.append(say(turn)).await.unwrap();
        }
        let err = bus.subscribe(0).await.unwrap_err();
        assert!(matches!(err, BusError::SeqUnavailable(0)));
    }

    // Backpressure only applies to durable buses: `backlog` tracks events
    // pending an fsync, so these two need a real log writer attached
    // (and a cadence that won't auto-fsync mid-test) rather than the
    // memory-only `BusConfig::default()`.
    fn durable_config(dir: &std::path::Path, queue_depth: usize) -> BusConfig {
        let mut config = BusConfig::default();
        config.queue_depth = queue_depth;
        config.log = Some((
            dir.to_path_buf(),
            crate::persistence::LogConfig {
                fsync_every_events: 1_000,
                fsync_every_ms: 60_000,
                ..crate::persistence::LogConfig::default()
            },
        ));
        config
    }

    #[tokio::test]
    async fn backpressure_trips_once_backlog_reaches_bound() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::open(durable_config(dir.path(), 2)).await.unwrap();
        let turn = TurnId::new();
        bus.append(say(turn)).await.unwrap();
        bus.append(say(turn)).await.unwrap();
        let err = bus.append(say(turn)).await.unwrap_err();
        assert!(matches!(err, BusError::BackpressureExceeded { .. }));
    }

    #[tokio::test]
    async fn flush_clears_backlog_counter() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::open(durable_config(dir.path(), 2)).await.unwrap();
        let turn = TurnId::new();
        bus.append(say(turn)).await.unwrap();
        bus.append(say(turn)).await.unwrap();
        bus.flush().await.unwrap();
        // Backlog reset by flush, so this no longer trips backpressure.
        bus.append(say(turn)).await.unwrap();
    }

    #[tokio::test]
    async fn memory_only_bus_never_backpressures() {
        let bus = EventBus::open(BusConfig { queue_depth: 2, ..BusConfig::default() }).await.unwrap();
        let turn = TurnId::new();
        for _ in 0..10 {
            bus.append(say(turn)).await.unwrap();
        }
    }

    struct UppercaseRedactor;
    impl Redactor for UppercaseRedactor {
        fn redact(&self, bytes: &[u8]) -> Vec<u8> {
            String::from_utf8_lossy(bytes).to_uppercase().into_bytes()
        }
    }

    #[tokio::test]
    async fn redactor_runs_before_sealing() {
        let bus =
            EventBus::open_with_redactor(BusConfig::default(), Arc::new(UppercaseRedactor))
                .await
                .unwrap();
        let sealed = bus.append(say(TurnId::new())).await.unwrap();
        assert_eq!(sealed.payload.as_text(), Some("HI"));
    }
}
