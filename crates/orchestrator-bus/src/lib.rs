#![deny(missing_docs)]
//! The Event Bus (C2) and Watermark Clock (C3): the kernel's single
//! source of truth for ordering, durability, and fan-out.
//!
//! Producers never write to the log directly; they hand a
//! [`orchestrator_core::event::PartialEvent`] to [`bus::EventBus::append`],
//! which assigns `seq`, advances the watermark, redacts, persists, and
//! notifies subscribers — all under one lock, so append order is total
//! order.

pub mod bus;
pub mod clock;
pub mod persistence;

pub use bus::{BusConfig, BusSubscription, EventBus, SubscriptionEvent};
pub use clock::WatermarkClock;
pub use persistence::{EventLogWriter, LogConfig};
