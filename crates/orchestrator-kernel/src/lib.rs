//! The Orchestrator Kernel: wires the Event Bus (C2), Watermark Clock
//! (C3), Stream Registry (C4), Floor Controller (C5), Trigger Engine
//! (C6), Turn Runner (C7), Preemption Mux (C8), and Tool Adapter
//! Contract shim (C9) into the single control loop that drives the
//! whole orchestrator. Everything above the kernel (UI, HTTP routing,
//! persistent memory) is out of scope and consumes it through
//! [`Kernel::subscribe`]/[`Kernel::tail`]/[`Kernel::post_user`].

#![deny(missing_docs)]

mod config;
mod kernel;

pub use config::KernelConfig;
pub use kernel::Kernel;
