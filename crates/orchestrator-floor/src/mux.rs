//! The Preemption Mux (C8): coalesces user input, shutdown, and policy
//! overrides into a single cancellation fan-in per turn.

use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Which signal source actually tripped the mux. Recorded so the Floor
/// Controller/Turn Runner can pick the right `floor_release` status
/// (`preempted` for user/policy, a clean shutdown path for `shutdown`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreemptReason {
    /// New input arrived on the `user` stream.
    UserInput,
    /// Kernel shutdown was requested.
    Shutdown,
    /// A policy/guardrail override (e.g. a hook vetoed the turn).
    PolicyOverride,
}

/// Fan-in point for the three cancellation sources: user input, kernel
/// shutdown, and policy override. Each in-flight turn gets a child
/// token derived from the mux's
/// current root token, so a fresh mux signal also cancels any turn
/// still running. `CancellationToken` cannot be un-cancelled, so
/// [`Self::reset`] swaps in a brand new root for the next turn rather
/// than trying to revive the old one.
pub struct PreemptionMux {
    root: Mutex<CancellationToken>,
    reason: Mutex<Option<PreemptReason>>,
}

impl PreemptionMux {
    /// Construct a fresh, unsignaled mux.
    pub fn new() -> Self {
        Self {
            root: Mutex::new(CancellationToken::new()),
            reason: Mutex::new(None),
        }
    }

    /// Signal from the `user` stream. First signal wins: if the mux was
    /// already tripped (by this or another source), this call is a no-op
    /// beyond the underlying token's idempotent cancellation.
    pub fn signal_user_input(&self) {
        self.signal(PreemptReason::UserInput);
    }

    /// Signal kernel shutdown.
    pub fn signal_shutdown(&self) {
        self.signal(PreemptReason::Shutdown);
    }

    /// Signal a policy override.
    pub fn signal_policy_override(&self) {
        self.signal(PreemptReason::PolicyOverride);
    }

    fn signal(&self, reason: PreemptReason) {
        let mut slot = self.reason.lock().unwrap();
        if slot.is_none() {
            *slot = Some(reason);
        }
        self.root.lock().unwrap().cancel();
    }

    /// Whether any signal has fired since the last [`Self::reset`].
    pub fn is_tripped(&self) -> bool {
        self.root.lock().unwrap().is_cancelled()
    }

    /// Which reason tripped the mux, if any.
    pub fn reason(&self) -> Option<PreemptReason> {
        *self.reason.lock().unwrap()
    }

    /// A cancellation token for one turn, derived from the current root.
    /// Cancels when the mux trips; cancelling it directly (e.g. the turn
    /// ending naturally) does not affect the root or sibling turns.
    pub fn child_token(&self) -> CancellationToken {
        self.root.lock().unwrap().child_token()
    }

    /// Arm the mux for the next turn by swapping in a fresh root token.
    /// Only meaningful after a `UserInput`/`PolicyOverride` trip — a
    /// `Shutdown` trip is terminal and callers should not reset after it.
    pub fn reset(&self) {
        *self.reason.lock().unwrap() = None;
        *self.root.lock().unwrap() = CancellationToken::new();
    }
}

impl Default for PreemptionMux {
    fn default() -> Self {
        Self::new()
    }
}
