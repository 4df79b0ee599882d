//! Consistency verification against the server.
//!
//! A removal pushed while an older pull is still outstanding can make the
//! removed line reappear locally. The verifier re-reads the server cart as
//! ground truth once pushes have settled: on demand through
//! [`ConsistencyVerifier::force_reload`], and automatically after the push
//! that carries a removal.

use std::sync::Arc;

use crate::api::CartApi;
use crate::reconcile::{PullMode, PullOutcome, Reconciler};
use crate::scheduler::SyncScheduler;

pub struct ConsistencyVerifier<A> {
    reconciler: Arc<Reconciler<A>>,
    scheduler: SyncScheduler<A>,
}

impl<A: CartApi> ConsistencyVerifier<A> {
    #[must_use]
    pub const fn new(reconciler: Arc<Reconciler<A>>, scheduler: SyncScheduler<A>) -> Self {
        Self {
            reconciler,
            scheduler,
        }
    }

    /// Replace the local cart with the server cart.
    ///
    /// Pending local changes are pushed first and any in-flight push is
    /// awaited, so the pull observes them.
    pub async fn force_reload(&self) -> PullOutcome {
        self.scheduler.flush().await;
        let outcome = self.reconciler.pull(PullMode::Authoritative).await;
        tracing::info!(?outcome, "Cart reloaded from server");
        outcome
    }

    /// Pull the server cart right after a push has landed.
    ///
    /// Skipped when newer local changes are waiting; the scheduler verifies
    /// after those are pushed instead.
    pub(crate) async fn verify_after_push(&self) -> PullOutcome {
        if self.scheduler.is_pending() || self.scheduler.in_flight() {
            tracing::debug!("Newer changes pending, deferring verification");
            return PullOutcome::Stale;
        }
        let outcome = self.reconciler.pull(PullMode::Authoritative).await;
        tracing::debug!(?outcome, "Post-push verification finished");
        outcome
    }
}
