//! Debounced push scheduling.
//!
//! Each local mutation calls [`SyncScheduler::schedule`], which (re)arms a
//! single timer. When the window passes without another mutation, one push is
//! issued carrying the cart as it is at fire time, so intermediate edits are
//! coalesced.
//!
//! At most one push is in flight. A timer that fires while a push is
//! outstanding does not start another; it marks the scheduler to rearm once
//! the outstanding push settles. Failed pushes leave the scheduler dirty and
//! are retried by the next mutation or [`SyncScheduler::flush`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::api::CartApi;
use crate::reconcile::{PushOutcome, Reconciler};
use crate::verify::ConsistencyVerifier;

/// Owns the debounce timer and the in-flight flag.
pub struct SyncScheduler<A> {
    inner: Arc<SchedulerInner<A>>,
}

impl<A> Clone for SyncScheduler<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct SchedulerInner<A> {
    window: Duration,
    reconciler: Arc<Reconciler<A>>,
    timer: Mutex<TimerState>,
    busy: watch::Sender<bool>,
}

#[derive(Default)]
struct TimerState {
    handle: Option<JoinHandle<()>>,
    /// Bumped whenever the timer is disarmed; a firing timer with an older
    /// generation does nothing.
    generation: u64,
    /// Local changes not yet sent.
    dirty: bool,
    /// A timer fired while a push was in flight.
    rearm: bool,
    /// Run the consistency verifier after the next successful push.
    verify: bool,
}

impl TimerState {
    fn disarm(&mut self) {
        self.generation += 1;
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl<A: CartApi> SyncScheduler<A> {
    #[must_use]
    pub fn new(reconciler: Arc<Reconciler<A>>, window: Duration) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                window,
                reconciler,
                timer: Mutex::new(TimerState::default()),
                busy: watch::Sender::new(false),
            }),
        }
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.inner.window
    }

    /// Arm (or re-arm) the debounce timer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule(&self) {
        self.arm(false);
    }

    /// Arm the timer and verify against the server once the push lands.
    pub fn schedule_verify(&self) {
        self.arm(true);
    }

    /// Drop the armed timer and any pending work without pushing.
    ///
    /// An in-flight push is not interrupted.
    pub fn cancel(&self) {
        let mut timer = self.lock_timer();
        timer.disarm();
        timer.dirty = false;
        timer.rearm = false;
        timer.verify = false;
    }

    /// Push pending changes now, after any in-flight push settles.
    ///
    /// Returns `None` if there was nothing to push.
    pub async fn flush(&self) -> Option<PushOutcome> {
        loop {
            self.wait_idle().await;
            let verify = {
                let mut timer = self.lock_timer();
                timer.disarm();
                if !timer.dirty {
                    return None;
                }
                if !self.try_acquire() {
                    continue;
                }
                timer.dirty = false;
                timer.rearm = false;
                std::mem::take(&mut timer.verify)
            };
            return Some(self.run_push(verify).await);
        }
    }

    /// Wait until no push is in flight.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.busy.subscribe();
        // The sender lives in `inner`, which outlives this borrow.
        let _ = rx.wait_for(|busy| !*busy).await;
    }

    /// Whether local changes are waiting to be pushed.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.lock_timer().dirty
    }

    #[must_use]
    pub fn in_flight(&self) -> bool {
        *self.inner.busy.borrow()
    }

    fn arm(&self, verify: bool) {
        let mut timer = self.lock_timer();
        timer.disarm();
        timer.dirty = true;
        timer.verify |= verify;

        let generation = timer.generation;
        let window = self.inner.window;
        let this = self.clone();
        timer.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            this.fire(generation).await;
        }));
    }

    async fn fire(&self, generation: u64) {
        let verify = {
            let mut timer = self.lock_timer();
            if timer.generation != generation {
                return;
            }
            timer.handle = None;
            if !timer.dirty {
                return;
            }
            if !self.try_acquire() {
                tracing::debug!("Push in flight, rearming once it settles");
                timer.rearm = true;
                return;
            }
            timer.dirty = false;
            std::mem::take(&mut timer.verify)
        };
        self.run_push(verify).await;
    }

    /// Push with the in-flight flag held, then settle scheduler state.
    async fn run_push(&self, verify: bool) -> PushOutcome {
        let outcome = self.inner.reconciler.push().await;

        let (rearm, pending) = {
            let mut timer = self.lock_timer();
            let failed = outcome == PushOutcome::Failed;
            if failed {
                timer.dirty = true;
            }
            if verify && timer.dirty {
                // Verify after the push that carries the newest state instead.
                timer.verify = true;
            }
            (std::mem::take(&mut timer.rearm), timer.dirty)
        };
        self.inner.busy.send_replace(false);

        if rearm {
            self.arm(false);
        }
        if verify && !pending && matches!(outcome, PushOutcome::Pushed { .. }) {
            ConsistencyVerifier::new(Arc::clone(&self.inner.reconciler), self.clone())
                .verify_after_push()
                .await;
        }
        outcome
    }

    fn try_acquire(&self) -> bool {
        self.inner.busy.send_if_modified(|busy| {
            if *busy {
                return false;
            }
            *busy = true;
            true
        })
    }

    fn lock_timer(&self) -> MutexGuard<'_, TimerState> {
        self.inner
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use cart_sync_core::{CartItem, Identity};
    use rust_decimal::Decimal;

    use super::*;
    use crate::api::memory::InMemoryCartApi;
    use crate::identity::IdentityManager;
    use crate::persist::MemorySnapshotStore;
    use crate::store::CartStore;

    const WINDOW: Duration = Duration::from_millis(400);

    struct Fixture {
        api: InMemoryCartApi,
        store: CartStore,
        scheduler: SyncScheduler<InMemoryCartApi>,
    }

    fn fixture() -> Fixture {
        let api = InMemoryCartApi::new();
        let persistence = Arc::new(MemorySnapshotStore::new());
        let store = CartStore::open(persistence.clone());
        let identity = Arc::new(IdentityManager::open(store.clone(), persistence));
        identity.observe(&Identity::Anonymous);
        let reconciler = Arc::new(Reconciler::new(api.clone(), store.clone(), identity));
        Fixture {
            api,
            store,
            scheduler: SyncScheduler::new(reconciler, WINDOW),
        }
    }

    fn item(product: &str) -> CartItem {
        CartItem::new(product, product, Decimal::ONE)
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_resets_on_each_schedule() {
        let f = fixture();
        f.store.add_item(item("p1"));
        f.scheduler.schedule();

        tokio::time::sleep(WINDOW / 2).await;
        f.store.add_item(item("p2"));
        f.scheduler.schedule();

        tokio::time::sleep(WINDOW * 3 / 4).await;
        assert_eq!(f.api.pushes_started(), 0);

        tokio::time::sleep(WINDOW).await;
        assert_eq!(f.api.push_count(), 1);
        assert_eq!(f.api.pushes()[0].1.items.len(), 2);
        assert!(!f.scheduler.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutation_during_push_rearms_instead_of_overlapping() {
        let f = fixture();
        f.api.hold_pushes();
        f.store.add_item(item("p1"));
        f.scheduler.schedule();

        tokio::time::sleep(WINDOW * 2).await;
        assert_eq!(f.api.pushes_started(), 1);
        assert!(f.scheduler.in_flight());

        f.store.add_item(item("p2"));
        f.scheduler.schedule();
        tokio::time::sleep(WINDOW * 2).await;
        assert_eq!(f.api.pushes_started(), 1);

        f.api.release_pushes();
        tokio::time::sleep(WINDOW * 2).await;

        let pushes = f.api.pushes();
        assert_eq!(pushes.len(), 2);
        assert_eq!(pushes[0].1.items.len(), 1);
        assert_eq!(pushes[1].1.items.len(), 2);
        assert!(!f.scheduler.in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_push_stays_pending_until_flush() {
        let f = fixture();
        f.api.fail_next_pushes(1);
        f.store.add_item(item("p1"));
        f.scheduler.schedule();

        tokio::time::sleep(WINDOW * 2).await;
        assert_eq!(f.api.push_count(), 0);
        assert!(f.scheduler.is_pending());
        assert_eq!(f.store.cart().item_count(), 1);

        let outcome = f.scheduler.flush().await;
        assert!(matches!(outcome, Some(PushOutcome::Pushed { .. })));
        assert_eq!(f.api.push_count(), 1);
        assert!(!f.scheduler.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_armed_timer() {
        let f = fixture();
        f.store.add_item(item("p1"));
        f.scheduler.schedule();
        f.scheduler.cancel();

        tokio::time::sleep(WINDOW * 2).await;
        assert_eq!(f.api.pushes_started(), 0);
        assert_eq!(f.scheduler.flush().await, None);
    }
}
