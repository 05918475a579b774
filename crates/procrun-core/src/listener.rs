//! Completion listeners.
//!
//! Listeners are kept in registration order and invoked synchronously on the
//! thread that delivers the completion. The list is snapshotted before
//! delivery, so listeners may subscribe or unsubscribe from inside a callback.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, error};

use crate::error::panic_message;
use crate::event::CompletionEvent;
use crate::ids::SubscriptionId;
use crate::process::Process;

/// Receives the completion event of an async run.
///
/// Any `Fn(&P, &CompletionEvent<P::Error>) + Send + Sync` closure is a listener.
pub trait CompletionListener<P: Process>: Send + Sync + 'static {
    /// Called once per non-cancelled async run, with the work as `sender`.
    fn on_complete(&self, sender: &P, event: &CompletionEvent<P::Error>);
}

impl<P, F> CompletionListener<P> for F
where
    P: Process,
    F: Fn(&P, &CompletionEvent<P::Error>) + Send + Sync + 'static,
{
    fn on_complete(&self, sender: &P, event: &CompletionEvent<P::Error>) {
        self(sender, event)
    }
}

type Entry<P> = (SubscriptionId, Arc<dyn CompletionListener<P>>);

/// Ordered set of completion listeners.
pub(crate) struct Listeners<P: Process> {
    entries: RwLock<Vec<Entry<P>>>,
    next_id: AtomicU64,
}

impl<P: Process> Listeners<P> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn subscribe(&self, listener: Arc<dyn CompletionListener<P>>) -> SubscriptionId {
        let id = SubscriptionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.push((id, listener));
        debug!(subscription = %id, total = entries.len(), "Completion listener subscribed");
        id
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        let removed = entries.len() != before;
        debug!(subscription = %id, removed, "Completion listener unsubscribed");
        removed
    }

    /// Drop every listener. Returns how many were removed.
    pub(crate) fn clear(&self) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let removed = entries.len();
        entries.clear();
        removed
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Invoke every listener in order. A panicking listener is logged and skipped.
    pub(crate) fn notify(&self, sender: &P, event: &CompletionEvent<P::Error>) -> usize {
        let snapshot: Vec<Entry<P>> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (id, listener) in &snapshot {
            let delivered =
                panic::catch_unwind(AssertUnwindSafe(|| listener.on_complete(sender, event)));
            if let Err(payload) = delivered {
                error!(
                    subscription = %id,
                    run_id = %event.run_id(),
                    reason = %panic_message(payload.as_ref()),
                    "Completion listener panicked"
                );
            }
        }

        snapshot.len()
    }
}
