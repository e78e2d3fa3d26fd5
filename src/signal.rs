//! Named synchronous fan-out of typed events to registered subscribers.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::{Mutex, ReentrantMutex};

/// One application-wide lock around all signal emission. Only one thread may
/// be inside any [`Signal::emit`] at a time, but the holding thread may emit
/// nested signals from inside a subscriber without deadlocking. This makes
/// the book and candle state effectively single-writer even though the
/// receive task and the snapshot tasks run in parallel.
static EMIT_LOCK: ReentrantMutex<()> = ReentrantMutex::new(());

/// Subscriber callback. A slot that returns `Err` is logged and does not
/// prevent the remaining slots from receiving the event.
type Slot<T> = Arc<dyn Fn(&T) -> Result<()> + Send + Sync>;

/// A typed signal. Cloning a signal yields another handle onto the same
/// subscriber list, so a component can keep one handle and hand clones to
/// the closures that need to fire it.
pub struct Signal<T> {
    slots: Arc<Mutex<Vec<Slot<T>>>>,
}

impl<T> Signal<T> {
    /// Create a signal with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Connect a slot to this signal. Slots are invoked in registration
    /// order; registration during an emission takes effect from the next
    /// emission on.
    pub fn connect<F>(&self, slot: F)
    where
        F: Fn(&T) -> Result<()> + Send + Sync + 'static,
    {
        self.slots.lock().push(Arc::new(slot));
    }

    /// Dispatch the payload to all connected slots, in registration order,
    /// under the application-wide emission lock. Returns whether at least
    /// one slot was present, failing or not; callers use this to fall back
    /// to the logger only when nobody is listening. A failing slot is
    /// logged here already, so it still counts as a listener.
    pub fn emit(&self, payload: &T) -> bool {
        let _guard = EMIT_LOCK.lock();
        // Snapshot the subscriber list so a slot may connect to (or even
        // re-emit) this same signal without holding the list lock.
        let slots = self.slots.lock().clone();

        let received = !slots.is_empty();
        for slot in &slots {
            if let Err(err) = slot(payload) {
                log::error!("signal subscriber failed: {err:#}");
            }
        }

        received
    }

    /// Number of connected slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Whether the signal has no subscribers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
        }
    }
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("slots", &self.slots.lock().len())
            .finish()
    }
}
