/**
 * Capabilities the engine calls back into.
 *
 * The package queue and the session manager live outside this crate.
 * Components receive them at construction (or `init`) and hold them
 * weakly: a collaborator may be released while a send is still in
 * flight, and a callback that finds it gone is silently dropped.
 */
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::protocol::types::{Event, Outcome};

/**
 * The persistent package queue.
 *
 * Both calls are made from the dispatcher's worker thread.
 */
pub trait PackageQueue: Send + Sync {
    /// The first package could not be delivered; keep it for a later retry.
    fn close_first_package(&self, outcome: Outcome, event: &Event);

    /// The first package is done with (delivered or not worth retrying).
    fn send_next_package(&self, outcome: Outcome);
}

/**
 * The session / activity lifecycle manager.
 *
 * All calls are made from the attribution poller's worker thread.
 */
pub trait SessionHandler: Send + Sync {
    fn set_asking_attribution(&self, asking: bool);

    fn launch_session_response_tasks(&self, outcome: Outcome);

    fn launch_attribution_response_tasks(&self, outcome: Outcome);
}

/// Non-owning, replaceable reference to a collaborator.
pub(crate) struct Collaborator<T: ?Sized> {
    slot: Mutex<Option<Weak<T>>>,
}

impl<T: ?Sized> Collaborator<T> {
    pub(crate) fn new(target: &Arc<T>) -> Self {
        Self {
            slot: Mutex::new(Some(Arc::downgrade(target))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Weak<T>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set(&self, target: &Arc<T>) {
        *self.lock() = Some(Arc::downgrade(target));
    }

    pub(crate) fn clear(&self) {
        *self.lock() = None;
    }

    /// `None` after `clear` or once the owner dropped the collaborator.
    pub(crate) fn get(&self) -> Option<Arc<T>> {
        self.lock().as_ref().and_then(Weak::upgrade)
    }
}
