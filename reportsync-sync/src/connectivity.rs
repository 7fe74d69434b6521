//! Online/offline signal.

use tokio::sync::watch;

/// Source of the device's connectivity state.
///
/// `watch` is the change notification: receivers wake on every transition.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;

    fn watch(&self) -> watch::Receiver<bool>;
}

/// Connectivity state driven by the platform (network callbacks, probes).
#[derive(Debug)]
pub struct ConnectivitySignal {
    tx: watch::Sender<bool>,
}

impl ConnectivitySignal {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx }
    }

    /// Records the current state. Receivers are only woken on a change.
    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
    }
}

impl Connectivity for ConnectivitySignal {
    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    fn watch(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
