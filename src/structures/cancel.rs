use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam::channel::{bounded, Receiver, Sender};

/// Cooperative interrupt for the controller.
///
/// Setting it never stops a node directly: the controller polls it once per
/// lap and turns its next outbound opportunity into a shutdown token. Code
/// that blocks on something else (the prompt) can also wait on `notified`.
#[derive(Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    notify_tx: Sender<()>,
    notify_rx: Receiver<()>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (notify_tx, notify_rx) = bounded(1);
        CancelToken { flag: Arc::new(AtomicBool::new(false)), notify_tx, notify_rx }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        // a full slot already wakes the waiter
        let _ = self.notify_tx.try_send(());
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Becomes ready once `cancel` has been called
    pub fn notified(&self) -> &Receiver<()> {
        &self.notify_rx
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
