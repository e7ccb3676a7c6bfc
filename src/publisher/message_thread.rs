//! Single-consumer message thread for deferred publisher work.
//!
//! ICE state callbacks must not re-enter stream locks from the port worker,
//! so session teardown is posted here and handled on a dedicated thread.

use std::sync::{
    Arc, Mutex,
    mpsc::{Sender, channel},
};
use std::thread;

use crate::publisher::session::RtcSession;

/// Why a session is being torn down; carried with the disconnect message
/// and logged when the teardown is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    ClientStop,
    IceFailure,
    Expired,
    StreamTearDown,
}

/// Tagged message kinds the thread understands. Arriving as a closed enum
/// means an unknown tag cannot exist at runtime; new kinds extend the enum.
pub enum PublisherMessage {
    DisconnectSession {
        session: Arc<RtcSession>,
        reason: DisconnectReason,
    },
}

pub struct MessageThread {
    tx: Mutex<Option<Sender<PublisherMessage>>>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl MessageThread {
    pub fn new() -> Self {
        Self {
            tx: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    pub fn start<F>(&self, handler: F)
    where
        F: Fn(PublisherMessage) + Send + 'static,
    {
        let (tx, rx) = channel::<PublisherMessage>();
        let handle = thread::Builder::new()
            .name("publisher-messages".into())
            .spawn(move || {
                while let Ok(message) = rx.recv() {
                    handler(message);
                }
            })
            .ok();
        if let Ok(mut slot) = self.tx.lock() {
            *slot = Some(tx);
        }
        if let Ok(mut slot) = self.handle.lock() {
            *slot = handle;
        }
    }

    /// Enqueue; returns false once the thread is stopped.
    pub fn post(&self, message: PublisherMessage) -> bool {
        self.tx
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(|tx| tx.send(message).is_ok()))
            .unwrap_or(false)
    }

    /// Drop the sender (draining the queue) and join the worker.
    pub fn stop(&self) {
        if let Ok(mut slot) = self.tx.lock() {
            slot.take();
        }
        let handle = self.handle.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl Default for MessageThread {
    fn default() -> Self {
        Self::new()
    }
}
