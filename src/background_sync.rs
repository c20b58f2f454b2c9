//! Deferred-sync registration.
//!
//! A queue that persists an entry asks for a later flush by registering its
//! sync tag. The worker owns the receiving end and decides when to honour it.

use tokio::sync::mpsc;

use crate::error::RegistrationError;

pub trait BackgroundSync: Send + Sync {
    fn register(&self, tag: &str) -> Result<(), RegistrationError>;
}

/// Sends registered tags to the background worker.
#[derive(Debug, Clone)]
pub struct SyncRegistrar {
    tx: mpsc::UnboundedSender<String>,
}

impl SyncRegistrar {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl BackgroundSync for SyncRegistrar {
    fn register(&self, tag: &str) -> Result<(), RegistrationError> {
        self.tx
            .send(tag.to_string())
            .map_err(|_| RegistrationError::Closed)
    }
}
