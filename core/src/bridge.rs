//! Host bridge implementations.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use thiserror::Error;

use crate::platform::HostBridge;
use crate::protocol::{BridgeMessage, HostEvent, ProtocolError};

/// Errors from delivering a message to the host
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("host bridge unavailable")]
    Unavailable,
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),
}

impl From<io::Error> for BridgeError {
    fn from(e: io::Error) -> Self {
        BridgeError::DeliveryFailed(e.to_string())
    }
}

impl From<ProtocolError> for BridgeError {
    fn from(e: ProtocolError) -> Self {
        BridgeError::DeliveryFailed(e.to_string())
    }
}

/// A slot the host fills in with its bridge, possibly after the adapter has
/// started. Posting while the slot is empty fails with `Unavailable`.
#[derive(Clone, Default)]
pub struct SharedBridge {
    inner: Arc<RwLock<Option<Arc<dyn HostBridge>>>>,
}

impl SharedBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, bridge: Arc<dyn HostBridge>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(bridge);
    }

    pub fn clear(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_installed(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl HostBridge for SharedBridge {
    fn post_message(&self, message: &BridgeMessage) -> Result<(), BridgeError> {
        // Clone out of the lock so a slow host never blocks install/clear.
        let bridge = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match bridge {
            Some(bridge) => bridge.post_message(message),
            None => Err(BridgeError::Unavailable),
        }
    }
}

/// Writes every message as a prefixed console line, the framing the host
/// scans page console output for.
pub struct ConsoleBridge<W: Write + Send> {
    out: Mutex<W>,
}

impl ConsoleBridge<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ConsoleBridge<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> HostBridge for ConsoleBridge<W> {
    fn post_message(&self, message: &BridgeMessage) -> Result<(), BridgeError> {
        let line = message.to_console_line()?;
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "{line}")?;
        out.flush()?;
        Ok(())
    }
}

/// Keeps every delivered message in memory, for hosts that poll.
#[derive(Clone, Default)]
pub struct MemoryBridge {
    messages: Arc<Mutex<Vec<BridgeMessage>>>,
}

impl MemoryBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<BridgeMessage> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drain and decode everything received so far.
    pub fn take_events(&self) -> Vec<Result<HostEvent, ProtocolError>> {
        let drained = std::mem::take(
            &mut *self.messages.lock().unwrap_or_else(PoisonError::into_inner),
        );
        drained
            .into_iter()
            .map(|message| match serde_json::to_value(&message) {
                Ok(value) => HostEvent::from_value(value),
                Err(e) => Err(e.into()),
            })
            .collect()
    }
}

impl HostBridge for MemoryBridge {
    fn post_message(&self, message: &BridgeMessage) -> Result<(), BridgeError> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;
