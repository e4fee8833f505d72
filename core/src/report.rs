//! Delivering reports to the host bridge.
//!
//! Delivery faults stop here: they are logged and counted, never returned
//! to the caller and never retried.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};

use crate::bridge::BridgeError;
use crate::platform::HostBridge;
use crate::protocol::Report;

pub struct Reporter {
    platform: String,
    bridge: Arc<dyn HostBridge>,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl Reporter {
    pub fn new(platform: impl Into<String>, bridge: Arc<dyn HostBridge>) -> Self {
        Self {
            platform: platform.into(),
            bridge,
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Encode and deliver one report. Returns whether the host accepted it.
    pub fn report(&self, report: &Report) -> bool {
        match self.deliver(report) {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                debug!("[{}] delivered {}", self.platform, report.kind());
                true
            }
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("[{}] dropped {} report: {}", self.platform, report.kind(), e);
                false
            }
        }
    }

    fn deliver(&self, report: &Report) -> Result<(), BridgeError> {
        let message = report.encode()?;
        // A panicking host bridge is treated like one that returned an error.
        panic::catch_unwind(AssertUnwindSafe(|| self.bridge.post_message(&message)))
            .unwrap_or_else(|payload| {
                Err(BridgeError::DeliveryFailed(panic_message(payload.as_ref())))
            })
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
#[path = "report_tests.rs"]
mod tests;
