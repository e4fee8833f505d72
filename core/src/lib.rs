pub mod adapter;
pub mod bridge;
pub mod config;
pub mod document;
pub mod extract;
pub mod protocol;
pub mod report;
pub mod scheduler;

pub use adapter::{Adapter, AdapterError, AdapterStatus};
pub use config::{Config, PlatformConfig};
pub use protocol::{BridgeMessage, HostEvent, Identity, MessageState, Report, ReportKind};

/// Interfaces that embedding hosts implement to adapt the core library
/// without pulling in host-specific dependencies.
pub mod platform {
    use crate::bridge::BridgeError;
    use crate::extract::ExtractError;
    use crate::protocol::BridgeMessage;

    /// The live page an adapter observes.
    pub trait Document: Send + Sync {
        /// Capture the page as it is now. Every query against the returned
        /// page sees that one state, however the live page changes after.
        fn snapshot(&self) -> Result<Box<dyn Page>, ExtractError>;
    }

    /// One consistent view of a page, taken once per tick.
    pub trait Page {
        /// Text content of every element matching `selector`, in document order.
        fn select_text(&self, selector: &str) -> Result<Vec<String>, ExtractError>;

        /// Value of `attribute` on every matching element that carries it.
        fn select_attribute(
            &self,
            selector: &str,
            attribute: &str,
        ) -> Result<Vec<String>, ExtractError>;
    }

    /// The message-receiving capability exposed by the host.
    pub trait HostBridge: Send + Sync {
        fn post_message(&self, message: &BridgeMessage) -> Result<(), BridgeError>;
    }

    /// Trait for platform-correct config paths.
    pub trait AppPaths {
        fn config_path(&self) -> std::path::PathBuf;
    }
}
