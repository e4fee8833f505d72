use super::*;
use crate::bridge::{MemoryBridge, SharedBridge};
use crate::protocol::{BridgeMessage, HostEvent, Identity, MessageState};

struct FailingBridge;

impl HostBridge for FailingBridge {
    fn post_message(&self, _message: &BridgeMessage) -> Result<(), BridgeError> {
        Err(BridgeError::DeliveryFailed("host closed".to_string()))
    }
}

struct PanickingBridge;

impl HostBridge for PanickingBridge {
    fn post_message(&self, _message: &BridgeMessage) -> Result<(), BridgeError> {
        panic!("host exploded");
    }
}

#[test]
fn delivered_reports_reach_the_bridge() {
    let memory = MemoryBridge::new();
    let reporter = Reporter::new("jd", Arc::new(memory.clone()));

    assert!(reporter.report(&Report::CurrentUser(Identity::default())));
    assert!(reporter.report(&Report::NewMessage(MessageState::new(2))));

    let events: Vec<HostEvent> = memory.take_events().into_iter().map(Result::unwrap).collect();
    assert_eq!(
        events,
        vec![
            HostEvent::CurrentUser(Identity::default()),
            HostEvent::NewMessage(MessageState::new(2)),
        ]
    );
    assert_eq!(reporter.delivered(), 2);
    assert_eq!(reporter.dropped(), 0);
}

#[test]
fn missing_bridge_is_swallowed() {
    let reporter = Reporter::new("jd", Arc::new(SharedBridge::new()));
    assert!(!reporter.report(&Report::NewMessage(MessageState::new(1))));
    assert_eq!(reporter.dropped(), 1);
}

#[test]
fn bridge_errors_are_swallowed() {
    let reporter = Reporter::new("jd", Arc::new(FailingBridge));
    assert!(!reporter.report(&Report::NewMessage(MessageState::new(1))));
    assert!(!reporter.report(&Report::NewMessage(MessageState::new(1))));
    assert_eq!(reporter.dropped(), 2);
}

#[test]
fn bridge_panics_are_contained() {
    let reporter = Reporter::new("jd", Arc::new(PanickingBridge));
    assert!(!reporter.report(&Report::NewMessage(MessageState::new(1))));
    assert_eq!(reporter.dropped(), 1);
    assert_eq!(reporter.delivered(), 0);
}

#[test]
fn panic_message_reads_common_payloads() {
    let static_str: Box<dyn std::any::Any + Send> = Box::new("boom");
    let owned: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
    let other: Box<dyn std::any::Any + Send> = Box::new(42u8);
    assert_eq!(panic_message(static_str.as_ref()), "boom");
    assert_eq!(panic_message(owned.as_ref()), "bang");
    assert_eq!(panic_message(other.as_ref()), "panic");
}
