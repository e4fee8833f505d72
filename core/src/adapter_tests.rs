use super::*;
use crate::bridge::{MemoryBridge, SharedBridge};
use crate::config::{FieldSelector, IdentitySelectors};
use crate::document::HtmlDocument;
use crate::extract::ExtractError;
use crate::platform::Page;
use crate::protocol::{HostEvent, Identity, MessageState};
use std::time::Duration;
use tokio::time::{self, Instant};

fn platform_config(warmup_ms: u64, poll_ms: u64) -> PlatformConfig {
    PlatformConfig {
        name: "抖店".to_string(),
        chat_url: None,
        enabled: true,
        message_selectors: vec![
            ".message-notify".to_string(),
            ".unread-count".to_string(),
        ],
        warmup_ms,
        poll_ms,
        identity: Identity {
            user_name: "抖店用户".to_string(),
            mall_name: "抖店店铺".to_string(),
            user_id: "doudian_user_id".to_string(),
            mall_id: "doudian_mall_id".to_string(),
            avatar: String::new(),
        },
        identity_selectors: IdentitySelectors::default(),
    }
}

fn events(memory: &MemoryBridge) -> Vec<HostEvent> {
    memory
        .take_events()
        .into_iter()
        .map(|event| event.unwrap())
        .collect()
}

fn message_counts(events: &[HostEvent]) -> Vec<u32> {
    events
        .iter()
        .filter_map(|event| match event {
            HostEvent::NewMessage(state) => Some(state.new_message_count()),
            _ => None,
        })
        .collect()
}

fn identities(events: &[HostEvent]) -> Vec<&Identity> {
    events
        .iter()
        .filter_map(|event| match event {
            HostEvent::CurrentUser(identity) => Some(identity),
            _ => None,
        })
        .collect()
}

/// Page that panics whenever it is looked at.
struct HostilePage;

impl Document for HostilePage {
    fn snapshot(&self) -> Result<Box<dyn Page>, ExtractError> {
        panic!("page script threw");
    }
}

/// Bridge that records the instant each message arrived.
#[derive(Clone, Default)]
struct TimedBridge {
    arrivals: Arc<Mutex<Vec<(String, Instant)>>>,
}

impl HostBridge for TimedBridge {
    fn post_message(
        &self,
        message: &crate::protocol::BridgeMessage,
    ) -> Result<(), crate::bridge::BridgeError> {
        self.arrivals
            .lock()
            .unwrap()
            .push((message.kind.clone(), Instant::now()));
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn reports_identity_once_and_messages_every_period() {
    let start = Instant::now();
    let bridge = TimedBridge::default();
    let doc = Arc::new(HtmlDocument::new(r#"<span class="unread-count">1</span>"#));

    let adapter = Adapter::start(
        "doudian",
        &platform_config(2000, 1000),
        doc,
        Arc::new(bridge.clone()),
    )
    .unwrap();

    time::sleep(Duration::from_millis(5500)).await;

    let arrivals = bridge.arrivals.lock().unwrap().clone();
    let at = |kind: &str| -> Vec<Duration> {
        arrivals
            .iter()
            .filter(|(k, _)| k == kind)
            .map(|(_, instant)| instant.duration_since(start))
            .collect()
    };

    assert_eq!(at("currentuser"), vec![Duration::from_millis(2000)]);
    assert_eq!(
        at("newmessage"),
        (1..=5).map(|n| Duration::from_millis(n * 1000)).collect::<Vec<_>>()
    );

    let status = adapter.status();
    assert!(status.running);
    assert_eq!(status.identity_timer, TimerState::Fired);
    assert_eq!(status.message_ticks, 5);
    assert_eq!(status.reports_delivered, 6);
    assert!(status.last_identity_at.is_some());
    assert!(status.last_message_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn single_indicator_reports_five() {
    let memory = MemoryBridge::new();
    let doc = Arc::new(HtmlDocument::new(r#"<span class="unread-count">5</span>"#));
    let _adapter = Adapter::start(
        "doudian",
        &platform_config(2000, 1000),
        doc,
        Arc::new(memory.clone()),
    )
    .unwrap();

    time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(events(&memory), vec![HostEvent::NewMessage(MessageState::new(5))]);
}

#[tokio::test(start_paused = true)]
async fn identity_report_carries_configured_values() {
    let memory = MemoryBridge::new();
    let doc = Arc::new(HtmlDocument::new(r#"<p class="shop-title">旗舰店</p>"#));
    let mut config = platform_config(2000, 1000);
    config.identity_selectors.mall_name = Some(FieldSelector::text(".shop-title"));

    let _adapter = Adapter::start("doudian", &config, doc, Arc::new(memory.clone())).unwrap();
    time::sleep(Duration::from_millis(2500)).await;

    let events = events(&memory);
    let reported = identities(&events);
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].mall_name, "旗舰店");
    assert_eq!(reported[0].user_name, "抖店用户");
}

#[tokio::test(start_paused = true)]
async fn page_changes_show_up_on_next_tick() {
    let memory = MemoryBridge::new();
    let doc = Arc::new(HtmlDocument::new("<div></div>"));
    let _adapter = Adapter::start(
        "doudian",
        &platform_config(60_000, 1000),
        doc.clone(),
        Arc::new(memory.clone()),
    )
    .unwrap();

    time::sleep(Duration::from_millis(1500)).await;
    doc.replace(r#"<em class="message-notify">2</em><em class="unread-count">1</em>"#);
    time::sleep(Duration::from_millis(1000)).await;
    doc.replace("<div></div>");
    time::sleep(Duration::from_millis(1000)).await;

    let events = events(&memory);
    assert_eq!(message_counts(&events), vec![0, 3, 0]);
    let flags: Vec<bool> = events
        .iter()
        .filter_map(|event| match event {
            HostEvent::NewMessage(state) => Some(state.has_new_message()),
            _ => None,
        })
        .collect();
    assert_eq!(flags, vec![false, true, false]);
}

#[tokio::test(start_paused = true)]
async fn missing_bridge_does_not_stop_ticks() {
    let slot = SharedBridge::new();
    let memory = MemoryBridge::new();
    let doc = Arc::new(HtmlDocument::new(r#"<span class="unread-count">4</span>"#));
    let adapter = Adapter::start(
        "doudian",
        &platform_config(2000, 1000),
        doc,
        Arc::new(slot.clone()),
    )
    .unwrap();

    time::sleep(Duration::from_millis(2500)).await;
    let status = adapter.status();
    assert_eq!(status.message_ticks, 2);
    assert_eq!(status.reports_dropped, 3);
    assert_eq!(status.last_identity_at, None);

    slot.install(Arc::new(memory.clone()));
    time::sleep(Duration::from_millis(1000)).await;

    assert_eq!(events(&memory), vec![HostEvent::NewMessage(MessageState::new(4))]);
    assert!(adapter.is_running());
}

#[tokio::test(start_paused = true)]
async fn panicking_page_does_not_stop_ticks() {
    let memory = MemoryBridge::new();
    let mut config = platform_config(500, 1000);
    config.identity_selectors.user_name = Some(FieldSelector::text(".nick"));

    let adapter = Adapter::start(
        "doudian",
        &config,
        Arc::new(HostilePage),
        Arc::new(memory.clone()),
    )
    .unwrap();

    time::sleep(Duration::from_millis(3500)).await;
    assert!(memory.messages().is_empty());

    let status = adapter.status();
    assert_eq!(status.message_ticks, 3);
    assert_eq!(status.identity_timer, TimerState::Fired);
    assert!(status.running);
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_both_timers() {
    let memory = MemoryBridge::new();
    let doc = Arc::new(HtmlDocument::new(r#"<span class="unread-count">1</span>"#));
    let adapter = Adapter::start(
        "doudian",
        &platform_config(2000, 1000),
        doc,
        Arc::new(memory.clone()),
    )
    .unwrap();

    time::sleep(Duration::from_millis(1500)).await;
    adapter.stop();
    adapter.stop();
    time::sleep(Duration::from_millis(5000)).await;

    let events = events(&memory);
    assert_eq!(message_counts(&events), vec![1]);
    assert!(identities(&events).is_empty());

    let status = adapter.status();
    assert!(!status.running);
    assert_eq!(status.identity_timer, TimerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn dropping_adapter_tears_down_timers() {
    let memory = MemoryBridge::new();
    let doc = Arc::new(HtmlDocument::new(r#"<span class="unread-count">1</span>"#));
    let adapter = Adapter::start(
        "doudian",
        &platform_config(2000, 1000),
        doc,
        Arc::new(memory.clone()),
    )
    .unwrap();

    time::sleep(Duration::from_millis(1500)).await;
    drop(adapter);
    time::sleep(Duration::from_millis(5000)).await;

    assert_eq!(memory.messages().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn adapters_are_independent() {
    let first = MemoryBridge::new();
    let second = MemoryBridge::new();

    let _fast = Adapter::start(
        "doudian",
        &platform_config(2000, 500),
        Arc::new(HtmlDocument::new(r#"<i class="unread-count">1</i>"#)),
        Arc::new(first.clone()),
    )
    .unwrap();
    let slow = Adapter::start(
        "jd",
        &platform_config(2000, 1000),
        Arc::new(HtmlDocument::new(r#"<i class="unread-count">9</i>"#)),
        Arc::new(second.clone()),
    )
    .unwrap();

    time::sleep(Duration::from_millis(1200)).await;
    slow.stop();
    time::sleep(Duration::from_millis(1000)).await;

    assert_eq!(message_counts(&events(&first)), vec![1, 1, 1, 1]);
    assert_eq!(message_counts(&events(&second)), vec![9]);
}

#[tokio::test]
async fn invalid_config_is_rejected_at_start() {
    let mut config = platform_config(2000, 1000);
    config.message_selectors.clear();

    let result = Adapter::start(
        "doudian",
        &config,
        Arc::new(HtmlDocument::default()),
        Arc::new(MemoryBridge::new()),
    );
    assert!(matches!(result, Err(AdapterError::Config(_))));
}

#[test]
fn start_without_runtime_fails() {
    let result = Adapter::start(
        "doudian",
        &platform_config(2000, 1000),
        Arc::new(HtmlDocument::default()),
        Arc::new(MemoryBridge::new()),
    );
    assert!(matches!(result, Err(AdapterError::NoRuntime)));
}

#[test]
fn start_with_explicit_runtime() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    let scheduler = Scheduler::new(runtime.handle().clone());
    let memory = MemoryBridge::new();

    let adapter = Adapter::start_with(
        &scheduler,
        "jd",
        &platform_config(2000, 10),
        Arc::new(HtmlDocument::new(r#"<i class="unread-count">2</i>"#)),
        Arc::new(memory.clone()),
    )
    .unwrap();
    assert_eq!(adapter.platform(), "jd");

    runtime.block_on(async {
        while memory.messages().is_empty() {
            time::sleep(Duration::from_millis(5)).await;
        }
    });
    adapter.stop();
    assert_eq!(
        events(&memory)[0],
        HostEvent::NewMessage(MessageState::new(2))
    );
}
