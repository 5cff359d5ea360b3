mod support;

use backstop_app::App;
use backstop_core::bridge::BackendEvent;
use backstop_core::model::{Properties, ScanStatus};
use serde_json::json;

use support::{FakeBackend, five_add_batch, sample_config};

#[tokio::test]
async fn events_are_applied_in_receipt_order() {
    let backend = FakeBackend::new(sample_config());
    let app = App::new(&backend);
    let mut events = app.start().await.expect("start");

    backend.emit(BackendEvent::ScanStatusChanged(ScanStatus::Scanning {
        current_path: "/a".to_string(),
        found: 1,
    }));
    backend.emit(BackendEvent::ScanStatusChanged(ScanStatus::Result(
        five_add_batch(),
    )));
    let mut pushed = sample_config();
    pushed.no_include = true;
    backend.emit(BackendEvent::ConfigChanged(pushed.clone()));

    let applied = events.drain_events().await.expect("drain");

    assert_eq!(applied, 3);
    assert_eq!(*app.scan().status(), ScanStatus::Result(five_add_batch()));
    assert_eq!(*app.config().final_config(), Some(pushed));
}

#[tokio::test]
async fn lagged_subscription_resynchronizes() {
    let backend = FakeBackend::with_capacity(sample_config(), 2);
    let app = App::new(&backend);
    let mut events = app.start().await.expect("start");
    let pulls_before = backend.commands().len();

    for found in 0..4 {
        backend.emit(BackendEvent::ScanStatusChanged(ScanStatus::Scanning {
            current_path: format!("/p{found}"),
            found,
        }));
    }
    backend.set_status(ScanStatus::Scanning {
        current_path: "/p3".to_string(),
        found: 3,
    });

    events.drain_events().await.expect("drain");

    let commands = backend.commands();
    assert_eq!(&commands[pulls_before..], ["get_config", "scan_status"]);
    assert_eq!(app.scan().current().found, 3);
}

#[tokio::test]
async fn closed_channel_is_resubscribed() {
    let backend = FakeBackend::new(sample_config());
    let app = App::new(&backend);
    let mut events = app.start().await.expect("start");

    backend.close_channel();
    assert_eq!(events.drain_events().await.expect("drain"), 0);

    backend.emit(BackendEvent::ScanStatusChanged(ScanStatus::Idle));
    assert_eq!(events.drain_events().await.expect("drain"), 1);
}

#[tokio::test]
async fn dropped_subscription_stops_delivery() {
    let backend = FakeBackend::new(sample_config());
    let app = App::new(&backend);
    let events = app.start().await.expect("start");
    drop(events);

    backend.emit(BackendEvent::ScanStatusChanged(ScanStatus::Result(
        five_add_batch(),
    )));

    assert_eq!(*app.scan().status(), ScanStatus::Idle);
}

#[tokio::test]
async fn properties_push_replaces_map() {
    let backend = FakeBackend::new(sample_config());
    let app = App::new(&backend);
    let mut events = app.start().await.expect("start");

    let mut properties = Properties::new();
    properties.insert("language".to_string(), json!("de"));
    backend.emit(BackendEvent::PropertiesChanged(properties.clone()));
    events.drain_events().await.expect("drain");
    assert_eq!(app.language().as_deref(), Some("de"));

    backend.emit(BackendEvent::PropertiesChanged(Properties::new()));
    events.drain_events().await.expect("drain");
    assert_eq!(app.language(), None);
}
