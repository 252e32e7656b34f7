//! Tests for `src/messaging/events.rs`: wire shape and the broadcast publisher.

use chrono::Utc;
use serde_json::json;

use bulksend::messaging::events::{
    BroadcastPublisher, ChannelStatus, EventPublisher, ProgressEvent,
};
use bulksend::messaging::session::RunState;
use bulksend::messaging::stats::{DeliveryOutcome, StatsSnapshot};

use crate::support::row;

#[test]
fn status_update_omits_unchanged_fields() {
    let value = serde_json::to_value(ProgressEvent::run_state(RunState::Paused))
        .expect("serialize");
    assert_eq!(
        value,
        json!({"event": "status_update", "data": {"messaging": "paused"}})
    );

    let value = serde_json::to_value(ProgressEvent::channel_status(ChannelStatus::Qr))
        .expect("serialize");
    assert_eq!(
        value,
        json!({"event": "status_update", "data": {"whatsapp": "qr"}})
    );
}

#[test]
fn stats_update_shape() {
    let value = serde_json::to_value(ProgressEvent::StatsUpdate(StatsSnapshot::new(5)))
        .expect("serialize");
    assert_eq!(
        value,
        json!({
            "event": "stats_update",
            "data": {"total": 5, "sent": 0, "failed": 0, "remaining": 5}
        })
    );
}

#[test]
fn failed_outcome_maps_to_message_failed_and_log_entry() {
    let outcome = DeliveryOutcome::failed(row(3, &["111"]), Some("111".to_owned()), "gone".to_owned());

    match ProgressEvent::from_outcome(&outcome) {
        ProgressEvent::MessageFailed {
            row, phone, error, ..
        } => {
            assert_eq!(row, 3);
            assert_eq!(phone.as_deref(), Some("111"));
            assert_eq!(error, "gone");
        }
        other => panic!("expected message_failed, got {}", other.name()),
    }

    let value = serde_json::to_value(ProgressEvent::log_entry(&outcome)).expect("serialize");
    assert_eq!(value["event"], "log_update");
    assert_eq!(value["data"]["status"], "failed");
    assert_eq!(value["data"]["contact"]["civil_id"], "CID3");
    assert_eq!(value["data"]["error"], "gone");
}

#[test]
fn sent_log_entry_has_no_error_field() {
    let outcome = DeliveryOutcome::sent(row(0, &["111"]), "111".to_owned(), Utc::now());
    let value = serde_json::to_value(ProgressEvent::log_entry(&outcome)).expect("serialize");
    assert_eq!(value["data"]["phone"], "111");
    assert!(value["data"].get("error").is_none());
}

#[tokio::test]
async fn broadcast_publisher_fans_out_in_order() {
    let publisher = BroadcastPublisher::new(8);
    let mut first = publisher.subscribe();
    let mut second = publisher.subscribe();

    publisher.publish(ProgressEvent::run_state(RunState::Sending));
    publisher.publish(ProgressEvent::run_state(RunState::Completed));

    for rx in [&mut first, &mut second] {
        assert_eq!(
            rx.recv().await.expect("first event"),
            ProgressEvent::run_state(RunState::Sending)
        );
        assert_eq!(
            rx.recv().await.expect("second event"),
            ProgressEvent::run_state(RunState::Completed)
        );
    }
}

#[test]
fn publishing_without_subscribers_is_harmless() {
    let publisher = BroadcastPublisher::new(1);
    publisher.publish(ProgressEvent::ChannelError {
        error: "bridge down".to_owned(),
    });
}
