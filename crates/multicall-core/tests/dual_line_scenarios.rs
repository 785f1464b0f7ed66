//! End-to-end scenarios for the dual-line coordinator, driven through the simulator

mod common;

use common::Harness;
use multicall_core::config::{AcceptOptions, VoiceSdkOptions};
use multicall_core::transport::AudioDeviceInfo;
use multicall_core::{
    CallHandle, CallId, CallState, DeviceState, MultiCallConfig, MultiCallError, ParticipantStatus, StateAction,
    TransportError,
};
use serde_json::json;

#[tokio::test]
async fn test_two_call_lifecycle() {
    let h = Harness::start();

    // primary call rings: the secondary device is provisioned and registered
    let first = h.primary_call("WT1", "CA1").await;
    let snapshot = h.settle().await;
    assert_eq!(snapshot.primary_call.as_ref().map(|c| c.call_id.clone()), Some(CallId::from("CA1")));
    assert_eq!(snapshot.secondary_device, Some(DeviceState::Registered));
    assert_eq!(snapshot.device_generation, 1);
    assert!(first.is_subscribed());

    // second call arrives on the secondary device and is auto-accepted
    let second = h.secondary_call("WT2", "CA2").await;
    assert_eq!(second.accept_count(), 1);

    let snapshot = h.settle().await;
    let secondary = snapshot.secondary_call.expect("secondary call bound");
    assert_eq!(secondary.call_id, CallId::from("CA2"));
    assert_eq!(secondary.state, CallState::Accepted);
    assert!(snapshot.pending_secondary.is_none());

    // everything else was held
    assert!(first.is_muted());
    assert!(!second.is_muted());
    assert_eq!(h.board.participant_status("WT1", "CA1-customer"), Some(ParticipantStatus::Holding));
    assert_eq!(h.board.participant_status("WT2", "CA2-customer"), Some(ParticipantStatus::Joined));

    // and the new session was published
    let actions = h.publisher.actions();
    assert_eq!(actions.len(), 1);
    assert!(matches!(&actions[0], StateAction::AddSecondaryCall(call) if call.call_id == CallId::from("CA2")));

    // primary ends first, then the secondary: device goes away with the last call
    first.disconnect();
    h.board.remove_task("WT1");
    let snapshot = h.settle().await;
    assert!(snapshot.primary_call.is_none());
    assert_eq!(snapshot.secondary_device, Some(DeviceState::Registered));

    second.disconnect();
    h.board.remove_task("WT2");
    let snapshot = h.settle().await;
    assert!(snapshot.secondary_call.is_none());
    assert_eq!(snapshot.secondary_device, Some(DeviceState::Destroyed));
    assert_eq!(h.secondary_device().destroy_count(), 1);
}

#[tokio::test]
async fn test_primary_disconnect_keeps_live_secondary() {
    let h = Harness::start();
    let first = h.primary_call("WT1", "CA1").await;
    let second = h.secondary_call("WT2", "CA2").await;
    assert_eq!(h.publisher.actions().len(), 1);

    first.disconnect();
    let snapshot = h.settle().await;

    assert_eq!(
        snapshot.secondary_call.map(|c| c.call_id),
        Some(CallId::from("CA2"))
    );
    assert_eq!(snapshot.secondary_device, Some(DeviceState::Registered));
    assert_eq!(h.secondary_device().destroy_count(), 0);

    let actions = h.publisher.actions();
    assert_eq!(actions.len(), 2);
    assert!(matches!(&actions[1], StateAction::AddSecondaryCall(call) if call.call_id == second.call_id()));
}

#[tokio::test]
async fn test_primary_reject_behaves_like_disconnect() {
    let h = Harness::start();
    let first = h.primary_call("WT1", "CA1").await;

    first.reject();
    let snapshot = h.settle().await;

    assert!(snapshot.primary_call.is_none());
    assert_eq!(snapshot.secondary_device, Some(DeviceState::Destroyed));
    assert!(h.publisher.actions().is_empty());
}

#[tokio::test]
async fn test_secondary_disconnect_before_accept_has_no_side_effects() {
    let h = Harness::start();
    let first = h.primary_call("WT1", "CA1").await;

    h.board.add_task(multicall_core::sim::SimTaskBoard::voice_task("WT2", "CA2", "CA2-customer"));
    let second = multicall_core::sim::SimCall::new("CA2");
    second.hold_accept_notification();
    assert!(h.secondary_device().ring(&second));

    let snapshot = h.settle().await;
    assert_eq!(snapshot.pending_secondary, Some(CallId::from("CA2")));
    assert!(snapshot.secondary_call.is_none());

    second.disconnect();
    let snapshot = h.settle().await;
    assert!(snapshot.pending_secondary.is_none());
    assert!(snapshot.secondary_call.is_none());

    // a late accept for the abandoned call is ignored as well
    second.emit_accept();
    let snapshot = h.settle().await;
    assert!(snapshot.secondary_call.is_none());

    assert!(h.publisher.actions().is_empty());
    assert!(h.board.hold_requests().is_empty());
    assert!(first.mute_history().is_empty());
    assert_eq!(h.board.participant_status("WT1", "CA1-customer"), Some(ParticipantStatus::Joined));

    // primary still live, so the device stays
    assert_eq!(snapshot.secondary_device, Some(DeviceState::Registered));
}

#[tokio::test]
async fn test_pending_secondary_keeps_device_when_primary_ends() {
    let h = Harness::start();
    let first = h.primary_call("WT1", "CA1").await;

    let second = multicall_core::sim::SimCall::new("CA2");
    second.hold_accept_notification();
    h.secondary_device().ring(&second);
    h.settle().await;

    first.disconnect();
    let snapshot = h.settle().await;
    assert_eq!(snapshot.secondary_device, Some(DeviceState::Registered));

    second.disconnect();
    let snapshot = h.settle().await;
    assert_eq!(snapshot.secondary_device, Some(DeviceState::Destroyed));
}

#[tokio::test]
async fn test_device_destroy_is_idempotent() {
    let h = Harness::start();
    let first = h.primary_call("WT1", "CA1").await;

    first.disconnect();
    h.settle().await;
    assert_eq!(h.secondary_device().destroy_count(), 1);

    // duplicate notifications and shutdown do not destroy again
    first.disconnect();
    first.reject();
    let snapshot = h.settle().await;
    assert_eq!(snapshot.secondary_device, Some(DeviceState::Destroyed));
    assert_eq!(h.secondary_device().destroy_count(), 1);

    h.handle.shutdown().await.unwrap();
    assert_eq!(h.secondary_device().destroy_count(), 1);
}

#[tokio::test]
async fn test_destroyed_device_is_replaced_not_reused() {
    let h = Harness::start();
    let first = h.primary_call("WT1", "CA1").await;
    let old_device = h.secondary_device();
    first.disconnect();
    h.board.remove_task("WT1");
    h.settle().await;

    let _next = h.primary_call("WT3", "CA3").await;
    let snapshot = h.settle().await;

    assert_eq!(h.transport.devices().len(), 2);
    assert_eq!(snapshot.device_generation, 2);
    assert_eq!(snapshot.secondary_device, Some(DeviceState::Registered));
    assert_eq!(old_device.destroy_count(), 1);
    assert_eq!(old_device.ring(&multicall_core::sim::SimCall::new("CA-stale")), true);

    // the stale device's ring is dropped
    let snapshot = h.settle().await;
    assert!(snapshot.pending_secondary.is_none());
    assert!(snapshot.secondary_call.is_none());
}

#[tokio::test]
async fn test_new_primary_call_holds_live_secondary() {
    let h = Harness::start();
    let first = h.primary_call("WT1", "CA1").await;
    let second = h.secondary_call("WT2", "CA2").await;

    first.disconnect();
    h.board.remove_task("WT1");
    h.settle().await;

    let third = h.primary_call("WT3", "CA3").await;

    assert!(second.is_muted());
    assert!(!third.is_muted());
    assert_eq!(h.board.participant_status("WT2", "CA2-customer"), Some(ParticipantStatus::Holding));
    assert_eq!(h.transport.devices().len(), 1);
    assert_eq!(h.live_unheld_tasks(&[&second, &third]), vec!["WT3".to_string()]);
}

#[tokio::test]
async fn test_busy_secondary_line_does_not_accept_another_call() {
    let h = Harness::start();
    let _first = h.primary_call("WT1", "CA1").await;
    let _second = h.secondary_call("WT2", "CA2").await;

    let intruder = multicall_core::sim::SimCall::new("CA9");
    h.secondary_device().ring(&intruder);
    let snapshot = h.settle().await;

    assert_eq!(intruder.accept_count(), 0);
    assert_eq!(snapshot.secondary_call.map(|c| c.call_id), Some(CallId::from("CA2")));
}

#[tokio::test]
async fn test_initial_device_check_mirrors_input_before_accept() {
    let accept = AcceptOptions {
        rtc_constraints: Some(json!({ "audio": { "deviceId": "mic-2" } })),
        rtc_configuration: None,
    };
    let config = MultiCallConfig::new()
        .with_enabled(true)
        .with_initial_device_check(true)
        .with_voice(VoiceSdkOptions::new().with_accept_options(accept.clone()));
    let h = Harness::start_with(config);
    h.primary.select_input(AudioDeviceInfo::new("mic-2", "Desk Mic"));

    let _first = h.primary_call("WT1", "CA1").await;
    let second = h.secondary_call("WT2", "CA2").await;

    assert_eq!(
        h.secondary_device().input_device_id(),
        Some("mic-2".to_string())
    );
    assert_eq!(second.accept_count(), 1);
    assert_eq!(second.accepted_with(), Some(accept));
}

#[tokio::test]
async fn test_input_mirror_failure_still_accepts() {
    let config = MultiCallConfig::new()
        .with_enabled(true)
        .with_initial_device_check(true);
    let h = Harness::start_with(config);
    h.primary.select_input(AudioDeviceInfo::new("mic-2", "Desk Mic"));

    let _first = h.primary_call("WT1", "CA1").await;
    h.secondary_device().fail_input_selection(true);
    let second = h.secondary_call("WT2", "CA2").await;

    assert_eq!(second.accept_count(), 1);
    assert!(h.settle().await.secondary_call.is_some());
}

#[tokio::test]
async fn test_accept_without_device_check_skips_input_mirroring() {
    let h = Harness::start();
    h.primary.select_input(AudioDeviceInfo::new("mic-2", "Desk Mic"));

    let _first = h.primary_call("WT1", "CA1").await;
    let second = h.secondary_call("WT2", "CA2").await;

    assert_eq!(second.accept_count(), 1);
    assert_eq!(second.accepted_with(), None);
    assert_eq!(h.secondary_device().input_device_id(), None);
}

#[tokio::test]
async fn test_failed_accept_releases_pending_call() {
    let h = Harness::start();
    let first = h.primary_call("WT1", "CA1").await;

    let second = multicall_core::sim::SimCall::new("CA2");
    second.fail_accept(true);
    h.secondary_device().ring(&second);
    let snapshot = h.settle().await;

    assert!(snapshot.pending_secondary.is_none());
    assert!(snapshot.secondary_call.is_none());
    assert!(!first.is_muted());
    assert_eq!(snapshot.secondary_device, Some(DeviceState::Registered));
}

#[tokio::test]
async fn test_registration_mirrors_non_default_outputs() {
    let h = Harness::start();
    h.primary.select_outputs(vec![
        AudioDeviceInfo::new("default", "System default"),
        AudioDeviceInfo::new("headset", "USB Headset"),
    ]);

    let _first = h.primary_call("WT1", "CA1").await;

    assert_eq!(h.secondary_device().output_ids(), vec!["headset".to_string()]);
}

#[tokio::test]
async fn test_secondary_device_options_come_from_config() {
    let config = MultiCallConfig::new()
        .with_enabled(true)
        .with_voice(VoiceSdkOptions::new().with_option("edge", json!("dublin")));
    let h = Harness::start_with(config);
    let _first = h.primary_call("WT1", "CA1").await;

    let device = h.secondary_device();
    assert_eq!(device.token(), "test-token");

    let options = serde_json::to_value(device.options().unwrap()).unwrap();
    assert_eq!(options["edge"], "dublin");
    assert_eq!(options["allowIncomingWhileBusy"], false);
    assert!(options.get("codecPreferences").is_none());
}

#[tokio::test]
async fn test_device_errors_do_not_change_call_state() {
    let h = Harness::start();
    let _first = h.primary_call("WT1", "CA1").await;
    let before = h.settle().await;

    h.secondary_device().raise_error(TransportError::other("ice failure"));
    h.primary.raise_error(TransportError::other("token expiring"));

    assert_eq!(h.settle().await, before);
}

#[tokio::test]
async fn test_device_creation_failure_is_non_fatal() {
    let h = Harness::start();
    h.transport.fail_device_creation(true);
    let _first = h.primary_call("WT1", "CA1").await;

    let snapshot = h.settle().await;
    assert!(snapshot.primary_call.is_some());
    assert_eq!(snapshot.secondary_device, None);
}

#[tokio::test]
async fn test_disabled_feature_refuses_to_start() {
    let err = multicall_core::MultiCallCoordinator::start(
        MultiCallConfig::new(),
        multicall_core::CoordinatorDeps {
            transport: std::sync::Arc::new(multicall_core::sim::SimTransport::new("t")),
            primary_device: std::sync::Arc::new(multicall_core::sim::SimDevice::standalone()),
            tasks: std::sync::Arc::new(multicall_core::sim::SimTaskBoard::new()),
            conference: std::sync::Arc::new(multicall_core::sim::SimTaskBoard::new()),
            publisher: std::sync::Arc::new(multicall_core::sim::RecordingPublisher::new()),
        },
    )
    .err()
    .expect("disabled coordinator must not start");

    assert!(matches!(err, MultiCallError::FeatureDisabled));
}

#[tokio::test]
async fn test_handle_reports_stopped_coordinator() {
    let h = Harness::start();
    h.handle.shutdown().await.unwrap();

    assert!(matches!(h.handle.snapshot().await, Err(MultiCallError::CoordinatorStopped)));
    assert!(h.handle.primary_incoming(std::sync::Arc::new(multicall_core::sim::SimCall::new("CA1"))).is_err());
}
