//! End-to-end behavior of `RemoteControlClient` against the in-memory
//! transport: handshake, correlation, origin filtering, timeouts, events and
//! teardown.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::{json, Value};

use godam_player::ipc::memory::{MemoryFrame, MemoryHost};
use godam_player::{ClientError, ClientOptions, Listener, RemoteControlClient};

const PLAYER_ORIGIN: &str = "https://player.example.com";

struct Harness {
    host: MemoryHost,
    frame: Rc<MemoryFrame>,
    client: RemoteControlClient,
}

impl Harness {
    fn new() -> Self {
        Self::with_options(ClientOptions::default())
    }

    fn with_options(options: ClientOptions) -> Self {
        let host = MemoryHost::new();
        let frame = MemoryFrame::iframe();
        host.insert_element("#player", frame.clone());
        let client = RemoteControlClient::new(Rc::new(host.clone()), "#player", options)
            .expect("client should initialize");
        Self {
            host,
            frame,
            client,
        }
    }

    fn posted(&self) -> Vec<Value> {
        self.frame.window().expect("frame loaded").posted()
    }

    fn id_of(&self, index: usize) -> String {
        self.posted()[index]["id"]
            .as_str()
            .expect("posted message carries an id")
            .to_string()
    }

    fn reply(&self, message_type: &str, id: &str, payload: Value) {
        self.host.dispatch(
            PLAYER_ORIGIN,
            json!({ "type": message_type, "id": id, "payload": payload }),
        );
    }

    fn broadcast(&self, origin: &str, data: Value) {
        self.host.dispatch(origin, data);
    }
}

fn recorder(log: &Rc<RefCell<Vec<String>>>, tag: &'static str) -> Listener {
    let log = Rc::clone(log);
    Listener::new(move |data| log.borrow_mut().push(format!("{tag}:{data}")))
}

// =============================================================================
// Handshake & readiness
// =============================================================================

#[tokio::test]
async fn test_ready_handshake_notifies_subscribers() {
    let h = Harness::new();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    h.client
        .on("ready", Listener::new(move |data| sink.borrow_mut().push(data.clone())));

    let ready = h.client.ready();
    h.broadcast(
        PLAYER_ORIGIN,
        json!({ "type": "godam:ready", "payload": { "duration": 120 } }),
    );

    assert_eq!(ready.await.unwrap(), json!({ "duration": 120 }));
    assert!(h.client.is_ready());
    assert_eq!(*seen.borrow(), vec![json!({ "duration": 120 })]);
}

#[tokio::test]
async fn test_readiness_is_idempotent_for_early_and_late_waiters() {
    let h = Harness::new();
    let early = h.client.ready();

    h.broadcast(PLAYER_ORIGIN, json!({ "type": "godam:ready", "payload": { "n": 1 } }));
    h.broadcast(PLAYER_ORIGIN, json!({ "type": "godam:ready", "payload": { "n": 2 } }));

    let late = h.client.ready();
    assert_eq!(early.await.unwrap(), json!({ "n": 1 }));
    assert_eq!(late.await.unwrap(), json!({ "n": 1 }));
}

#[tokio::test]
async fn test_ready_future_is_pending_before_handshake() {
    let h = Harness::new();
    let mut ready = Box::pin(h.client.ready());

    assert!((&mut ready).now_or_never().is_none());
    assert!(!h.client.is_ready());

    h.broadcast(PLAYER_ORIGIN, json!({ "type": "godam:ready", "payload": {} }));
    assert_eq!(ready.await.unwrap(), json!({}));
}

// =============================================================================
// Commands
// =============================================================================

#[tokio::test]
async fn test_get_current_time_resolves() {
    let h = Harness::new();
    let time = h.client.get_current_time();

    let posted = h.posted();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0]["type"], "godam:getCurrentTime");

    h.reply("godam:getCurrentTime", &h.id_of(0), json!({ "time": 42.5 }));

    assert_eq!(time.await.unwrap(), 42.5);
    assert_eq!(h.client.pending_count(), 0);
}

#[tokio::test]
async fn test_seek_and_volume_payloads() {
    let h = Harness::new();
    let _seek = h.client.seek(30.0).unwrap();
    let _volume = h.client.set_volume(0.5).unwrap();
    let _muted = h.client.set_muted(true);

    let posted = h.posted();
    assert_eq!(posted[0]["type"], "godam:seek");
    assert_eq!(posted[0]["payload"], json!({ "time": 30.0 }));
    assert_eq!(posted[1]["type"], "godam:setVolume");
    assert_eq!(posted[1]["payload"], json!({ "volume": 0.5 }));
    assert_eq!(posted[2]["type"], "godam:setMuted");
    assert_eq!(posted[2]["payload"], json!({ "muted": true }));
}

#[tokio::test]
async fn test_error_response_rejects_with_remote_message() {
    let h = Harness::new();
    let play = h.client.play();

    h.reply("godam:play:error", &h.id_of(0), json!({ "message": "no media" }));

    let err = play.await.unwrap_err();
    assert_eq!(err.to_string(), "no media");
    assert!(matches!(
        err,
        ClientError::CommandFailed { ref command, .. } if command == "play"
    ));
}

#[tokio::test]
async fn test_error_response_without_message() {
    let h = Harness::new();
    let pause = h.client.pause();

    h.reply("godam:pause:error", &h.id_of(0), json!({}));

    assert_eq!(pause.await.unwrap_err().to_string(), "Unknown error");
}

#[tokio::test]
async fn test_out_of_order_responses_settle_their_own_requests() {
    let h = Harness::new();
    let volume = h.client.get_volume();
    let duration = h.client.get_duration();
    let (volume_id, duration_id) = (h.id_of(0), h.id_of(1));

    h.reply("godam:getDuration", &duration_id, json!({ "duration": 300 }));
    h.reply("godam:getVolume", &volume_id, json!({ "volume": 0.8 }));

    assert_eq!(duration.await.unwrap(), 300.0);
    assert_eq!(volume.await.unwrap(), 0.8);
}

#[tokio::test]
async fn test_duplicate_response_is_ignored() {
    let h = Harness::new();
    let muted = h.client.get_muted();
    let id = h.id_of(0);

    h.reply("godam:getMuted", &id, json!({ "muted": true }));
    h.reply("godam:getMuted", &id, json!({ "muted": false }));

    assert!(muted.await.unwrap());
    assert_eq!(h.client.pending_count(), 0);
}

// =============================================================================
// Timeouts
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_command_times_out_after_default_window() {
    let h = Harness::new();
    let started = tokio::time::Instant::now();

    let err = h.client.pause().await.unwrap_err();

    assert!(matches!(
        err,
        ClientError::CommandTimeout { ref command, timeout_ms: 5000 } if command == "pause"
    ));
    assert!(started.elapsed() >= Duration::from_millis(5000));
    assert_eq!(h.client.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_late_response_after_timeout_is_ignored() {
    let h = Harness::new();
    let play = h.client.play();
    let id = h.id_of(0);

    assert!(matches!(
        play.await.unwrap_err(),
        ClientError::CommandTimeout { .. }
    ));

    h.reply("godam:play", &id, json!({}));
    assert_eq!(h.client.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_does_not_affect_other_commands() {
    let h = Harness::with_options(ClientOptions::default().with_command_timeout_ms(1000));
    let slow = h.client.get_duration();

    tokio::time::sleep(Duration::from_millis(600)).await;
    let fast = h.client.get_volume();
    let fast_id = h.id_of(1);

    let err = slow.await.unwrap_err();
    assert!(matches!(err, ClientError::CommandTimeout { timeout_ms: 1000, .. }));
    assert_eq!(h.client.pending_count(), 1);

    h.reply("godam:getVolume", &fast_id, json!({ "volume": 0.3 }));
    assert_eq!(fast.await.unwrap(), 0.3);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_fires_without_polling_and_late_response_is_dropped() {
    let h = Harness::new();
    let pause = h.client.pause();
    let id = h.id_of(0);

    tokio::time::sleep(Duration::from_millis(6000)).await;
    assert_eq!(h.client.pending_count(), 0);

    h.reply("godam:pause", &id, json!({}));

    let err = pause.await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::CommandTimeout { ref command, timeout_ms: 5000 } if command == "pause"
    ));
    assert_eq!(h.client.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_late_response_expires_command_before_routing() {
    let h = Harness::new();
    let time = h.client.get_current_time();
    let id = h.id_of(0);

    tokio::time::advance(Duration::from_millis(5000)).await;
    h.reply("godam:getCurrentTime", &id, json!({ "time": 42.5 }));

    assert!(matches!(
        time.await.unwrap_err(),
        ClientError::CommandTimeout { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_response_just_before_deadline_resolves() {
    let h = Harness::new();
    let time = h.client.get_current_time();
    let id = h.id_of(0);

    tokio::time::advance(Duration::from_millis(4999)).await;
    h.reply("godam:getCurrentTime", &id, json!({ "time": 42.5 }));

    assert_eq!(time.await.unwrap(), 42.5);
}

// =============================================================================
// Origin filtering
// =============================================================================

#[tokio::test]
async fn test_wildcard_subdomain_allowlist() {
    let h = Harness::with_options(ClientOptions::with_allowed_origins(["*.example.com"]));
    let ready = Box::pin(h.client.ready());

    h.broadcast(
        "https://evil.com",
        json!({ "type": "godam:ready", "payload": { "from": "evil" } }),
    );
    assert!(!h.client.is_ready());

    h.broadcast(
        "https://player.example.com",
        json!({ "type": "godam:ready", "payload": { "from": "player" } }),
    );
    assert_eq!(ready.await.unwrap(), json!({ "from": "player" }));
}

#[tokio::test]
async fn test_response_from_disallowed_origin_does_not_settle() {
    let h = Harness::with_options(ClientOptions::with_allowed_origins([
        "https://player.example.com",
    ]));
    let time = h.client.get_current_time();
    let id = h.id_of(0);

    h.host.dispatch(
        "https://other.example.com",
        json!({ "type": "godam:getCurrentTime", "id": id, "payload": { "time": 1 } }),
    );
    assert_eq!(h.client.pending_count(), 1);

    h.reply("godam:getCurrentTime", &id, json!({ "time": 2 }));
    assert_eq!(time.await.unwrap(), 2.0);
}

#[tokio::test]
async fn test_foreign_messages_are_ignored() {
    let h = Harness::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    h.client.on("ready", recorder(&log, "ready"));

    h.broadcast(PLAYER_ORIGIN, json!("godam:ready"));
    h.broadcast(PLAYER_ORIGIN, json!({ "payload": {} }));
    h.broadcast(PLAYER_ORIGIN, json!({ "type": "other:ready", "payload": {} }));

    assert!(!h.client.is_ready());
    assert!(log.borrow().is_empty());
}

// =============================================================================
// Events
// =============================================================================

#[tokio::test]
async fn test_events_reach_listeners_despite_panics() {
    let h = Harness::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    h.client
        .on("timeupdate", Listener::new(|_| panic!("listener failure")))
        .on("timeupdate", recorder(&log, "f2"));

    h.broadcast(
        PLAYER_ORIGIN,
        json!({ "type": "godam:event", "payload": { "event": "timeupdate", "data": { "t": 3 } } }),
    );

    assert_eq!(*log.borrow(), vec![r#"f2:{"t":3}"#.to_string()]);
}

#[tokio::test]
async fn test_event_without_data_field_passes_remaining_payload() {
    let h = Harness::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    h.client.on("ended", recorder(&log, "ended"));

    h.broadcast(
        PLAYER_ORIGIN,
        json!({ "type": "godam:event", "payload": { "event": "ended", "at": 120 } }),
    );

    assert_eq!(*log.borrow(), vec![r#"ended:{"at":120}"#.to_string()]);
}

#[tokio::test]
async fn test_off_removes_one_listener_or_all() {
    let h = Harness::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    let first = recorder(&log, "a");
    h.client
        .on("play", first.clone())
        .on("play", recorder(&log, "b"));

    h.client.off("play", Some(&first));
    assert_eq!(h.client.listener_count("play"), 1);

    h.client.off("play", None).off("unknown", None);
    assert_eq!(h.client.listener_count("play"), 0);
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn test_invalid_arguments_fail_before_sending() {
    let h = Harness::new();

    assert!(matches!(
        h.client.seek(f64::NAN),
        Err(ClientError::Validation(_))
    ));
    assert!(matches!(
        h.client.set_volume(1.5),
        Err(ClientError::Validation(_))
    ));
    assert!(matches!(
        h.client.set_volume(-0.1),
        Err(ClientError::Validation(_))
    ));

    assert!(h.posted().is_empty());
    assert_eq!(h.client.pending_count(), 0);
}

#[tokio::test]
async fn test_non_finite_arguments_are_rejected() {
    let h = Harness::new();

    assert!(matches!(
        h.client.seek(f64::INFINITY),
        Err(ClientError::Validation(_))
    ));
    assert!(matches!(
        h.client.seek(f64::NEG_INFINITY),
        Err(ClientError::Validation(_))
    ));
    assert!(matches!(
        h.client.set_volume(f64::NAN),
        Err(ClientError::Validation(_))
    ));

    assert!(h.posted().is_empty());
}

#[tokio::test]
async fn test_volume_range_is_inclusive() {
    let h = Harness::new();

    let _silent = h.client.set_volume(0.0).expect("0.0 is a valid volume");
    let _full = h.client.set_volume(1.0).expect("1.0 is a valid volume");
    let _start = h.client.seek(0.0).expect("0.0 is a valid time");

    let posted = h.posted();
    assert_eq!(posted.len(), 3);
    assert_eq!(posted[0]["payload"], json!({ "volume": 0.0 }));
    assert_eq!(posted[1]["payload"], json!({ "volume": 1.0 }));
    assert_eq!(posted[2]["payload"], json!({ "time": 0.0 }));
    assert_eq!(h.client.pending_count(), 3);
}

// =============================================================================
// Teardown
// =============================================================================

#[tokio::test]
async fn test_destroy_rejects_pending_and_stops_listening() {
    let h = Harness::new();
    let play = h.client.play();
    let time = h.client.get_current_time();
    let ready = h.client.ready();
    let log = Rc::new(RefCell::new(Vec::new()));
    h.client.on("ready", recorder(&log, "ready"));

    h.client.destroy();

    assert!(matches!(play.await.unwrap_err(), ClientError::Destroyed));
    assert!(matches!(time.await.unwrap_err(), ClientError::Destroyed));
    assert_eq!(h.host.listener_count(), 0);
    assert_eq!(h.client.listener_count("ready"), 0);

    h.broadcast(PLAYER_ORIGIN, json!({ "type": "godam:ready", "payload": {} }));
    assert!(log.borrow().is_empty());
    assert!((Box::pin(ready)).now_or_never().is_none());
}

#[tokio::test]
async fn test_reloaded_frame_receives_later_commands() {
    let h = Harness::new();
    h.frame.unload();
    assert!(matches!(
        h.client.play().await.unwrap_err(),
        ClientError::UnavailableTarget { .. }
    ));

    let window = h.frame.load();
    let _pause = h.client.pause();
    assert_eq!(window.posted().len(), 1);
}
