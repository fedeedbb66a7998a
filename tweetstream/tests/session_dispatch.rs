//! Dispatch behaviour of connection sessions, driven by a scripted transport.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use stream_transport::{ScriptedTransport, TransportEvent};
use tokio::time::timeout;
use tweetstream::{
    Callback, CallbackRegistry, DeleteNotice, Endpoint, DirectMessage, LimitNotice, ReconnectError, ReconnectNotice,
    SessionHandle, SessionState, StallWarning, Status, StreamClient, StreamConfig, StreamError,
    StreamItem, StreamParams, UserEvent,
};

fn line(json: &str) -> TransportEvent {
    TransportEvent::Line(json.to_string())
}

fn scripted(events: Vec<TransportEvent>) -> (StreamClient, ScriptedTransport) {
    let transport = ScriptedTransport::new();
    transport.push_events(events);
    let client = StreamClient::with_transport(StreamConfig::default(), Arc::new(transport.clone()));
    (client, transport)
}

/// Shared log of handler calls
#[derive(Clone, Default)]
struct Calls(Arc<Mutex<Vec<String>>>);

impl Calls {
    fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock())
    }
}

/// Register a recording handler for every fixed event
fn record_everything(client: &mut StreamClient, calls: &Calls) {
    let c = calls.clone();
    client.on_delete(Callback::new(move |n: DeleteNotice| {
        let user = n.user_id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string());
        c.push(format!("delete {} {}", n.status_id, user))
    }));
    let c = calls.clone();
    client.on_limit(Callback::new(move |n: LimitNotice| c.push(format!("limit {}", n.track))));
    let c = calls.clone();
    client.on_scrub_geo(Callback::new(move |n: tweetstream::ScrubGeoNotice| c.push(format!("scrub_geo {}", n.up_to_status_id))));
    let c = calls.clone();
    client.on_error(Callback::new(move |m: String| c.push(format!("error {}", m))));
    let c = calls.clone();
    client.on_timeline_status(Callback::new(move |s: Status| c.push(format!("status {}", s.text))));
    let c = calls.clone();
    client.on_direct_message(Callback::new(move |dm: DirectMessage| c.push(format!("dm {}", dm.text))));
    let c = calls.clone();
    client.on_stall_warning(Callback::new(move |w: StallWarning| c.push(format!("stall {}", w.code))));
    let c = calls.clone();
    client.on_friends(Callback::new(move |ids: Vec<u64>| c.push(format!("friends {:?}", ids))));
    let c = calls.clone();
    client.on_status_withheld(Callback::new(move |w: tweetstream::StatusWithheld| c.push(format!("status_withheld {}", w.id))));
    let c = calls.clone();
    client.on_user_withheld(Callback::new(move |w: tweetstream::UserWithheld| c.push(format!("user_withheld {}", w.id))));
    let c = calls.clone();
    client.on_anything(Callback::new(move |_: Value| c.push("anything")));
}

#[tokio::test]
async fn test_delete_fires_only_delete_and_anything() {
    let (mut client, _) = scripted(vec![
        TransportEvent::Connected,
        line(r#"{"delete":{"status":{"id":1234,"user_id":3}}}"#),
    ]);
    let calls = Calls::default();
    record_everything(&mut client, &calls);

    client.sample(StreamParams::new(), None).await.unwrap();

    assert_eq!(calls.take(), vec!["delete 1234 3", "anything"]);
}

#[tokio::test]
async fn test_missing_secondary_fields_still_reach_handlers() {
    let (mut client, _) = scripted(vec![
        line(r#"{"delete":{"status":{"id":1234}}}"#),
        line(r#"{"direct_message":{"id":1,"text":"psst"}}"#),
    ]);
    let calls = Calls::default();
    record_everything(&mut client, &calls);

    client.sample(StreamParams::new(), None).await.unwrap();

    assert_eq!(
        calls.take(),
        vec!["delete 1234 -", "anything", "dm psst", "anything"]
    );
}

#[tokio::test]
async fn test_limit_fires_with_track_count() {
    let (mut client, _) = scripted(vec![line(r#"{"limit":{"track":1234}}"#)]);
    let calls = Calls::default();
    record_everything(&mut client, &calls);

    client.sample(StreamParams::new(), None).await.unwrap();

    assert_eq!(calls.take(), vec!["limit 1234", "anything"]);
}

#[tokio::test]
async fn test_each_known_kind_reaches_its_handler() {
    let (mut client, _) = scripted(vec![
        line(r#"{"scrub_geo":{"user_id":14090452,"up_to_status_id":23260136625}}"#),
        line(r#"{"direct_message":{"id":1,"text":"psst","sender":{"id":2,"screen_name":"al"}}}"#),
        line(r#"{"warning":{"code":"FALLING_BEHIND","message":"behind","percent_full":60}}"#),
        line(r#"{"friends":[1,2,3]}"#),
        line(r#"{"status_withheld":{"id":9,"user_id":3,"withheld_in_countries":["DE"]}}"#),
        line(r#"{"user_withheld":{"id":7,"withheld_in_countries":["DE"]}}"#),
    ]);
    let calls = Calls::default();
    record_everything(&mut client, &calls);

    client.userstream(StreamParams::new(), None).await.unwrap();

    assert_eq!(
        calls.take(),
        vec![
            "scrub_geo 23260136625",
            "anything",
            "dm psst",
            "anything",
            "stall FALLING_BEHIND",
            "anything",
            "friends [1, 2, 3]",
            "anything",
            "status_withheld 9",
            "anything",
            "user_withheld 7",
            "anything",
        ]
    );
}

#[tokio::test]
async fn test_timeline_status_reaches_handler_and_block() {
    let (mut client, _) = scripted(vec![
        TransportEvent::Connected,
        line(r#"{"text":"hi","user":{"screen_name":"bob"}}"#),
    ]);
    let seen = Calls::default();

    let handler_seen = seen.clone();
    client.on_timeline_status(Callback::new(move |status: Status| {
        handler_seen.push(format!(
            "handler {} {}",
            status.text,
            status.user.screen_name.unwrap_or_default()
        ));
    }));
    let block_seen = seen.clone();
    let block = Callback::new(move |item: StreamItem| {
        let status = item.as_status().expect("block should receive a status");
        block_seen.push(format!(
            "block {} {}",
            status.text,
            status.user.screen_name.as_deref().unwrap_or_default()
        ));
    });

    let last = client.track(["hi"], Some(block)).await.unwrap();

    assert_eq!(seen.take(), vec!["handler hi bob", "block hi bob"]);
    assert_eq!(last.map(|s| s.text), Some("hi".to_string()));
}

#[tokio::test]
async fn test_malformed_json_reports_and_keeps_streaming() {
    let (mut client, transport) = scripted(vec![
        TransportEvent::Connected,
        line(r#"{"text":"broken"#),
        line(r#"{"limit":{"track":5}}"#),
    ]);
    let calls = Calls::default();

    let c = calls.clone();
    client.on_error(Callback::with_session(move |message: String, session: &SessionHandle| {
        c.push(format!("{:?}: {}", session.state(), message));
    }));
    let c = calls.clone();
    client.on_limit(Callback::new(move |n: LimitNotice| c.push(format!("limit {}", n.track))));

    client.sample(StreamParams::new(), None).await.unwrap();

    assert_eq!(
        calls.take(),
        vec![
            r#"Streaming: JSON decode error in stream: {"text":"broken"#.to_string(),
            "limit 5".to_string(),
        ]
    );
    assert_eq!(transport.opened_requests().len(), 1);
}

#[tokio::test]
async fn test_non_object_payload_is_an_error() {
    let (mut client, _) = scripted(vec![line("[1,2,3]"), line("42")]);
    let calls = Calls::default();
    record_everything(&mut client, &calls);

    client.sample(StreamParams::new(), None).await.unwrap();

    assert_eq!(
        calls.take(),
        vec![
            "error Unexpected JSON object in stream: [1,2,3]",
            "error Unexpected JSON object in stream: 42",
        ]
    );
}

#[tokio::test]
async fn test_unclassified_object_only_reaches_anything() {
    let (mut client, _) = scripted(vec![line(r#"{"something":"new"}"#)]);
    let calls = Calls::default();
    record_everything(&mut client, &calls);

    client.sample(StreamParams::new(), None).await.unwrap();

    assert_eq!(calls.take(), vec!["anything"]);
}

#[tokio::test]
async fn test_malformed_known_kind_reports_then_reaches_anything() {
    let (mut client, _) = scripted(vec![line(r#"{"delete":{"status":{"id":"abc"}}}"#)]);
    let calls = Calls::default();
    record_everything(&mut client, &calls);

    client.sample(StreamParams::new(), None).await.unwrap();

    let calls = calls.take();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].starts_with("error Malformed delete message"), "{:?}", calls);
    assert_eq!(calls[1], "anything");
}

#[tokio::test]
async fn test_overwritten_handler_replaces_previous() {
    let (mut client, _) = scripted(vec![line("not json")]);
    let calls = Calls::default();

    let c = calls.clone();
    client.on_error(Callback::new(move |_: String| c.push("A")));
    let c = calls.clone();
    client.on_error(Callback::new(move |_: String| c.push("B")));

    client.sample(StreamParams::new(), None).await.unwrap();

    assert_eq!(calls.take(), vec!["B"]);
}

#[tokio::test]
async fn test_per_stream_overrides_apply_to_that_stream_only() {
    let (mut client, transport) = scripted(vec![
        line(r#"{"limit":{"track":1}}"#),
        line(r#"{"delete":{"status":{"id":7,"user_id":1}}}"#),
    ]);
    transport.push_events(vec![
        line(r#"{"limit":{"track":2}}"#),
        line(r#"{"delete":{"status":{"id":8,"user_id":1}}}"#),
    ]);
    let calls = Calls::default();

    let c = calls.clone();
    client.on_limit(Callback::new(move |n: LimitNotice| c.push(format!("client limit {}", n.track))));
    let c = calls.clone();
    client.on_delete(Callback::new(move |n: DeleteNotice| c.push(format!("client delete {}", n.status_id))));

    let mut overrides = CallbackRegistry::new();
    let c = calls.clone();
    overrides.on_limit(Callback::new(move |n: LimitNotice| c.push(format!("override limit {}", n.track))));

    client
        .connect_with(Endpoint::Sample, StreamParams::new(), overrides, None)
        .await
        .unwrap();
    assert_eq!(calls.take(), vec!["override limit 1", "client delete 7"]);

    client.sample(StreamParams::new(), None).await.unwrap();
    assert_eq!(calls.take(), vec!["client limit 2", "client delete 8"]);
}

#[tokio::test]
async fn test_session_handler_receives_dispatching_session() {
    let (mut client, _) = scripted(vec![line(r#"{"limit":{"track":1}}"#)]);
    let received: Arc<Mutex<Option<SessionHandle>>> = Arc::default();

    let slot = Arc::clone(&received);
    client.on_limit(Callback::with_session(move |_: LimitNotice, session: &SessionHandle| {
        *slot.lock() = Some(session.clone());
    }));

    let session = client.session(tweetstream::Endpoint::Sample, StreamParams::new(), None);
    let handle = session.handle();
    session.run().await.unwrap();

    assert_eq!(received.lock().clone(), Some(handle));
}

#[tokio::test]
async fn test_max_reconnects_is_fatal() {
    let (mut client, transport) = scripted(vec![
        TransportEvent::Connected,
        line(r#"{"text":"before","user":{}}"#),
        TransportEvent::MaxReconnects {
            timeout: Duration::from_secs(30),
            retries: 20,
        },
        line(r#"{"text":"never","user":{}}"#),
    ]);
    let calls = Calls::default();
    record_everything(&mut client, &calls);

    let result = client.sample(StreamParams::new(), None).await;

    match result {
        Err(StreamError::Reconnect(err)) => {
            assert_eq!(
                err,
                ReconnectError {
                    timeout: Duration::from_secs(30),
                    retries: 20,
                }
            );
            assert_eq!(err.to_string(), "Failed to reconnect after 20 tries.");
        }
        other => panic!("expected reconnect error, got {:?}", other),
    }
    assert_eq!(calls.take(), vec!["status before", "anything"]);

    let session = client.current_session().unwrap();
    assert_eq!(session.state(), SessionState::Terminated);
    assert!(transport.was_closed(0));
}

#[tokio::test]
async fn test_transport_signals_reach_their_handlers() {
    let (mut client, _) = scripted(vec![
        TransportEvent::Unauthorized,
        TransportEvent::EnhanceYourCalm,
        TransportEvent::Error("Connection failed: refused".to_string()),
        TransportEvent::Reconnect {
            timeout: Duration::from_millis(250),
            retries: 1,
        },
        TransportEvent::Connected,
        TransportEvent::NoDataReceived,
    ]);
    let calls = Calls::default();

    let c = calls.clone();
    client.on_unauthorized(Callback::new(move |()| c.push("unauthorized")));
    let c = calls.clone();
    client.on_enhance_your_calm(Callback::new(move |()| c.push("calm")));
    let c = calls.clone();
    client.on_error(Callback::new(move |m: String| c.push(format!("error {}", m))));
    let c = calls.clone();
    client.on_reconnect(Callback::with_session(move |n: ReconnectNotice, s: &SessionHandle| {
        c.push(format!(
            "reconnect {} {}ms {:?} {}",
            n.retries,
            n.timeout.as_millis(),
            s.state(),
            s.reconnect_attempts()
        ));
    }));
    let c = calls.clone();
    client.on_inited(Callback::with_session(move |(), s: &SessionHandle| {
        c.push(format!("inited {:?} {}", s.state(), s.reconnect_attempts()));
    }));
    let c = calls.clone();
    client.on_no_data_received(Callback::new(move |()| c.push("no data")));

    client.sample(StreamParams::new(), None).await.unwrap();

    assert_eq!(
        calls.take(),
        vec![
            "unauthorized",
            "calm",
            "error Connection failed: refused",
            "reconnect 1 250ms Reconnecting 1",
            "inited Streaming 0",
            "no data",
        ]
    );
}

#[tokio::test]
async fn test_named_events_dispatch_by_name() {
    let (mut client, _) = scripted(vec![
        line(r#"{"event":"favorite","source":{"id":1,"screen_name":"al"},"target":{"id":2},"target_object":{"id":3}}"#),
        line(r#"{"event":"follow","source":{"id":1},"target":{"id":2}}"#),
    ]);
    let calls = Calls::default();

    let c = calls.clone();
    client.on_event(
        "favorite",
        Callback::new(move |e: UserEvent| {
            let source = e.source.and_then(|u| u.screen_name).unwrap_or_default();
            c.push(format!("{} by {}", e.event, source));
        }),
    );
    let c = calls.clone();
    client.on_anything(Callback::new(move |v: Value| c.push(format!("anything {}", v["event"]))));

    client.userstream(StreamParams::new(), None).await.unwrap();

    assert_eq!(
        calls.take(),
        vec![
            "favorite by al",
            "anything \"favorite\"",
            "anything \"follow\"",
        ]
    );
}

#[tokio::test]
async fn test_for_user_messages_reach_the_block() {
    let (client, _) = scripted(vec![
        line(r#"{"for_user":1888,"message":{"text":"hello","user":{"id":2}}}"#),
        line(r#"{"for_user":"1888","message":{"friends":[4,5]}}"#),
    ]);
    let items: Arc<Mutex<Vec<StreamItem>>> = Arc::default();

    let sink = Arc::clone(&items);
    let block = Callback::new(move |item: StreamItem| sink.lock().push(item));
    let last = client
        .sitestream(1888u64, StreamParams::new(), Some(block))
        .await
        .unwrap();

    let items = items.lock();
    assert_eq!(items.len(), 2);
    let first = items[0].as_for_user().unwrap();
    assert_eq!(first.for_user, "1888");
    assert_eq!(first.status().map(|s| s.text), Some("hello".to_string()));
    assert!(items[1].as_for_user().unwrap().status().is_none());
    // Wrapped statuses are not timeline statuses
    assert!(last.is_none());
}

#[tokio::test]
async fn test_stop_stream_from_handler_ends_after_current_message() {
    let (mut client, transport) = scripted(vec![
        TransportEvent::Connected,
        line(r#"{"text":"one","user":{}}"#),
        line(r#"{"text":"two","user":{}}"#),
    ]);
    let calls = Calls::default();

    let c = calls.clone();
    client.on_timeline_status(Callback::with_session(move |s: Status, session: &SessionHandle| {
        c.push(s.text);
        session.stop_stream();
    }));
    let c = calls.clone();
    client.on_anything(Callback::new(move |_: Value| c.push("anything")));

    let last = client.sample(StreamParams::new(), None).await.unwrap();

    assert_eq!(calls.take(), vec!["one", "anything"]);
    assert_eq!(last.map(|s| s.text), Some("one".to_string()));
    assert!(transport.was_closed(0));
    assert!(!client.reactor().is_stopped());
}

#[tokio::test]
async fn test_stop_returns_last_status_and_stops_reactor() {
    let (mut client, _) = scripted(vec![
        line(r#"{"text":"first","user":{}}"#),
        line(r#"{"text":"last","user":{}}"#),
        line(r#"{"limit":{"track":1}}"#),
    ]);
    let returned: Arc<Mutex<Option<Status>>> = Arc::default();

    let slot = Arc::clone(&returned);
    client.on_limit(Callback::with_session(move |_: LimitNotice, session: &SessionHandle| {
        *slot.lock() = session.stop();
    }));

    client.sample(StreamParams::new(), None).await.unwrap();

    assert_eq!(returned.lock().as_ref().map(|s| s.text.as_str()), Some("last"));
    assert!(client.reactor().is_stopped());
}

#[tokio::test]
async fn test_close_connection_from_outside() {
    let transport = ScriptedTransport::new();
    let feed = transport.push_live();
    let client = StreamClient::with_transport(StreamConfig::default(), Arc::new(transport.clone()));

    let session = client.session(tweetstream::Endpoint::Sample, StreamParams::new(), None);
    let handle = session.handle();
    let task = tokio::spawn(session.run());

    feed.send(TransportEvent::Connected).unwrap();
    feed.send(line(r#"{"text":"kept","user":{}}"#)).unwrap();
    while handle.last_status().is_none() {
        tokio::task::yield_now().await;
    }

    client.close_connection();
    let result = timeout(Duration::from_secs(1), task)
        .await
        .expect("session should end after close_connection")
        .unwrap();

    assert_eq!(result.unwrap().map(|s| s.text), Some("kept".to_string()));
    assert_eq!(handle.state(), SessionState::Terminated);
    assert!(transport.was_closed(0));
    assert!(!client.reactor().is_stopped());
}

#[tokio::test]
async fn test_stop_stream_leaves_sibling_sessions_running() {
    let transport = ScriptedTransport::new();
    let _feed_a = transport.push_live();
    let _feed_b = transport.push_live();
    let client = StreamClient::with_transport(StreamConfig::default(), Arc::new(transport.clone()));

    let a = client.session(tweetstream::Endpoint::Sample, StreamParams::new(), None);
    let b = client.session(tweetstream::Endpoint::Sample, StreamParams::new(), None);
    let (handle_a, handle_b) = (a.handle(), b.handle());
    let task_a = tokio::spawn(a.run());
    let task_b = tokio::spawn(b.run());

    handle_a.stop_stream();
    timeout(Duration::from_secs(1), task_a)
        .await
        .expect("stopped session should end")
        .unwrap()
        .unwrap();
    assert_eq!(handle_a.state(), SessionState::Terminated);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!task_b.is_finished());
    assert_ne!(handle_b.state(), SessionState::Terminated);

    client.reactor().stop();
    timeout(Duration::from_secs(1), task_b)
        .await
        .expect("reactor stop should end every session")
        .unwrap()
        .unwrap();
    assert_eq!(handle_b.state(), SessionState::Terminated);
}

#[test]
fn test_start_blocks_until_stream_ends() {
    let (client, transport) = scripted(vec![
        TransportEvent::Connected,
        line(r#"{"text":"blocking","user":{"screen_name":"bob"}}"#),
    ]);

    let last = client
        .start(tweetstream::Endpoint::Firehose, StreamParams::new(), None)
        .unwrap();

    assert_eq!(last.map(|s| s.text), Some("blocking".to_string()));
    assert_eq!(
        transport.last_request().unwrap().path,
        "/1.1/statuses/firehose.json"
    );
}
