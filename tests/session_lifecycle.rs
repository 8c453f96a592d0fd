//! Scenario tests: join, render cycles, event dispatch, redirect, close.

use std::sync::Arc;

use serde_json::{Value, json};

use livedata::test_harness::TestClient;
use livedata::test_harness::views::{CounterView, RedirectView};
use livedata::{
    Assigns, CloseReason, EventOutcome, RedirectPayload, Rendered, ReplyStatus, RouteTarget,
    Router, Socket, View, ViewError,
};

fn counter_router() -> Arc<Router> {
    let mut router = Router::new();
    router
        .route("counter", |_params| {
            Some(RouteTarget::new(Arc::new(CounterView)))
        })
        .unwrap();
    router
        .route("redirector", |_params| {
            Some(RouteTarget::new(Arc::new(RedirectView)))
        })
        .unwrap();
    Arc::new(router)
}

#[test]
fn initial_render_delivers_the_counter_document() {
    let (mut client, reply) = TestClient::join(counter_router(), "dv:c:counter").unwrap();
    assert_eq!(reply.status, ReplyStatus::Ok);
    assert_eq!(reply.payload, json!({}));

    let patch = client.recv_patch().unwrap();
    assert_eq!(patch.c, 0);
    assert_eq!(patch.o, vec![json!(1), json!("/r"), json!({"counter": 0})]);
    assert!(patch.f.is_none());
    assert_eq!(client.document(), json!({"counter": 0}));
}

#[test]
fn server_info_increments_with_flash_and_push_event() {
    let (mut client, _reply) = TestClient::join(counter_router(), "dv:c:counter").unwrap();
    client.recv_patch().unwrap();

    client.send_info(json!("increment")).unwrap();

    let patch = client.recv_patch().unwrap();
    assert_eq!(patch.c, 1);
    assert_eq!(patch.o, vec![json!(2), json!("/r/counter"), json!(1)]);
    assert_eq!(
        patch.f.as_ref().and_then(|f| f.get("info")),
        Some(&json!("Incremented!"))
    );
    assert_eq!(client.document(), json!({"counter": 1}));

    // Push-events trail the patch, in insertion order.
    let event = client.recv_event().unwrap();
    assert_eq!(event.event, "chart");
    assert_eq!(event.payload, json!({}));

    // The scratch is reset after the flush.
    assert!(client.get_events().unwrap().is_empty());
    assert!(client.get_flash().unwrap().is_empty());
}

#[test]
fn client_event_increments_without_flash() {
    let (mut client, _reply) = TestClient::join(counter_router(), "dv:c:counter").unwrap();
    client.recv_patch().unwrap();

    client.send_info(json!("increment")).unwrap();
    client.recv_patch().unwrap();
    client.recv_event().unwrap();

    client.send_event("increment", json!({})).unwrap();
    let patch = client.recv_patch().unwrap();
    assert_eq!(patch.c, 2);
    assert_eq!(patch.o, vec![json!(2), json!("/r/counter"), json!(2)]);
    assert!(patch.f.is_none());
    assert_eq!(client.document(), json!({"counter": 2}));

    client.ping().unwrap();
    assert!(client.try_recv().is_none());
}

#[test]
fn event_replies_follow_the_patch() {
    let (mut client, _reply) = TestClient::join(counter_router(), "dv:c:counter").unwrap();
    client.recv_patch().unwrap();

    let msg_ref = client.send_event("current", json!({})).unwrap();
    let patch = client.recv_patch().unwrap();
    assert!(patch.o.is_empty());

    let reply = client.recv_reply().unwrap();
    assert_eq!(reply.msg_ref.as_deref(), Some(msg_ref.as_str()));
    assert_eq!(reply.status, ReplyStatus::Ok);
    assert_eq!(reply.payload, json!({"counter": 0}));
}

#[test]
fn info_heartbeats_advance_the_cycle_counter() {
    let (mut client, _reply) = TestClient::join(counter_router(), "dv:c:counter").unwrap();
    assert_eq!(client.recv_patch().unwrap().c, 0);

    for expected in 1i64..=3 {
        client.send_info(json!("noop")).unwrap();
        let patch = client.recv_patch().unwrap();
        assert_eq!(patch.c, expected);
        assert!(patch.o.is_empty());
    }
}

#[test]
fn render_sync_barrier_forces_a_cycle() {
    let (mut client, _reply) = TestClient::join(counter_router(), "dv:c:counter").unwrap();
    assert_eq!(client.recv_patch().unwrap().c, 0);

    assert_eq!(client.render_sync().unwrap(), 1);
    let patch = client.recv_patch().unwrap();
    assert_eq!(patch.c, 1);
    assert!(patch.o.is_empty());
}

#[test]
fn unknown_route_refuses_the_join() {
    let (client, reply) = TestClient::join(counter_router(), "dv:c:missing").unwrap();
    assert_eq!(reply.status, ReplyStatus::Error);
    assert_eq!(reply.payload, json!({"reason": "no_route"}));
    assert_eq!(client.close_reason(), Some(CloseReason::Closed));
}

#[test]
fn leave_stops_the_session_cleanly() {
    let (mut client, _reply) = TestClient::join(counter_router(), "dv:c:counter").unwrap();
    client.recv_patch().unwrap();
    client.leave().unwrap();
    assert_eq!(client.close_reason(), Some(CloseReason::Closed));
}

#[test]
fn unhandled_event_crashes_the_session() {
    let (mut client, _reply) = TestClient::join(counter_router(), "dv:c:counter").unwrap();
    client.recv_patch().unwrap();
    client.send_event("no_such_event", json!({})).unwrap();
    client.recv_close().unwrap();
    match client.close_reason() {
        Some(CloseReason::Crash(reason)) => assert!(reason.contains("no_such_event")),
        other => panic!("expected crash close, got {other:?}"),
    }
}

#[test]
fn redirect_with_outstanding_reply_rides_the_reply() {
    let (mut client, _reply) = TestClient::join(counter_router(), "dv:c:redirector").unwrap();
    client.recv_patch().unwrap();

    let msg_ref = client.send_event("go", json!({})).unwrap();
    let reply = client.recv_reply().unwrap();
    assert_eq!(reply.msg_ref.as_deref(), Some(msg_ref.as_str()));
    assert_eq!(reply.status, ReplyStatus::Ok);
    assert_eq!(reply.payload, json!({"redirect": {"to": "/next"}}));

    client.recv_close().unwrap();
    assert_eq!(
        client.close_reason(),
        Some(CloseReason::Redirect(RedirectPayload::Local {
            to: "/next".to_string()
        }))
    );
}

#[test]
fn redirect_without_reply_is_pushed() {
    let (mut client, _reply) = TestClient::join(counter_router(), "dv:c:redirector").unwrap();
    client.recv_patch().unwrap();

    client.send_event_no_ref("external", json!({})).unwrap();
    assert_eq!(
        client.recv_redirect().unwrap(),
        RedirectPayload::External {
            external: "https://example.com/away".to_string()
        }
    );
    client.recv_close().unwrap();
    match client.close_reason() {
        Some(CloseReason::Redirect(RedirectPayload::External { external })) => {
            assert_eq!(external, "https://example.com/away");
        }
        other => panic!("expected external redirect close, got {other:?}"),
    }
}

/// View that mirrors arbitrary event payloads into assigns, for checking
/// that the applied patch stream reproduces the rendered document.
struct MirrorView;

impl View for MirrorView {
    fn handle_event(
        &self,
        event: &str,
        payload: &Value,
        mut socket: Socket,
    ) -> Result<EventOutcome, ViewError> {
        match event {
            "put" => {
                if let Value::Object(entries) = payload {
                    for (key, value) in entries {
                        socket.assign(key, value.clone())?;
                    }
                }
                Ok(EventOutcome::NoReply(socket))
            }
            other => Err(ViewError::UnhandledEvent {
                event: other.to_string(),
            }),
        }
    }

    fn render(&self, assigns: &Assigns) -> Result<Rendered, ViewError> {
        Ok(Rendered::object(assigns.iter().map(|(key, value)| {
            (key.as_str().to_string(), Rendered::Value(value.clone()))
        })))
    }
}

#[test]
fn patch_stream_reproduces_the_server_document() {
    let mut router = Router::new();
    router
        .route("mirror", |_params| {
            Some(RouteTarget::new(Arc::new(MirrorView)))
        })
        .unwrap();
    let (mut client, _reply) = TestClient::join(Arc::new(router), "dv:c:mirror").unwrap();
    client.recv_patch().unwrap();
    assert_eq!(client.document(), json!({}));

    let steps = [
        json!({"a": 1, "b": {"x": [1, 2, 3]}}),
        json!({"a": 2}),
        json!({"b": {"x": [1], "y": "deep"}, "c": null}),
        json!({"a": null, "c": {"nested": {"k": true}}}),
    ];
    for step in steps {
        client.send_event("put", step).unwrap();
        client.recv_patch().unwrap();
    }

    // Nulls are elided from the rendered tree, so `a` and the null `c`
    // write surface as removes and the document converges to the render.
    assert_eq!(
        client.document(),
        json!({"b": {"x": [1], "y": "deep"}, "c": {"nested": {"k": true}}})
    );
}
