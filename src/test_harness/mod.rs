//! Deterministic driving harness for session tests.
//!
//! `TestClient` plays the part of the client runtime: it joins a route,
//! feeds events and infos into the session mailbox, and applies every
//! received patch to a local document the way the wire contract
//! prescribes (ops target the `{"r": …}`-wrapped tree; the wrapper is
//! stripped on read).

mod apply;
pub mod views;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{Receiver, Sender, unbounded};
use serde_json::{Value, json};
use thiserror::Error;

pub use apply::{ApplyError, apply_ops};

use crate::config::Limits;
use crate::patch::{PatchCodecError, decompress};
use crate::router::Router;
use crate::session::SessionError;
use crate::session::actor::CloseReason;
use crate::session::runtime::{SessionHandle, Transport, TransportError, spawn_session};
use crate::socket::PushEvent;
use crate::wire::{
    EventFrame, JoinParams, PatchPayload, RedirectPayload, ReplyFrame, ServerEnvelope, Topic,
    WireError,
};

const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const BARRIER_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("no envelope within {0:?}")]
    RecvTimeout(Duration),
    #[error("expected {expected} envelope, got {got:?}")]
    UnexpectedEnvelope {
        expected: &'static str,
        got: Box<ServerEnvelope>,
    },
    #[error(transparent)]
    Apply(#[from] ApplyError),
    #[error(transparent)]
    Patch(#[from] PatchCodecError),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Channel-backed transport capturing everything the session emits.
pub struct TestTransport {
    tx: Sender<ServerEnvelope>,
}

impl TestTransport {
    pub fn pair() -> (Arc<Self>, Receiver<ServerEnvelope>) {
        let (tx, rx) = unbounded();
        (Arc::new(Self { tx }), rx)
    }
}

impl Transport for TestTransport {
    fn send(&self, envelope: ServerEnvelope) -> Result<(), TransportError> {
        self.tx.send(envelope).map_err(|_| TransportError::Closed)
    }
}

pub struct TestClient {
    handle: SessionHandle,
    rx: Receiver<ServerEnvelope>,
    /// The wrapped client document; patches apply here verbatim.
    doc: Value,
    limits: Limits,
    next_ref: u64,
}

impl TestClient {
    /// Join a route and return the client together with the join reply.
    pub fn join(router: Arc<Router>, topic: &str) -> Result<(Self, ReplyFrame), HarnessError> {
        Self::join_with_params(router, topic, JoinParams::default())
    }

    pub fn join_with_params(
        router: Arc<Router>,
        topic: &str,
        params: JoinParams,
    ) -> Result<(Self, ReplyFrame), HarnessError> {
        let limits = Limits::default();
        let topic = Topic::parse(topic, &limits)?;
        let (transport, rx) = TestTransport::pair();
        let handle = spawn_session(topic, router, limits.clone(), transport)?;
        handle.join(params, Some("1".to_string()), Some("1".to_string()))?;

        let mut client = Self {
            handle,
            rx,
            doc: json!({}),
            limits,
            next_ref: 1,
        };
        let reply = client.recv_reply()?;
        Ok((client, reply))
    }

    /// Next raw envelope from the session.
    pub fn recv(&mut self) -> Result<ServerEnvelope, HarnessError> {
        self.rx
            .recv_timeout(RECV_TIMEOUT)
            .map_err(|_| HarnessError::RecvTimeout(RECV_TIMEOUT))
    }

    /// A non-blocking look at the stream, for asserting silence. Run a
    /// `ping` first so the mailbox is drained.
    pub fn try_recv(&mut self) -> Option<ServerEnvelope> {
        self.rx.try_recv().ok()
    }

    /// Expect a patch envelope; decompress and apply it to the local
    /// document, then hand the payload back.
    pub fn recv_patch(&mut self) -> Result<PatchPayload, HarnessError> {
        match self.recv()? {
            ServerEnvelope::Patch(frame) => {
                let ops = decompress(&frame.payload.o, &self.limits)?;
                apply_ops(&mut self.doc, &ops)?;
                Ok(frame.payload)
            }
            other => Err(HarnessError::UnexpectedEnvelope {
                expected: "patch",
                got: Box::new(other),
            }),
        }
    }

    pub fn recv_reply(&mut self) -> Result<ReplyFrame, HarnessError> {
        match self.recv()? {
            ServerEnvelope::Reply(reply) => Ok(reply),
            other => Err(HarnessError::UnexpectedEnvelope {
                expected: "reply",
                got: Box::new(other),
            }),
        }
    }

    pub fn recv_event(&mut self) -> Result<EventFrame, HarnessError> {
        match self.recv()? {
            ServerEnvelope::Event(frame) => Ok(frame),
            other => Err(HarnessError::UnexpectedEnvelope {
                expected: "event",
                got: Box::new(other),
            }),
        }
    }

    pub fn recv_redirect(&mut self) -> Result<RedirectPayload, HarnessError> {
        match self.recv()? {
            ServerEnvelope::Redirect(frame) => Ok(frame.payload),
            other => Err(HarnessError::UnexpectedEnvelope {
                expected: "redirect",
                got: Box::new(other),
            }),
        }
    }

    pub fn recv_close(&mut self) -> Result<(), HarnessError> {
        match self.recv()? {
            ServerEnvelope::Close(_) => Ok(()),
            other => Err(HarnessError::UnexpectedEnvelope {
                expected: "close",
                got: Box::new(other),
            }),
        }
    }

    /// The document as the client sees it, wrapper stripped.
    pub fn document(&self) -> Value {
        self.doc.get("r").cloned().unwrap_or(Value::Null)
    }

    /// Send a client event with a fresh ref; returns the ref used.
    pub fn send_event(&mut self, name: &str, payload: Value) -> Result<String, HarnessError> {
        self.next_ref += 1;
        let msg_ref = self.next_ref.to_string();
        self.handle.client_event(
            name,
            payload,
            Some(msg_ref.clone()),
            Some("1".to_string()),
        )?;
        Ok(msg_ref)
    }

    /// Send a client event carrying no reply ref.
    pub fn send_event_no_ref(&self, name: &str, payload: Value) -> Result<(), HarnessError> {
        self.handle.client_event(name, payload, None, None)?;
        Ok(())
    }

    pub fn send_info(&self, message: Value) -> Result<(), HarnessError> {
        self.handle.send_info(message)?;
        Ok(())
    }

    pub fn leave(&self) -> Result<(), HarnessError> {
        self.handle.leave()?;
        Ok(())
    }

    pub fn ping(&self) -> Result<(), HarnessError> {
        self.handle.ping(BARRIER_TIMEOUT)?;
        Ok(())
    }

    pub fn render_sync(&self) -> Result<i64, HarnessError> {
        Ok(self.handle.render_sync(BARRIER_TIMEOUT)?)
    }

    pub fn get_events(&self) -> Result<Vec<PushEvent>, HarnessError> {
        Ok(self.handle.get_events(BARRIER_TIMEOUT)?)
    }

    pub fn get_flash(&self) -> Result<BTreeMap<String, Value>, HarnessError> {
        Ok(self.handle.get_flash(BARRIER_TIMEOUT)?)
    }

    /// Wait for the session to stop and report why. Keeps the transport
    /// open until the thread has exited.
    pub fn close_reason(self) -> Option<CloseReason> {
        let TestClient { handle, rx, .. } = self;
        let reason = handle.close_reason();
        drop(rx);
        reason
    }
}
