//! Per-subscription session state machine.
//!
//! The actor is pure with respect to its transport: every inbound message
//! folds into a list of `SessionAction`s the runtime carries out. One
//! render cycle follows every handler, and its outbound envelopes are
//! emitted atomically in the order patch, push-events, reply.

use std::collections::BTreeMap;
use std::sync::Arc;

use crossbeam::channel::Sender;
use serde_json::{Value, json};

use crate::config::Limits;
use crate::patch;
use crate::render::render_view;
use crate::router::Router;
use crate::session::assign_async::{AsyncEnvelope, AsyncOutcome, AsyncResult};
use crate::session::lifecycle::run_on_mount;
use crate::socket::{Endpoint, PushEvent, SessionId, Socket};
use crate::view::{EventOutcome, SessionMeta, View};
use crate::wire::{JoinParams, PatchPayload, RedirectPayload, ReplyStatus, ServerEnvelope, Topic};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Init,
    Mounting,
    Ready,
    Terminated,
}

/// Inbound envelopes the actor consumes.
#[derive(Debug)]
pub enum Inbound {
    Join {
        params: JoinParams,
        msg_ref: Option<String>,
        join_ref: Option<String>,
    },
    ClientEvent {
        event: String,
        payload: Value,
        msg_ref: Option<String>,
        join_ref: Option<String>,
    },
    AsyncResult(AsyncEnvelope),
    /// Arbitrary server-side message, dispatched to `handle_info`.
    Info(Value),
    Leave,
    TransportDown,
}

/// Synchronous test barriers, answered through bounded reply channels.
#[derive(Debug)]
pub enum Barrier {
    Ping(Sender<()>),
    RenderSync(Sender<i64>),
    GetEvents(Sender<Vec<PushEvent>>),
    GetFlash(Sender<BTreeMap<String, Value>>),
}

#[derive(Debug)]
pub enum SessionMessage {
    Inbound(Inbound),
    Barrier(Barrier),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CloseReason {
    /// Transport gone or client leave.
    Closed,
    Redirect(RedirectPayload),
    /// A user callback failed. Sessions are restart-temporary: the crash
    /// is logged, the client observes the close, nothing restarts.
    Crash(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    Send(ServerEnvelope),
    Close(CloseReason),
}

pub struct SessionActor {
    topic: Topic,
    session_id: SessionId,
    router: Arc<Router>,
    limits: Limits,
    self_tx: Sender<SessionMessage>,
    phase: SessionPhase,
    view: Option<Arc<dyn View>>,
    socket: Option<Socket>,
    join_ref: Option<String>,
    render_count: i64,
    last_rendered: Option<Value>,
}

impl SessionActor {
    pub fn new(
        topic: Topic,
        router: Arc<Router>,
        limits: Limits,
        self_tx: Sender<SessionMessage>,
    ) -> Self {
        Self {
            topic,
            session_id: SessionId::new(),
            router,
            limits,
            self_tx,
            phase: SessionPhase::Init,
            view: None,
            socket: None,
            join_ref: None,
            render_count: -1,
            last_rendered: None,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn render_count(&self) -> i64 {
        self.render_count
    }

    pub fn handle(&mut self, msg: Inbound) -> Vec<SessionAction> {
        if self.phase == SessionPhase::Terminated {
            return Vec::new();
        }
        match msg {
            Inbound::Join {
                params,
                msg_ref,
                join_ref,
            } => self.handle_join(params, msg_ref, join_ref),
            Inbound::ClientEvent {
                event,
                payload,
                msg_ref,
                join_ref,
            } => self.handle_client_event(event, payload, msg_ref, join_ref),
            Inbound::AsyncResult(envelope) => self.handle_async_result(envelope),
            Inbound::Info(message) => self.handle_info(message),
            Inbound::Leave | Inbound::TransportDown => {
                self.phase = SessionPhase::Terminated;
                vec![SessionAction::Close(CloseReason::Closed)]
            }
        }
    }

    pub fn answer_barrier(&mut self, barrier: Barrier) -> Vec<SessionAction> {
        match barrier {
            Barrier::Ping(reply) => {
                let _ = reply.send(());
                Vec::new()
            }
            Barrier::RenderSync(reply) => {
                let actions = if self.phase == SessionPhase::Ready {
                    self.render_cycle(None)
                } else {
                    Vec::new()
                };
                let _ = reply.send(self.render_count);
                actions
            }
            Barrier::GetEvents(reply) => {
                let events = self
                    .socket
                    .as_ref()
                    .map(|socket| socket.get_push_events().to_vec())
                    .unwrap_or_default();
                let _ = reply.send(events);
                Vec::new()
            }
            Barrier::GetFlash(reply) => {
                let flash = self
                    .socket
                    .as_ref()
                    .map(|socket| socket.get_flash().clone())
                    .unwrap_or_default();
                let _ = reply.send(flash);
                Vec::new()
            }
        }
    }

    fn handle_join(
        &mut self,
        params: JoinParams,
        msg_ref: Option<String>,
        join_ref: Option<String>,
    ) -> Vec<SessionAction> {
        if self.phase != SessionPhase::Init {
            tracing::warn!(topic = %self.topic, "duplicate join ignored");
            return Vec::new();
        }

        let params_value = serde_json::to_value(&params).unwrap_or(Value::Null);
        let Some(target) = self.router.resolve(&self.topic, &params_value) else {
            tracing::debug!(topic = %self.topic, "join refused: no route");
            self.phase = SessionPhase::Terminated;
            return vec![
                SessionAction::Send(ServerEnvelope::reply(
                    msg_ref,
                    join_ref,
                    &self.topic,
                    ReplyStatus::Error,
                    json!({"reason": "no_route"}),
                )),
                SessionAction::Close(CloseReason::Closed),
            ];
        };

        self.phase = SessionPhase::Mounting;
        self.join_ref = join_ref.clone();

        let endpoint = Endpoint::new(self.topic.clone(), self.session_id);
        let socket = Socket::new(endpoint, target.on_mount, Some(self.self_tx.clone()));
        let meta = SessionMeta {
            id: self.session_id,
            topic: self.topic.clone(),
            caller: params.caller.clone(),
            opts: target.opts.clone(),
        };

        let (socket, halted) = match run_on_mount(&params_value, &meta, socket) {
            Ok(outcome) => outcome,
            Err(err) => return self.crash("on_mount hook", err),
        };

        let socket = if !halted && target.view.exports_mount() {
            match target.view.mount(&params.p, socket) {
                Ok(socket) => socket,
                Err(err) => return self.crash("mount", err),
            }
        } else {
            socket
        };

        if let Some(opts) = socket.redirected().cloned() {
            return self.redirect_actions(opts, msg_ref, join_ref);
        }

        self.view = Some(target.view);
        self.socket = Some(socket);
        self.phase = SessionPhase::Ready;
        tracing::info!(topic = %self.topic, session = %self.session_id, "session mounted");

        // The ok reply always precedes the first patch envelope.
        let mut actions = vec![SessionAction::Send(ServerEnvelope::reply(
            msg_ref,
            join_ref,
            &self.topic,
            ReplyStatus::Ok,
            json!({}),
        ))];
        actions.extend(self.render_cycle(None));
        actions
    }

    fn handle_client_event(
        &mut self,
        event: String,
        payload: Value,
        msg_ref: Option<String>,
        join_ref: Option<String>,
    ) -> Vec<SessionAction> {
        if self.phase != SessionPhase::Ready {
            tracing::warn!(topic = %self.topic, event, "event before ready ignored");
            return Vec::new();
        }
        if event.len() > self.limits.max_event_name_len {
            return self.crash(
                "client event",
                format!("event name exceeds {} bytes", self.limits.max_event_name_len),
            );
        }
        let Some((view, socket)) = self.view.clone().zip(self.socket.take()) else {
            return Vec::new();
        };

        let socket = match view.handle_event(&event, &payload, socket) {
            Ok(EventOutcome::NoReply(socket)) => socket,
            Ok(EventOutcome::Reply(value, mut socket)) => {
                socket.put_reply(value);
                socket
            }
            Err(err) => return self.crash("handle_event", err),
        };
        self.socket = Some(socket);

        if let Some(opts) = self.redirected() {
            return self.redirect_actions(opts, msg_ref, join_ref);
        }
        self.render_cycle(msg_ref.map(|r| (r, join_ref)))
    }

    fn handle_info(&mut self, message: Value) -> Vec<SessionAction> {
        if self.phase != SessionPhase::Ready {
            return Vec::new();
        }
        let Some((view, socket)) = self.view.clone().zip(self.socket.take()) else {
            return Vec::new();
        };

        let socket = match view.handle_info(&message, socket) {
            Ok(socket) => socket,
            Err(err) => return self.crash("handle_info", err),
        };
        self.socket = Some(socket);

        if let Some(opts) = self.redirected() {
            return self.redirect_actions(opts, None, None);
        }
        // Re-rendered even for an unchanged socket: the client observes an
        // empty patch with an advancing cycle counter.
        self.render_cycle(None)
    }

    fn handle_async_result(&mut self, envelope: AsyncEnvelope) -> Vec<SessionAction> {
        if self.phase != SessionPhase::Ready {
            return Vec::new();
        }
        if envelope.component_id.is_some() {
            tracing::debug!(topic = %self.topic, "component-targeted async result ignored");
            return Vec::new();
        }
        let Some(socket) = self.socket.as_mut() else {
            return Vec::new();
        };

        let mut applied = false;
        for key in &envelope.keys {
            if socket.current_async_ref(key) != Some(envelope.async_ref) {
                tracing::debug!(key = %key, "stale async result discarded");
                continue;
            }
            socket.complete_async(key);
            let result = match &envelope.outcome {
                AsyncOutcome::Ok(map) => match map.get(key) {
                    Some(value) => AsyncResult::Ok(value.clone()),
                    None => AsyncResult::Failed(json!(format!(
                        "async producer returned no value for {key}"
                    ))),
                },
                AsyncOutcome::Failed(error) => AsyncResult::Failed(error.clone()),
            };
            if let Err(err) = socket.force_assign(key.as_str(), result.to_value()) {
                return self.crash("async fold", err);
            }
            applied = true;
        }

        if applied {
            self.render_cycle(None)
        } else {
            Vec::new()
        }
    }

    /// Render, diff, frame. Runs after every handler.
    fn render_cycle(&mut self, reply_to: Option<(String, Option<String>)>) -> Vec<SessionAction> {
        let Some((view, socket)) = self.view.clone().zip(self.socket.as_mut()) else {
            return Vec::new();
        };

        let (tree, _components) = match render_view(view.as_ref(), socket.assigns(), &self.limits) {
            Ok(rendered) => rendered,
            Err(err) => return self.crash("render", err),
        };

        let ops = patch::diff(self.last_rendered.as_ref(), &tree);
        self.render_count += 1;

        let scratch = socket.take_scratch();
        socket.clear_changed();
        self.last_rendered = Some(tree);

        let flash = (!scratch.flash_delta.is_empty()).then_some(scratch.flash_delta);
        let mut actions = vec![SessionAction::Send(ServerEnvelope::patch(PatchPayload {
            o: ops,
            c: self.render_count,
            f: flash,
        }))];
        for event in scratch.events {
            actions.push(SessionAction::Send(ServerEnvelope::event(
                event.name,
                event.payload,
            )));
        }
        if let (Some(payload), Some((msg_ref, join_ref))) = (scratch.reply, reply_to) {
            actions.push(SessionAction::Send(ServerEnvelope::reply(
                Some(msg_ref),
                join_ref.or_else(|| self.join_ref.clone()),
                &self.topic,
                ReplyStatus::Ok,
                payload,
            )));
        }
        tracing::debug!(topic = %self.topic, c = self.render_count, "render cycle");
        actions
    }

    fn redirected(&self) -> Option<RedirectPayload> {
        self.socket
            .as_ref()
            .and_then(|socket| socket.redirected().cloned())
    }

    fn redirect_actions(
        &mut self,
        opts: RedirectPayload,
        msg_ref: Option<String>,
        join_ref: Option<String>,
    ) -> Vec<SessionAction> {
        let mut actions = Vec::new();
        match msg_ref {
            // An outstanding reply carries the redirect; otherwise it is
            // pushed as its own envelope.
            Some(msg_ref) => {
                let opts_value = serde_json::to_value(&opts).unwrap_or(Value::Null);
                actions.push(SessionAction::Send(ServerEnvelope::reply(
                    Some(msg_ref),
                    join_ref.or_else(|| self.join_ref.clone()),
                    &self.topic,
                    ReplyStatus::Ok,
                    json!({"redirect": opts_value}),
                )));
            }
            None => actions.push(SessionAction::Send(ServerEnvelope::redirect(opts.clone()))),
        }
        actions.push(SessionAction::Send(ServerEnvelope::close(&self.topic)));
        self.phase = SessionPhase::Terminated;
        tracing::info!(topic = %self.topic, session = %self.session_id, "session redirected");
        actions.push(SessionAction::Close(CloseReason::Redirect(opts)));
        actions
    }

    fn crash(&mut self, context: &str, err: impl std::fmt::Display) -> Vec<SessionAction> {
        let reason = format!("{context}: {err}");
        tracing::error!(topic = %self.topic, session = %self.session_id, %reason, "session crashed");
        self.phase = SessionPhase::Terminated;
        // The client observes the close; the crash reason stays server-side.
        vec![
            SessionAction::Send(ServerEnvelope::close(&self.topic)),
            SessionAction::Close(CloseReason::Crash(reason)),
        ]
    }
}
