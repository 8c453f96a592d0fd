//! Per-session socket: the assign store, change hints, and the per-cycle
//! scratch area holding queued push-events, the pending reply, and the
//! flash delta.
//!
//! The owning session actor has exclusive access to its socket; user
//! callbacks receive it by value and hand it back.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use crossbeam::channel::Sender;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::session::actor::SessionMessage;
use crate::session::assign_async::{AsyncRef, AsyncResult, spawn_producer};
use crate::session::lifecycle::MountHook;
use crate::wire::url::{self, UrlError};
use crate::wire::{RedirectPayload, Topic};

/// Key of the reserved flash assign.
pub const FLASH_KEY: &str = "flash";

pub type Assigns = BTreeMap<AssignKey, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque endpoint descriptor: where this socket is being served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub topic: Topic,
    pub session_id: SessionId,
}

impl Endpoint {
    pub fn new(topic: Topic, session_id: SessionId) -> Self {
        Self { topic, session_id }
    }
}

/// Validated assign identifier: `[A-Za-z_][A-Za-z0-9_]*`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssignKey(String);

impl AssignKey {
    pub fn parse(raw: impl Into<String>) -> Result<Self, SocketError> {
        let raw = raw.into();
        let mut chars = raw.chars();
        let valid = match chars.next() {
            Some(first) => {
                (first.is_ascii_alphabetic() || first == '_')
                    && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            None => false,
        };
        if valid {
            Ok(Self(raw))
        } else {
            Err(SocketError::InvalidKey { key: raw })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AssignKey {
    type Error = SocketError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(raw)
    }
}

impl From<AssignKey> for String {
    fn from(key: AssignKey) -> String {
        key.0
    }
}

impl Borrow<str> for AssignKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssignKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-key change hint recorded between renders.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeHint {
    /// Key changed; the previous value was not an object.
    Touched,
    /// Key changed away from an object; the previous map enables nested
    /// diff hints for renderers that want them.
    PreviousMap(Map<String, Value>),
}

/// A queued fire-and-forget signal, emitted after the cycle's patch.
#[derive(Debug, Clone, PartialEq)]
pub struct PushEvent {
    pub name: String,
    pub payload: Value,
}

/// Per-render-cycle outputs. Reset on every flush.
#[derive(Debug, Clone, Default)]
pub(crate) struct Scratch {
    pub events: Vec<PushEvent>,
    pub reply: Option<Value>,
    pub flash_delta: BTreeMap<String, Value>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SocketError {
    #[error("assign key {key:?} is not a valid identifier")]
    InvalidKey { key: String },
    #[error("assign_async requires at least one key")]
    EmptyAsyncKeys,
    #[error("socket already redirected")]
    AlreadyRedirected,
    #[error(transparent)]
    InvalidRedirect(#[from] UrlError),
}

pub struct Socket {
    endpoint: Endpoint,
    connected: bool,
    assigns: Assigns,
    changed: BTreeMap<AssignKey, ChangeHint>,
    redirect: Option<RedirectPayload>,
    lifecycle: Vec<MountHook>,
    scratch: Scratch,
    async_refs: BTreeMap<AssignKey, AsyncRef>,
    self_tx: Option<Sender<SessionMessage>>,
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("endpoint", &self.endpoint)
            .field("connected", &self.connected)
            .field("assigns", &self.assigns)
            .field("changed", &self.changed)
            .field("redirect", &self.redirect)
            .finish_non_exhaustive()
    }
}

impl Socket {
    pub(crate) fn new(
        endpoint: Endpoint,
        lifecycle: Vec<MountHook>,
        self_tx: Option<Sender<SessionMessage>>,
    ) -> Self {
        Self {
            endpoint,
            connected: self_tx.is_some(),
            assigns: Assigns::new(),
            changed: BTreeMap::new(),
            redirect: None,
            lifecycle,
            scratch: Scratch::default(),
            async_refs: BTreeMap::new(),
            self_tx,
        }
    }

    /// A socket served by no session, for exercising views directly.
    pub fn detached(endpoint: Endpoint) -> Self {
        Self::new(endpoint, Vec::new(), None)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Whether a live transport is serving this socket.
    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn assigns(&self) -> &Assigns {
        &self.assigns
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.assigns.get(key)
    }

    pub fn changed(&self) -> &BTreeMap<AssignKey, ChangeHint> {
        &self.changed
    }

    /// Assign `key := value`, short-circuiting on structural equality.
    pub fn assign(&mut self, key: impl AsRef<str>, value: Value) -> Result<(), SocketError> {
        let key = AssignKey::parse(key.as_ref())?;
        if self.assigns.get(&key) == Some(&value) {
            return Ok(());
        }
        self.store(key, value);
        Ok(())
    }

    /// Fold of the scalar form over `(key, value)` entries.
    pub fn assign_many<K>(
        &mut self,
        entries: impl IntoIterator<Item = (K, Value)>,
    ) -> Result<(), SocketError>
    where
        K: AsRef<str>,
    {
        for (key, value) in entries {
            self.assign(key, value)?;
        }
        Ok(())
    }

    /// Compute-and-assign only when the key is absent.
    pub fn assign_new(
        &mut self,
        key: impl AsRef<str>,
        value: impl FnOnce() -> Value,
    ) -> Result<(), SocketError> {
        let key = AssignKey::parse(key.as_ref())?;
        if self.assigns.contains_key(&key) {
            return Ok(());
        }
        self.store(key, value());
        Ok(())
    }

    /// Assign without the equality check.
    pub fn force_assign(&mut self, key: impl AsRef<str>, value: Value) -> Result<(), SocketError> {
        let key = AssignKey::parse(key.as_ref())?;
        self.store(key, value);
        Ok(())
    }

    fn store(&mut self, key: AssignKey, value: Value) {
        let previous = self.assigns.insert(key.clone(), value);
        // First mutation in a cycle wins the hint; later ones keep it.
        self.changed.entry(key).or_insert(match previous {
            Some(Value::Object(map)) => ChangeHint::PreviousMap(map),
            _ => ChangeHint::Touched,
        });
    }

    /// Queue a push-event for emission after this cycle's patch.
    pub fn push_event(&mut self, name: impl Into<String>, payload: Value) {
        self.scratch.events.push(PushEvent {
            name: name.into(),
            payload,
        });
    }

    /// Store the pending reply for the inbound event being handled.
    /// Overwrites any prior reply in the same cycle.
    pub fn put_reply(&mut self, payload: Value) {
        self.scratch.reply = Some(payload);
    }

    /// Write a flash message: into the flash assign (so it diffs into the
    /// document) and into the side-channel delta for the `f` field.
    pub fn put_flash(&mut self, key: impl Into<String>, message: Value) {
        let key = key.into();
        let mut flash = match self.assigns.get(FLASH_KEY) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        flash.insert(key.clone(), message.clone());
        self.store_flash(flash);
        self.scratch.flash_delta.insert(key, message);
    }

    /// Drop all flash keys, mirrored in assigns and the delta.
    pub fn clear_flash(&mut self) {
        self.store_flash(Map::new());
        self.scratch.flash_delta.clear();
    }

    /// Drop one flash key, mirrored in assigns and the delta.
    pub fn clear_flash_key(&mut self, key: &str) {
        let mut flash = match self.assigns.get(FLASH_KEY) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        flash.remove(key);
        self.store_flash(flash);
        self.scratch.flash_delta.remove(key);
    }

    fn store_flash(&mut self, flash: Map<String, Value>) {
        // Infallible: FLASH_KEY is a valid identifier.
        let key = AssignKey(FLASH_KEY.to_string());
        if self.assigns.get(&key) != Some(&Value::Object(flash.clone())) {
            self.store(key, Value::Object(flash));
        }
    }

    /// Flash keys written this cycle (the `f` side channel).
    pub fn get_flash(&self) -> &BTreeMap<String, Value> {
        &self.scratch.flash_delta
    }

    /// Push-events queued this cycle, in insertion order.
    pub fn get_push_events(&self) -> &[PushEvent] {
        &self.scratch.events
    }

    /// The pending reply, if the current handler stored one.
    pub fn get_reply(&self) -> Option<&Value> {
        self.scratch.reply.as_ref()
    }

    /// Redirect to a local path. Set-once; validated per the local rules.
    pub fn redirect(&mut self, to: impl Into<String>) -> Result<(), SocketError> {
        let to = to.into();
        url::validate_local(&to)?;
        self.set_redirect(RedirectPayload::Local { to })
    }

    /// Redirect to an external URL. Set-once; the scheme must be in the
    /// allowed set.
    pub fn redirect_external(&mut self, external: impl Into<String>) -> Result<(), SocketError> {
        let external = external.into();
        url::validate_external(&external)?;
        self.set_redirect(RedirectPayload::External { external })
    }

    /// Redirect to an external URL of a scheme outside the allowed set.
    /// The caller vouches for the URL; only the shape is checked.
    pub fn redirect_external_trusted(
        &mut self,
        external: impl Into<String>,
    ) -> Result<(), SocketError> {
        let external = external.into();
        url::require_scheme(&external)?;
        self.set_redirect(RedirectPayload::External { external })
    }

    fn set_redirect(&mut self, payload: RedirectPayload) -> Result<(), SocketError> {
        if self.redirect.is_some() {
            return Err(SocketError::AlreadyRedirected);
        }
        self.redirect = Some(payload);
        Ok(())
    }

    pub fn redirected(&self) -> Option<&RedirectPayload> {
        self.redirect.as_ref()
    }

    /// Launch an asynchronous producer for one or more keys.
    ///
    /// Each key is immediately assigned a loading `AsyncResult`; the
    /// producer runs on its own thread and its outcome rejoins the session
    /// mailbox. A superseding call for the same key stales the prior
    /// attempt: its late result is discarded.
    pub fn assign_async<I, K, F>(&mut self, keys: I, producer: F) -> Result<(), SocketError>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
        F: FnOnce() -> Result<BTreeMap<AssignKey, Value>, Value> + Send + 'static,
    {
        let keys = keys
            .into_iter()
            .map(|key| AssignKey::parse(key.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        if keys.is_empty() {
            return Err(SocketError::EmptyAsyncKeys);
        }

        let async_ref = AsyncRef::new();
        for key in &keys {
            self.force_assign(key.as_str(), AsyncResult::Loading.to_value())?;
            self.async_refs.insert(key.clone(), async_ref);
        }
        if let Some(tx) = &self.self_tx {
            spawn_producer(tx.clone(), async_ref, keys, producer);
        }
        Ok(())
    }

    pub(crate) fn current_async_ref(&self, key: &AssignKey) -> Option<AsyncRef> {
        self.async_refs.get(key).copied()
    }

    pub(crate) fn complete_async(&mut self, key: &AssignKey) {
        self.async_refs.remove(key);
    }

    pub(crate) fn take_lifecycle(&mut self) -> Vec<MountHook> {
        std::mem::take(&mut self.lifecycle)
    }

    pub(crate) fn take_scratch(&mut self) -> Scratch {
        std::mem::take(&mut self.scratch)
    }

    pub(crate) fn clear_changed(&mut self) {
        self.changed.clear();
    }
}
