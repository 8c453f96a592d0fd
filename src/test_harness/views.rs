//! Fixture views exercised by the unit and scenario tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use crossbeam::channel::{Receiver, Sender, bounded};
use serde_json::{Value, json};

use crate::render::Rendered;
use crate::session::assign_async::{AsyncClauses, async_result};
use crate::socket::{AssignKey, Assigns, Socket};
use crate::view::{EventOutcome, View, ViewError};

fn assign_or<'a>(assigns: &'a Assigns, key: &str, fallback: &'a Value) -> &'a Value {
    assigns.get(key).unwrap_or(fallback)
}

/// The counter of the S1–S3 scenarios: mounts at zero, increments from
/// client events and server infos, flashes and pushes on the latter.
pub struct CounterView;

impl CounterView {
    fn bump(socket: &mut Socket, delta: i64) -> Result<i64, ViewError> {
        let current = socket.get("counter").and_then(Value::as_i64).unwrap_or(0);
        let next = current + delta;
        socket.assign("counter", json!(next))?;
        Ok(next)
    }
}

impl View for CounterView {
    fn mount(&self, _params: &Value, mut socket: Socket) -> Result<Socket, ViewError> {
        socket.assign("counter", json!(0))?;
        Ok(socket)
    }

    fn handle_event(
        &self,
        event: &str,
        _payload: &Value,
        mut socket: Socket,
    ) -> Result<EventOutcome, ViewError> {
        match event {
            "increment" => {
                Self::bump(&mut socket, 1)?;
                Ok(EventOutcome::NoReply(socket))
            }
            "decrement" => {
                Self::bump(&mut socket, -1)?;
                Ok(EventOutcome::NoReply(socket))
            }
            "current" => {
                let counter = socket.get("counter").cloned().unwrap_or(json!(0));
                Ok(EventOutcome::Reply(json!({ "counter": counter }), socket))
            }
            other => Err(ViewError::UnhandledEvent {
                event: other.to_string(),
            }),
        }
    }

    fn handle_info(&self, message: &Value, mut socket: Socket) -> Result<Socket, ViewError> {
        if message == &json!("increment") {
            Self::bump(&mut socket, 1)?;
            socket.put_flash("info", json!("Incremented!"));
            socket.push_event("chart", json!({}));
        }
        Ok(socket)
    }

    fn render(&self, assigns: &Assigns) -> Result<Rendered, ViewError> {
        Ok(Rendered::object([(
            "counter",
            Rendered::Value(assign_or(assigns, "counter", &json!(0)).clone()),
        )]))
    }
}

/// Leaf component: renders `{"hello": name}`.
pub struct GreeterView;

impl View for GreeterView {
    fn render(&self, assigns: &Assigns) -> Result<Rendered, ViewError> {
        Ok(Rendered::object([(
            "hello",
            Rendered::Value(assign_or(assigns, "name", &Value::Null).clone()),
        )]))
    }
}

/// The S5 board: two entries whose `welcome` field is a greeter component.
pub struct GreetingBoardView;

impl View for GreetingBoardView {
    fn mount(&self, _params: &Value, mut socket: Socket) -> Result<Socket, ViewError> {
        socket.assign("counter", json!(0))?;
        Ok(socket)
    }

    fn render(&self, assigns: &Assigns) -> Result<Rendered, ViewError> {
        let counter = assign_or(assigns, "counter", &json!(0)).clone();
        let entry = |id: &str, name: &str| -> Result<Rendered, ViewError> {
            let mut greeter_assigns = Assigns::new();
            greeter_assigns.insert(AssignKey::parse("name")?, json!(name));
            Ok(Rendered::object([
                ("counter", Rendered::Value(counter.clone())),
                (
                    "welcome",
                    Rendered::component(id, Arc::new(GreeterView), greeter_assigns),
                ),
            ]))
        };
        Ok(Rendered::list([
            entry("greeter-world", "World")?,
            entry("greeter-elixir", "Elixir")?,
        ]))
    }
}

/// The S4 view: a lazily produced counter behind `assign_async`, rendered
/// through `async_result` clauses.
pub struct LazyCounterView {
    gate: Option<Receiver<()>>,
    outcome: Result<Value, Value>,
}

impl LazyCounterView {
    pub fn resolving(value: Value) -> Self {
        Self {
            gate: None,
            outcome: Ok(value),
        }
    }

    pub fn failing(error: Value) -> Self {
        Self {
            gate: None,
            outcome: Err(error),
        }
    }

    /// The producer blocks until the returned sender fires (or drops).
    pub fn gated(value: Value) -> (Self, Sender<()>) {
        let (release, gate) = bounded(1);
        (
            Self {
                gate: Some(gate),
                outcome: Ok(value),
            },
            release,
        )
    }
}

impl View for LazyCounterView {
    fn mount(&self, _params: &Value, mut socket: Socket) -> Result<Socket, ViewError> {
        let gate = self.gate.clone();
        let outcome = self.outcome.clone();
        socket.assign_async(["lazy_counter"], move || {
            if let Some(gate) = gate {
                let _ = gate.recv();
            }
            let value = outcome?;
            let mut results = BTreeMap::new();
            let key = AssignKey::parse("lazy_counter")
                .map_err(|err| Value::String(err.to_string()))?;
            results.insert(key, value);
            Ok(results)
        })?;
        Ok(socket)
    }

    fn render(&self, assigns: &Assigns) -> Result<Rendered, ViewError> {
        let lazy = assign_or(assigns, "lazy_counter", &Value::Null);
        let rendered = async_result(
            lazy,
            AsyncClauses {
                loading: Box::new(|| Rendered::from("Loading...")),
                ok: Box::new(|value| Rendered::Value(value.clone())),
                failed: Box::new(|error| Rendered::Value(json!({ "error": error }))),
            },
        )?;
        Ok(Rendered::object([("lazy_counter", rendered)]))
    }
}

/// Async view whose attempt can be superseded: mount launches a gated
/// producer, the `reload` event launches an immediate one for the same key.
pub struct ReloadableView {
    gate: Receiver<()>,
}

impl ReloadableView {
    pub fn gated() -> (Self, Sender<()>) {
        let (release, gate) = bounded(1);
        (Self { gate }, release)
    }
}

impl View for ReloadableView {
    fn mount(&self, _params: &Value, mut socket: Socket) -> Result<Socket, ViewError> {
        let gate = self.gate.clone();
        socket.assign_async(["data"], move || {
            let _ = gate.recv();
            Ok(data_result(json!("stale")))
        })?;
        Ok(socket)
    }

    fn handle_event(
        &self,
        event: &str,
        _payload: &Value,
        mut socket: Socket,
    ) -> Result<EventOutcome, ViewError> {
        match event {
            "reload" => {
                socket.assign_async(["data"], || Ok(data_result(json!("fresh"))))?;
                Ok(EventOutcome::NoReply(socket))
            }
            other => Err(ViewError::UnhandledEvent {
                event: other.to_string(),
            }),
        }
    }

    fn render(&self, assigns: &Assigns) -> Result<Rendered, ViewError> {
        let data = assign_or(assigns, "data", &Value::Null);
        let rendered = async_result(
            data,
            AsyncClauses {
                loading: Box::new(|| Rendered::from("Loading...")),
                ok: Box::new(|value| Rendered::Value(value.clone())),
                failed: Box::new(|error| Rendered::Value(json!({ "error": error }))),
            },
        )?;
        Ok(Rendered::object([("data", rendered)]))
    }
}

fn data_result(value: Value) -> BTreeMap<AssignKey, Value> {
    let mut results = BTreeMap::new();
    if let Ok(key) = AssignKey::parse("data") {
        results.insert(key, value);
    }
    results
}

/// Redirecting view: `go` sets a local redirect, `external` an external one.
pub struct RedirectView;

impl View for RedirectView {
    fn handle_event(
        &self,
        event: &str,
        _payload: &Value,
        mut socket: Socket,
    ) -> Result<EventOutcome, ViewError> {
        match event {
            "go" => {
                socket.redirect("/next")?;
                Ok(EventOutcome::NoReply(socket))
            }
            "external" => {
                socket.redirect_external("https://example.com/away")?;
                Ok(EventOutcome::NoReply(socket))
            }
            other => Err(ViewError::UnhandledEvent {
                event: other.to_string(),
            }),
        }
    }

    fn render(&self, _assigns: &Assigns) -> Result<Rendered, ViewError> {
        Ok(Rendered::object([("ok", Rendered::from(true))]))
    }
}
