//! Ordered pre-mount hook chain.
//!
//! Hooks run before the view's own mount, in registration order. A halting
//! hook short-circuits the chain and skips `view.mount`; whatever socket it
//! returned is used as-is, including any redirect it set.

use std::sync::Arc;

use serde_json::Value;

use crate::socket::Socket;
use crate::view::{SessionMeta, ViewError};

/// A pre-mount callback.
pub type MountHook =
    Arc<dyn Fn(&Value, &SessionMeta, Socket) -> Result<HookOutcome, ViewError> + Send + Sync>;

#[derive(Debug)]
pub enum HookOutcome {
    Cont(Socket),
    Halt(Socket),
}

/// Wrap a closure as a registrable hook.
pub fn on_mount<F>(hook: F) -> MountHook
where
    F: Fn(&Value, &SessionMeta, Socket) -> Result<HookOutcome, ViewError> + Send + Sync + 'static,
{
    Arc::new(hook)
}

/// Run the socket's hook chain. Returns the resulting socket and whether
/// a hook halted the chain.
pub(crate) fn run_on_mount(
    params: &Value,
    session: &SessionMeta,
    mut socket: Socket,
) -> Result<(Socket, bool), ViewError> {
    let hooks = socket.take_lifecycle();
    for hook in hooks {
        match hook(params, session, socket)? {
            HookOutcome::Cont(next) => socket = next,
            HookOutcome::Halt(next) => return Ok((next, true)),
        }
    }
    Ok((socket, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Limits;
    use crate::socket::{Endpoint, SessionId};
    use crate::wire::Topic;
    use serde_json::json;

    fn fixture() -> (SessionMeta, Endpoint) {
        let topic = Topic::parse("dv:c:test", &Limits::default()).unwrap();
        let id = SessionId::new();
        let meta = SessionMeta {
            id,
            topic: topic.clone(),
            caller: None,
            opts: Value::Null,
        };
        (meta, Endpoint::new(topic, id))
    }

    fn socket_with_hooks(endpoint: Endpoint, hooks: Vec<MountHook>) -> Socket {
        Socket::new(endpoint, hooks, None)
    }

    #[test]
    fn hooks_run_in_registration_order() {
        let (meta, endpoint) = fixture();
        let hooks = vec![
            on_mount(|_, _, mut socket| {
                socket.assign("order", json!(["a"]))?;
                Ok(HookOutcome::Cont(socket))
            }),
            on_mount(|_, _, mut socket| {
                let mut order = socket.get("order").cloned().unwrap_or(json!([]));
                order.as_array_mut().unwrap().push(json!("b"));
                socket.assign("order", order)?;
                Ok(HookOutcome::Cont(socket))
            }),
        ];
        let socket = socket_with_hooks(endpoint, hooks);
        let (socket, halted) = run_on_mount(&json!({}), &meta, socket).unwrap();
        assert!(!halted);
        assert_eq!(socket.get("order"), Some(&json!(["a", "b"])));
    }

    #[test]
    fn halt_short_circuits_the_chain() {
        let (meta, endpoint) = fixture();
        let hooks = vec![
            on_mount(|_, _, mut socket| {
                socket.assign("first", json!(true))?;
                Ok(HookOutcome::Halt(socket))
            }),
            on_mount(|_, _, _socket| unreachable!("second hook must not run")),
        ];
        let socket = socket_with_hooks(endpoint, hooks);
        let (socket, halted) = run_on_mount(&json!({}), &meta, socket).unwrap();
        assert!(halted);
        assert_eq!(socket.get("first"), Some(&json!(true)));
    }

    #[test]
    fn hook_errors_propagate() {
        let (meta, endpoint) = fixture();
        let hooks = vec![on_mount(|_, _, _socket| {
            Err(ViewError::Failure("denied".to_string()))
        })];
        let socket = socket_with_hooks(endpoint, hooks);
        assert!(run_on_mount(&json!({}), &meta, socket).is_err());
    }
}
