//! Route and channel registration.
//!
//! A route handler is a pure function from join params to a view target;
//! resolution failure surfaces to the client as a `no_route` join error.
//! User channels register here too, solely so the reserved `dv:*`
//! namespace can be refused at configuration time.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::session::lifecycle::MountHook;
use crate::view::View;
use crate::wire::Topic;

type RouteHandler = Arc<dyn Fn(&Value) -> Option<RouteTarget> + Send + Sync>;

/// What a resolved route mounts: the view, handler-attached options, and
/// the pre-mount hook chain.
#[derive(Clone)]
pub struct RouteTarget {
    pub view: Arc<dyn View>,
    pub opts: Value,
    pub on_mount: Vec<MountHook>,
}

impl RouteTarget {
    pub fn new(view: Arc<dyn View>) -> Self {
        Self {
            view,
            opts: Value::Null,
            on_mount: Vec::new(),
        }
    }

    pub fn with_opts(mut self, opts: Value) -> Self {
        self.opts = opts;
        self
    }

    pub fn with_on_mount(mut self, hooks: Vec<MountHook>) -> Self {
        self.on_mount = hooks;
        self
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("channel pattern {pattern:?} is under the reserved dv:* namespace")]
    ReservedNamespace { pattern: String },
    #[error("route {route:?} is already registered")]
    DuplicateRoute { route: String },
    #[error("channel pattern {pattern:?} is already registered")]
    DuplicateChannel { pattern: String },
}

#[derive(Default)]
pub struct Router {
    routes: BTreeMap<String, RouteHandler>,
    channels: BTreeSet<String>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a view route reachable at `dv:c:<route>`.
    pub fn route<F>(&mut self, route: &str, handler: F) -> Result<(), RouterError>
    where
        F: Fn(&Value) -> Option<RouteTarget> + Send + Sync + 'static,
    {
        if self.routes.contains_key(route) {
            return Err(RouterError::DuplicateRoute {
                route: route.to_string(),
            });
        }
        self.routes.insert(route.to_string(), Arc::new(handler));
        Ok(())
    }

    /// Register a user channel pattern. Anything under `dv:*` is refused.
    pub fn channel(&mut self, pattern: &str) -> Result<(), RouterError> {
        if Topic::is_reserved(pattern) {
            return Err(RouterError::ReservedNamespace {
                pattern: pattern.to_string(),
            });
        }
        if !self.channels.insert(pattern.to_string()) {
            return Err(RouterError::DuplicateChannel {
                pattern: pattern.to_string(),
            });
        }
        Ok(())
    }

    /// Resolve a view topic through its route handler.
    pub fn resolve(&self, topic: &Topic, params: &Value) -> Option<RouteTarget> {
        self.routes.get(topic.route()).and_then(|handler| handler(params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Limits;
    use crate::test_harness::views::CounterView;
    use serde_json::json;

    #[test]
    fn reserved_namespace_is_refused_at_registration() {
        let mut router = Router::new();
        assert_eq!(
            router.channel("dv:foo"),
            Err(RouterError::ReservedNamespace {
                pattern: "dv:foo".to_string()
            })
        );
        assert_eq!(
            router.channel("dv:*"),
            Err(RouterError::ReservedNamespace {
                pattern: "dv:*".to_string()
            })
        );
        assert!(router.channel("room:*").is_ok());
    }

    #[test]
    fn duplicate_registrations_are_errors() {
        let mut router = Router::new();
        router.channel("room:*").unwrap();
        assert_eq!(
            router.channel("room:*"),
            Err(RouterError::DuplicateChannel {
                pattern: "room:*".to_string()
            })
        );

        router
            .route("counter", |_| Some(RouteTarget::new(Arc::new(CounterView))))
            .unwrap();
        let second = router.route("counter", |_| None);
        assert_eq!(
            second,
            Err(RouterError::DuplicateRoute {
                route: "counter".to_string()
            })
        );
    }

    #[test]
    fn resolution_runs_the_handler() {
        let mut router = Router::new();
        router
            .route("counter", |params| {
                if params.get("caller").is_some() {
                    None
                } else {
                    Some(RouteTarget::new(Arc::new(CounterView)).with_opts(json!({"n": 1})))
                }
            })
            .unwrap();

        let topic = Topic::parse("dv:c:counter", &Limits::default()).unwrap();
        let target = router.resolve(&topic, &json!({})).unwrap();
        assert_eq!(target.opts, json!({"n": 1}));
        assert!(router.resolve(&topic, &json!({"caller": []})).is_none());

        let other = Topic::parse("dv:c:unknown", &Limits::default()).unwrap();
        assert!(router.resolve(&other, &json!({})).is_none());
    }
}
