//! Turns a view's assigns into a pure JSON tree.
//!
//! The walk drops null-valued map keys and null list entries (a field
//! becoming null surfaces as a `remove` op), coerces keys to strings, and
//! replaces every sub-component reference with the referenced view's own
//! rendered tree. No reference survives into the differ input.

mod tree;

use serde_json::{Map, Value};
use thiserror::Error;

pub use tree::{ComponentRef, Rendered};

use crate::config::Limits;
use crate::socket::Assigns;
use crate::view::{View, ViewError};

/// A component discovered during expansion, in discovery order: each
/// reference is listed before the components found inside its own tree.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedComponent {
    pub id: String,
    pub tree: Value,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("component nesting exceeds depth {max_depth}")]
    ComponentDepthExceeded { max_depth: usize },
    #[error("tree serialization failed: {0}")]
    Serialize(String),
}

/// Render a view against its assigns, expanding nested components.
pub fn render_view(
    view: &dyn View,
    assigns: &Assigns,
    limits: &Limits,
) -> Result<(Value, Vec<RenderedComponent>), ViewError> {
    let mut components = Vec::new();
    let rendered = view.render(assigns)?;
    let tree = expand(rendered, 0, limits, &mut components)?.unwrap_or(Value::Null);
    Ok((tree, components))
}

fn expand(
    node: Rendered,
    depth: usize,
    limits: &Limits,
    components: &mut Vec<RenderedComponent>,
) -> Result<Option<Value>, ViewError> {
    match node {
        Rendered::Value(value) => Ok(prune_nulls(value)),
        Rendered::Map(entries) => {
            let mut out = Map::new();
            for (key, child) in entries {
                if let Some(value) = expand(child, depth, limits, components)? {
                    out.insert(key, value);
                }
            }
            Ok(Some(Value::Object(out)))
        }
        Rendered::List(items) => {
            let mut out = Vec::new();
            for child in items {
                if let Some(value) = expand(child, depth, limits, components)? {
                    out.push(value);
                }
            }
            Ok(Some(Value::Array(out)))
        }
        Rendered::Component(reference) => {
            if depth >= limits.max_component_depth {
                return Err(ViewError::Render(RenderError::ComponentDepthExceeded {
                    max_depth: limits.max_component_depth,
                }));
            }
            // Reserve the slot so this component precedes the ones its own
            // tree discovers.
            let slot = components.len();
            components.push(RenderedComponent {
                id: reference.id.clone(),
                tree: Value::Null,
            });
            let rendered = reference.view.render(&reference.assigns)?;
            let tree = expand(rendered, depth + 1, limits, components)?;
            components[slot].tree = tree.clone().unwrap_or(Value::Null);
            Ok(tree)
        }
    }
}

fn prune_nulls(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(entries) => Some(Value::Object(
            entries
                .into_iter()
                .filter_map(|(key, child)| prune_nulls(child).map(|v| (key, v)))
                .collect(),
        )),
        Value::Array(items) => Some(Value::Array(
            items.into_iter().filter_map(prune_nulls).collect(),
        )),
        scalar => Some(scalar),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_harness::views::GreeterView;
    use serde_json::json;
    use std::sync::Arc;

    struct StaticView(Value);

    impl View for StaticView {
        fn render(&self, _assigns: &Assigns) -> Result<Rendered, ViewError> {
            Ok(Rendered::Value(self.0.clone()))
        }
    }

    struct NestingView {
        inner: Arc<dyn View>,
    }

    impl View for NestingView {
        fn render(&self, _assigns: &Assigns) -> Result<Rendered, ViewError> {
            Ok(Rendered::object([(
                "child",
                Rendered::component("outer", Arc::clone(&self.inner), Assigns::new()),
            )]))
        }
    }

    fn greeter_assigns(name: &str) -> Assigns {
        let mut assigns = Assigns::new();
        let key = crate::socket::AssignKey::parse("name").unwrap();
        assigns.insert(key, json!(name));
        assigns
    }

    #[test]
    fn nulls_are_elided_everywhere() {
        let view = StaticView(json!({
            "keep": 1,
            "drop": null,
            "list": [1, null, {"inner": null, "ok": true}],
        }));
        let (tree, _) = render_view(&view, &Assigns::new(), &Limits::default()).unwrap();
        assert_eq!(tree, json!({"keep": 1, "list": [1, {"ok": true}]}));
    }

    #[test]
    fn scalars_pass_through() {
        let view = StaticView(json!(42));
        let (tree, components) = render_view(&view, &Assigns::new(), &Limits::default()).unwrap();
        assert_eq!(tree, json!(42));
        assert!(components.is_empty());
    }

    #[test]
    fn components_expand_in_place() {
        struct Board;
        impl View for Board {
            fn render(&self, _assigns: &Assigns) -> Result<Rendered, ViewError> {
                Ok(Rendered::list([Rendered::object([(
                    "welcome",
                    Rendered::component("hello", Arc::new(GreeterView), greeter_assigns("World")),
                )])]))
            }
        }
        let (tree, components) = render_view(&Board, &Assigns::new(), &Limits::default()).unwrap();
        assert_eq!(tree, json!([{"welcome": {"hello": "World"}}]));
        assert_eq!(
            components,
            vec![RenderedComponent {
                id: "hello".to_string(),
                tree: json!({"hello": "World"}),
            }]
        );
    }

    #[test]
    fn discovery_order_lists_parents_first() {
        let inner: Arc<dyn View> = Arc::new(NestingView {
            inner: Arc::new(GreeterView),
        });
        // outer -> NestingView -> GreeterView; ids appear parent-first.
        struct Root {
            nested: Arc<dyn View>,
        }
        impl View for Root {
            fn render(&self, _assigns: &Assigns) -> Result<Rendered, ViewError> {
                Ok(Rendered::object([(
                    "root",
                    Rendered::component("top", Arc::clone(&self.nested), Assigns::new()),
                )]))
            }
        }
        let root = Root { nested: inner };
        let (_, components) = render_view(&root, &Assigns::new(), &Limits::default()).unwrap();
        let ids: Vec<_> = components.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["top", "outer"]);
    }

    #[test]
    fn structs_flatten_to_field_maps() {
        #[derive(serde::Serialize)]
        struct Profile {
            name: &'static str,
            admin: bool,
            note: Option<&'static str>,
        }
        struct ProfileView;
        impl View for ProfileView {
            fn render(&self, _assigns: &Assigns) -> Result<Rendered, ViewError> {
                Ok(Rendered::from_serialize(&Profile {
                    name: "ada",
                    admin: true,
                    note: None,
                })?)
            }
        }
        let (tree, _) = render_view(&ProfileView, &Assigns::new(), &Limits::default()).unwrap();
        // The absent option serializes to null and is elided like any field.
        assert_eq!(tree, json!({"name": "ada", "admin": true}));
    }

    #[test]
    fn runaway_nesting_is_bounded() {
        struct Recursive;
        impl View for Recursive {
            fn render(&self, _assigns: &Assigns) -> Result<Rendered, ViewError> {
                Ok(Rendered::component("again", Arc::new(Recursive), Assigns::new()))
            }
        }
        let limits = Limits {
            max_component_depth: 4,
            ..Limits::default()
        };
        let err = render_view(&Recursive, &Assigns::new(), &limits).unwrap_err();
        assert!(matches!(
            err,
            ViewError::Render(RenderError::ComponentDepthExceeded { max_depth: 4 })
        ));
    }
}
