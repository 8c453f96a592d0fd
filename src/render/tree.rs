//! The tree views author: plain JSON plus embedded sub-component
//! references the renderer expands in place.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::render::RenderError;
use crate::socket::Assigns;
use crate::view::View;

/// An in-tree reference to a sub-component: expanded by the renderer
/// into the result of `view.render(assigns)`.
#[derive(Clone)]
pub struct ComponentRef {
    pub id: String,
    pub view: Arc<dyn View>,
    pub assigns: Assigns,
}

impl fmt::Debug for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRef")
            .field("id", &self.id)
            .field("assigns", &self.assigns)
            .finish_non_exhaustive()
    }
}

/// A render result before component expansion.
#[derive(Debug, Clone)]
pub enum Rendered {
    Value(Value),
    Map(BTreeMap<String, Rendered>),
    List(Vec<Rendered>),
    Component(ComponentRef),
}

impl Rendered {
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Rendered)>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value))
                .collect(),
        )
    }

    pub fn list(items: impl IntoIterator<Item = Rendered>) -> Self {
        Self::List(items.into_iter().collect())
    }

    pub fn component(id: impl Into<String>, view: Arc<dyn View>, assigns: Assigns) -> Self {
        Self::Component(ComponentRef {
            id: id.into(),
            view,
            assigns,
        })
    }

    /// Flatten a struct-like value to its field map through serde.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, RenderError> {
        serde_json::to_value(value)
            .map(Rendered::Value)
            .map_err(|err| RenderError::Serialize(err.to_string()))
    }
}

impl From<Value> for Rendered {
    fn from(value: Value) -> Self {
        Rendered::Value(value)
    }
}

impl From<&str> for Rendered {
    fn from(value: &str) -> Self {
        Rendered::Value(Value::from(value))
    }
}

impl From<String> for Rendered {
    fn from(value: String) -> Self {
        Rendered::Value(Value::from(value))
    }
}

impl From<i64> for Rendered {
    fn from(value: i64) -> Self {
        Rendered::Value(Value::from(value))
    }
}

impl From<bool> for Rendered {
    fn from(value: bool) -> Self {
        Rendered::Value(Value::from(value))
    }
}
