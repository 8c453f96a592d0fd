//! Reference JSON-Patch applier.
//!
//! Mirrors what the client runtime does with a patch stream; the engine
//! itself never applies patches. Kept here because the diff/apply
//! equivalence invariant is the backbone of the self-test suite.

use serde_json::Value;
use thiserror::Error;

use crate::patch::PatchOp;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApplyError {
    #[error("invalid JSON pointer {path:?}")]
    InvalidPointer { path: String },
    #[error("path {path:?} does not resolve")]
    PathNotFound { path: String },
    #[error("invalid array index in {path:?}")]
    InvalidIndex { path: String },
    #[error("test op failed at {path:?}")]
    TestFailed { path: String },
}

/// Apply ops to the document in order.
pub fn apply_ops(doc: &mut Value, ops: &[PatchOp]) -> Result<(), ApplyError> {
    for op in ops {
        apply_one(doc, op)?;
    }
    Ok(())
}

fn apply_one(doc: &mut Value, op: &PatchOp) -> Result<(), ApplyError> {
    match op {
        PatchOp::Add { path, value } => add(doc, path, value.clone()),
        PatchOp::Remove { path } => remove(doc, path).map(|_| ()),
        PatchOp::Replace { path, value } => {
            let target = resolve_mut(doc, &tokens(path)?, path)?;
            *target = value.clone();
            Ok(())
        }
        PatchOp::Test { path, value } => {
            let target = resolve_mut(doc, &tokens(path)?, path)?;
            if target == value {
                Ok(())
            } else {
                Err(ApplyError::TestFailed { path: path.clone() })
            }
        }
        PatchOp::Move { from, path } => {
            let value = remove(doc, from)?;
            add(doc, path, value)
        }
        PatchOp::Copy { from, path } => {
            let value = resolve_mut(doc, &tokens(from)?, from)?.clone();
            add(doc, path, value)
        }
    }
}

fn add(doc: &mut Value, path: &str, value: Value) -> Result<(), ApplyError> {
    let tokens = tokens(path)?;
    let Some((last, parents)) = tokens.split_last() else {
        *doc = value;
        return Ok(());
    };
    let parent = resolve_mut(doc, parents, path)?;
    match parent {
        Value::Object(map) => {
            map.insert(last.clone(), value);
            Ok(())
        }
        Value::Array(items) => {
            if last == "-" {
                items.push(value);
                return Ok(());
            }
            let index = parse_index(last, path)?;
            if index > items.len() {
                return Err(ApplyError::PathNotFound {
                    path: path.to_string(),
                });
            }
            items.insert(index, value);
            Ok(())
        }
        _ => Err(ApplyError::PathNotFound {
            path: path.to_string(),
        }),
    }
}

fn remove(doc: &mut Value, path: &str) -> Result<Value, ApplyError> {
    let tokens = tokens(path)?;
    let Some((last, parents)) = tokens.split_last() else {
        return Ok(std::mem::replace(doc, Value::Null));
    };
    let parent = resolve_mut(doc, parents, path)?;
    match parent {
        Value::Object(map) => map.remove(last).ok_or_else(|| ApplyError::PathNotFound {
            path: path.to_string(),
        }),
        Value::Array(items) => {
            let index = parse_index(last, path)?;
            if index >= items.len() {
                return Err(ApplyError::PathNotFound {
                    path: path.to_string(),
                });
            }
            Ok(items.remove(index))
        }
        _ => Err(ApplyError::PathNotFound {
            path: path.to_string(),
        }),
    }
}

fn resolve_mut<'a>(
    doc: &'a mut Value,
    tokens: &[String],
    path: &str,
) -> Result<&'a mut Value, ApplyError> {
    let mut current = doc;
    for token in tokens {
        current = match current {
            Value::Object(map) => map.get_mut(token).ok_or_else(|| ApplyError::PathNotFound {
                path: path.to_string(),
            })?,
            Value::Array(items) => {
                let index = parse_index(token, path)?;
                items.get_mut(index).ok_or_else(|| ApplyError::PathNotFound {
                    path: path.to_string(),
                })?
            }
            _ => {
                return Err(ApplyError::PathNotFound {
                    path: path.to_string(),
                });
            }
        };
    }
    Ok(current)
}

fn tokens(path: &str) -> Result<Vec<String>, ApplyError> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    if !path.starts_with('/') {
        return Err(ApplyError::InvalidPointer {
            path: path.to_string(),
        });
    }
    Ok(path[1..]
        .split('/')
        .map(|token| token.replace("~1", "/").replace("~0", "~"))
        .collect())
}

fn parse_index(token: &str, path: &str) -> Result<usize, ApplyError> {
    token.parse().map_err(|_| ApplyError::InvalidIndex {
        path: path.to_string(),
    })
}
