//! RFC-6902 operation model and the flat positional wire encoding.
//!
//! On the wire a patch is a single flat array: each op contributes
//! `[opcode, path]` or `[opcode, path, third]` where `third` is the value
//! for add/replace/test and the source path for move/copy. Positions are
//! stable and there are no object keys, keeping payloads compact.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::Limits;

const OP_REMOVE: u64 = 0;
const OP_ADD: u64 = 1;
const OP_REPLACE: u64 = 2;
const OP_TEST: u64 = 3;
const OP_MOVE: u64 = 4;
const OP_COPY: u64 = 5;

/// A single logical patch operation.
///
/// Serde round-trips as the standard RFC-6902 object shape,
/// e.g. `{"op":"add","path":"/x","value":1}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PatchOp {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
    Test { path: String, value: Value },
    Move { from: String, path: String },
    Copy { from: String, path: String },
}

impl PatchOp {
    pub fn path(&self) -> &str {
        match self {
            PatchOp::Add { path, .. }
            | PatchOp::Remove { path }
            | PatchOp::Replace { path, .. }
            | PatchOp::Test { path, .. }
            | PatchOp::Move { path, .. }
            | PatchOp::Copy { path, .. } => path,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatchCodecError {
    #[error("unknown patch opcode {opcode}")]
    UnknownOpcode { opcode: u64 },
    #[error("patch opcode is not an unsigned integer")]
    InvalidOpcode,
    #[error("patch path is not a string")]
    InvalidPath,
    #[error("compressed patch ends mid-operation")]
    TruncatedPatch,
    #[error("compressed patch exceeds {max_ops} operations")]
    TooManyOps { max_ops: usize },
}

/// Compress a list of ops into the flat positional array.
pub fn compress(ops: &[PatchOp]) -> Vec<Value> {
    let mut out = Vec::with_capacity(ops.len() * 3);
    for op in ops {
        match op {
            PatchOp::Remove { path } => {
                out.push(Value::from(OP_REMOVE));
                out.push(Value::from(path.clone()));
            }
            PatchOp::Add { path, value } => {
                out.push(Value::from(OP_ADD));
                out.push(Value::from(path.clone()));
                out.push(value.clone());
            }
            PatchOp::Replace { path, value } => {
                out.push(Value::from(OP_REPLACE));
                out.push(Value::from(path.clone()));
                out.push(value.clone());
            }
            PatchOp::Test { path, value } => {
                out.push(Value::from(OP_TEST));
                out.push(Value::from(path.clone()));
                out.push(value.clone());
            }
            PatchOp::Move { from, path } => {
                out.push(Value::from(OP_MOVE));
                out.push(Value::from(path.clone()));
                out.push(Value::from(from.clone()));
            }
            PatchOp::Copy { from, path } => {
                out.push(Value::from(OP_COPY));
                out.push(Value::from(path.clone()));
                out.push(Value::from(from.clone()));
            }
        }
    }
    out
}

/// Decompress the flat positional array back into ops.
///
/// Unknown opcodes and truncated suffixes are fatal protocol errors.
pub fn decompress(flat: &[Value], limits: &Limits) -> Result<Vec<PatchOp>, PatchCodecError> {
    let mut ops = Vec::new();
    let mut cursor = flat.iter();

    while let Some(head) = cursor.next() {
        if ops.len() >= limits.max_patch_ops {
            return Err(PatchCodecError::TooManyOps {
                max_ops: limits.max_patch_ops,
            });
        }
        let opcode = head.as_u64().ok_or(PatchCodecError::InvalidOpcode)?;
        let path = next_string(&mut cursor)?;
        let op = match opcode {
            OP_REMOVE => PatchOp::Remove { path },
            OP_ADD => PatchOp::Add {
                path,
                value: next_value(&mut cursor)?,
            },
            OP_REPLACE => PatchOp::Replace {
                path,
                value: next_value(&mut cursor)?,
            },
            OP_TEST => PatchOp::Test {
                path,
                value: next_value(&mut cursor)?,
            },
            OP_MOVE => PatchOp::Move {
                from: next_string(&mut cursor)?,
                path,
            },
            OP_COPY => PatchOp::Copy {
                from: next_string(&mut cursor)?,
                path,
            },
            other => return Err(PatchCodecError::UnknownOpcode { opcode: other }),
        };
        ops.push(op);
    }

    Ok(ops)
}

fn next_value<'a>(cursor: &mut impl Iterator<Item = &'a Value>) -> Result<Value, PatchCodecError> {
    cursor.next().cloned().ok_or(PatchCodecError::TruncatedPatch)
}

fn next_string<'a>(cursor: &mut impl Iterator<Item = &'a Value>) -> Result<String, PatchCodecError> {
    match cursor.next() {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(PatchCodecError::InvalidPath),
        None => Err(PatchCodecError::TruncatedPatch),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn wire_examples() {
        let ops = vec![
            PatchOp::Add {
                path: "/x".into(),
                value: json!(1),
            },
            PatchOp::Remove { path: "/x".into() },
            PatchOp::Move {
                from: "/a".into(),
                path: "/b".into(),
            },
        ];
        let flat = compress(&ops);
        assert_eq!(
            flat,
            vec![
                json!(1),
                json!("/x"),
                json!(1),
                json!(0),
                json!("/x"),
                json!(4),
                json!("/b"),
                json!("/a"),
            ]
        );
        assert_eq!(decompress(&flat, &Limits::default()).unwrap(), ops);
    }

    #[test]
    fn unknown_opcode_is_fatal() {
        let flat = vec![json!(9), json!("/x")];
        assert_eq!(
            decompress(&flat, &Limits::default()),
            Err(PatchCodecError::UnknownOpcode { opcode: 9 })
        );
    }

    #[test]
    fn truncated_suffix_is_fatal() {
        let flat = vec![json!(1), json!("/x")];
        assert_eq!(
            decompress(&flat, &Limits::default()),
            Err(PatchCodecError::TruncatedPatch)
        );
        let flat = vec![json!(0)];
        assert_eq!(
            decompress(&flat, &Limits::default()),
            Err(PatchCodecError::TruncatedPatch)
        );
    }

    #[test]
    fn non_string_path_is_rejected() {
        let flat = vec![json!(0), json!(3)];
        assert_eq!(
            decompress(&flat, &Limits::default()),
            Err(PatchCodecError::InvalidPath)
        );
    }

    #[test]
    fn op_count_limit_enforced() {
        let limits = Limits {
            max_patch_ops: 1,
            ..Limits::default()
        };
        let ops = vec![
            PatchOp::Remove { path: "/a".into() },
            PatchOp::Remove { path: "/b".into() },
        ];
        assert_eq!(
            decompress(&compress(&ops), &limits),
            Err(PatchCodecError::TooManyOps { max_ops: 1 })
        );
    }

    #[test]
    fn serde_shape_is_rfc6902() {
        let op = PatchOp::Add {
            path: "/x".into(),
            value: json!(1),
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json, json!({"op": "add", "path": "/x", "value": 1}));
    }

    fn arb_path() -> impl Strategy<Value = String> {
        proptest::collection::vec("[a-z]{1,4}", 1..3).prop_map(|segs| format!("/{}", segs.join("/")))
    }

    fn arb_op() -> impl Strategy<Value = PatchOp> {
        let value = prop_oneof![
            Just(json!(null)),
            any::<bool>().prop_map(Value::from),
            any::<i32>().prop_map(Value::from),
            "[a-z]{0,6}".prop_map(Value::from),
        ];
        prop_oneof![
            (arb_path(), value.clone()).prop_map(|(path, value)| PatchOp::Add { path, value }),
            arb_path().prop_map(|path| PatchOp::Remove { path }),
            (arb_path(), value.clone()).prop_map(|(path, value)| PatchOp::Replace { path, value }),
            (arb_path(), value).prop_map(|(path, value)| PatchOp::Test { path, value }),
            (arb_path(), arb_path()).prop_map(|(from, path)| PatchOp::Move { from, path }),
            (arb_path(), arb_path()).prop_map(|(from, path)| PatchOp::Copy { from, path }),
        ]
    }

    proptest! {
        #[test]
        fn roundtrip_is_stable(ops in proptest::collection::vec(arb_op(), 0..12)) {
            let limits = Limits::default();
            let once = decompress(&compress(&ops), &limits).unwrap();
            prop_assert_eq!(&once, &ops);
            let twice = decompress(&compress(&once), &limits).unwrap();
            prop_assert_eq!(twice, once);
        }
    }
}
