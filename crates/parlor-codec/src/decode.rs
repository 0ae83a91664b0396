use parlor_schema::{FieldDescriptor, FieldKind, ScalarKind, Shape, TypeDescriptor};
use parlor_types::Value;
use serde_json::{Map, Number, Value as Json};

use crate::error::{CodecError, CodecResult};

/// Rebuild the serde view of a record from its generic form.
///
/// Absent fields are left out of the view (or, for arrays, become an empty
/// sequence); whether the record type accepts their absence is decided by
/// its serde definition.
pub fn decode_view(desc: &TypeDescriptor, value: &Value) -> CodecResult<Json> {
    match desc.shape() {
        Shape::Scalar { kind, size } => decode_scalar(desc.name(), desc.name(), *kind, *size, value),
        Shape::Struct(fields) => {
            let Value::Object(obj) = value else {
                return Err(CodecError::format(
                    desc.name(),
                    "*",
                    format!("expected an object, found {}", value.kind_name()),
                ));
            };
            let mut members = Map::new();
            for field in fields {
                if matches!(field.kind, FieldKind::Delegated) {
                    continue;
                }
                match obj.get(&field.accessor) {
                    None | Some(Value::Absent) => {
                        if matches!(field.kind, FieldKind::Array(_)) {
                            members.insert(field.name.clone(), Json::Array(Vec::new()));
                        }
                    }
                    Some(stored) => {
                        members.insert(field.name.clone(), decode_field(desc, field, stored)?);
                    }
                }
            }

            let mut view = Json::Object(members);
            for field in fields {
                if !matches!(field.kind, FieldKind::Delegated) {
                    continue;
                }
                let Some(stored) = obj.get(&field.accessor).filter(|v| !v.is_absent()) else {
                    continue;
                };
                restore_delegated(desc, field, &mut view, stored.clone())?;
            }
            Ok(view)
        }
    }
}

fn decode_field(desc: &TypeDescriptor, field: &FieldDescriptor, stored: &Value) -> CodecResult<Json> {
    match &field.kind {
        FieldKind::Scalar(kind) => decode_scalar(desc.name(), &field.name, *kind, field.size, stored),
        FieldKind::Nested(elem) | FieldKind::Pointer(elem) => decode_view(elem.get()?, stored),
        FieldKind::Array(elem) => {
            let Value::Seq(items) = stored else {
                return Err(CodecError::format(
                    desc.name(),
                    &field.name,
                    format!("expected a sequence, found {}", stored.kind_name()),
                ));
            };
            let elem = elem.get()?;
            items
                .iter()
                .map(|item| decode_view(elem, item))
                .collect::<CodecResult<Vec<_>>>()
                .map(Json::Array)
        }
        // Delegated fields are restored after the rest of the view exists.
        FieldKind::Delegated => Ok(Json::Null),
    }
}

fn restore_delegated(
    desc: &TypeDescriptor,
    field: &FieldDescriptor,
    view: &mut Json,
    stored: Value,
) -> CodecResult<()> {
    let delegate_error = |source| CodecError::Delegate {
        type_name: desc.name().to_string(),
        field: field.name.clone(),
        source,
    };
    let hooks = desc
        .hooks()
        .ok_or_else(|| delegate_error(parlor_schema::DelegateError::Unsupported(desc.name())))?;
    hooks
        .set(view, &field.accessor, stored)
        .map_err(delegate_error)
}

fn decode_scalar(
    type_name: &str,
    field: &str,
    kind: ScalarKind,
    size: u32,
    stored: &Value,
) -> CodecResult<Json> {
    let mismatch = || {
        CodecError::format(
            type_name,
            field,
            format!("expected {kind}, found {}", stored.kind_name()),
        )
    };
    match (kind, stored) {
        (ScalarKind::Integer, Value::Int(n)) => check_width(type_name, field, *n, size),
        (ScalarKind::Integer, Value::Float(f)) if f.fract() == 0.0 && f.is_finite() => {
            check_width(type_name, field, *f as i64, size)
        }
        (ScalarKind::Unsigned, Value::Int(n)) => check_unsigned_width(type_name, field, *n, size),
        (ScalarKind::Unsigned, Value::Float(f)) if f.fract() == 0.0 && f.is_finite() => {
            check_unsigned_width(type_name, field, *f as i64, size)
        }
        (ScalarKind::Float, Value::Int(n)) => float(type_name, field, *n as f64),
        (ScalarKind::Float, Value::Float(f)) => float(type_name, field, *f),
        (ScalarKind::Boolean, Value::Int(n)) => Ok(Json::Bool(*n != 0)),
        (ScalarKind::String, Value::Str(s)) => Ok(Json::String(s.clone())),
        (ScalarKind::Bytes, Value::Bytes(b)) => Ok(bytes(b)),
        (ScalarKind::Bytes, Value::Str(s)) => hex::decode(s)
            .map(|b| bytes(&b))
            .map_err(|e| CodecError::format(type_name, field, format!("invalid hex blob: {e}"))),
        _ => Err(mismatch()),
    }
}

fn check_width(type_name: &str, field: &str, n: i64, bits: u32) -> CodecResult<Json> {
    let fits = match bits {
        8 => i8::try_from(n).is_ok(),
        16 => i16::try_from(n).is_ok(),
        32 => i32::try_from(n).is_ok(),
        _ => true,
    };
    if fits {
        Ok(Json::Number(n.into()))
    } else {
        Err(CodecError::format(
            type_name,
            field,
            format!("{n} does not fit in {bits} bits"),
        ))
    }
}

fn check_unsigned_width(type_name: &str, field: &str, n: i64, bits: u32) -> CodecResult<Json> {
    let fits = match bits {
        8 => u8::try_from(n).is_ok(),
        16 => u16::try_from(n).is_ok(),
        _ => u32::try_from(n).is_ok(),
    };
    if fits {
        Ok(Json::Number(n.into()))
    } else {
        Err(CodecError::format(
            type_name,
            field,
            format!("{n} does not fit in {bits} unsigned bits"),
        ))
    }
}

fn float(type_name: &str, field: &str, f: f64) -> CodecResult<Json> {
    Number::from_f64(f)
        .map(Json::Number)
        .ok_or_else(|| CodecError::format(type_name, field, "non-finite float"))
}

fn bytes(b: &[u8]) -> Json {
    Json::Array(b.iter().map(|b| Json::Number((*b).into())).collect())
}
