use parlor_schema::{FieldDescriptor, FieldKind, ScalarKind, Shape, TypeDescriptor};
use parlor_types::{Object, Value};
use serde_json::Value as Json;
use tracing::trace;

use crate::error::{CodecError, CodecResult};

/// Encode the serde view of a record into its generic form.
pub fn encode_view(desc: &TypeDescriptor, view: &Json) -> CodecResult<Value> {
    match desc.shape() {
        Shape::Scalar { kind, .. } => encode_scalar(desc.name(), desc.name(), *kind, view),
        Shape::Struct(fields) => {
            let Json::Object(members) = view else {
                return Err(CodecError::format(desc.name(), "*", "expected a struct"));
            };
            let mut out = Object::new();
            for field in fields {
                let value = match (&field.kind, members.get(&field.name)) {
                    (FieldKind::Delegated, _) => delegated_value(desc, field, view)?,
                    // serde writes NaN and the infinities as null.
                    (FieldKind::Scalar(ScalarKind::Float), Some(Json::Null)) => {
                        let reason = "non-finite float";
                        return Err(CodecError::format(desc.name(), &field.name, reason));
                    }
                    (_, None | Some(Json::Null)) => Value::Absent,
                    (_, Some(member)) => encode_field(desc, field, member)?,
                };
                if value.is_absent() {
                    trace!(type_name = desc.name(), field = %field.name, "absent field skipped");
                } else {
                    out.insert(field.accessor.clone(), value);
                }
            }
            Ok(Value::Object(out))
        }
    }
}

fn encode_field(desc: &TypeDescriptor, field: &FieldDescriptor, member: &Json) -> CodecResult<Value> {
    match &field.kind {
        FieldKind::Scalar(kind) => encode_scalar(desc.name(), &field.name, *kind, member),
        FieldKind::Nested(elem) | FieldKind::Pointer(elem) => encode_view(elem.get()?, member),
        FieldKind::Array(elem) => {
            let Json::Array(items) = member else {
                return Err(CodecError::format(desc.name(), &field.name, "expected a sequence"));
            };
            let elem = elem.get()?;
            items
                .iter()
                .map(|item| encode_view(elem, item))
                .collect::<CodecResult<Vec<_>>>()
                .map(Value::Seq)
        }
        FieldKind::Delegated => delegated_value(desc, field, member),
    }
}

fn delegated_value(desc: &TypeDescriptor, field: &FieldDescriptor, view: &Json) -> CodecResult<Value> {
    let hooks = desc.hooks().ok_or_else(|| CodecError::Delegate {
        type_name: desc.name().to_string(),
        field: field.name.clone(),
        source: parlor_schema::DelegateError::Unsupported(desc.name()),
    })?;
    hooks
        .get(view, &field.accessor)
        .map_err(|source| CodecError::Delegate {
            type_name: desc.name().to_string(),
            field: field.name.clone(),
            source,
        })
}

fn encode_scalar(type_name: &str, field: &str, kind: ScalarKind, member: &Json) -> CodecResult<Value> {
    let mismatch = || CodecError::format(type_name, field, format!("expected {kind}, found {member}"));
    match kind {
        ScalarKind::Integer => match member.as_i64() {
            Some(n) => Ok(Value::Int(n)),
            None if member.is_u64() => Err(CodecError::format(
                type_name,
                field,
                "integer exceeds the signed 64-bit range",
            )),
            None => Err(mismatch()),
        },
        ScalarKind::Unsigned => member
            .as_u64()
            .and_then(|n| i64::try_from(n).ok())
            .map(Value::Int)
            .ok_or_else(mismatch),
        ScalarKind::Float => member.as_f64().map(Value::Float).ok_or_else(mismatch),
        ScalarKind::Boolean => member.as_bool().map(Value::from).ok_or_else(mismatch),
        ScalarKind::String => member
            .as_str()
            .map(|s| Value::Str(s.to_string()))
            .ok_or_else(mismatch),
        ScalarKind::Bytes => {
            let Json::Array(items) = member else {
                return Err(mismatch());
            };
            items
                .iter()
                .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect::<Option<Vec<u8>>>()
                .map(Value::Bytes)
                .ok_or_else(mismatch)
        }
    }
}
