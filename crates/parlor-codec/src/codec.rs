use std::any::TypeId;

use parlor_schema::{Storable, TypeDescriptor};
use parlor_types::Value;

use crate::decode::decode_view;
use crate::encode::encode_view;
use crate::error::{CodecError, CodecResult};

/// Converts typed records to and from their generic form.
///
/// Both directions are pure functions of (descriptor, value): encoding a
/// record and decoding the result yields an equivalent record.
pub struct ObjectCodec;

impl ObjectCodec {
    /// Encode `record` using its descriptor.
    pub fn encode<T: Storable>(desc: &TypeDescriptor, record: &T) -> CodecResult<Value> {
        check_type::<T>(desc)?;
        let view = serde_json::to_value(record)
            .map_err(|e| CodecError::format(desc.name(), "*", e.to_string()))?;
        encode_view(desc, &view)
    }

    /// Decode a record of type `T` from its generic form.
    pub fn decode<T: Storable>(desc: &TypeDescriptor, value: &Value) -> CodecResult<T> {
        check_type::<T>(desc)?;
        let view = decode_view(desc, value)?;
        serde_json::from_value(view).map_err(|e| CodecError::format(desc.name(), "*", e.to_string()))
    }
}

fn check_type<T: Storable>(desc: &TypeDescriptor) -> CodecResult<()> {
    if desc.type_id() == TypeId::of::<T>() {
        Ok(())
    } else {
        Err(CodecError::TypeMismatch {
            descriptor: desc.name(),
            record: T::type_name(),
        })
    }
}
