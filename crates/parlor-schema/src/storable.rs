//! The record trait and the delegated-field capability.

use std::fmt;

use parlor_types::Value;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::builder::SchemaBuilder;
use crate::descriptor::{ScalarKind, Shape};
use crate::error::{DelegateError, SchemaResult};

/// A type the store can persist.
///
/// The in-memory shape of the record is read and written through serde;
/// `describe` states which of its fields are stored, under which keys, and
/// with which index flags. Fields left out of the description (or marked
/// `ignore`) must tolerate being absent on deserialization, e.g. with
/// `#[serde(skip)]` or `#[serde(default)]`.
///
/// # Example
///
/// ```
/// use parlor_schema::{SchemaBuilder, SchemaResult, Shape, Storable};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Player {
///     id: String,
///     login: String,
///     roles: Vec<String>,
/// }
///
/// impl Storable for Player {
///     fn type_name() -> &'static str {
///         "Player"
///     }
///
///     fn describe(schema: &mut SchemaBuilder<'_>) -> SchemaResult<Shape> {
///         Ok(Shape::Struct(vec![
///             schema.string("id"),
///             schema.string("login").unique().case_insensitive(),
///             schema.array::<String>("roles")?,
///         ]))
///     }
/// }
/// ```
pub trait Storable: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Logical name of the type; names its primary bucket.
    fn type_name() -> &'static str;

    /// The storable shape. Called once per registry.
    fn describe(schema: &mut SchemaBuilder<'_>) -> SchemaResult<Shape>;

    /// The delegated-field capability, for types that declare delegated fields.
    fn delegate(&self) -> Option<&dyn DelegatedFields> {
        None
    }

    /// Mutable counterpart of [`delegate`](Self::delegate).
    fn delegate_mut(&mut self) -> Option<&mut dyn DelegatedFields> {
        None
    }
}

/// Capability for fields whose stored form differs from their in-memory
/// form, e.g. an associated entity stored only by its identifier.
///
/// Delegated fields should deserialize from absence (an `Option` or a
/// `#[serde(default)]` field): the codec fills them through
/// `set_delegated_value` after the rest of the record is rebuilt.
pub trait DelegatedFields {
    /// The stored value of the delegated field `accessor`.
    /// Return [`Value::Absent`] to store nothing.
    fn delegated_value(&self, accessor: &str) -> Result<Value, DelegateError>;

    /// Restore the delegated field `accessor` from its stored value.
    fn set_delegated_value(&mut self, accessor: &str, value: Value) -> Result<(), DelegateError>;
}

type GetHook = fn(&serde_json::Value, &str) -> Result<Value, DelegateError>;
type SetHook = fn(&mut serde_json::Value, &str, Value) -> Result<(), DelegateError>;

/// Type-erased entry points into a concrete type's [`DelegatedFields`].
///
/// Captured when the type is registered, so the codec can reach the
/// capability at any nesting depth while only holding the serde view of a
/// nested value.
#[derive(Clone, Copy)]
pub struct DelegateHooks {
    type_name: &'static str,
    get: GetHook,
    set: SetHook,
}

impl DelegateHooks {
    pub fn of<T: Storable>() -> Self {
        Self {
            type_name: T::type_name(),
            get: get_via::<T>,
            set: set_via::<T>,
        }
    }

    /// Read the delegated field `accessor` from the serde view of a record.
    pub fn get(&self, view: &serde_json::Value, accessor: &str) -> Result<Value, DelegateError> {
        (self.get)(view, accessor)
    }

    /// Write the delegated field `accessor` into the serde view of a record.
    pub fn set(
        &self,
        view: &mut serde_json::Value,
        accessor: &str,
        value: Value,
    ) -> Result<(), DelegateError> {
        (self.set)(view, accessor, value)
    }
}

impl fmt::Debug for DelegateHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegateHooks")
            .field("type_name", &self.type_name)
            .finish()
    }
}

fn get_via<T: Storable>(view: &serde_json::Value, accessor: &str) -> Result<Value, DelegateError> {
    let record: T =
        serde_json::from_value(view.clone()).map_err(|e| DelegateError::View(e.to_string()))?;
    record
        .delegate()
        .ok_or(DelegateError::Unsupported(T::type_name()))?
        .delegated_value(accessor)
}

fn set_via<T: Storable>(
    view: &mut serde_json::Value,
    accessor: &str,
    value: Value,
) -> Result<(), DelegateError> {
    let mut record: T =
        serde_json::from_value(view.clone()).map_err(|e| DelegateError::View(e.to_string()))?;
    record
        .delegate_mut()
        .ok_or(DelegateError::Unsupported(T::type_name()))?
        .set_delegated_value(accessor, value)?;
    *view = serde_json::to_value(&record).map_err(|e| DelegateError::View(e.to_string()))?;
    Ok(())
}

macro_rules! scalar_storable {
    ($($ty:ty => $name:literal, $kind:ident, $size:literal;)*) => {
        $(
            impl Storable for $ty {
                fn type_name() -> &'static str {
                    $name
                }

                fn describe(_: &mut SchemaBuilder<'_>) -> SchemaResult<Shape> {
                    Ok(Shape::scalar(ScalarKind::$kind, $size))
                }
            }
        )*
    };
}

scalar_storable! {
    String => "string", String, 256;
    bool => "bool", Boolean, 0;
    i8 => "int8", Integer, 8;
    i16 => "int16", Integer, 16;
    i32 => "int32", Integer, 32;
    i64 => "int64", Integer, 64;
    u8 => "uint8", Unsigned, 8;
    u16 => "uint16", Unsigned, 16;
    u32 => "uint32", Unsigned, 32;
    f32 => "float32", Float, 32;
    f64 => "float64", Float, 64;
}
