//! Field constructors used by [`Storable::describe`].

use std::any::TypeId;

use tracing::{debug, trace};

use crate::descriptor::{FieldDescriptor, FieldKind, ScalarKind, Shape, TypeDescriptor, TypeRef};
use crate::error::{SchemaError, SchemaResult};
use crate::registry::RegistryState;
use crate::storable::{DelegateHooks, Storable};

/// Default length hint for string fields.
const STRING_SIZE_HINT: u32 = 256;

/// Builds descriptors while the registry's exclusive lock is held.
///
/// Element types referenced through [`array`](Self::array),
/// [`pointer`](Self::pointer) and [`nested`](Self::nested) are resolved
/// through the same registry, recursively. Every type first registered
/// during one build is recorded so the build can be rolled back as a unit.
pub struct SchemaBuilder<'a> {
    state: &'a mut RegistryState,
    created: Vec<TypeId>,
}

impl<'a> SchemaBuilder<'a> {
    pub(crate) fn new(state: &'a mut RegistryState) -> Self {
        Self {
            state,
            created: Vec::new(),
        }
    }

    /// Integer field of native (64-bit) width.
    pub fn int(&self, name: &str) -> FieldDescriptor {
        self.int_sized(name, 64)
    }

    /// Integer field stored in `bits` bits; decoding rejects values that do
    /// not fit.
    pub fn int_sized(&self, name: &str, bits: u32) -> FieldDescriptor {
        FieldDescriptor::new(name, FieldKind::Scalar(ScalarKind::Integer), bits)
    }

    /// Unsigned integer field stored in `bits` bits (8, 16 or 32). Use this
    /// rather than [`int_sized`](Self::int_sized) for `u8`, `u16` and `u32`.
    pub fn uint_sized(&self, name: &str, bits: u32) -> FieldDescriptor {
        FieldDescriptor::new(name, FieldKind::Scalar(ScalarKind::Unsigned), bits)
    }

    pub fn float(&self, name: &str) -> FieldDescriptor {
        FieldDescriptor::new(name, FieldKind::Scalar(ScalarKind::Float), 64)
    }

    pub fn boolean(&self, name: &str) -> FieldDescriptor {
        FieldDescriptor::new(name, FieldKind::Scalar(ScalarKind::Boolean), 0)
    }

    pub fn string(&self, name: &str) -> FieldDescriptor {
        FieldDescriptor::new(name, FieldKind::Scalar(ScalarKind::String), STRING_SIZE_HINT)
    }

    /// Byte blob field (`Vec<u8>` in memory).
    pub fn bytes(&self, name: &str) -> FieldDescriptor {
        FieldDescriptor::new(name, FieldKind::Scalar(ScalarKind::Bytes), 0)
    }

    /// Field handled by the owning record's delegated-field capability.
    pub fn delegated(&self, name: &str) -> FieldDescriptor {
        FieldDescriptor::new(name, FieldKind::Delegated, 0)
    }

    /// `Vec<E>` field.
    pub fn array<E: Storable>(&mut self, name: &str) -> SchemaResult<FieldDescriptor> {
        let elem = self.resolve::<E>()?;
        Ok(FieldDescriptor::new(name, FieldKind::Array(elem), 0))
    }

    /// `Option<E>` field.
    pub fn pointer<E: Storable>(&mut self, name: &str) -> SchemaResult<FieldDescriptor> {
        let elem = self.resolve::<E>()?;
        Ok(FieldDescriptor::new(name, FieldKind::Pointer(elem), 0))
    }

    /// Embedded struct field of type `E`.
    pub fn nested<E: Storable>(&mut self, name: &str) -> SchemaResult<FieldDescriptor> {
        let elem = self.resolve::<E>()?;
        Ok(FieldDescriptor::new(name, FieldKind::Nested(elem), 0))
    }

    /// Return the descriptor handle for `T`, building it on a cache miss.
    pub(crate) fn resolve<T: Storable>(&mut self) -> SchemaResult<TypeRef> {
        let id = TypeId::of::<T>();
        if let Some(existing) = self.state.by_type.get(&id) {
            return Ok(existing.clone());
        }

        let name = T::type_name();
        if self.state.by_name.get(name).is_some_and(|other| *other != id) {
            return Err(SchemaError::DuplicateTypeName(name.to_string()));
        }

        let handle = TypeRef::pending(name);
        self.state.by_type.insert(id, handle.clone());
        self.state.by_name.insert(name, id);
        self.created.push(id);
        trace!(type_name = name, "building descriptor");

        let shape = validate(name, T::describe(self)?)?;
        let has_delegates = shape
            .fields()
            .iter()
            .any(|f| matches!(f.kind, FieldKind::Delegated));
        let hooks = has_delegates.then(DelegateHooks::of::<T>);
        let field_count = shape.fields().len();

        handle.fill(TypeDescriptor::new(name, id, shape, hooks))?;
        debug!(type_name = name, fields = field_count, "descriptor registered");
        Ok(handle)
    }

    /// Undo every registration made by this build.
    pub(crate) fn rollback(self) {
        for id in self.created {
            if let Some(handle) = self.state.by_type.remove(&id) {
                self.state.by_name.remove(handle.name());
            }
        }
    }
}

/// Drop ignored fields and reject shapes the store cannot maintain.
fn validate(type_name: &str, shape: Shape) -> SchemaResult<Shape> {
    let fields = match shape {
        Shape::Scalar { .. } => return Ok(shape),
        Shape::Struct(fields) => fields,
    };

    let unsupported = |field: &FieldDescriptor, reason: &str| SchemaError::UnsupportedShape {
        type_name: type_name.to_string(),
        field: field.name.clone(),
        reason: reason.to_string(),
    };

    let mut kept: Vec<FieldDescriptor> = Vec::with_capacity(fields.len());
    for mut field in fields {
        if field.flags.ignored {
            trace!(type_name, field = %field.name, "ignoring field");
            continue;
        }
        if field.flags.unique {
            field.flags.indexed = true;
        }
        if kept
            .iter()
            .any(|f| f.name == field.name || f.accessor == field.accessor)
        {
            return Err(SchemaError::DuplicateField {
                type_name: type_name.to_string(),
                field: field.name,
            });
        }

        match &field.kind {
            FieldKind::Nested(elem) => {
                if elem_is_scalar(elem) {
                    return Err(unsupported(&field, "nested field of a scalar type"));
                }
                if field.flags.indexed {
                    return Err(unsupported(&field, "index on a nested struct"));
                }
            }
            FieldKind::Array(elem) | FieldKind::Pointer(elem) => {
                if field.flags.indexed && !elem_is_scalar(elem) {
                    return Err(unsupported(&field, "index on a sequence of structs"));
                }
            }
            FieldKind::Scalar(ScalarKind::Bytes) => {
                if field.flags.indexed {
                    return Err(unsupported(&field, "index on a byte blob"));
                }
            }
            FieldKind::Scalar(ScalarKind::Integer) => {
                if !matches!(field.size, 0 | 8 | 16 | 32 | 64) {
                    return Err(unsupported(&field, "integer width must be 8, 16, 32 or 64"));
                }
            }
            FieldKind::Scalar(ScalarKind::Unsigned) => {
                if !matches!(field.size, 8 | 16 | 32) {
                    return Err(unsupported(&field, "unsigned width must be 8, 16 or 32"));
                }
            }
            FieldKind::Scalar(_) | FieldKind::Delegated => {}
        }
        kept.push(field);
    }
    Ok(Shape::Struct(kept))
}

/// A type still under construction can only be a struct: scalars never
/// recurse into the builder.
fn elem_is_scalar(elem: &TypeRef) -> bool {
    elem.get().map(|d| !d.is_struct()).unwrap_or(false)
}
