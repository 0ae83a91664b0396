//! Field and type descriptors.

use std::any::TypeId;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::error::{SchemaError, SchemaResult};
use crate::storable::DelegateHooks;

/// Kinds of leaf values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Integer,
    /// Non-negative integer; stored as an `Int`.
    Unsigned,
    Float,
    Boolean,
    String,
    Bytes,
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "int"),
            Self::Unsigned => write!(f, "uint"),
            Self::Float => write!(f, "float"),
            Self::Boolean => write!(f, "bool"),
            Self::String => write!(f, "string"),
            Self::Bytes => write!(f, "blob"),
        }
    }
}

/// Kind of a storable field.
#[derive(Clone, Debug)]
pub enum FieldKind {
    /// A leaf value.
    Scalar(ScalarKind),
    /// Ordered sequence of elements of the referenced type.
    Array(TypeRef),
    /// At most one value of the referenced type (`Option<T>`).
    Pointer(TypeRef),
    /// An embedded struct of the referenced type.
    Nested(TypeRef),
    /// Produced and consumed by the owning record's
    /// [`DelegatedFields`](crate::DelegatedFields) capability.
    Delegated,
}

impl FieldKind {
    /// The element descriptor for array, pointer and nested kinds.
    pub fn elem(&self) -> Option<&TypeRef> {
        match self {
            Self::Array(elem) | Self::Pointer(elem) | Self::Nested(elem) => Some(elem),
            Self::Scalar(_) | Self::Delegated => None,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(kind) => write!(f, "{kind}"),
            Self::Array(elem) => write!(f, "[]{}", elem.name()),
            Self::Pointer(elem) => write!(f, "*{}", elem.name()),
            Self::Nested(elem) => write!(f, "{}", elem.name()),
            Self::Delegated => write!(f, "delegated"),
        }
    }
}

/// Per-field flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FieldFlags {
    /// Maintain a secondary index on this field.
    pub indexed: bool,
    /// The index rejects a value already held by another record.
    pub unique: bool,
    /// Index keys (and query masks) are lower-cased.
    pub case_insensitive: bool,
    /// Not stored at all. Ignored fields never reach a registered descriptor.
    pub ignored: bool,
}

/// One storable field of a record type.
#[derive(Clone, Debug)]
pub struct FieldDescriptor {
    /// In-memory (serde) field name. Also names the field's index bucket.
    pub name: String,
    /// Key of the field inside the stored document.
    pub accessor: String,
    pub kind: FieldKind,
    /// Width hint: bits for integers and floats, a length hint for strings,
    /// `0` when unspecified.
    pub size: u32,
    pub flags: FieldFlags,
}

impl FieldDescriptor {
    /// A field whose accessor equals its name.
    pub fn new(name: impl Into<String>, kind: FieldKind, size: u32) -> Self {
        let name = name.into();
        Self {
            accessor: name.clone(),
            name,
            kind,
            size,
            flags: FieldFlags::default(),
        }
    }

    /// Store the field under a different document key.
    pub fn accessor(mut self, accessor: impl Into<String>) -> Self {
        self.accessor = accessor.into();
        self
    }

    /// Override the width hint.
    pub fn size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    /// Maintain a non-unique index.
    pub fn indexed(mut self) -> Self {
        self.flags.indexed = true;
        self
    }

    /// Maintain a unique index (implies [`indexed`](Self::indexed)).
    pub fn unique(mut self) -> Self {
        self.flags.indexed = true;
        self.flags.unique = true;
        self
    }

    /// Fold index keys to lower case.
    pub fn case_insensitive(mut self) -> Self {
        self.flags.case_insensitive = true;
        self
    }

    /// Leave the field out of storage.
    pub fn ignore(mut self) -> Self {
        self.flags.ignored = true;
        self
    }

    pub fn is_indexed(&self) -> bool {
        self.flags.indexed
    }

    pub fn is_unique(&self) -> bool {
        self.flags.unique
    }

    pub fn is_case_insensitive(&self) -> bool {
        self.flags.case_insensitive
    }
}

/// The storable shape of a type.
#[derive(Clone, Debug)]
pub enum Shape {
    /// A struct stored as a generic object, fields in declaration order.
    Struct(Vec<FieldDescriptor>),
    /// A single leaf value.
    Scalar { kind: ScalarKind, size: u32 },
}

impl Shape {
    pub fn scalar(kind: ScalarKind, size: u32) -> Self {
        Self::Scalar { kind, size }
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, Self::Struct(_))
    }

    /// Fields of a struct shape; empty for scalars.
    pub fn fields(&self) -> &[FieldDescriptor] {
        match self {
            Self::Struct(fields) => fields,
            Self::Scalar { .. } => &[],
        }
    }
}

/// Cached metadata for one record type.
#[derive(Debug)]
pub struct TypeDescriptor {
    name: &'static str,
    type_id: TypeId,
    shape: Shape,
    hooks: Option<DelegateHooks>,
}

impl TypeDescriptor {
    pub(crate) fn new(
        name: &'static str,
        type_id: TypeId,
        shape: Shape,
        hooks: Option<DelegateHooks>,
    ) -> Self {
        Self {
            name,
            type_id,
            shape,
            hooks,
        }
    }

    /// Logical name; also the name of the type's primary bucket.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn is_struct(&self) -> bool {
        self.shape.is_struct()
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        self.shape.fields()
    }

    /// Look up a top-level field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields().iter().find(|f| f.name == name)
    }

    /// Hooks reaching the type's [`DelegatedFields`](crate::DelegatedFields)
    /// capability; present only when the type declares delegated fields.
    pub fn hooks(&self) -> Option<&DelegateHooks> {
        self.hooks.as_ref()
    }

    /// Resolve a dotted field path such as `"Settings.Mode"`.
    ///
    /// Every segment but the last must name a nested, array or pointer field
    /// whose element is a struct. Returns the index bucket path the final
    /// field lives under (e.g. `"Room.Settings"`) and its descriptor.
    pub fn field_path(&self, path: &str) -> SchemaResult<Option<(String, &FieldDescriptor)>> {
        let mut segments = path.split('.').peekable();
        let mut current = self;
        let mut bucket_path = self.name.to_string();
        while let Some(segment) = segments.next() {
            let Some(field) = current.field(segment) else {
                return Ok(None);
            };
            if segments.peek().is_none() {
                return Ok(Some((bucket_path, field)));
            }
            let Some(elem) = field.kind.elem() else {
                return Ok(None);
            };
            bucket_path.push('.');
            bucket_path.push_str(&field.name);
            current = elem.get()?;
        }
        Ok(None)
    }
}

/// Shared handle to a registered descriptor.
///
/// All handles for one type point at the same cell. The cell is filled
/// exactly once, before the registry releases its lock, so a handle obtained
/// from the registry always resolves. A handle observed while its type is
/// still being built (a self-reference) resolves once the build finishes.
#[derive(Clone)]
pub struct TypeRef {
    name: &'static str,
    cell: Arc<OnceLock<TypeDescriptor>>,
}

impl TypeRef {
    pub(crate) fn pending(name: &'static str) -> Self {
        Self {
            name,
            cell: Arc::new(OnceLock::new()),
        }
    }

    pub(crate) fn fill(&self, descriptor: TypeDescriptor) -> SchemaResult<()> {
        self.cell
            .set(descriptor)
            .map_err(|_| SchemaError::DuplicateTypeName(self.name.to_string()))
    }

    pub(crate) fn is_filled(&self) -> bool {
        self.cell.get().is_some()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The descriptor behind this handle.
    pub fn get(&self) -> SchemaResult<&TypeDescriptor> {
        self.cell
            .get()
            .ok_or_else(|| SchemaError::Incomplete(self.name.to_string()))
    }

    /// Whether two handles share the same descriptor cell.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.cell, &b.cell)
    }
}

// Descriptors of self-referential types form cycles; print names only.
impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRef")
            .field("name", &self.name)
            .field("filled", &self.is_filled())
            .finish()
    }
}
