//! Schema registry for the Parlor store.
//!
//! Record types describe their storable shape once, through
//! [`Storable::describe`]. The [`SchemaRegistry`] caches the resulting
//! [`TypeDescriptor`] per concrete type; every later lookup is a cache hit
//! returning the same shared [`TypeRef`].
//!
//! # Key Types
//!
//! - [`Storable`]: Implemented by every record (and scalar element) type
//! - [`SchemaBuilder`]: Field constructors handed to `describe`
//! - [`FieldDescriptor`] / [`FieldKind`] / [`FieldFlags`]: One storable field
//! - [`TypeDescriptor`] / [`Shape`]: One record type
//! - [`DelegatedFields`]: Capability for fields stored in a derived form
//!
//! # Design Rules
//!
//! 1. A descriptor is built exactly once per type and never mutated after.
//! 2. Cache fills run under a single exclusive lock; reads share it.
//! 3. Self-referential types terminate: a type under construction is
//!    referenced through its not-yet-filled [`TypeRef`].
//! 4. A failed build registers nothing.

pub mod builder;
pub mod descriptor;
pub mod error;
pub mod registry;
pub mod storable;

pub use builder::SchemaBuilder;
pub use descriptor::{FieldDescriptor, FieldFlags, FieldKind, ScalarKind, Shape, TypeDescriptor, TypeRef};
pub use error::{DelegateError, SchemaError, SchemaResult};
pub use registry::SchemaRegistry;
pub use storable::{DelegateHooks, DelegatedFields, Storable};
