//! Object codec for the Parlor store.
//!
//! Converts typed records to and from the generic [`Value`] form, driven by
//! the record's [`TypeDescriptor`]. The record's in-memory shape is reached
//! through serde; the descriptor decides which fields are stored, under which
//! accessor keys, and how each field kind is represented:
//!
//! | kind      | generic form                                  |
//! |-----------|-----------------------------------------------|
//! | boolean   | `Int(0)` / `Int(1)`                           |
//! | integer   | `Int`, range-checked against the width hint   |
//! | float     | `Float`                                       |
//! | string    | `Str`                                         |
//! | blob      | `Bytes` (hex string accepted on decode)       |
//! | nested    | `Object`                                      |
//! | array     | `Seq`; absent decodes to an empty container   |
//! | pointer   | absent when `None`, else the pointee's form   |
//! | delegated | whatever the record's delegate produces       |
//!
//! [`Value`]: parlor_types::Value
//! [`TypeDescriptor`]: parlor_schema::TypeDescriptor

pub mod codec;
mod decode;
mod encode;
pub mod error;

pub use codec::ObjectCodec;
pub use decode::decode_view;
pub use encode::encode_view;
pub use error::{CodecError, CodecResult};
