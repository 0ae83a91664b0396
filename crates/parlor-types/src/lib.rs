//! Foundation types for the Parlor store.
//!
//! Every other Parlor crate depends on `parlor-types`. It defines the
//! type-erased form in which records travel between the codec, the index
//! maintainer and the on-disk buckets, plus the filter callers use to query
//! them.
//!
//! # Key Types
//!
//! - [`Value`]: Closed tagged union for generic record values
//! - [`Object`]: Accessor-keyed map of values (a generic struct)
//! - [`Filter`]: Field/mask query accepted by `list` operations

pub mod error;
pub mod filter;
pub mod value;

pub use error::TypeError;
pub use filter::Filter;
pub use value::{Object, Value};
