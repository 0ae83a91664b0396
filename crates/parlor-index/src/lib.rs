//! Secondary index maintenance for the Parlor store.
//!
//! Index entries are derived data: every entry is written, removed or
//! rebuilt inside the same redb write transaction as the primary record it
//! was derived from.
//!
//! # Key Types
//!
//! - [`IndexMaintainer`] -- apply / remove / drop / rebuild over a transaction
//! - [`IndexSnapshot`] -- Contents of a type's index buckets, for inspection
//!
//! # Layout
//!
//! | index kind        | key                          | value       |
//! |-------------------|------------------------------|-------------|
//! | unique            | value                        | primary key |
//! | non-unique        | value `->` primary key       | primary key |
//! | case-insensitive  | as above, value lower-cased  | primary key |

pub mod bucket;
pub mod error;
pub mod maintainer;

pub use bucket::{
    fold, index_bucket_name, index_key, index_table, primary_table, INDEX_PREFIX,
    NON_UNIQUE_DELIMITER,
};
pub use error::{IndexError, IndexResult};
pub use maintainer::{table_exists, IndexMaintainer, IndexSnapshot};
