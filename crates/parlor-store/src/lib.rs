//! Schema-driven document store for the Parlor server.
//!
//! Records are any [`Storable`] type. The store flattens them with the
//! object codec, keeps their secondary indexes consistent within the same
//! redb write transaction, and answers [`Filter`] queries through an index
//! bucket when the filter names an indexed field.
//!
//! # Key Types
//!
//! - [`Store`] -- CRUD, list and index administration over one database
//! - [`StoreConfig`] / [`DurabilityMode`] -- Where and how the database is opened
//! - [`QueryPlan`] -- How a filter is resolved
//!
//! # Example
//!
//! ```no_run
//! use parlor_store::{Store, StoreConfig};
//! use parlor_types::Filter;
//!
//! # fn demo() -> parlor_store::StoreResult<()> {
//! let store = Store::open(StoreConfig::new("data/parlor"))?;
//! store.create("motd", &"welcome".to_string())?;
//! let all: Vec<String> = store.list(&Filter::all())?;
//! # Ok(())
//! # }
//! ```
//!
//! [`Storable`]: parlor_schema::Storable
//! [`Filter`]: parlor_types::Filter

pub mod config;
pub mod error;
pub mod query;
pub mod store;

pub use config::{DurabilityMode, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use parlor_index::IndexSnapshot;
pub use query::QueryPlan;
pub use store::Store;
