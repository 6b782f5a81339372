//! RosterStore - versioned record storage for the roster daemon
//!
//! Stores domain records as JSON bodies in SQLite with a secondary index for
//! field lookups. Every write goes through compare-and-swap on the record
//! version, so concurrent writers detect each other instead of overwriting.
//!
//! # Architecture
//!
//! ```text
//! roster.db
//! ├── records       # (collection, id) -> version, updated_at, JSON body
//! └── record_index  # (collection, field, value) -> id, one row per value
//! ```
//!
//! A record may index the same field under several values (a session indexes
//! `resource` once per staff member plus once for the room), which is what
//! makes per-(resource, date) candidate queries cheap.
//!
//! # Example
//!
//! ```ignore
//! use rosterstore::{Filter, FilterOp, IndexValue, Store};
//!
//! let mut store = Store::open(".rosterd/roster.db")?;
//! let session = store.create(session)?;
//! let on_date = store.list::<Session>(&[Filter::eq("date", IndexValue::String("2024-01-15".into()))])?;
//! ```

pub mod error;
pub mod filter;
pub mod record;
mod store;

pub use error::StoreError;
pub use filter::{Filter, FilterOp};
pub use record::{IndexValue, Record, now_ms};
pub use store::Store;
