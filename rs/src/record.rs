//! Record trait and index value types

use serde::{Deserialize, Serialize};

/// Current time as Unix milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A value stored in the secondary index
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexValue {
    String(String),
    Int(i64),
}

impl std::fmt::Display for IndexValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexValue::String(s) => write!(f, "{}", s),
            IndexValue::Int(i) => write!(f, "{}", i),
        }
    }
}

/// Contract for anything the store can persist.
///
/// Records serialize to JSON for the body column; `indexed_fields` declares
/// the (field, value) pairs written to the secondary index. The same field
/// may appear more than once with different values.
pub trait Record {
    /// Unique id within the collection
    fn id(&self) -> &str;

    /// Optimistic-concurrency version; 0 before first persist, bumped by the
    /// store on create/update
    fn version(&self) -> u64;

    /// Called by the store after a successful write
    fn set_version(&mut self, version: u64);

    /// Last update timestamp (Unix milliseconds)
    fn updated_at(&self) -> i64;

    /// Collection (table partition) this record type lives in
    fn collection_name() -> &'static str
    where
        Self: Sized;

    /// Field/value pairs for the secondary index
    fn indexed_fields(&self) -> Vec<(String, IndexValue)>;
}
