//! Query filters over indexed fields

use crate::record::IndexValue;

/// Comparison operator for a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
}

/// A single predicate over an indexed field. Multiple filters passed to
/// `Store::list` are AND-ed together.
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: IndexValue,
}

impl Filter {
    /// Equality filter on an indexed field
    pub fn eq(field: impl Into<String>, value: IndexValue) -> Self {
        Filter {
            field: field.into(),
            op: FilterOp::Eq,
            value,
        }
    }
}
