//! Core violation data types.

mod types;

pub use types::{
    infer_status, parse_amount, EnhancedResult, Origin, Query, ResultMetadata, Violation,
    ViolationStatus, ViolationSummary,
};
