//! Training dataset schema
//!
//! Records carry the survey dataset's column names verbatim. Input is either
//! a JSON array or NDJSON (one record per line).

mod adapter;
mod record;

pub use adapter::*;
pub use record::*;
