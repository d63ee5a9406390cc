//! RusTs Bench Core - data primitives for the load-testing harness
//!
//! This crate provides the allocation-friendly types shared by the generator
//! and the ingestion path:
//! - `Point`: one timestamped, tagged, multi-field sample, reusable across cycles
//! - `FieldValue`: typed field values (Integer, Float, Boolean, Text)
//! - `Pool`: a non-blocking free list with scoped `Pooled` guards

pub mod error;
pub mod pool;
pub mod types;

pub use error::{CoreError, Result};
pub use pool::{Pool, Pooled, Reset};
pub use types::*;
