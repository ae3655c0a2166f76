//! Data models for the SQL gateway.
//!
//! This module re-exports all model types used throughout the crate.

pub mod batch;
pub mod query;

pub use batch::Batch;
pub use query::{QueryParam, QueryResult, Statement};
