//! Core types and the per-process ABI context

pub mod context;
pub mod types;
