//! Core dispatch machinery
//!
//! - `table`: the per-ABI handler array
//! - `registry`: one table slot per ABI tag
//! - `dispatcher`: the multiplexer itself
//! - `env`: what a handler can reach
//! - `error`, `traits`, `logger`: diagnostics

pub mod dispatcher;
pub mod env;
pub mod error;
pub mod logger;
pub mod registry;
pub mod table;
pub mod traits;
