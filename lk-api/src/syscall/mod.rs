//! System call argument types

pub mod types;
