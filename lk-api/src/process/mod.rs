//! Process access and scheduling interfaces

pub mod interface;
