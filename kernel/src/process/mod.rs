//! Process management

mod pid;
mod table;

pub use pid::PidPool;
pub use table::{ProcessDescriptor, ProcessSpec, ProcessSummary, ProcessTable};
