//! Process-wide observability setup shared by the workspace crates.

pub mod logging;
