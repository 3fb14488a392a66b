//! CLI commands implementation

pub mod ask;
pub mod chart;
pub mod history;
pub mod init;
pub mod tables;

pub use ask::*;
pub use chart::*;
pub use history::*;
pub use init::*;
pub use tables::*;
