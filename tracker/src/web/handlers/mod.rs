//! HTTP request handlers.
//!
//! - `backups` - snapshot, restore, listing and deletion of backups
//! - `common` - shared response and query types
//! - `operations` - operation tracking and emergency cleanup

pub mod backups;
pub mod common;
pub mod operations;

pub use backups::*;
pub use operations::*;
