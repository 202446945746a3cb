//! This module provides reusable test utilities:
//! - Temp-file backed test databases
//! - Seed data and artifact builders
//! - Blob storage doubles

// Allow unused code in test fixtures - not every test binary uses every helper
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod blob_storage;
pub mod test_data;
pub mod test_database;

// Re-export commonly used items
pub use blob_storage::FailingBlobStorage;
pub use test_data::*;
pub use test_database::TestDatabase;
