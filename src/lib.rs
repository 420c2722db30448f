pub mod blob_relocation;
pub mod blob_store;
pub mod config;
pub mod dependents;
pub mod error;
pub mod migrator;
pub mod relocator;
pub mod reporter;
pub mod scanner;
pub mod search_index;
pub mod storage;
pub mod strategies;
pub mod types;
