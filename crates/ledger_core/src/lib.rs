pub mod config;
pub mod error;
pub mod ledger;
pub mod model;
pub mod storage;
pub mod store;
