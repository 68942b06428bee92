pub mod config;
pub mod ledger;
pub mod models;
pub mod service;

pub use config::Config;
pub use ledger::{ContractStore, MemoryStore, PostgresStore, StoreError};
pub use models::*;
pub use service::FilteredContractsService;
