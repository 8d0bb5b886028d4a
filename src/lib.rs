pub mod capacity;
pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod lifecycle;
pub mod logging;
pub mod precheck;
pub mod rebalance;
pub mod storage;
pub mod sweeper;
pub mod types;
pub mod wal;
