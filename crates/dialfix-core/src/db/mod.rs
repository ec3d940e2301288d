//! Database layer for Dialfix

mod connection;
mod contact_repository;
mod migrations;
mod staged_repository;

pub use connection::Database;
pub use contact_repository::{ContactCache, LibSqlContactCache};
pub use staged_repository::{LibSqlStagedChangeStore, StagedChangeStore};
