//! Database layer for OnTable

mod connection;
mod migrations;
mod repository;

pub use connection::Database;
pub use repository::{DecisionRepository, SqliteDecisionRepository};
