use thiserror::Error;

pub mod compliance;
pub mod database;
mod data_manager;

pub use data_manager::*;

pub const DATA_DIR: &str = "data/";
pub const DATABASE_PATH: &str = "data/dispatch.db";

#[derive(Debug, Error)]
pub enum DataManagerError {
    #[error("storage setup: {0}")]
    Setup(String),
    #[error("database failure: {0}")]
    Database(#[from] sqlx::Error),
    #[error("vehicle already has an open trip (log {0})")]
    TripConflict(i64),
    #[error("parent log {0} is not a trip start for this driver and vehicle")]
    InvalidParent(i64),
    #[error("compliance reporter: {0}")]
    Reporter(String),
}
