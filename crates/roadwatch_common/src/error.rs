//! Error types for the gamification core.

use thiserror::Error;
use uuid::Uuid;

/// Failures raised by a storage backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    #[error("XP overflow for user {0}")]
    XpOverflow(Uuid),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failures surfaced by the rank and achievement engines.
#[derive(Error, Debug)]
pub enum GamificationError {
    #[error("User {0} not found")]
    UserNotFound(Uuid),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Catalog error: {0}")]
    Catalog(String),
}

impl GamificationError {
    pub fn code(&self) -> i32 {
        match self {
            GamificationError::UserNotFound(_) => -32404,
            GamificationError::Store(StoreError::XpOverflow(_)) => -32010,
            GamificationError::Store(_) => -32500,
            GamificationError::Catalog(_) => -32020,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GamificationError::UserNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, GamificationError>;
