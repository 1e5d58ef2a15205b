use thiserror::Error;

use crate::core::types::{LocationId, PlayerId, UnitId};

#[derive(Error, Debug)]
pub enum OddsError {
    #[error("No world state bound to the calculator")]
    NotReady,

    #[error("Calculation requested before forces and location were configured")]
    NotConfigured,

    #[error("Invalid order of losses {order:?}: {reason}")]
    InvalidCasualtyOrder { order: String, reason: String },

    #[error("Unsupported query during odds simulation: {0}")]
    Unsupported(&'static str),

    #[error("Player not found: {0}")]
    UnknownPlayer(PlayerId),

    #[error("Location not found: {0}")]
    UnknownLocation(LocationId),

    #[error("Unit type not in catalog: {0}")]
    UnknownUnitType(String),

    #[error("Unit not found: {0}")]
    UnknownUnit(UnitId),

    #[error("Unit already present: {0}")]
    DuplicateUnit(UnitId),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OddsError {
    pub(crate) fn casualty_order(order: &str, reason: impl Into<String>) -> Self {
        Self::InvalidCasualtyOrder {
            order: order.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OddsError>;
