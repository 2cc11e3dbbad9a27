use std::fmt;

use foundation::{FeatureId, LevelId};
use streaming::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationError {
    /// A level needed for the transition could not be loaded. Navigation
    /// state is unchanged.
    DataUnavailable { level: LevelId, reason: String },
    /// The id is not part of the currently shown set.
    UnknownFeature { level: LevelId, feature: FeatureId },
    UnknownLevel(LevelId),
}

impl fmt::Display for NavigationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavigationError::DataUnavailable { level, reason } => {
                write!(f, "level {level} is unavailable: {reason}")
            }
            NavigationError::UnknownFeature { level, feature } => {
                write!(f, "feature {feature} is not shown at level {level}")
            }
            NavigationError::UnknownLevel(level) => write!(f, "unknown level: {level}"),
        }
    }
}

impl std::error::Error for NavigationError {}

impl From<StoreError> for NavigationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnknownLevel(level) => NavigationError::UnknownLevel(level),
            StoreError::DataUnavailable { level, reason } => {
                NavigationError::DataUnavailable { level, reason }
            }
        }
    }
}
