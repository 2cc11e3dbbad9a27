use foundation::{FeatureId, LevelId};
use layers::Viewport;
use serde::{Deserialize, Serialize};

/// Where the user is: the level shown, the feature it is filtered by and the
/// camera fitted to it.
///
/// The controller owns exactly one of these; history holds frozen copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationState {
    pub level: LevelId,
    pub parent: Option<FeatureId>,
    pub viewport: Viewport,
}

impl NavigationState {
    pub fn at_root(level: LevelId, viewport: Viewport) -> Self {
        Self {
            level,
            parent: None,
            viewport,
        }
    }

    pub fn is_root_view(&self) -> bool {
        self.parent.is_none()
    }
}

pub type HistoryEntry = NavigationState;
