/// Lifecycle of one level's feature collection inside the store.
///
/// Absent → Loading → Ready, or back to Absent when the load fails so the
/// next visit retries. Ready is terminal for the session.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Absent,
    Loading,
    Ready,
}

impl LoadState {
    pub fn as_str(self) -> &'static str {
        match self {
            LoadState::Absent => "absent",
            LoadState::Loading => "loading",
            LoadState::Ready => "ready",
        }
    }
}
