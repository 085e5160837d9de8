use super::PalmPosition;

/// What the compositor knows about the hand for the current tick.
///
/// Derived from the latest detection only, never smoothed across frames.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum HandState {
    #[default]
    NoHand,
    HandPresent(PalmPosition),
}

impl HandState {
    pub fn palm(&self) -> Option<&PalmPosition> {
        match self {
            HandState::NoHand => None,
            HandState::HandPresent(palm) => Some(palm),
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, HandState::HandPresent(_))
    }
}

impl From<Option<PalmPosition>> for HandState {
    fn from(palm: Option<PalmPosition>) -> Self {
        palm.map_or(HandState::NoHand, HandState::HandPresent)
    }
}
