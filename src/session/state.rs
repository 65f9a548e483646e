//! Session lifecycle states

/// Where a session is in its lifecycle.
///
/// `Idle -> Uploaded -> Processing -> Processed -> (Highlighting | Preview)`.
/// A new document may be uploaded from any settled state; a failed run drops
/// back to `Uploaded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No document loaded
    #[default]
    Idle,
    /// Document loaded, not yet processed
    Uploaded,
    /// Page loop running
    Processing,
    /// Indices built and persisted
    Processed,
    /// Pages rendered with keyword highlights
    Highlighting,
    /// First page rendered without highlights
    Preview,
}

impl SessionState {
    /// Whether moving to `next` is a legal transition
    pub fn can_transition(self, next: SessionState) -> bool {
        use SessionState::*;

        match (self, next) {
            (Processing, Uploaded) => true,
            (Processing, _) => next == Processed,
            (_, Uploaded) => true,
            (Uploaded, Processing) => true,
            (Processed | Highlighting | Preview, Highlighting | Preview) => true,
            _ => false,
        }
    }

}
