/// Lifecycle of a vehicle track.
///
/// Confirmation is sticky: a confirmed track that misses a frame becomes
/// `Lost` and returns to `Confirmed` on its next match, while a tentative
/// track stays tentative until it strings together `min_hits` matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackState {
    /// Has not yet reached `min_hits` consecutive matches
    #[default]
    Tentative,
    /// Confirmed and matched in the latest frame
    Confirmed,
    /// Confirmed but missed in the latest frame
    Lost,
}
