//! Choosing which group keeps playing when two groups merge.

use crate::error::{CommandError, CommandResult};
use crate::sonos::types::SourceKind;

/// One group taking part in a merge, represented by its coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorCandidate {
    pub coordinator_id: String,
    /// Display name used in error messages.
    pub name: String,
    pub source: SourceKind,
}

/// Picks the coordinator of a merged group.
pub trait CoordinatorPolicy: Send + Sync {
    /// Returns the index of the winning candidate.
    ///
    /// # Errors
    /// [`CommandError::AmbiguousCoordinator`] when the choice cannot be made
    /// without asking the user.
    fn choose(&self, candidates: &[CoordinatorCandidate]) -> CommandResult<usize>;
}

/// Line-in beats TV beats streaming or radio beats idle.
///
/// A tie between equal non-idle sources is ambiguous. When nothing is
/// playing the first candidate wins.
#[derive(Debug, Default, Clone, Copy)]
pub struct PriorityPolicy;

impl PriorityPolicy {
    #[must_use]
    pub fn priority(source: SourceKind) -> u8 {
        match source {
            SourceKind::LineIn => 3,
            SourceKind::Tv => 2,
            SourceKind::Streaming | SourceKind::Radio => 1,
            SourceKind::Idle | SourceKind::Following => 0,
        }
    }
}

impl CoordinatorPolicy for PriorityPolicy {
    fn choose(&self, candidates: &[CoordinatorCandidate]) -> CommandResult<usize> {
        let Some(best) = candidates
            .iter()
            .map(|c| Self::priority(c.source))
            .max()
        else {
            return Err(CommandError::InvalidGrouping("no candidates".into()));
        };

        let winners: Vec<usize> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| Self::priority(c.source) == best)
            .map(|(i, _)| i)
            .collect();

        match winners.as_slice() {
            [only] => Ok(*only),
            [first, ..] if best == 0 => Ok(*first),
            _ => Err(CommandError::AmbiguousCoordinator {
                candidates: winners
                    .iter()
                    .map(|&i| candidates[i].name.clone())
                    .collect(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, source: SourceKind) -> CoordinatorCandidate {
        CoordinatorCandidate {
            coordinator_id: format!("RINCON_{}", name.to_uppercase()),
            name: name.to_string(),
            source,
        }
    }

    #[test]
    fn streaming_beats_idle() {
        let candidates = [
            candidate("Office", SourceKind::Idle),
            candidate("Kitchen", SourceKind::Streaming),
        ];
        assert_eq!(PriorityPolicy.choose(&candidates).expect("choice"), 1);
    }

    #[test]
    fn line_in_beats_tv_beats_radio() {
        let candidates = [
            candidate("Den", SourceKind::Radio),
            candidate("Lounge", SourceKind::Tv),
        ];
        assert_eq!(PriorityPolicy.choose(&candidates).expect("choice"), 1);

        let candidates = [
            candidate("Lounge", SourceKind::Tv),
            candidate("Studio", SourceKind::LineIn),
        ];
        assert_eq!(PriorityPolicy.choose(&candidates).expect("choice"), 1);
    }

    #[test]
    fn equal_playing_sources_are_ambiguous() {
        let candidates = [
            candidate("Kitchen", SourceKind::Streaming),
            candidate("Office", SourceKind::Radio),
        ];
        match PriorityPolicy.choose(&candidates) {
            Err(CommandError::AmbiguousCoordinator { candidates }) => {
                assert_eq!(candidates, vec!["Kitchen", "Office"]);
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn nothing_playing_keeps_first() {
        let candidates = [
            candidate("Kitchen", SourceKind::Idle),
            candidate("Office", SourceKind::Following),
        ];
        assert_eq!(PriorityPolicy.choose(&candidates).expect("choice"), 0);
    }
}
