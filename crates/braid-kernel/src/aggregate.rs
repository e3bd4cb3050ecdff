//! Error aggregation: fold per-branch outcomes into one call result.
//!
//! The fold starts from "nothing tried yet". A success anywhere makes the
//! whole call a success; when every branch failed, the last failure's
//! errno is the one reported.

use nix::errno::Errno;

use crate::error::{BraidError, Result};
use crate::executor::Outcome;

/// Running state of the fold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Accumulator {
    #[default]
    Unattempted,
    Succeeded,
    Failed(Errno),
}

impl Accumulator {
    /// One step of the fold.
    pub fn fold(self, outcome: Outcome) -> Self {
        match (self, outcome) {
            (Accumulator::Succeeded, _) | (_, Outcome::Success) => Accumulator::Succeeded,
            (_, Outcome::Failure(errno)) => Accumulator::Failed(errno),
        }
    }

    /// The call's result.
    ///
    /// `Unattempted` only arises if no branch ran at all; callers reject
    /// empty candidate lists earlier, so it surfaces as `ENOENT`.
    pub fn finish(self) -> Result<()> {
        match self {
            Accumulator::Succeeded => Ok(()),
            Accumulator::Failed(errno) => Err(BraidError::Branch(errno)),
            Accumulator::Unattempted => Err(BraidError::no_branch(Errno::ENOENT)),
        }
    }
}

/// Fold a sequence of outcomes left to right.
pub fn reduce<I>(outcomes: I) -> Result<()>
where
    I: IntoIterator<Item = Outcome>,
{
    outcomes
        .into_iter()
        .fold(Accumulator::default(), Accumulator::fold)
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    use Outcome::{Failure, Success};

    #[rstest]
    #[case::single_success(vec![Success], Ok(()))]
    #[case::success_first(vec![Success, Failure(Errno::EACCES)], Ok(()))]
    #[case::success_last(vec![Failure(Errno::EACCES), Success], Ok(()))]
    #[case::success_middle(vec![Failure(Errno::EIO), Success, Failure(Errno::ENOSPC)], Ok(()))]
    #[case::last_failure_wins(
        vec![Failure(Errno::EACCES), Failure(Errno::ENOSPC)],
        Err(BraidError::Branch(Errno::ENOSPC))
    )]
    #[case::last_failure_wins_reversed(
        vec![Failure(Errno::ENOSPC), Failure(Errno::EACCES)],
        Err(BraidError::Branch(Errno::EACCES))
    )]
    #[case::empty(vec![], Err(BraidError::no_branch(Errno::ENOENT)))]
    fn reduce_cases(#[case] outcomes: Vec<Outcome>, #[case] expected: Result<()>) {
        assert_eq!(reduce(outcomes), expected);
    }

    #[test]
    fn unattempted_is_distinct() {
        let acc = Accumulator::default();
        assert_eq!(acc, Accumulator::Unattempted);
        assert_ne!(acc, Accumulator::Succeeded);
        assert_eq!(acc.fold(Failure(Errno::EIO)), Accumulator::Failed(Errno::EIO));
    }

    fn errno() -> impl Strategy<Value = Errno> {
        prop::sample::select(vec![
            Errno::EACCES,
            Errno::ENOSPC,
            Errno::EROFS,
            Errno::ENOENT,
            Errno::EPERM,
            Errno::EIO,
        ])
    }

    fn outcome() -> impl Strategy<Value = Outcome> {
        prop_oneof![Just(Success), errno().prop_map(Failure)]
    }

    proptest! {
        #[test]
        fn any_success_dominates(
            before in prop::collection::vec(outcome(), 0..8),
            after in prop::collection::vec(outcome(), 0..8),
        ) {
            let mut outcomes = before;
            outcomes.push(Success);
            outcomes.extend(after);
            prop_assert_eq!(reduce(outcomes), Ok(()));
        }

        #[test]
        fn all_failures_report_the_last(errnos in prop::collection::vec(errno(), 1..8)) {
            let last = *errnos.last().unwrap();
            let outcomes = errnos.into_iter().map(Failure);
            prop_assert_eq!(reduce(outcomes), Err(BraidError::Branch(last)));
        }
    }
}
